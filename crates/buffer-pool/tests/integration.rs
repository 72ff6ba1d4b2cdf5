// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: lease lifecycles across handles and threads.

use buffer_pool::{BufferPool, PoolBudget, PoolError};
use std::sync::Arc;
use std::thread;

#[test]
fn test_budget_enforced_across_clones() {
    let pool = BufferPool::new(PoolBudget::from_bytes(8192));
    let clone = pool.clone();

    let a = pool.lease(1024).unwrap();
    let b = clone.lease(1024).unwrap();
    assert_eq!(pool.allocated_bytes(), 8192);
    assert!(matches!(
        clone.lease(1),
        Err(PoolError::OutOfMemory { available_bytes: 0, .. })
    ));

    drop(a);
    assert_eq!(clone.available_bytes(), 4096);
    drop(b);
    assert_eq!(pool.allocated_bytes(), 0);
    assert_eq!(pool.stats().oom_count, 1);
}

#[test]
fn test_returned_buffers_are_zeroed_on_reuse() {
    let pool = BufferPool::unbounded();
    let mut lease = pool.lease(2000).unwrap();
    lease.as_mut_slice().fill(7.0);
    drop(lease);
    assert!(pool.free_list_bytes() > 0);

    let again = pool.lease(1500).unwrap();
    assert_eq!(again.len(), 1500);
    assert!(again.as_slice().iter().all(|&x| x == 0.0));
    assert_eq!(pool.stats().reuse_hits, 1);

    drop(again);
    pool.shrink();
    assert_eq!(pool.free_list_bytes(), 0);
}

#[test]
fn test_concurrent_leases_balance() {
    let pool = Arc::new(BufferPool::new(PoolBudget::from_mb(16)));
    let workers: Vec<_> = (0..8)
        .map(|t| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for i in 0..50 {
                    let mut lease = pool.lease(256 + (t * 50 + i) % 700).unwrap();
                    lease.as_mut_slice()[0] = t as f32;
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.leases, 400);
    assert_eq!(stats.returns, 400);
    assert_eq!(pool.allocated_bytes(), 0);
    assert!(stats.peak_bytes <= 8 * 955 * 4);
}

#[test]
fn test_budget_strings() {
    assert_eq!(PoolBudget::parse("64K").unwrap().as_bytes(), 64 * 1024);
    assert_eq!(PoolBudget::parse("1gb").unwrap().as_bytes(), 1024 * 1024 * 1024);
    assert!(matches!(
        PoolBudget::parse("-3M"),
        Err(PoolError::InvalidBudget { .. })
    ));
}
