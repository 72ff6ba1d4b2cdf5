// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Free-list buffer pool with budget enforcement.
//!
//! Returned buffers are cached by size class (the next power of two of the
//! element count, never below [`MIN_CLASS_ELEMENTS`]) so that a later lease
//! of a similar length reuses the allocation instead of hitting the heap.
//! The budget is charged for the requested length, not the class capacity.

use crate::{BufferLease, PoolBudget, PoolError, PoolStats};
use free_list::FreeList;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Smallest size class, in elements.
pub const MIN_CLASS_ELEMENTS: usize = 1024;

const F32_BYTES: usize = std::mem::size_of::<f32>();

mod free_list {
    use std::collections::HashMap;

    /// Cached buffers keyed by size class.
    #[derive(Default)]
    pub(super) struct FreeList {
        classes: HashMap<usize, Vec<Vec<f32>>>,
        cached_bytes: usize,
    }

    impl FreeList {
        pub(super) fn take(&mut self, class: usize) -> Option<Vec<f32>> {
            let buffer = self.classes.get_mut(&class)?.pop()?;
            self.cached_bytes -= buffer.capacity() * super::F32_BYTES;
            Some(buffer)
        }

        pub(super) fn put(&mut self, class: usize, buffer: Vec<f32>) {
            self.cached_bytes += buffer.capacity() * super::F32_BYTES;
            self.classes.entry(class).or_default().push(buffer);
        }

        pub(super) fn clear(&mut self) {
            self.classes.clear();
            self.cached_bytes = 0;
        }

        pub(super) fn cached_bytes(&self) -> usize {
            self.cached_bytes
        }
    }
}

/// State shared between the pool and its outstanding leases.
pub(crate) struct PoolShared {
    budget: PoolBudget,
    live_bytes: AtomicUsize,
    free: Mutex<FreeList>,
    stats: Mutex<PoolStats>,
}

impl PoolShared {
    /// Called from `BufferLease::drop`.
    pub(crate) fn give_back(&self, buffer: Vec<f32>) {
        self.live_bytes
            .fetch_sub(buffer.len() * F32_BYTES, Ordering::AcqRel);

        if let Ok(mut stats) = self.stats.lock() {
            stats.record_return();
        }
        if let Ok(mut free) = self.free.lock() {
            free.put(size_class(buffer.len()), buffer);
        }
    }
}

/// Hands out zero-filled `f32` buffers under a byte budget.
///
/// Cloning a `BufferPool` yields another handle to the same pool.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    pub fn new(budget: PoolBudget) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                budget,
                live_bytes: AtomicUsize::new(0),
                free: Mutex::new(FreeList::default()),
                stats: Mutex::new(PoolStats::default()),
            }),
        }
    }

    /// A pool that never refuses a lease on budget grounds.
    pub fn unbounded() -> Self {
        Self::new(PoolBudget::unlimited())
    }

    /// Leases a zero-filled buffer of `len` elements.
    ///
    /// # Errors
    /// [`PoolError::ZeroSizedLease`] for `len == 0`,
    /// [`PoolError::OutOfMemory`] when the budget would be exceeded.
    pub fn lease(&self, len: usize) -> Result<BufferLease, PoolError> {
        if len == 0 {
            return Err(PoolError::ZeroSizedLease);
        }

        let bytes = len.saturating_mul(F32_BYTES);
        let budget = self.shared.budget.as_bytes();
        let reserved = self
            .shared
            .live_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(bytes).filter(|&total| total <= budget)
            });

        let live_before = match reserved {
            Ok(previous) => previous,
            Err(live) => {
                if let Ok(mut stats) = self.shared.stats.lock() {
                    stats.record_oom();
                }
                return Err(PoolError::OutOfMemory {
                    requested_bytes: bytes,
                    available_bytes: budget.saturating_sub(live),
                    budget_bytes: budget,
                });
            }
        };

        let class = size_class(len);
        let cached = self
            .shared
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.take(class));
        let reused = cached.is_some();

        let buffer = match cached {
            Some(mut buffer) => {
                buffer.clear();
                buffer.resize(len, 0.0);
                tracing::debug!(len, class, "reusing pooled buffer");
                buffer
            }
            None => {
                let mut buffer = Vec::with_capacity(class);
                buffer.resize(len, 0.0);
                buffer
            }
        };

        if let Ok(mut stats) = self.shared.stats.lock() {
            stats.record_lease(bytes, reused, live_before + bytes);
        }

        Ok(BufferLease::new(buffer, Arc::clone(&self.shared)))
    }

    /// Bytes currently on loan.
    pub fn allocated_bytes(&self) -> usize {
        self.shared.live_bytes.load(Ordering::Acquire)
    }

    /// Bytes that can still be leased before the budget is hit.
    pub fn available_bytes(&self) -> usize {
        self.shared
            .budget
            .as_bytes()
            .saturating_sub(self.allocated_bytes())
    }

    pub fn budget(&self) -> PoolBudget {
        self.shared.budget
    }

    /// Bytes held by cached (returned, not yet reused) buffers.
    pub fn free_list_bytes(&self) -> usize {
        self.shared
            .free
            .lock()
            .map(|free| free.cached_bytes())
            .unwrap_or(0)
    }

    /// Drops every cached buffer. Outstanding leases are unaffected.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.shared.free.lock() {
            free.clear();
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.shared
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Size class for a buffer of `len` elements.
fn size_class(len: usize) -> usize {
    len.max(MIN_CLASS_ELEMENTS).next_power_of_two()
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("budget", &self.shared.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("free_list_bytes", &self.free_list_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_and_return() {
        let pool = BufferPool::new(PoolBudget::from_mb(1));

        let lease = pool.lease(256).unwrap();
        assert_eq!(lease.len(), 256);
        assert_eq!(pool.allocated_bytes(), 1024);

        drop(lease);
        assert_eq!(pool.allocated_bytes(), 0);
        assert_eq!(pool.stats().returns, 1);
    }

    #[test]
    fn test_lease_is_zeroed_after_reuse() {
        let pool = BufferPool::unbounded();

        let mut lease = pool.lease(100).unwrap();
        lease.as_mut_slice().fill(7.5);
        drop(lease);

        let again = pool.lease(100).unwrap();
        assert!(again.as_slice().iter().all(|&x| x == 0.0));
        assert_eq!(pool.stats().reuse_hits, 1);
    }

    #[test]
    fn test_same_class_is_reused() {
        let pool = BufferPool::unbounded();

        drop(pool.lease(3000).unwrap());
        // 3000 and 4000 both round up to the 4096 class.
        let lease = pool.lease(4000).unwrap();
        assert_eq!(lease.len(), 4000);

        let stats = pool.stats();
        assert_eq!(stats.fresh_allocations, 1);
        assert_eq!(stats.reuse_hits, 1);
    }

    #[test]
    fn test_out_of_memory() {
        let pool = BufferPool::new(PoolBudget::from_bytes(1024));

        let _a = pool.lease(128).unwrap();
        let _b = pool.lease(128).unwrap();
        let err = pool.lease(1).unwrap_err();

        assert_eq!(
            err,
            PoolError::OutOfMemory {
                requested_bytes: 4,
                available_bytes: 0,
                budget_bytes: 1024,
            }
        );
        assert_eq!(pool.stats().oom_count, 1);
    }

    #[test]
    fn test_zero_length_lease() {
        let pool = BufferPool::unbounded();
        assert_eq!(pool.lease(0).unwrap_err(), PoolError::ZeroSizedLease);
    }

    #[test]
    fn test_shrink_clears_cache() {
        let pool = BufferPool::unbounded();
        drop(pool.lease(2048).unwrap());
        assert!(pool.free_list_bytes() >= 2048 * 4);

        pool.shrink();
        assert_eq!(pool.free_list_bytes(), 0);
    }

    #[test]
    fn test_peak_bytes() {
        let pool = BufferPool::unbounded();
        let a = pool.lease(10).unwrap();
        let b = pool.lease(20).unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.stats().peak_bytes, 120);
    }

    #[test]
    fn test_lease_survives_pool_handle_drop() {
        let pool = BufferPool::unbounded();
        let observer = pool.clone();
        let lease = pool.lease(8).unwrap();
        drop(pool);

        assert_eq!(observer.allocated_bytes(), 32);
        drop(lease);
        assert_eq!(observer.allocated_bytes(), 0);
    }

    #[test]
    fn test_size_class() {
        assert_eq!(size_class(1), MIN_CLASS_ELEMENTS);
        assert_eq!(size_class(1024), 1024);
        assert_eq!(size_class(1025), 2048);
    }

    #[test]
    fn test_debug_format() {
        let debug = format!("{:?}", BufferPool::new(PoolBudget::from_mb(2)));
        assert!(debug.contains("BufferPool"));
        assert!(debug.contains("budget"));
    }
}
