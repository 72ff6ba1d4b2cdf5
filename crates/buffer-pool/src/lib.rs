// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # buffer-pool
//!
//! A free-list allocator for `f32` tensor buffers with an optional byte
//! budget. The tensor engine leases buffers from here for its pool-backed
//! segments and gets them back automatically when the last reference to a
//! segment goes away.
//!
//! # Key Components
//!
//! - [`PoolBudget`] — a byte ceiling with human-readable parsing (`"256M"`).
//! - [`BufferPool`] — the allocator: enforces the budget, caches returned
//!   buffers binned by power-of-two size class, and tracks statistics.
//! - [`BufferLease`] — an RAII wrapper around a leased buffer. Dropping the
//!   lease puts the buffer back on the free list.
//! - [`PoolStats`] — cumulative counters (reuse ratio, peak bytes, OOMs).
//!
//! # Ownership Model
//!
//! ```text
//! BufferPool::lease(len)
//!       │
//!       ▼
//!   BufferLease  ◄─── owns Vec<f32>, holds Arc<PoolShared>
//!       │
//!       │  drop()
//!       ▼
//!   PoolShared::give_back()  ──► free list
//! ```
//!
//! # Example
//! ```
//! use buffer_pool::{BufferPool, PoolBudget};
//!
//! let pool = BufferPool::new(PoolBudget::from_mb(4));
//!
//! let a = pool.lease(1024).unwrap();
//! assert_eq!(a.len(), 1024);
//! assert_eq!(pool.allocated_bytes(), 4096);
//!
//! drop(a);
//! assert_eq!(pool.allocated_bytes(), 0);
//! ```

mod budget;
mod error;
mod lease;
mod pool;
mod stats;

pub use budget::PoolBudget;
pub use error::PoolError;
pub use lease::BufferLease;
pub use pool::BufferPool;
pub use stats::PoolStats;
