// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Cumulative pool counters.

/// Usage counters for a [`crate::BufferPool`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Successful leases.
    pub leases: u64,
    /// Leases served from the free list.
    pub reuse_hits: u64,
    /// Leases that needed a fresh heap allocation.
    pub fresh_allocations: u64,
    /// Buffers handed back to the pool.
    pub returns: u64,
    /// Lease requests rejected by the budget.
    pub oom_count: u64,
    /// High-water mark of live leased bytes.
    pub peak_bytes: usize,
    /// Total bytes ever leased.
    pub cumulative_bytes: u64,
}

impl PoolStats {
    /// Fraction of leases served from the free list, in `[0.0, 1.0]`.
    pub fn reuse_ratio(&self) -> f64 {
        if self.leases == 0 {
            return 0.0;
        }
        self.reuse_hits as f64 / self.leases as f64
    }

    pub(crate) fn record_lease(&mut self, bytes: usize, reused: bool, live_bytes: usize) {
        self.leases += 1;
        self.cumulative_bytes += bytes as u64;
        if reused {
            self.reuse_hits += 1;
        } else {
            self.fresh_allocations += 1;
        }
        self.peak_bytes = self.peak_bytes.max(live_bytes);
    }

    pub(crate) fn record_return(&mut self) {
        self.returns += 1;
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "{} leases ({} reused, {:.0}% reuse), {} returned, {} OOMs, peak {:.2} MB",
            self.leases,
            self.reuse_hits,
            self.reuse_ratio() * 100.0,
            self.returns,
            self.oom_count,
            self.peak_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}
