// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for buffer leasing.

/// Errors raised by [`crate::BufferPool`] and [`crate::PoolBudget`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Granting the lease would push live bytes past the budget.
    #[error("out of memory: requested {requested_bytes} bytes, but only {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// A lease of zero elements was requested.
    #[error("cannot lease a zero-length buffer")]
    ZeroSizedLease,

    /// A budget string could not be parsed.
    #[error("invalid budget '{input}': {reason}")]
    InvalidBudget { input: String, reason: &'static str },
}
