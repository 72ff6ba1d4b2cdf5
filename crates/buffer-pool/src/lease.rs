// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII lease over a pooled `f32` buffer.

use crate::pool::PoolShared;
use std::sync::Arc;

/// A buffer on loan from a [`BufferPool`](crate::BufferPool).
///
/// The buffer is zero-filled when handed out and goes back to the pool's
/// free list when the lease is dropped.
pub struct BufferLease {
    /// `None` only while the lease is being dropped.
    data: Option<Vec<f32>>,
    pool: Arc<PoolShared>,
}

impl BufferLease {
    pub(crate) fn new(data: Vec<f32>, pool: Arc<PoolShared>) -> Self {
        Self {
            data: Some(data),
            pool,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    /// Number of `f32` elements on loan.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes charged against the pool budget for this lease.
    pub fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<f32>()
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.data.take() {
            self.pool.give_back(buffer);
        }
    }
}

impl std::fmt::Debug for BufferLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferLease")
            .field("len", &self.len())
            .finish()
    }
}
