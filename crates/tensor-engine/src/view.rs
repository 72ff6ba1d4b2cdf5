// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Non-owning strided windows onto a segment.

use crate::segment::{SegmentCore, SegmentRead};
use crate::TensorError;
use parking_lot::MappedRwLockReadGuard;
use std::sync::Arc;

/// Window of `len` elements starting at `offset`, `stride` apart, over the
/// buffer of an owning segment.
///
/// Reference counting is forwarded to the base; a view never frees anything
/// on its own.
#[derive(Clone)]
pub struct StridedView {
    base: Arc<SegmentCore>,
    offset: usize,
    stride: usize,
    len: usize,
}

impl StridedView {
    pub(crate) fn new(
        base: Arc<SegmentCore>,
        offset: usize,
        stride: usize,
        len: usize,
    ) -> Result<Self, TensorError> {
        if stride == 0 {
            return Err(TensorError::ShapeMismatch {
                op: "view",
                expected: "a stride of at least 1".into(),
                actual: "0".into(),
            });
        }
        match window_end(offset, stride, len) {
            Some(end) if end <= base.size() => {}
            _ => return Err(out_of_range(offset, stride, len, base.size())),
        }
        Ok(Self {
            base,
            offset,
            stride,
            len,
        })
    }

    /// A window onto this window, expressed directly over the base buffer.
    pub(crate) fn narrow(
        &self,
        offset: usize,
        stride: usize,
        len: usize,
    ) -> Result<Self, TensorError> {
        let outside = || out_of_range(offset, stride, len, self.len);
        match window_end(offset, stride.max(1), len) {
            Some(end) if end <= self.len => {}
            _ => return Err(outside()),
        }
        let start = offset
            .checked_mul(self.stride)
            .and_then(|skip| skip.checked_add(self.offset))
            .ok_or_else(outside)?;
        let step = match len {
            0 | 1 if stride > 0 => 1,
            _ => stride.checked_mul(self.stride).ok_or_else(outside)?,
        };
        Self::new(Arc::clone(&self.base), start, step, len)
    }

    pub(crate) fn base(&self) -> &Arc<SegmentCore> {
        &self.base
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` when the elements sit next to each other in the base buffer.
    pub fn is_contiguous(&self) -> bool {
        self.stride == 1 || self.len <= 1
    }

    #[inline]
    fn position(&self, index: usize) -> usize {
        assert!(
            index < self.len,
            "view index {index} out of range for length {}",
            self.len
        );
        self.offset + index * self.stride
    }

    pub fn get(&self, index: usize) -> f32 {
        self.base.read()[self.position(index)]
    }

    pub fn set(&self, index: usize, value: f32) {
        let at = self.position(index);
        self.base.write()[at] = value;
    }

    pub(crate) fn read(&self) -> SegmentRead<'_> {
        if self.is_contiguous() {
            let (start, end) = (self.offset, self.offset + self.len);
            SegmentRead::Borrowed(MappedRwLockReadGuard::map(self.base.read(), |all| {
                &all[start..end]
            }))
        } else {
            SegmentRead::Copied(self.gather())
        }
    }

    fn gather(&self) -> Vec<f32> {
        let data = self.base.read();
        (0..self.len)
            .map(|i| data[self.offset + i * self.stride])
            .collect()
    }

    pub(crate) fn copy_to(&self, target: &mut [f32]) {
        let data = self.base.read();
        if self.stride == 1 {
            target.copy_from_slice(&data[self.offset..self.offset + self.len]);
            return;
        }
        for (i, t) in target.iter_mut().enumerate() {
            *t = data[self.offset + i * self.stride];
        }
    }

    pub(crate) fn modify<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        if self.is_contiguous() {
            let mut data = self.base.write();
            return f(&mut data[self.offset..self.offset + self.len]);
        }
        let mut scratch = self.gather();
        let out = f(&mut scratch);
        let mut data = self.base.write();
        for (i, v) in scratch.into_iter().enumerate() {
            data[self.offset + i * self.stride] = v;
        }
        out
    }
}

/// One past the last element a window touches, or `None` on overflow.
fn window_end(offset: usize, stride: usize, len: usize) -> Option<usize> {
    match len {
        0 => Some(offset),
        _ => (len - 1)
            .checked_mul(stride)?
            .checked_add(offset)?
            .checked_add(1),
    }
}

fn out_of_range(offset: usize, stride: usize, len: usize, size: usize) -> TensorError {
    TensorError::ShapeMismatch {
        op: "view",
        expected: format!("a window inside {size} elements"),
        actual: format!("offset {offset}, stride {stride}, length {len}"),
    }
}

impl std::fmt::Debug for StridedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedView")
            .field("offset", &self.offset)
            .field("stride", &self.stride)
            .field("len", &self.len)
            .finish()
    }
}
