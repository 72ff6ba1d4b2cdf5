// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference-counted flat `f32` buffers.
//!
//! A [`Segment`] is a cheap handle. Cloning it does not touch the reference
//! count: that count is an explicit protocol driven by the shape wrappers,
//! which call [`Segment::add_ref`] when built over a segment and
//! [`Segment::release`] exactly once when disposed. When the count reaches
//! zero the backing buffer is freed; a pool lease goes back to its pool at
//! that moment, not when the last handle is dropped.
//!
//! ```text
//!  Segment ──► SegmentCore { refs, RwLock<Option<Storage>> }
//!     │                            │
//!     │ view(offset, stride, len)  ├── Storage::Leased(BufferLease)
//!     ▼                            └── Storage::Plain(Vec<f32>)
//!  Segment (strided) ──► same SegmentCore
//! ```

use crate::view::StridedView;
use crate::TensorError;
use buffer_pool::BufferLease;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

/// Ownership flavour of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// Buffer leased from a [`buffer_pool::BufferPool`].
    Leased,
    /// Buffer allocated directly on the heap.
    Plain,
    /// Non-owning window onto another segment.
    Strided,
}

/// Backing memory of an owning segment.
pub(crate) enum Storage {
    Leased(BufferLease),
    Plain(Vec<f32>),
}

impl Storage {
    pub(crate) fn as_slice(&self) -> &[f32] {
        match self {
            Storage::Leased(lease) => lease.as_slice(),
            Storage::Plain(values) => values,
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f32] {
        match self {
            Storage::Leased(lease) => lease.as_mut_slice(),
            Storage::Plain(values) => values,
        }
    }

    fn kind(&self) -> SegmentKind {
        match self {
            Storage::Leased(_) => SegmentKind::Leased,
            Storage::Plain(_) => SegmentKind::Plain,
        }
    }
}

#[cold]
#[track_caller]
fn use_after_release() -> ! {
    panic!("tensor segment accessed after its final release")
}

fn live_slice(storage: &Option<Storage>) -> &[f32] {
    match storage {
        Some(storage) => storage.as_slice(),
        None => use_after_release(),
    }
}

fn live_slice_mut(storage: &mut Option<Storage>) -> &mut [f32] {
    match storage {
        Some(storage) => storage.as_mut_slice(),
        None => use_after_release(),
    }
}

/// Shared state of an owning segment; strided views point at it too.
pub(crate) struct SegmentCore {
    kind: SegmentKind,
    size: usize,
    refs: AtomicIsize,
    storage: RwLock<Option<Storage>>,
}

impl SegmentCore {
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    fn add_ref(&self) -> isize {
        debug_assert!(self.is_live(), "add_ref on a released tensor segment");
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn release(&self) -> isize {
        let remaining = self.refs.fetch_sub(1, Ordering::AcqRel) - 1;
        debug_assert!(
            remaining >= 0,
            "tensor segment released more times than it was referenced"
        );
        if remaining <= 0 {
            let freed = self.storage.write().take();
            if let Some(storage) = freed {
                tracing::trace!(size = self.size, kind = ?self.kind, "segment buffer freed");
                drop(storage);
            }
        }
        remaining
    }

    fn ref_count(&self) -> isize {
        self.refs.load(Ordering::Acquire)
    }

    fn is_live(&self) -> bool {
        self.storage.read_recursive().is_some()
    }

    /// Read access to the whole buffer. Re-entrant for readers on one thread.
    ///
    /// # Panics
    /// Panics if the segment has been released.
    pub(crate) fn read(&self) -> MappedRwLockReadGuard<'_, [f32]> {
        RwLockReadGuard::map(self.storage.read_recursive(), live_slice)
    }

    /// Write access to the whole buffer.
    ///
    /// # Panics
    /// Panics if the segment has been released.
    pub(crate) fn write(&self) -> MappedRwLockWriteGuard<'_, [f32]> {
        RwLockWriteGuard::map(self.storage.write(), live_slice_mut)
    }
}

/// Contiguous read access to a segment's elements.
///
/// Borrows the backing buffer when the segment is contiguous, otherwise
/// holds a materialised copy.
pub enum SegmentRead<'a> {
    Borrowed(MappedRwLockReadGuard<'a, [f32]>),
    Copied(Vec<f32>),
}

impl Deref for SegmentRead<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match self {
            SegmentRead::Borrowed(guard) => &**guard,
            SegmentRead::Copied(values) => values.as_slice(),
        }
    }
}

/// Lazy iterator over a segment's elements, holding a read lock.
pub struct SegmentValues<'a> {
    data: MappedRwLockReadGuard<'a, [f32]>,
    offset: usize,
    stride: usize,
    next: usize,
    len: usize,
}

impl Iterator for SegmentValues<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.next >= self.len {
            return None;
        }
        let value = self.data[self.offset + self.next * self.stride];
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SegmentValues<'_> {}

#[derive(Clone)]
enum Repr {
    Owned(Arc<SegmentCore>),
    Strided(StridedView),
}

/// Handle to a reference-counted `f32` buffer or a strided window onto one.
#[derive(Clone)]
pub struct Segment {
    repr: Repr,
}

impl Segment {
    pub(crate) fn from_storage(storage: Storage) -> Self {
        let size = storage.as_slice().len();
        Self {
            repr: Repr::Owned(Arc::new(SegmentCore {
                kind: storage.kind(),
                size,
                refs: AtomicIsize::new(0),
                storage: RwLock::new(Some(storage)),
            })),
        }
    }

    /// A zero-filled, heap-allocated segment with a reference count of 0.
    pub fn plain(size: usize) -> Self {
        Self::from_storage(Storage::Plain(vec![0.0; size]))
    }

    /// Takes ownership of `values`.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self::from_storage(Storage::Plain(values))
    }

    /// Wraps a pool lease; the buffer returns to the pool on final release.
    pub fn leased(lease: BufferLease) -> Self {
        Self::from_storage(Storage::Leased(lease))
    }

    pub(crate) fn from_view(view: StridedView) -> Self {
        Self {
            repr: Repr::Strided(view),
        }
    }

    fn base(&self) -> &Arc<SegmentCore> {
        match &self.repr {
            Repr::Owned(core) => core,
            Repr::Strided(view) => view.base(),
        }
    }

    /// Number of addressable elements.
    pub fn size(&self) -> usize {
        match &self.repr {
            Repr::Owned(core) => core.size,
            Repr::Strided(view) => view.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn kind(&self) -> SegmentKind {
        match &self.repr {
            Repr::Owned(core) => core.kind,
            Repr::Strided(_) => SegmentKind::Strided,
        }
    }

    /// The strided window, when this segment is a view.
    pub fn as_view(&self) -> Option<&StridedView> {
        match &self.repr {
            Repr::Owned(_) => None,
            Repr::Strided(view) => Some(view),
        }
    }

    /// Increments the reference count (of the base segment, for views).
    pub fn add_ref(&self) -> isize {
        self.base().add_ref()
    }

    /// Decrements the reference count (of the base, for views) and frees the
    /// buffer once it reaches zero.
    ///
    /// Releasing more times than referenced is a contract violation and
    /// trips a debug assertion.
    pub fn release(&self) -> isize {
        self.base().release()
    }

    /// Current reference count of the owning buffer.
    pub fn ref_count(&self) -> isize {
        self.base().ref_count()
    }

    /// `false` once the owning buffer has been freed.
    pub fn is_valid(&self) -> bool {
        self.base().is_live()
    }

    /// `true` when both handles address the same owning buffer.
    pub fn shares_buffer_with(&self, other: &Segment) -> bool {
        Arc::ptr_eq(self.base(), other.base())
    }

    pub fn get(&self, index: usize) -> f32 {
        match &self.repr {
            Repr::Owned(core) => core.read()[index],
            Repr::Strided(view) => view.get(index),
        }
    }

    pub fn set(&self, index: usize, value: f32) {
        match &self.repr {
            Repr::Owned(core) => core.write()[index] = value,
            Repr::Strided(view) => view.set(index, value),
        }
    }

    /// Iterates the elements in order without copying them.
    pub fn values(&self) -> SegmentValues<'_> {
        match &self.repr {
            Repr::Owned(core) => SegmentValues {
                data: core.read(),
                offset: 0,
                stride: 1,
                next: 0,
                len: core.size,
            },
            Repr::Strided(view) => SegmentValues {
                data: view.base().read(),
                offset: view.offset(),
                stride: view.stride(),
                next: 0,
                len: view.len(),
            },
        }
    }

    /// The raw backing buffer, only for segments that own one.
    ///
    /// Strided views return `None`; use [`Segment::copy_to`] or
    /// [`Segment::read`] instead.
    pub fn local_buffer(&self) -> Option<MappedRwLockReadGuard<'_, [f32]>> {
        match &self.repr {
            Repr::Owned(core) => Some(core.read()),
            Repr::Strided(_) => None,
        }
    }

    /// Contiguous read access, copying only for non-unit strides.
    pub fn read(&self) -> SegmentRead<'_> {
        match &self.repr {
            Repr::Owned(core) => SegmentRead::Borrowed(core.read()),
            Repr::Strided(view) => view.read(),
        }
    }

    /// Copies the elements into a new `Vec`.
    pub fn to_vec(&self) -> Vec<f32> {
        match self.read() {
            SegmentRead::Borrowed(guard) => guard.to_vec(),
            SegmentRead::Copied(values) => values,
        }
    }

    /// Copies every element into `target`, which must be exactly `size()` long.
    pub fn copy_to(&self, target: &mut [f32]) -> Result<(), TensorError> {
        crate::error::ensure_same("copy_to", self.size(), target.len())?;
        match &self.repr {
            Repr::Owned(core) => target.copy_from_slice(&core.read()),
            Repr::Strided(view) => view.copy_to(target),
        }
        Ok(())
    }

    /// Overwrites every element from `source`, which must be exactly `size()` long.
    pub fn copy_from(&self, source: &[f32]) -> Result<(), TensorError> {
        crate::error::ensure_same("copy_from", self.size(), source.len())?;
        self.modify(|values| values.copy_from_slice(source));
        Ok(())
    }

    /// Sets every element to zero.
    pub fn clear(&self) {
        self.modify(|values| values.fill(0.0));
    }

    /// Runs `f` over the elements as one mutable slice.
    ///
    /// Strided views with a stride other than 1 are gathered into a
    /// temporary, mutated, then scattered back.
    pub fn modify<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        match &self.repr {
            Repr::Owned(core) => f(&mut core.write()),
            Repr::Strided(view) => view.modify(f),
        }
    }

    /// A strided window onto this segment: element `i` of the result is
    /// element `offset + i * stride` of `self`.
    pub fn view(&self, offset: usize, stride: usize, len: usize) -> Result<Segment, TensorError> {
        let view = match &self.repr {
            Repr::Owned(core) => StridedView::new(Arc::clone(core), offset, stride, len)?,
            Repr::Strided(view) => view.narrow(offset, stride, len)?,
        };
        Ok(Segment::from_view(view))
    }

    /// Splits into `blocks` equal contiguous views.
    pub fn split(&self, blocks: usize) -> Result<Vec<Segment>, TensorError> {
        if blocks == 0 || self.size() % blocks != 0 {
            return Err(TensorError::ShapeMismatch {
                op: "split",
                expected: format!("a divisor of {}", self.size()),
                actual: blocks.to_string(),
            });
        }
        let block = self.size() / blocks;
        (0..blocks).map(|i| self.view(i * block, 1, block)).collect()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Segment");
        s.field("kind", &self.kind())
            .field("size", &self.size())
            .field("refs", &self.ref_count());
        if let Some(view) = self.as_view() {
            s.field("offset", &view.offset()).field("stride", &view.stride());
        }
        s.finish()
    }
}
