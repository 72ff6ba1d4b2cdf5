// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scope stack and wrapper registrations.
//!
//! Every shape wrapper owns one [`Registration`]: the single reference it
//! took on its segment. The registration sits in the top frame of the
//! unit's [`ScopeStack`] until either the wrapper is disposed or the frame
//! is popped; whichever comes first releases the segment, the other is a
//! no-op.

use super::ComputeUnit;
use crate::segment::Segment;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One wrapper's claim on a segment. Releases at most once.
pub(crate) struct Registration {
    id: u64,
    segment: Segment,
    released: AtomicBool,
}

impl Registration {
    pub(crate) fn new(id: u64, segment: Segment) -> Self {
        Self {
            id,
            segment,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Releases the segment reference. Returns `false` if already released.
    pub(crate) fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.segment.release();
        true
    }
}

type Frame = HashMap<u64, Arc<Registration>>;

/// Ordered frames of live registrations. Never empty: the base frame stays.
pub(crate) struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self {
            frames: vec![Frame::new()],
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Removes the top frame and hands back its registrations. At the base
    /// frame the registrations are drained but the frame itself is kept.
    pub(crate) fn pop(&mut self) -> Vec<Arc<Registration>> {
        let frame = if self.frames.len() > 1 {
            self.frames.pop().unwrap_or_default()
        } else {
            self.frames.first_mut().map(std::mem::take).unwrap_or_default()
        };
        frame.into_values().collect()
    }

    pub(crate) fn insert(&mut self, registration: Arc<Registration>) {
        if let Some(top) = self.frames.last_mut() {
            top.insert(registration.id(), registration);
        }
    }

    /// Takes a registration out of whichever frame holds it, searching from the top.
    pub(crate) fn remove(&mut self, id: u64) -> Option<Arc<Registration>> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.remove(&id))
    }

    pub(crate) fn drain_all(&mut self) -> Vec<Arc<Registration>> {
        let drained = self
            .frames
            .drain(..)
            .flat_map(|frame| frame.into_values())
            .collect();
        self.frames.push(Frame::new());
        drained
    }

    /// Registrations still tracked across every frame.
    pub(crate) fn live(&self) -> usize {
        self.frames.iter().map(HashMap::len).sum()
    }
}

/// RAII scope: pushed on creation, popped (releasing its tensors) on drop.
///
/// ```
/// use tensor_engine::{ComputeUnit, Tensor};
///
/// let unit = ComputeUnit::with_defaults().unwrap();
/// let kept = unit.create_vector(4).unwrap();
/// let scratch = {
///     let _scope = unit.scope();
///     unit.create_vector(4).unwrap()
/// };
/// assert!(kept.is_valid());
/// assert!(!scratch.is_valid());
/// ```
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    unit: &'a ComputeUnit,
}

impl<'a> ScopeGuard<'a> {
    pub(crate) fn new(unit: &'a ComputeUnit) -> Self {
        unit.push_scope();
        Self { unit }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.unit.pop_scope();
    }
}

/// A wrapper's link to its unit and its registration.
#[derive(Clone)]
pub struct Handle {
    unit: ComputeUnit,
    registration: Arc<Registration>,
}

impl Handle {
    pub(crate) fn new(unit: ComputeUnit, registration: Arc<Registration>) -> Self {
        Self { unit, registration }
    }

    pub fn segment(&self) -> &Segment {
        &self.registration.segment
    }

    pub fn unit(&self) -> &ComputeUnit {
        &self.unit
    }

    pub fn id(&self) -> u64 {
        self.registration.id()
    }

    /// `false` once disposed or once its scope has been popped.
    pub fn is_live(&self) -> bool {
        self.registration.is_live()
    }

    /// Drops the registration from its scope and releases the segment once.
    pub fn dispose(&self) {
        self.unit.forget(self.id());
        self.registration.release();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id())
            .field("live", &self.is_live())
            .field("segment", self.segment())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: u64) -> Arc<Registration> {
        let segment = Segment::plain(2);
        segment.add_ref();
        Arc::new(Registration::new(id, segment))
    }

    #[test]
    fn test_release_once() {
        let r = registration(1);
        assert!(r.is_live());
        assert!(r.release());
        assert!(!r.release());
        assert!(!r.is_live());
        assert!(!r.segment.is_valid());
    }

    #[test]
    fn test_push_pop_frames() {
        let mut stack = ScopeStack::new();
        stack.insert(registration(1));
        stack.push();
        stack.insert(registration(2));
        stack.insert(registration(3));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.live(), 3);

        let popped = stack.pop();
        assert_eq!(popped.len(), 2);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.live(), 1);
    }

    #[test]
    fn test_base_frame_survives_pop() {
        let mut stack = ScopeStack::new();
        stack.insert(registration(7));
        assert_eq!(stack.pop().len(), 1);
        assert_eq!(stack.depth(), 1);
        stack.insert(registration(8));
        assert_eq!(stack.live(), 1);
    }

    #[test]
    fn test_remove_searches_all_frames() {
        let mut stack = ScopeStack::new();
        stack.insert(registration(1));
        stack.push();
        assert!(stack.remove(1).is_some());
        assert!(stack.remove(1).is_none());
        assert_eq!(stack.live(), 0);
    }

    #[test]
    fn test_drain_all_resets() {
        let mut stack = ScopeStack::new();
        stack.insert(registration(1));
        stack.push();
        stack.insert(registration(2));
        assert_eq!(stack.drain_all().len(), 2);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.live(), 0);
    }
}
