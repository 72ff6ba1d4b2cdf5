// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The computation unit: segment factory, kernel executor and scope stack.
//!
//! A [`ComputeUnit`] is an explicit context, cheap to clone (all clones
//! share one worker pool, one buffer pool and one scope stack). Every
//! tensor it creates registers itself in the current scope and is released
//! in bulk when that scope is popped.
//!
//! ```
//! use tensor_engine::{ComputeUnit, ReductionOps, Tensor};
//!
//! let unit = ComputeUnit::with_defaults().unwrap();
//! let v = unit.create_vector_from(4, &[1.0, 2.0, 3.0, 4.0]).unwrap();
//! assert_eq!(v.sum(), 10.0);
//!
//! unit.push_scope();
//! let tmp = unit.create_vector(1024).unwrap();
//! unit.pop_scope();
//! assert!(!tmp.is_valid());
//! assert!(v.is_valid());
//! ```

mod create;
mod scope;

pub use scope::{Handle, ScopeGuard};

use crate::config::UnitConfig;
use crate::kernels::{simd, Kernels};
use crate::segment::{Segment, Storage};
use crate::shape::Tensor;
use crate::TensorError;
use buffer_pool::{BufferPool, PoolStats};
use parking_lot::Mutex;
use scope::{Registration, ScopeStack};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Name reported by [`ComputeUnit::backend_name`] and in
/// [`TensorError::NotImplemented`].
pub const BACKEND: &str = "cpu";

struct UnitInner {
    config: UnitConfig,
    kernels: Kernels,
    pool: Option<BufferPool>,
    scopes: Mutex<ScopeStack>,
    next_id: AtomicU64,
}

impl Drop for UnitInner {
    fn drop(&mut self) {
        let remaining = self.scopes.get_mut().drain_all();
        let released = release_all(&remaining);
        if released > 0 {
            tracing::debug!(released, "computation unit dropped with live tensors");
        }
    }
}

fn release_all(registrations: &[Arc<Registration>]) -> usize {
    registrations.iter().filter(|r| r.release()).count()
}

/// Factory, kernel library and lifetime manager for CPU tensors.
#[derive(Clone)]
pub struct ComputeUnit {
    inner: Arc<UnitInner>,
}

impl ComputeUnit {
    /// Builds a unit from `config`.
    ///
    /// # Errors
    /// [`TensorError::Config`] for an unknown strategy, a malformed pool
    /// budget, or a worker pool that cannot be started.
    pub fn new(config: UnitConfig) -> Result<Self, TensorError> {
        let strategy = config.kernel_strategy()?;
        let threads = config.resolve_threads();
        let kernels = Kernels::new(strategy, threads, config.parallel_threshold)?;
        let pool = config.parse_budget()?.map(BufferPool::new);

        tracing::info!(
            strategy = %strategy,
            threads,
            threshold = config.parallel_threshold,
            simd = simd::capability(),
            pooled = pool.is_some(),
            "computation unit ready"
        );

        Ok(Self {
            inner: Arc::new(UnitInner {
                config,
                kernels,
                pool,
                scopes: Mutex::new(ScopeStack::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// A unit with [`UnitConfig::default`].
    pub fn with_defaults() -> Result<Self, TensorError> {
        Self::new(UnitConfig::default())
    }

    pub fn config(&self) -> &UnitConfig {
        &self.inner.config
    }

    pub fn kernels(&self) -> &Kernels {
        &self.inner.kernels
    }

    pub fn backend_name(&self) -> &'static str {
        BACKEND
    }

    /// Statistics of the backing buffer pool, if segments are pool-leased.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.inner.pool.as_ref().map(BufferPool::stats)
    }

    /// The backing buffer pool, if any.
    pub fn pool(&self) -> Option<&BufferPool> {
        self.inner.pool.as_ref()
    }

    /// `true` when both handles refer to the same unit.
    pub fn same_unit(&self, other: &ComputeUnit) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn allocate(&self, len: usize) -> Result<Storage, TensorError> {
        match &self.inner.pool {
            Some(pool) if len > 0 => Ok(Storage::Leased(pool.lease(len)?)),
            _ => Ok(Storage::Plain(vec![0.0; len])),
        }
    }

    /// A zero-filled segment with a reference count of 0.
    pub fn create_segment(&self, size: usize) -> Result<Segment, TensorError> {
        Ok(Segment::from_storage(self.allocate(size)?))
    }

    /// Builds a `T` over `segment`, taking one reference on it and
    /// registering it in the current scope.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] when `dims` does not cover exactly
    /// `segment.size()` elements.
    pub fn wrap<T: Tensor>(&self, segment: Segment, dims: T::Dims) -> Result<T, TensorError> {
        self.wrap_as("wrap", segment, dims)
    }

    pub(crate) fn wrap_as<T: Tensor>(
        &self,
        op: &'static str,
        segment: Segment,
        dims: T::Dims,
    ) -> Result<T, TensorError> {
        let count = T::element_count(dims);
        if count != segment.size() {
            return Err(TensorError::ShapeMismatch {
                op,
                expected: format!("{} elements", segment.size()),
                actual: format!("{} {dims:?} ({count} elements)", T::NAME),
            });
        }
        segment.add_ref();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration::new(id, segment));
        self.inner.scopes.lock().insert(Arc::clone(&registration));
        Ok(T::from_handle(Handle::new(self.clone(), registration), dims))
    }

    /// Allocates a `T` of shape `dims` and lets `init` fill its buffer
    /// before anything else can see it.
    pub(crate) fn build<T, F>(&self, dims: T::Dims, init: F) -> Result<T, TensorError>
    where
        T: Tensor,
        F: FnOnce(&mut [f32]),
    {
        let mut storage = self.allocate(T::element_count(dims))?;
        init(storage.as_mut_slice());
        self.wrap_as("create", Segment::from_storage(storage), dims)
    }

    /// Opens a new scope.
    pub fn push_scope(&self) {
        let depth = {
            let mut scopes = self.inner.scopes.lock();
            scopes.push();
            scopes.depth()
        };
        tracing::debug!(depth, "scope pushed");
    }

    /// Closes the innermost scope, releasing every tensor registered in it.
    /// Returns how many tensors were released.
    ///
    /// Popping with no scope pushed releases the base frame's tensors and
    /// leaves the base frame in place.
    pub fn pop_scope(&self) -> usize {
        let (popped, depth) = {
            let mut scopes = self.inner.scopes.lock();
            if scopes.depth() == 1 {
                tracing::warn!("pop_scope called on the base scope");
            }
            let popped = scopes.pop();
            (popped, scopes.depth())
        };
        let released = release_all(&popped);
        tracing::debug!(depth, released, "scope popped");
        released
    }

    /// RAII variant of [`ComputeUnit::push_scope`] / [`ComputeUnit::pop_scope`].
    pub fn scope(&self) -> ScopeGuard<'_> {
        ScopeGuard::new(self)
    }

    /// Moves `tensor` into the current (innermost) scope.
    ///
    /// Disposed tensors are left alone. Returns whether the tensor was moved.
    pub fn add_to_scope<T: Tensor>(&self, tensor: &T) -> bool {
        let handle = tensor.handle();
        let mut scopes = self.inner.scopes.lock();
        match scopes.remove(handle.id()) {
            Some(registration) if registration.is_live() => {
                scopes.insert(registration);
                true
            }
            _ => false,
        }
    }

    /// Detaches `tensor` from scope tracking; it survives every later pop
    /// and must be disposed explicitly.
    pub fn remove_from_scope<T: Tensor>(&self, tensor: &T) -> bool {
        self.forget(tensor.handle().id())
    }

    pub(crate) fn forget(&self, id: u64) -> bool {
        self.inner.scopes.lock().remove(id).is_some()
    }

    /// Number of open scopes, the base frame included.
    pub fn scope_depth(&self) -> usize {
        self.inner.scopes.lock().depth()
    }

    /// Tensors currently tracked by any scope.
    pub fn live_tensors(&self) -> usize {
        self.inner.scopes.lock().live()
    }

    /// Releases every tracked tensor across all scopes and resets to the
    /// base frame. Returns how many tensors were released.
    pub fn dispose(&self) -> usize {
        let drained = self.inner.scopes.lock().drain_all();
        let released = release_all(&drained);
        tracing::info!(released, "computation unit disposed");
        released
    }
}

impl std::fmt::Debug for ComputeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeUnit")
            .field("backend", &BACKEND)
            .field("kernels", &self.inner.kernels)
            .field("pooled", &self.inner.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::KernelStrategy;
    use crate::shape::{Matrix, Vector};

    fn unit() -> ComputeUnit {
        ComputeUnit::new(UnitConfig {
            num_threads: Some(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let bad_strategy = UnitConfig {
            strategy: "gpu".into(),
            ..Default::default()
        };
        assert!(matches!(ComputeUnit::new(bad_strategy), Err(TensorError::Config(_))));

        let bad_budget = UnitConfig {
            pool_budget: Some("lots".into()),
            ..Default::default()
        };
        assert!(matches!(ComputeUnit::new(bad_budget), Err(TensorError::Config(_))));
    }

    #[test]
    fn test_wrap_takes_reference() {
        let u = unit();
        let segment = u.create_segment(6).unwrap();
        assert_eq!(segment.ref_count(), 0);

        let m: Matrix = u.wrap(segment.clone(), [2, 3]).unwrap();
        assert_eq!(segment.ref_count(), 1);
        let v: Vector = u.wrap(segment.clone(), 6).unwrap();
        assert_eq!(segment.ref_count(), 2);

        m.dispose();
        assert!(segment.is_valid());
        v.dispose();
        assert!(!segment.is_valid());
    }

    #[test]
    fn test_wrap_size_mismatch() {
        let u = unit();
        let segment = u.create_segment(6).unwrap();
        let result: Result<Matrix, _> = u.wrap(segment.clone(), [4, 2]);
        assert!(matches!(result, Err(TensorError::ShapeMismatch { op: "wrap", .. })));
        assert_eq!(segment.ref_count(), 0);
    }

    #[test]
    fn test_scopes_release_only_inner_tensors() {
        let u = unit();
        let outer = u.create_vector(3).unwrap();
        u.push_scope();
        let a = u.create_vector(3).unwrap();
        let b = u.create_matrix(2, 2).unwrap();
        assert_eq!(u.scope_depth(), 2);
        assert_eq!(u.pop_scope(), 2);

        assert!(outer.is_valid());
        assert!(!a.is_valid());
        assert!(!b.is_valid());
        assert_eq!(u.scope_depth(), 1);
        assert_eq!(u.live_tensors(), 1);
    }

    #[test]
    fn test_dispose_after_pop_is_noop() {
        let u = unit();
        let v = {
            let _scope = u.scope();
            u.create_vector(4).unwrap()
        };
        assert!(!v.is_valid());
        v.dispose();
        v.dispose();
    }

    #[test]
    fn test_remove_from_scope_survives_pop() {
        let u = unit();
        u.push_scope();
        let kept = u.create_vector(2).unwrap();
        assert!(u.remove_from_scope(&kept));
        u.pop_scope();
        assert!(kept.is_valid());
        kept.dispose();
        assert!(!kept.is_valid());
    }

    #[test]
    fn test_add_to_scope_moves_inward() {
        let u = unit();
        let v = u.create_vector(2).unwrap();
        u.push_scope();
        assert!(u.add_to_scope(&v));
        u.pop_scope();
        assert!(!v.is_valid());
        assert!(!u.add_to_scope(&v));
    }

    #[test]
    fn test_dispose_releases_everything() {
        let u = unit();
        let a = u.create_vector(2).unwrap();
        u.push_scope();
        let b = u.create_vector(2).unwrap();
        assert_eq!(u.dispose(), 2);
        assert!(!a.is_valid());
        assert!(!b.is_valid());
        assert_eq!(u.scope_depth(), 1);
    }

    #[test]
    fn test_pooled_unit_leases_segments() {
        let u = ComputeUnit::new(UnitConfig {
            pool_budget: Some("1M".into()),
            ..Default::default()
        })
        .unwrap();
        let v = u.create_vector(256).unwrap();
        assert_eq!(v.segment().kind(), crate::SegmentKind::Leased);
        v.dispose();
        let stats = u.pool_stats().unwrap();
        assert_eq!(stats.leases, 1);
        assert_eq!(stats.returns, 1);
    }

    #[test]
    fn test_pool_exhaustion_surfaces() {
        let u = ComputeUnit::new(UnitConfig {
            pool_budget: Some("1K".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            u.create_vector(1024),
            Err(TensorError::Pool(buffer_pool::PoolError::OutOfMemory { .. }))
        ));
    }

    #[test]
    fn test_strategy_from_config() {
        let u = ComputeUnit::new(
            UnitConfig::default().with_strategy(KernelStrategy::ParallelScalar),
        )
        .unwrap();
        assert_eq!(u.kernels().strategy(), KernelStrategy::ParallelScalar);
        assert_eq!(u.backend_name(), "cpu");
    }
}
