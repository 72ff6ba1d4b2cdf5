// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-engine
//!
//! Dense `f32` tensors of rank 1 to 4 with deterministic, scope-driven
//! memory management and data-parallel CPU kernels.
//!
//! # Key Components
//!
//! - [`Segment`] — a reference-counted flat buffer (heap, pool-leased, or a
//!   strided window onto another segment).
//! - [`Vector`], [`Matrix`], [`Tensor3D`], [`Tensor4D`] — shape wrappers,
//!   all implementing [`Tensor`].
//! - [`ComputeUnit`] — creates tensors, owns the worker pool and kernel
//!   strategy, and releases tensors in bulk when a scope is popped.
//! - [`ElementwiseOps`] / [`ReductionOps`] — arithmetic, activations,
//!   reductions and distances for every rank.
//! - [`Window`] — sliding-window geometry for im2col, max-pooling and their
//!   reverses.
//!
//! # Memory Model
//!
//! ```text
//! ComputeUnit ── scope stack ── [ {reg, reg}, {reg} ]
//!                                  │
//!                                  ▼ one reference each
//!   Vector / Matrix / ... ──► Segment (refcount) ──► Vec<f32> | BufferLease
//! ```
//!
//! A wrapper takes one reference on its segment. Popping the scope that
//! created it, or disposing it, gives that reference back; the buffer is
//! freed when the count reaches zero.
//!
//! # Example
//! ```
//! use tensor_engine::{ComputeUnit, ElementwiseOps, ReductionOps, Tensor};
//!
//! let unit = ComputeUnit::with_defaults().unwrap();
//! let a = unit.create_matrix_from(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//!
//! let total = {
//!     let _scope = unit.scope();
//!     let doubled = a.multiply_scalar(2.0).unwrap();
//!     doubled.transpose().unwrap().sum()
//! };
//! assert_eq!(total, 42.0);
//! assert_eq!(unit.live_tensors(), 1);
//! ```

pub mod config;
pub mod dump;
pub mod error;
pub mod kernels;
pub mod ops;
pub mod segment;
pub mod shape;
pub mod unit;
pub mod view;

pub use config::UnitConfig;
pub use dump::DebugDump;
pub use error::TensorError;
pub use kernels::{KernelStrategy, Kernels};
pub use ops::conv::Window;
pub use ops::elementwise::ElementwiseOps;
pub use ops::reduction::{DistanceMetric, MinMax, ReductionOps};
pub use segment::{Segment, SegmentKind, SegmentRead};
pub use shape::{Matrix, Tensor, Tensor3D, Tensor4D, Vector};
pub use unit::{ComputeUnit, Handle, ScopeGuard};
pub use view::StridedView;
