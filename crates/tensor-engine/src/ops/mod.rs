// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Numeric operations over shape wrappers.
//!
//! Every operation allocates its result through the owning unit (so it
//! lands in the current scope) unless its name ends in `_in_place`.

pub mod conv;
pub mod elementwise;
pub mod linalg;
pub mod reduction;

use crate::error::ensure_same;
use crate::kernels::Lane;
use crate::shape::Tensor;
use crate::TensorError;

/// `f` applied to every element of `t`, as a new tensor.
pub(crate) fn map_tensor<T, S, L>(t: &T, scalar: S, lane: L) -> Result<T, TensorError>
where
    T: Tensor,
    S: Fn(f32) -> f32 + Sync,
    L: Fn(Lane) -> Lane + Sync,
{
    let unit = t.unit();
    let src = t.segment().read();
    unit.build(t.dims(), |out| unit.kernels().transform(&src, out, scalar, lane))
}

/// `f(a, b)` element by element, as a new tensor shaped like `a`.
pub(crate) fn zip_tensors<T, S, L>(
    op: &'static str,
    a: &T,
    b: &T,
    scalar: S,
    lane: L,
) -> Result<T, TensorError>
where
    T: Tensor,
    S: Fn(f32, f32) -> f32 + Sync,
    L: Fn(Lane, Lane) -> Lane + Sync,
{
    ensure_same(op, a.dims(), b.dims())?;
    let unit = a.unit();
    let lhs = a.segment().read();
    let rhs = b.segment().read();
    unit.build(a.dims(), |out| unit.kernels().zip(&lhs, &rhs, out, scalar, lane))
}

pub(crate) fn mutate_tensor<T, S, L>(t: &T, scalar: S, lane: L)
where
    T: Tensor,
    S: Fn(f32) -> f32 + Sync,
    L: Fn(Lane) -> Lane + Sync,
{
    let kernels = t.unit().kernels();
    t.segment()
        .modify(|values| kernels.mutate(values, scalar, lane));
}

/// `target[i] = f(target[i], other[i])`.
///
/// `other` is copied first when both share a buffer, since its read lock
/// would otherwise be taken while `target` holds the write lock.
pub(crate) fn mutate_zip_tensors<T, S, L>(
    op: &'static str,
    target: &T,
    other: &T,
    scalar: S,
    lane: L,
) -> Result<(), TensorError>
where
    T: Tensor,
    S: Fn(f32, f32) -> f32 + Sync,
    L: Fn(Lane, Lane) -> Lane + Sync,
{
    ensure_same(op, target.dims(), other.dims())?;
    let kernels = target.unit().kernels();
    if target.segment().shares_buffer_with(other.segment()) {
        let copy = other.to_vec();
        target
            .segment()
            .modify(|values| kernels.mutate_zip(values, &copy, scalar, lane));
    } else {
        let rhs = other.segment().read();
        target
            .segment()
            .modify(|values| kernels.mutate_zip(values, &rhs, scalar, lane));
    }
    Ok(())
}
