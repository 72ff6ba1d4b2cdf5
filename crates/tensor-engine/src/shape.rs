// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rank-aware wrappers over segments.
//!
//! All four ranks are row-major with the outer axes as the largest strides:
//!
//! ```text
//! index = n * (depth*rows*cols) + d * (rows*cols) + r * cols + c
//! ```
//!
//! Wrappers are cheap handles; cloning one shares its registration, so
//! disposing any clone disposes them all.

use crate::unit::{ComputeUnit, Handle};
use crate::{Segment, TensorError};
use std::fmt;

/// Behaviour shared by [`Vector`], [`Matrix`], [`Tensor3D`] and [`Tensor4D`].
pub trait Tensor: Sized + Clone + Send + Sync {
    /// Shape fields fixed at construction.
    type Dims: Copy + PartialEq + fmt::Debug + Send + Sync;

    const RANK: usize;
    const NAME: &'static str;

    /// Number of elements a tensor of shape `dims` holds.
    fn element_count(dims: Self::Dims) -> usize;

    /// Rebuilds a wrapper from an existing registration.
    fn from_handle(handle: Handle, dims: Self::Dims) -> Self;

    fn handle(&self) -> &Handle;

    fn dims(&self) -> Self::Dims;

    fn segment(&self) -> &Segment {
        self.handle().segment()
    }

    fn unit(&self) -> &ComputeUnit {
        self.handle().unit()
    }

    fn size(&self) -> usize {
        Self::element_count(self.dims())
    }

    /// `false` once disposed or once the scope that created it was popped.
    fn is_valid(&self) -> bool {
        self.handle().is_live() && self.segment().is_valid()
    }

    /// Releases this wrapper's reference on its segment. Idempotent.
    fn dispose(&self) {
        self.handle().dispose()
    }

    fn to_vec(&self) -> Vec<f32> {
        self.segment().to_vec()
    }

    /// A wrapper of another rank over the same segment.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] when the element counts differ.
    fn reshape<U: Tensor>(&self, dims: U::Dims) -> Result<U, TensorError> {
        self.unit().wrap_as("reshape", self.segment().clone(), dims)
    }

    /// A deep copy into a fresh, contiguous segment.
    fn duplicate(&self) -> Result<Self, TensorError> {
        let source = self.segment();
        self.unit().build(self.dims(), |out| {
            source.values().zip(out.iter_mut()).for_each(|(v, o)| *o = v);
        })
    }
}

macro_rules! impl_tensor {
    ($ty:ident, $dims:ty, $rank:expr, $name:expr, |$d:ident| $count:expr) => {
        impl Tensor for $ty {
            type Dims = $dims;
            const RANK: usize = $rank;
            const NAME: &'static str = $name;

            fn element_count($d: $dims) -> usize {
                $count
            }

            fn from_handle(handle: Handle, dims: $dims) -> Self {
                Self { handle, dims }
            }

            fn handle(&self) -> &Handle {
                &self.handle
            }

            fn dims(&self) -> $dims {
                self.dims
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct($name)
                    .field("dims", &self.dims)
                    .field("valid", &self.is_valid())
                    .finish()
            }
        }
    };
}

#[track_caller]
fn check(axis: &str, index: usize, bound: usize) {
    assert!(index < bound, "{axis} index {index} out of range for {bound}");
}

/// Rank-1 tensor.
#[derive(Clone)]
pub struct Vector {
    handle: Handle,
    dims: usize,
}

impl_tensor!(Vector, usize, 1, "vector", |d| d);

impl Vector {
    pub fn len(&self) -> usize {
        self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.dims == 0
    }

    pub fn get(&self, i: usize) -> f32 {
        check("vector", i, self.dims);
        self.segment().get(i)
    }

    pub fn set(&self, i: usize, value: f32) {
        check("vector", i, self.dims);
        self.segment().set(i, value)
    }

    /// Splits into `blocks` equal-length vectors sharing this one's segment.
    pub fn split(&self, blocks: usize) -> Result<Vec<Vector>, TensorError> {
        let len = self.dims / blocks.max(1);
        self.segment()
            .split(blocks)?
            .into_iter()
            .map(|part| self.unit().wrap_as("split", part, len))
            .collect()
    }
}

/// Rank-2 tensor, row-major.
#[derive(Clone)]
pub struct Matrix {
    handle: Handle,
    dims: [usize; 2],
}

impl_tensor!(Matrix, [usize; 2], 2, "matrix", |d| d[0] * d[1]);

impl Matrix {
    pub fn rows(&self) -> usize {
        self.dims[0]
    }

    pub fn columns(&self) -> usize {
        self.dims[1]
    }

    /// Linear offset of `(row, column)`.
    pub fn offset(&self, row: usize, column: usize) -> usize {
        row * self.dims[1] + column
    }

    pub fn get(&self, row: usize, column: usize) -> f32 {
        check("row", row, self.dims[0]);
        check("column", column, self.dims[1]);
        self.segment().get(self.offset(row, column))
    }

    pub fn set(&self, row: usize, column: usize, value: f32) {
        check("row", row, self.dims[0]);
        check("column", column, self.dims[1]);
        self.segment().set(self.offset(row, column), value)
    }

    /// Row `i` as a vector view, without copying.
    pub fn row(&self, i: usize) -> Result<Vector, TensorError> {
        if i >= self.rows() {
            return Err(TensorError::IndexOutOfRange {
                op: "row",
                index: i,
                bound: self.rows(),
            });
        }
        let view = self.segment().view(i * self.columns(), 1, self.columns())?;
        self.unit().wrap_as("row", view, self.columns())
    }

    /// Column `j` as a strided vector view, without copying.
    pub fn column(&self, j: usize) -> Result<Vector, TensorError> {
        if j >= self.columns() {
            return Err(TensorError::IndexOutOfRange {
                op: "column",
                index: j,
                bound: self.columns(),
            });
        }
        let view = self.segment().view(j, self.columns(), self.rows())?;
        self.unit().wrap_as("column", view, self.rows())
    }
}

/// Rank-3 tensor: `depth` row-major matrices laid end to end.
#[derive(Clone)]
pub struct Tensor3D {
    handle: Handle,
    dims: [usize; 3],
}

impl_tensor!(Tensor3D, [usize; 3], 3, "tensor3d", |d| d[0] * d[1] * d[2]);

impl Tensor3D {
    pub fn depth(&self) -> usize {
        self.dims[0]
    }

    pub fn rows(&self) -> usize {
        self.dims[1]
    }

    pub fn columns(&self) -> usize {
        self.dims[2]
    }

    /// Elements in one depth slice.
    pub fn matrix_size(&self) -> usize {
        self.dims[1] * self.dims[2]
    }

    pub fn offset(&self, depth: usize, row: usize, column: usize) -> usize {
        depth * self.matrix_size() + row * self.dims[2] + column
    }

    pub fn get(&self, depth: usize, row: usize, column: usize) -> f32 {
        check("depth", depth, self.dims[0]);
        check("row", row, self.dims[1]);
        check("column", column, self.dims[2]);
        self.segment().get(self.offset(depth, row, column))
    }

    pub fn set(&self, depth: usize, row: usize, column: usize, value: f32) {
        check("depth", depth, self.dims[0]);
        check("row", row, self.dims[1]);
        check("column", column, self.dims[2]);
        self.segment().set(self.offset(depth, row, column), value)
    }

    /// Depth slice `d` as a matrix view.
    pub fn matrix(&self, d: usize) -> Result<Matrix, TensorError> {
        if d >= self.depth() {
            return Err(TensorError::IndexOutOfRange {
                op: "matrix",
                index: d,
                bound: self.depth(),
            });
        }
        let size = self.matrix_size();
        let view = self.segment().view(d * size, 1, size)?;
        self.unit().wrap_as("matrix", view, [self.rows(), self.columns()])
    }

    /// Every depth slice, in order.
    pub fn matrices(&self) -> Result<Vec<Matrix>, TensorError> {
        (0..self.depth()).map(|d| self.matrix(d)).collect()
    }

    /// The `(depth, rows * columns)` matrix over the same segment.
    pub fn flatten(&self) -> Result<Matrix, TensorError> {
        self.reshape([self.depth(), self.matrix_size()])
    }
}

/// Rank-4 tensor: `count` 3D tensors laid end to end.
#[derive(Clone)]
pub struct Tensor4D {
    handle: Handle,
    dims: [usize; 4],
}

impl_tensor!(Tensor4D, [usize; 4], 4, "tensor4d", |d| d[0] * d[1] * d[2] * d[3]);

impl Tensor4D {
    pub fn count(&self) -> usize {
        self.dims[0]
    }

    pub fn depth(&self) -> usize {
        self.dims[1]
    }

    pub fn rows(&self) -> usize {
        self.dims[2]
    }

    pub fn columns(&self) -> usize {
        self.dims[3]
    }

    /// Elements in one 3D tensor.
    pub fn tensor_size(&self) -> usize {
        self.dims[1] * self.dims[2] * self.dims[3]
    }

    pub fn offset(&self, n: usize, depth: usize, row: usize, column: usize) -> usize {
        n * self.tensor_size() + depth * self.dims[2] * self.dims[3] + row * self.dims[3] + column
    }

    pub fn get(&self, n: usize, depth: usize, row: usize, column: usize) -> f32 {
        check("count", n, self.dims[0]);
        check("depth", depth, self.dims[1]);
        check("row", row, self.dims[2]);
        check("column", column, self.dims[3]);
        self.segment().get(self.offset(n, depth, row, column))
    }

    pub fn set(&self, n: usize, depth: usize, row: usize, column: usize, value: f32) {
        check("count", n, self.dims[0]);
        check("depth", depth, self.dims[1]);
        check("row", row, self.dims[2]);
        check("column", column, self.dims[3]);
        self.segment().set(self.offset(n, depth, row, column), value)
    }

    /// Tensor `n` as a 3D view.
    pub fn tensor(&self, n: usize) -> Result<Tensor3D, TensorError> {
        if n >= self.count() {
            return Err(TensorError::IndexOutOfRange {
                op: "tensor",
                index: n,
                bound: self.count(),
            });
        }
        let size = self.tensor_size();
        let view = self.segment().view(n * size, 1, size)?;
        self.unit()
            .wrap_as("tensor", view, [self.depth(), self.rows(), self.columns()])
    }

    /// Every 3D tensor, in order.
    pub fn tensors(&self) -> Result<Vec<Tensor3D>, TensorError> {
        (0..self.count()).map(|n| self.tensor(n)).collect()
    }

    /// All `count * depth` slices viewed as one 3D tensor.
    pub(crate) fn as_slices(&self) -> Result<Tensor3D, TensorError> {
        self.reshape([self.count() * self.depth(), self.rows(), self.columns()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> ComputeUnit {
        ComputeUnit::with_defaults().unwrap()
    }

    #[test]
    fn test_matrix_offsets_row_major() {
        let u = unit();
        let m = u.create_matrix_from(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(m.offset(1, 2), 5);
        assert_eq!(m.get(1, 0), 4.0);
        m.set(0, 2, 9.0);
        assert_eq!(m.segment().get(2), 9.0);
    }

    #[test]
    #[should_panic(expected = "column index 3 out of range")]
    fn test_matrix_get_checks_column() {
        let u = unit();
        u.create_matrix(2, 3).unwrap().get(0, 3);
    }

    #[test]
    fn test_row_and_column_views_share_segment() {
        let u = unit();
        let m = u.create_matrix_from(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let row = m.row(1).unwrap();
        let column = m.column(2).unwrap();
        assert_eq!(row.to_vec(), vec![4.0, 5.0, 6.0]);
        assert_eq!(column.to_vec(), vec![3.0, 6.0]);

        column.set(0, -3.0);
        assert_eq!(m.get(0, 2), -3.0);
        assert_eq!(m.segment().ref_count(), 3);
        assert!(m.row(2).is_err());
        assert!(m.column(3).is_err());
    }

    #[test]
    fn test_reshape_round_trip_shares_values() {
        let u = unit();
        let v = u.create_vector_with(6, |i| i as f32).unwrap();
        let m: Matrix = v.reshape([2, 3]).unwrap();
        let back: Vector = m.reshape(6).unwrap();
        assert!(back.segment().shares_buffer_with(v.segment()));
        assert_eq!(back.to_vec(), v.to_vec());
        assert_eq!(m.get(1, 1), 4.0);

        let bad: Result<Matrix, _> = v.reshape([4, 2]);
        assert!(matches!(bad, Err(TensorError::ShapeMismatch { op: "reshape", .. })));
    }

    #[test]
    fn test_tensor3d_slices() {
        let u = unit();
        let t = u.create_tensor3d_with(3, 2, 2, |d, r, c| (d * 100 + r * 10 + c) as f32).unwrap();
        let m = t.matrix(2).unwrap();
        assert_eq!(m.to_vec(), vec![200.0, 201.0, 210.0, 211.0]);
        assert_eq!(t.matrices().unwrap().len(), 3);

        let flat = t.flatten().unwrap();
        assert_eq!(flat.dims(), [3, 4]);
        assert_eq!(flat.get(1, 3), 111.0);
    }

    #[test]
    fn test_tensor4d_offsets_and_views() {
        let u = unit();
        let q = u.create_tensor4d_with(2, 2, 2, 3, |n, d, r, c| {
            (n * 1000 + d * 100 + r * 10 + c) as f32
        })
        .unwrap();
        assert_eq!(q.offset(1, 1, 1, 2), 12 + 6 + 3 + 2);
        assert_eq!(q.get(1, 0, 1, 1), 1011.0);
        let t = q.tensor(1).unwrap();
        assert_eq!(t.get(1, 0, 2), 1102.0);
        assert_eq!(q.tensors().unwrap().len(), 2);
        assert!(q.tensor(2).is_err());
    }

    #[test]
    fn test_vector_split() {
        let u = unit();
        let v = u.create_vector_with(6, |i| i as f32).unwrap();
        let parts = v.split(3).unwrap();
        assert_eq!(parts[1].to_vec(), vec![2.0, 3.0]);
        parts[2].set(0, 40.0);
        assert_eq!(v.get(4), 40.0);
        assert!(v.split(4).is_err());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let u = unit();
        let m = u.create_matrix_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let column = m.column(1).unwrap();
        let copy = column.duplicate().unwrap();
        copy.set(0, 0.0);
        assert_eq!(m.get(0, 1), 2.0);
        assert_eq!(copy.to_vec(), vec![0.0, 4.0]);
        assert!(!copy.segment().shares_buffer_with(m.segment()));
    }

    #[test]
    fn test_views_keep_base_alive() {
        let u = unit();
        let m = u.create_matrix_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let row = m.row(0).unwrap();
        m.dispose();
        assert!(row.is_valid());
        assert_eq!(row.to_vec(), vec![1.0, 2.0]);
        row.dispose();
        assert!(!m.segment().is_valid());
    }
}
