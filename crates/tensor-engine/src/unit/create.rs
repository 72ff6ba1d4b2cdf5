// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor constructors.

use super::ComputeUnit;
use crate::error::ensure_same;
use crate::shape::{Matrix, Tensor, Tensor3D, Tensor4D, Vector};
use crate::TensorError;

impl ComputeUnit {
    fn create_from<T: Tensor>(
        &self,
        op: &'static str,
        dims: T::Dims,
        values: &[f32],
    ) -> Result<T, TensorError> {
        ensure_same(op, T::element_count(dims), values.len())?;
        self.build(dims, |out| out.copy_from_slice(values))
    }

    fn create_with<T: Tensor>(
        &self,
        dims: T::Dims,
        init: impl Fn(usize) -> f32 + Sync,
    ) -> Result<T, TensorError> {
        let kernels = self.kernels();
        self.build(dims, |out| kernels.fill_indexed(out, init))
    }

    // Vectors

    /// A zero-filled vector.
    pub fn create_vector(&self, len: usize) -> Result<Vector, TensorError> {
        self.build(len, |_| {})
    }

    /// A vector with element `i` set to `init(i)`.
    pub fn create_vector_with(
        &self,
        len: usize,
        init: impl Fn(usize) -> f32 + Sync,
    ) -> Result<Vector, TensorError> {
        self.create_with(len, init)
    }

    pub fn create_vector_from(&self, len: usize, values: &[f32]) -> Result<Vector, TensorError> {
        self.create_from("create_vector_from", len, values)
    }

    // Matrices

    pub fn create_matrix(&self, rows: usize, columns: usize) -> Result<Matrix, TensorError> {
        self.build([rows, columns], |_| {})
    }

    /// A matrix with cell `(r, c)` set to `init(r, c)`.
    pub fn create_matrix_with(
        &self,
        rows: usize,
        columns: usize,
        init: impl Fn(usize, usize) -> f32 + Sync,
    ) -> Result<Matrix, TensorError> {
        self.create_with([rows, columns], |i| init(i / columns, i % columns))
    }

    /// A matrix from row-major `values`.
    pub fn create_matrix_from(
        &self,
        rows: usize,
        columns: usize,
        values: &[f32],
    ) -> Result<Matrix, TensorError> {
        self.create_from("create_matrix_from", [rows, columns], values)
    }

    /// Stacks equally long vectors as the rows of a new matrix.
    pub fn create_matrix_from_rows(&self, rows: &[Vector]) -> Result<Matrix, TensorError> {
        let columns = common_dims("create_matrix_from_rows", rows)?;
        self.build([rows.len(), columns], |out| {
            for (row, dst) in rows.iter().zip(out.chunks_mut(columns.max(1))) {
                row.segment().values().zip(dst).for_each(|(v, d)| *d = v);
            }
        })
    }

    /// Places equally long vectors side by side as the columns of a new matrix.
    pub fn create_matrix_from_columns(&self, columns: &[Vector]) -> Result<Matrix, TensorError> {
        let rows = common_dims("create_matrix_from_columns", columns)?;
        let width = columns.len();
        self.build([rows, width], |out| {
            for (c, column) in columns.iter().enumerate() {
                for (r, v) in column.segment().values().enumerate() {
                    out[r * width + c] = v;
                }
            }
        })
    }

    // 3D tensors

    pub fn create_tensor3d(
        &self,
        depth: usize,
        rows: usize,
        columns: usize,
    ) -> Result<Tensor3D, TensorError> {
        self.build([depth, rows, columns], |_| {})
    }

    /// A tensor with cell `(d, r, c)` set to `init(d, r, c)`.
    pub fn create_tensor3d_with(
        &self,
        depth: usize,
        rows: usize,
        columns: usize,
        init: impl Fn(usize, usize, usize) -> f32 + Sync,
    ) -> Result<Tensor3D, TensorError> {
        let plane = rows * columns;
        self.create_with([depth, rows, columns], |i| {
            let (d, rest) = (i / plane, i % plane);
            init(d, rest / columns, rest % columns)
        })
    }

    pub fn create_tensor3d_from(
        &self,
        depth: usize,
        rows: usize,
        columns: usize,
        values: &[f32],
    ) -> Result<Tensor3D, TensorError> {
        self.create_from("create_tensor3d_from", [depth, rows, columns], values)
    }

    /// Stacks equally shaped matrices along a new depth axis.
    pub fn create_tensor3d_from_matrices(
        &self,
        matrices: &[Matrix],
    ) -> Result<Tensor3D, TensorError> {
        let [rows, columns] = common_dims("create_tensor3d_from_matrices", matrices)?;
        self.build([matrices.len(), rows, columns], |out| {
            stack(matrices, out, rows * columns)
        })
    }

    // 4D tensors

    pub fn create_tensor4d(
        &self,
        count: usize,
        depth: usize,
        rows: usize,
        columns: usize,
    ) -> Result<Tensor4D, TensorError> {
        self.build([count, depth, rows, columns], |_| {})
    }

    /// A tensor with cell `(n, d, r, c)` set to `init(n, d, r, c)`.
    pub fn create_tensor4d_with(
        &self,
        count: usize,
        depth: usize,
        rows: usize,
        columns: usize,
        init: impl Fn(usize, usize, usize, usize) -> f32 + Sync,
    ) -> Result<Tensor4D, TensorError> {
        let plane = rows * columns;
        let volume = depth * plane;
        self.create_with([count, depth, rows, columns], |i| {
            let (n, rest) = (i / volume, i % volume);
            let (d, rest) = (rest / plane, rest % plane);
            init(n, d, rest / columns, rest % columns)
        })
    }

    pub fn create_tensor4d_from(
        &self,
        count: usize,
        depth: usize,
        rows: usize,
        columns: usize,
        values: &[f32],
    ) -> Result<Tensor4D, TensorError> {
        self.create_from("create_tensor4d_from", [count, depth, rows, columns], values)
    }

    /// Stacks equally shaped 3D tensors along a new count axis.
    pub fn create_tensor4d_from_tensors(
        &self,
        tensors: &[Tensor3D],
    ) -> Result<Tensor4D, TensorError> {
        let [depth, rows, columns] = common_dims("create_tensor4d_from_tensors", tensors)?;
        self.build([tensors.len(), depth, rows, columns], |out| {
            stack(tensors, out, depth * rows * columns)
        })
    }
}

/// Shape shared by every item of a batch.
fn common_dims<T: Tensor>(op: &'static str, items: &[T]) -> Result<T::Dims, TensorError> {
    let first = items.first().ok_or(TensorError::Empty { op })?;
    let dims = first.dims();
    for item in &items[1..] {
        ensure_same(op, dims, item.dims())?;
    }
    Ok(dims)
}

fn stack<T: Tensor>(items: &[T], out: &mut [f32], block: usize) {
    if block == 0 {
        return;
    }
    for (item, dst) in items.iter().zip(out.chunks_mut(block)) {
        item.segment().values().zip(dst).for_each(|(v, d)| *d = v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> ComputeUnit {
        ComputeUnit::with_defaults().unwrap()
    }

    #[test]
    fn test_create_is_zeroed() {
        let u = unit();
        let t = u.create_tensor4d(2, 3, 4, 5).unwrap();
        assert_eq!(t.dims(), [2, 3, 4, 5]);
        assert_eq!(t.size(), 120);
        assert!(t.to_vec().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_create_with_coordinates() {
        let u = unit();
        let m = u.create_matrix_with(2, 3, |r, c| (r * 10 + c) as f32).unwrap();
        assert_eq!(m.to_vec(), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);

        let t = u
            .create_tensor3d_with(2, 2, 2, |d, r, c| (d * 100 + r * 10 + c) as f32)
            .unwrap();
        assert_eq!(t.get(1, 1, 0), 110.0);

        let q = u
            .create_tensor4d_with(2, 2, 1, 2, |n, d, _, c| (n * 100 + d * 10 + c) as f32)
            .unwrap();
        assert_eq!(q.get(1, 1, 0, 1), 111.0);
    }

    #[test]
    fn test_create_from_checks_length() {
        let u = unit();
        assert!(u.create_matrix_from(2, 2, &[1.0, 2.0, 3.0]).is_err());
        let v = u.create_vector_from(3, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(v.get(2), 3.0);
    }

    #[test]
    fn test_matrix_from_rows_and_columns() {
        let u = unit();
        let a = u.create_vector_from(3, &[1.0, 2.0, 3.0]).unwrap();
        let b = u.create_vector_from(3, &[4.0, 5.0, 6.0]).unwrap();

        let by_rows = u.create_matrix_from_rows(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(by_rows.dims(), [2, 3]);
        assert_eq!(by_rows.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let by_columns = u.create_matrix_from_columns(&[a, b]).unwrap();
        assert_eq!(by_columns.dims(), [3, 2]);
        assert_eq!(by_columns.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_batches_reject_mixed_shapes() {
        let u = unit();
        let a = u.create_vector(3).unwrap();
        let b = u.create_vector(4).unwrap();
        assert!(matches!(
            u.create_matrix_from_rows(&[a, b]),
            Err(TensorError::ShapeMismatch { .. })
        ));

        let m = u.create_matrix(2, 2).unwrap();
        let n = u.create_matrix(2, 3).unwrap();
        assert!(u.create_tensor3d_from_matrices(&[m, n]).is_err());
    }

    #[test]
    fn test_empty_batches_fail() {
        let u = unit();
        assert!(matches!(
            u.create_matrix_from_columns(&[]),
            Err(TensorError::Empty { .. })
        ));
        assert!(u.create_tensor4d_from_tensors(&[]).is_err());
    }

    #[test]
    fn test_stacking_tensors() {
        let u = unit();
        let m1 = u.create_matrix_from(1, 2, &[1.0, 2.0]).unwrap();
        let m2 = u.create_matrix_from(1, 2, &[3.0, 4.0]).unwrap();
        let t = u.create_tensor3d_from_matrices(&[m1, m2]).unwrap();
        assert_eq!(t.dims(), [2, 1, 2]);
        assert_eq!(t.get(1, 0, 1), 4.0);

        let q = u.create_tensor4d_from_tensors(&[t.clone(), t]).unwrap();
        assert_eq!(q.dims(), [2, 2, 1, 2]);
        assert_eq!(q.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sources_may_be_views() {
        let u = unit();
        let m = u.create_matrix_from(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let columns = [m.column(0).unwrap(), m.column(1).unwrap()];
        let rebuilt = u.create_matrix_from_rows(&columns).unwrap();
        assert_eq!(rebuilt.to_vec(), vec![1.0, 3.0, 2.0, 4.0]);
    }
}
