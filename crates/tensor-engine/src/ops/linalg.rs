// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix operations: transpose, products, row/column reductions,
//! concatenation and splitting.

use crate::kernels::{simd, KernelStrategy, Kernels};
use crate::shape::{Matrix, Tensor, Vector};
use crate::unit::BACKEND;
use crate::TensorError;

/// `a · b` on the calling thread.
fn dot(kernels: &Kernels, a: &[f32], b: &[f32]) -> f32 {
    match kernels.strategy() {
        KernelStrategy::ParallelScalar => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        KernelStrategy::Vectorized => simd::dot(a, b),
    }
}

/// Row-major transpose of a `rows × columns` buffer.
fn transposed(kernels: &Kernels, values: &[f32], rows: usize, columns: usize) -> Vec<f32> {
    let mut out = vec![0.0; values.len()];
    kernels.fill_indexed(&mut out, |i| {
        let (c, r) = (i / rows, i % rows);
        values[r * columns + c]
    });
    out
}

impl Matrix {
    /// `out[i][j] = lhs_row(i) · rhs_row(j)` where both operands are given
    /// row-major with rows of length `inner`.
    fn multiply_rows(
        &self,
        lhs: &[f32],
        rhs: &[f32],
        rows: usize,
        columns: usize,
        inner: usize,
    ) -> Result<Matrix, TensorError> {
        let kernels = self.unit().kernels();
        self.unit().build([rows, columns], |out| {
            if inner == 0 {
                return;
            }
            kernels.for_each_row(out, columns, |i, row| {
                let a = &lhs[i * inner..(i + 1) * inner];
                for (j, cell) in row.iter_mut().enumerate() {
                    *cell = dot(kernels, a, &rhs[j * inner..(j + 1) * inner]);
                }
            });
        })
    }

    /// `selfᵀ`, with cells computed in parallel.
    pub fn transpose(&self) -> Result<Matrix, TensorError> {
        let [rows, columns] = self.dims();
        let source = self.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build([columns, rows], |out| {
            kernels.fill_indexed(out, |i| {
                let (c, r) = (i / rows, i % rows);
                source[r * columns + c]
            })
        })
    }

    /// `self · other`.
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, TensorError> {
        if self.columns() != other.rows() {
            return Err(TensorError::mismatch("multiply", self.dims(), other.dims()));
        }
        let kernels = self.unit().kernels();
        let lhs = self.to_vec();
        let rhs = transposed(kernels, &other.to_vec(), other.rows(), other.columns());
        self.multiply_rows(&lhs, &rhs, self.rows(), other.columns(), self.columns())
    }

    /// `selfᵀ · other`.
    pub fn transpose_this_and_multiply(&self, other: &Matrix) -> Result<Matrix, TensorError> {
        if self.rows() != other.rows() {
            return Err(TensorError::mismatch(
                "transpose_this_and_multiply",
                self.dims(),
                other.dims(),
            ));
        }
        let kernels = self.unit().kernels();
        let lhs = transposed(kernels, &self.to_vec(), self.rows(), self.columns());
        let rhs = transposed(kernels, &other.to_vec(), other.rows(), other.columns());
        self.multiply_rows(&lhs, &rhs, self.columns(), other.columns(), self.rows())
    }

    /// `self · otherᵀ`.
    pub fn transpose_and_multiply(&self, other: &Matrix) -> Result<Matrix, TensorError> {
        if self.columns() != other.columns() {
            return Err(TensorError::mismatch(
                "transpose_and_multiply",
                self.dims(),
                other.dims(),
            ));
        }
        let lhs = self.to_vec();
        let rhs = other.to_vec();
        self.multiply_rows(&lhs, &rhs, self.rows(), other.rows(), self.columns())
    }

    /// Sum of each row, as a vector of length `rows`.
    pub fn row_sums(&self) -> Result<Vector, TensorError> {
        let [rows, columns] = self.dims();
        let source = self.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build(rows, |out| {
            kernels.fill_indexed(out, |r| source[r * columns..(r + 1) * columns].iter().sum())
        })
    }

    /// Sum of each column, as a vector of length `columns`.
    pub fn column_sums(&self) -> Result<Vector, TensorError> {
        let [rows, columns] = self.dims();
        let source = self.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build(columns, |out| {
            kernels.fill_indexed(out, |c| (0..rows).map(|r| source[r * columns + c]).sum())
        })
    }

    /// The main diagonal, `min(rows, columns)` long.
    pub fn diagonal(&self) -> Result<Vector, TensorError> {
        let len = self.rows().min(self.columns());
        let step = self.columns() + 1;
        let source = self.segment().read();
        self.unit().build(len, |out| {
            for (i, d) in out.iter_mut().enumerate() {
                *d = source[i * step];
            }
        })
    }

    /// `other` stacked below `self`; both need the same column count.
    pub fn concat_rows(&self, other: &Matrix) -> Result<Matrix, TensorError> {
        if self.columns() != other.columns() {
            return Err(TensorError::mismatch("concat_rows", self.dims(), other.dims()));
        }
        let split = self.size();
        let (top, bottom) = (self.segment().read(), other.segment().read());
        self.unit()
            .build([self.rows() + other.rows(), self.columns()], |out| {
                out[..split].copy_from_slice(&top);
                out[split..].copy_from_slice(&bottom);
            })
    }

    /// `other` placed to the right of `self`; both need the same row count.
    pub fn concat_columns(&self, other: &Matrix) -> Result<Matrix, TensorError> {
        if self.rows() != other.rows() {
            return Err(TensorError::mismatch("concat_columns", self.dims(), other.dims()));
        }
        let (left_width, right_width) = (self.columns(), other.columns());
        let width = left_width + right_width;
        let (left, right) = (self.segment().read(), other.segment().read());
        let kernels = self.unit().kernels();
        self.unit().build([self.rows(), width], |out| {
            kernels.for_each_row(out, width, |r, row| {
                row[..left_width].copy_from_slice(&left[r * left_width..(r + 1) * left_width]);
                row[left_width..]
                    .copy_from_slice(&right[r * right_width..(r + 1) * right_width]);
            })
        })
    }

    /// Copies of rows `[0, row)` and `[row, rows)`.
    pub fn split_at_row(&self, row: usize) -> Result<(Matrix, Matrix), TensorError> {
        if row > self.rows() {
            return Err(TensorError::IndexOutOfRange {
                op: "split_at_row",
                index: row,
                bound: self.rows(),
            });
        }
        let columns = self.columns();
        let source = self.segment().read();
        let (top, bottom) = source.split_at(row * columns);
        let unit = self.unit();
        let upper: Matrix = unit.build([row, columns], |out| out.copy_from_slice(top))?;
        let lower: Matrix = unit.build([self.rows() - row, columns], |out| out.copy_from_slice(bottom))?;
        Ok((upper, lower))
    }

    /// Copies of columns `[0, column)` and `[column, columns)`.
    pub fn split_at_column(&self, column: usize) -> Result<(Matrix, Matrix), TensorError> {
        if column > self.columns() {
            return Err(TensorError::IndexOutOfRange {
                op: "split_at_column",
                index: column,
                bound: self.columns(),
            });
        }
        let [rows, columns] = self.dims();
        let right_width = columns - column;
        let source = self.segment().read();
        let unit = self.unit();
        let left: Matrix = unit.build([rows, column], |out| {
            for (r, row) in out.chunks_mut(column.max(1)).enumerate().take(rows) {
                row.copy_from_slice(&source[r * columns..r * columns + column]);
            }
        })?;
        let right: Matrix = unit.build([rows, right_width], |out| {
            for (r, row) in out.chunks_mut(right_width.max(1)).enumerate().take(rows) {
                row.copy_from_slice(&source[r * columns + column..(r + 1) * columns]);
            }
        })?;
        Ok((left, right))
    }

    /// Adds `vector` to every row; its length must equal `columns`.
    pub fn add_to_each_row(&self, vector: &Vector) -> Result<Matrix, TensorError> {
        crate::error::ensure_same("add_to_each_row", self.columns(), vector.len())?;
        let columns = self.columns();
        let source = self.segment().read();
        let addend = vector.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build(self.dims(), |out| {
            kernels.for_each_row(out, columns, |r, row| {
                let src = &source[r * columns..(r + 1) * columns];
                for ((o, &s), &a) in row.iter_mut().zip(src).zip(addend.iter()) {
                    *o = s + a;
                }
            })
        })
    }

    /// Adds `vector[r]` to every cell of row `r`; its length must equal `rows`.
    pub fn add_to_each_column(&self, vector: &Vector) -> Result<Matrix, TensorError> {
        crate::error::ensure_same("add_to_each_column", self.rows(), vector.len())?;
        let columns = self.columns();
        let source = self.segment().read();
        let addend = vector.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build(self.dims(), |out| {
            kernels.for_each_row(out, columns, |r, row| {
                let src = &source[r * columns..(r + 1) * columns];
                for (o, &s) in row.iter_mut().zip(src) {
                    *o = s + addend[r];
                }
            })
        })
    }

    /// Singular-value decomposition `(U, S, Vᵀ)`.
    ///
    /// # Errors
    /// Always [`TensorError::NotImplemented`] on the CPU backend.
    pub fn svd(&self) -> Result<(Matrix, Vector, Matrix), TensorError> {
        Err(TensorError::NotImplemented {
            op: "svd",
            backend: BACKEND,
        })
    }
}
