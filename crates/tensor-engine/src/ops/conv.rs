// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution primitives as index arithmetic over flat buffers.
//!
//! A [`Window`] slides over each depth slice; its placements are numbered
//! row-major over the output grid, so placement `p` covers the region whose
//! top-left corner is `(p / out_cols * stride_y, p % out_cols * stride_x)`.
//! Inside a window, `x` runs across columns and `y` down rows, and the
//! in-window offset is `x * height + y`.

use crate::shape::{Matrix, Tensor, Tensor3D, Tensor4D};
use crate::TensorError;

/// Filter size and step of a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub width: usize,
    pub height: usize,
    pub stride_x: usize,
    pub stride_y: usize,
}

impl Window {
    pub fn new(width: usize, height: usize, stride_x: usize, stride_y: usize) -> Self {
        Self {
            width,
            height,
            stride_x,
            stride_y,
        }
    }

    /// A `size × size` window moving `stride` in both directions.
    pub fn square(size: usize, stride: usize) -> Self {
        Self::new(size, size, stride, stride)
    }

    /// Cells covered by one placement.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Output grid `(rows, columns)` over a `rows × columns` input.
    ///
    /// # Errors
    /// [`TensorError::ShapeMismatch`] for a zero-sized window, a zero stride,
    /// or a window larger than the input.
    pub fn output_size(&self, rows: usize, columns: usize) -> Result<(usize, usize), TensorError> {
        if self.area() == 0 || self.stride_x == 0 || self.stride_y == 0 {
            return Err(TensorError::ShapeMismatch {
                op: "window",
                expected: "non-zero filter size and stride".into(),
                actual: format!("{self:?}"),
            });
        }
        if self.width > columns || self.height > rows {
            return Err(TensorError::ShapeMismatch {
                op: "window",
                expected: format!("a window within {rows}x{columns}"),
                actual: format!("{}x{}", self.height, self.width),
            });
        }
        Ok((
            (rows - self.height) / self.stride_y + 1,
            (columns - self.width) / self.stride_x + 1,
        ))
    }

    /// Number of placements over a `rows × columns` input.
    pub fn placements(&self, rows: usize, columns: usize) -> Result<usize, TensorError> {
        let (out_rows, out_cols) = self.output_size(rows, columns)?;
        Ok(out_rows * out_cols)
    }
}

impl Tensor3D {
    /// Unrolls every window placement into a matrix row.
    ///
    /// The result has one row per placement and `width * height * depth`
    /// columns; column `d * width * height + x * height + y` holds cell
    /// `(d, top + y, left + x)`.
    pub fn im2col(&self, window: &Window) -> Result<Matrix, TensorError> {
        let [depth, rows, columns] = self.dims();
        let (_, out_cols) = window.output_size(rows, columns)?;
        let placements = window.placements(rows, columns)?;
        let area = window.area();
        let width = area * depth;
        let plane = rows * columns;
        let source = self.segment().read();
        let kernels = self.unit().kernels();

        self.unit().build([placements, width], |out| {
            kernels.for_each_row(out, width, |p, row| {
                let top = p / out_cols * window.stride_y;
                let left = p % out_cols * window.stride_x;
                for d in 0..depth {
                    for x in 0..window.width {
                        for y in 0..window.height {
                            row[d * area + x * window.height + y] =
                                source[d * plane + (top + y) * columns + left + x];
                        }
                    }
                }
            })
        })
    }

    /// Scatters im2col-shaped gradients back onto the input grid.
    ///
    /// `self` is the error signal, one depth slice per filter, over the
    /// output grid. `filters` holds one column per filter and one row per
    /// im2col column. For every input depth `d`, filter `f` and placement,
    /// `filters[d*w*h + (w-x-1)*h + (h-y-1), f] * error` is accumulated into
    /// cell `(d, top + y, left + x)`.
    pub fn reverse_im2col(
        &self,
        filters: &Matrix,
        out_rows: usize,
        out_cols: usize,
        out_depth: usize,
        window: &Window,
    ) -> Result<Tensor3D, TensorError> {
        let [filter_count, grid_rows, grid_cols] = self.dims();
        let expected_grid = window.output_size(out_rows, out_cols)?;
        if expected_grid != (grid_rows, grid_cols) {
            return Err(TensorError::mismatch(
                "reverse_im2col",
                expected_grid,
                (grid_rows, grid_cols),
            ));
        }
        let area = window.area();
        let expected_filters = [out_depth * area, filter_count];
        crate::error::ensure_same("reverse_im2col", expected_filters, filters.dims())?;

        let grid = grid_rows * grid_cols;
        let error = self.segment().read();
        let weights = filters.segment().read();
        let kernels = self.unit().kernels();
        let (w, h) = (window.width, window.height);

        self.unit().build([out_depth, out_rows, out_cols], |out| {
            kernels.for_each_row(out, out_rows * out_cols, |d, slice| {
                for f in 0..filter_count {
                    for p in 0..grid {
                        let signal = error[f * grid + p];
                        let top = p / grid_cols * window.stride_y;
                        let left = p % grid_cols * window.stride_x;
                        for x in 0..w {
                            for y in 0..h {
                                let flipped = d * area + (w - x - 1) * h + (h - y - 1);
                                slice[(top + y) * out_cols + left + x] +=
                                    weights[flipped * filter_count + f] * signal;
                            }
                        }
                    }
                }
            })
        })
    }

    /// Window maximum per depth slice and placement.
    ///
    /// Ties keep the first value found scanning `x` outer, `y` inner. With
    /// `save_indices`, a second tensor of the output's shape records each
    /// winner's in-window offset `x * height + y`.
    pub fn max_pool(
        &self,
        window: &Window,
        save_indices: bool,
    ) -> Result<(Tensor3D, Option<Tensor3D>), TensorError> {
        let [depth, rows, columns] = self.dims();
        let (out_rows, out_cols) = window.output_size(rows, columns)?;
        let out_plane = out_rows * out_cols;
        let plane = rows * columns;
        let source = self.segment().read();
        let kernels = self.unit().kernels();

        let corner = |p: usize| (p / out_cols * window.stride_y, p % out_cols * window.stride_x);

        let dims = [depth, out_rows, out_cols];
        if !save_indices {
            let pooled: Tensor3D = self.unit().build(dims, |out| {
                kernels.for_each_row(out, out_plane, |d, slice| {
                    let input = &source[d * plane..(d + 1) * plane];
                    for (p, value) in slice.iter_mut().enumerate() {
                        let (top, left) = corner(p);
                        *value = window_max(input, columns, top, left, window).0;
                    }
                })
            })?;
            return Ok((pooled, None));
        }

        let mut offsets = vec![0.0; depth * out_plane];
        let pooled: Tensor3D = self.unit().build(dims, |out| {
            kernels.for_each_row_pair(out, &mut offsets, out_plane, |d, slice, saved| {
                let input = &source[d * plane..(d + 1) * plane];
                for (p, (value, offset)) in slice.iter_mut().zip(saved.iter_mut()).enumerate() {
                    let (top, left) = corner(p);
                    let (max, at) = window_max(input, columns, top, left, window);
                    *value = max;
                    *offset = at as f32;
                }
            })
        })?;
        let indices: Tensor3D = self.unit().build(dims, |out| out.copy_from_slice(&offsets))?;
        Ok((pooled, Some(indices)))
    }

    /// Routes each pooled value back to the cell its saved index names.
    ///
    /// `self` is the pooled tensor and `indices` the offsets saved by
    /// [`Tensor3D::max_pool`]. Every other cell of the
    /// `depth × out_rows × out_cols` result is zero; values landing on the
    /// same cell through overlapping windows are summed.
    pub fn reverse_max_pool(
        &self,
        indices: &Tensor3D,
        out_rows: usize,
        out_cols: usize,
        window: &Window,
    ) -> Result<Tensor3D, TensorError> {
        crate::error::ensure_same("reverse_max_pool", self.dims(), indices.dims())?;
        let [depth, pooled_rows, pooled_cols] = self.dims();
        let expected_grid = window.output_size(out_rows, out_cols)?;
        if expected_grid != (pooled_rows, pooled_cols) {
            return Err(TensorError::mismatch(
                "reverse_max_pool",
                expected_grid,
                (pooled_rows, pooled_cols),
            ));
        }

        let offsets = indices.to_vec();
        let area = window.area();
        let valid = |o: f32| o.is_finite() && o.fract() == 0.0 && o >= 0.0 && (o as usize) < area;
        if let Some(bad) = offsets.iter().find(|&&o| !valid(o)) {
            return Err(TensorError::IndexOutOfRange {
                op: "reverse_max_pool",
                index: bad.max(0.0) as usize,
                bound: area,
            });
        }

        let pooled_plane = pooled_rows * pooled_cols;
        let values = self.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build([depth, out_rows, out_cols], |out| {
            kernels.for_each_row(out, out_rows * out_cols, |d, slice| {
                for p in 0..pooled_plane {
                    let (i, j) = (p / pooled_cols, p % pooled_cols);
                    let offset = offsets[d * pooled_plane + p] as usize;
                    let row = i * window.stride_y + offset % window.height;
                    let column = j * window.stride_x + offset / window.height;
                    slice[row * out_cols + column] += values[d * pooled_plane + p];
                }
            })
        })
    }

    /// Surrounds every depth slice with `padding` zero cells on each side.
    pub fn add_padding(&self, padding: usize) -> Result<Tensor3D, TensorError> {
        let [depth, rows, columns] = self.dims();
        let (padded_rows, padded_cols) = (rows + 2 * padding, columns + 2 * padding);
        let source = self.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build([depth, padded_rows, padded_cols], |out| {
            kernels.for_each_row(out, padded_rows * padded_cols, |d, slice| {
                for r in 0..rows {
                    let src = &source[(d * rows + r) * columns..(d * rows + r + 1) * columns];
                    let start = (r + padding) * padded_cols + padding;
                    slice[start..start + columns].copy_from_slice(src);
                }
            })
        })
    }

    /// Strips `padding` cells from each side of every depth slice.
    pub fn remove_padding(&self, padding: usize) -> Result<Tensor3D, TensorError> {
        let [depth, rows, columns] = self.dims();
        if 2 * padding > rows || 2 * padding > columns {
            return Err(TensorError::ShapeMismatch {
                op: "remove_padding",
                expected: format!("at least {0}x{0} per slice", 2 * padding),
                actual: format!("{rows}x{columns}"),
            });
        }
        let (inner_rows, inner_cols) = (rows - 2 * padding, columns - 2 * padding);
        let source = self.segment().read();
        let kernels = self.unit().kernels();
        self.unit().build([depth, inner_rows, inner_cols], |out| {
            kernels.for_each_row(out, inner_rows * inner_cols, |d, slice| {
                for r in 0..inner_rows {
                    let start = (d * rows + r + padding) * columns + padding;
                    slice[r * inner_cols..(r + 1) * inner_cols]
                        .copy_from_slice(&source[start..start + inner_cols]);
                }
            })
        })
    }
}

/// Maximum of the window whose top-left corner is `(top, left)`, with its
/// in-window offset. The first of equal values wins, scanning `x` outer.
fn window_max(
    input: &[f32],
    columns: usize,
    top: usize,
    left: usize,
    window: &Window,
) -> (f32, usize) {
    let mut best = (f32::NEG_INFINITY, 0);
    let mut first = true;
    for x in 0..window.width {
        for y in 0..window.height {
            let value = input[(top + y) * columns + left + x];
            if first || value > best.0 {
                best = (value, x * window.height + y);
                first = false;
            }
        }
    }
    best
}

/// Runs a 3D operation over all `count * depth` slices of a 4D tensor and
/// reshapes the result back to `count` tensors.
fn per_slice<F>(tensor: &Tensor4D, op: F) -> Result<Tensor4D, TensorError>
where
    F: FnOnce(&Tensor3D) -> Result<Tensor3D, TensorError>,
{
    let slices = tensor.as_slices()?;
    let result = op(&slices);
    slices.dispose();
    let result = result?;
    let [_, rows, columns] = result.dims();
    let out: Result<Tensor4D, TensorError> =
        result.reshape([tensor.count(), tensor.depth(), rows, columns]);
    result.dispose();
    out
}

impl Tensor4D {
    pub fn add_padding(&self, padding: usize) -> Result<Tensor4D, TensorError> {
        per_slice(self, |t| t.add_padding(padding))
    }

    pub fn remove_padding(&self, padding: usize) -> Result<Tensor4D, TensorError> {
        per_slice(self, |t| t.remove_padding(padding))
    }

    /// [`Tensor3D::max_pool`] over every `(count, depth)` slice.
    pub fn max_pool(
        &self,
        window: &Window,
        save_indices: bool,
    ) -> Result<(Tensor4D, Option<Tensor4D>), TensorError> {
        let mut indices = None;
        let pooled = per_slice(self, |t| {
            let (pooled, saved) = t.max_pool(window, save_indices)?;
            indices = saved;
            Ok(pooled)
        })?;
        let indices = match indices {
            Some(saved) => {
                let reshaped: Result<Tensor4D, TensorError> = saved.reshape(pooled.dims());
                saved.dispose();
                Some(reshaped?)
            }
            None => None,
        };
        Ok((pooled, indices))
    }

    /// [`Tensor3D::reverse_max_pool`] over every `(count, depth)` slice.
    pub fn reverse_max_pool(
        &self,
        indices: &Tensor4D,
        out_rows: usize,
        out_cols: usize,
        window: &Window,
    ) -> Result<Tensor4D, TensorError> {
        crate::error::ensure_same("reverse_max_pool", self.dims(), indices.dims())?;
        let saved = indices.as_slices()?;
        let out = per_slice(self, |t| t.reverse_max_pool(&saved, out_rows, out_cols, window));
        saved.dispose();
        out
    }
}
