// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise arithmetic and activation functions.
//!
//! Derivatives take the pre-activation input `x`, not the activated output.

use super::{map_tensor, mutate_tensor, mutate_zip_tensors, zip_tensors};
use crate::kernels::simd;
use crate::shape::Tensor;
use crate::TensorError;

/// Added under square roots.
pub const SQRT_EPSILON: f32 = 1e-8;

/// Slope of leaky ReLU below zero.
pub const LEAKY_SLOPE: f32 = 0.01;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn leaky_relu(x: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        LEAKY_SLOPE * x
    }
}

fn unary<T: Tensor>(t: &T, f: impl Fn(f32) -> f32 + Sync) -> Result<T, TensorError> {
    map_tensor(t, &f, |lane| simd::map(lane, &f))
}

/// Elementwise operations, available on every rank.
pub trait ElementwiseOps: Tensor {
    fn add(&self, other: &Self) -> Result<Self, TensorError> {
        zip_tensors("add", self, other, |a, b| a + b, simd::add)
    }

    fn subtract(&self, other: &Self) -> Result<Self, TensorError> {
        zip_tensors("subtract", self, other, |a, b| a - b, simd::sub)
    }

    fn pointwise_multiply(&self, other: &Self) -> Result<Self, TensorError> {
        zip_tensors("pointwise_multiply", self, other, |a, b| a * b, simd::mul)
    }

    fn pointwise_divide(&self, other: &Self) -> Result<Self, TensorError> {
        zip_tensors("pointwise_divide", self, other, |a, b| a / b, simd::div)
    }

    fn add_scalar(&self, scalar: f32) -> Result<Self, TensorError> {
        map_tensor(self, |x| x + scalar, |l| simd::shift(l, scalar))
    }

    fn multiply_scalar(&self, scalar: f32) -> Result<Self, TensorError> {
        map_tensor(self, |x| x * scalar, |l| simd::scale(l, scalar))
    }

    fn abs(&self) -> Result<Self, TensorError> {
        map_tensor(self, f32::abs, simd::abs)
    }

    /// Natural logarithm.
    fn log(&self) -> Result<Self, TensorError> {
        unary(self, f32::ln)
    }

    fn exp(&self) -> Result<Self, TensorError> {
        unary(self, f32::exp)
    }

    fn squared(&self) -> Result<Self, TensorError> {
        map_tensor(self, |x| x * x, |l| simd::mul(l, l))
    }

    /// `sqrt(x + 1e-8)`.
    fn sqrt(&self) -> Result<Self, TensorError> {
        unary(self, |x| (x + SQRT_EPSILON).sqrt())
    }

    fn pow(&self, power: f32) -> Result<Self, TensorError> {
        unary(self, |x| x.powf(power))
    }

    fn sigmoid(&self) -> Result<Self, TensorError> {
        unary(self, sigmoid)
    }

    fn sigmoid_derivative(&self) -> Result<Self, TensorError> {
        unary(self, |x| {
            let s = sigmoid(x);
            s * (1.0 - s)
        })
    }

    fn tanh(&self) -> Result<Self, TensorError> {
        unary(self, f32::tanh)
    }

    fn tanh_derivative(&self) -> Result<Self, TensorError> {
        unary(self, |x| {
            let t = x.tanh();
            1.0 - t * t
        })
    }

    fn relu(&self) -> Result<Self, TensorError> {
        map_tensor(self, |x| x.max(0.0), |l| simd::map(l, |x| x.max(0.0)))
    }

    fn relu_derivative(&self) -> Result<Self, TensorError> {
        unary(self, |x| if x > 0.0 { 1.0 } else { 0.0 })
    }

    fn leaky_relu(&self) -> Result<Self, TensorError> {
        unary(self, leaky_relu)
    }

    fn leaky_relu_derivative(&self) -> Result<Self, TensorError> {
        unary(self, |x| if x > 0.0 { 1.0 } else { LEAKY_SLOPE })
    }

    /// Softmax over every element.
    ///
    /// The maximum is subtracted before exponentiating. If the exponentials
    /// sum to (numerically) zero the un-normalised values are returned.
    fn softmax(&self) -> Result<Self, TensorError> {
        let unit = self.unit();
        let kernels = unit.kernels();
        let values = self.segment().read();
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        unit.build(self.dims(), |out| {
            kernels.transform(
                &values,
                out,
                |x| (x - max).exp(),
                |l| simd::map(l, |x| (x - max).exp()),
            );
            let sum = kernels.sum(out);
            if sum.abs() > f32::EPSILON {
                let inv = 1.0 / sum;
                kernels.mutate(out, |x| x * inv, |l| simd::scale(l, inv));
            }
        })
    }

    /// `upper` where `x >= lower + (upper - lower) / 2`, else `lower`.
    fn round(&self, lower: f32, upper: f32) -> Result<Self, TensorError> {
        let threshold = lower + (upper - lower) / 2.0;
        unary(self, |x| if x >= threshold { upper } else { lower })
    }

    /// Clamps every element into `[min, max]`.
    fn constrain(&self, min: f32, max: f32) -> Result<Self, TensorError> {
        map_tensor(self, |x| x.max(min).min(max), |l| simd::clamp(l, min, max))
    }

    fn add_in_place(&self, other: &Self) -> Result<(), TensorError> {
        mutate_zip_tensors("add_in_place", self, other, |a, b| a + b, simd::add)
    }

    fn subtract_in_place(&self, other: &Self) -> Result<(), TensorError> {
        mutate_zip_tensors("subtract_in_place", self, other, |a, b| a - b, simd::sub)
    }

    fn pointwise_multiply_in_place(&self, other: &Self) -> Result<(), TensorError> {
        mutate_zip_tensors(
            "pointwise_multiply_in_place",
            self,
            other,
            |a, b| a * b,
            simd::mul,
        )
    }

    fn multiply_in_place(&self, scalar: f32) {
        mutate_tensor(self, |x| x * scalar, |l| simd::scale(l, scalar));
    }

    fn constrain_in_place(&self, min: f32, max: f32) {
        mutate_tensor(self, |x| x.max(min).min(max), |l| simd::clamp(l, min, max));
    }
}

impl<T: Tensor> ElementwiseOps for T {}
