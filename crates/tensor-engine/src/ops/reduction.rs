// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reductions and distance metrics.
//!
//! Partial results are merged in no fixed order, so results may differ in
//! the last bits between kernel strategies and thread counts.

use crate::kernels::simd;
use crate::shape::Tensor;
use crate::TensorError;
use std::fmt;
use std::str::FromStr;

/// Extremes of a tensor with the flat index of their first occurrence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f32,
    pub min_index: usize,
    pub max: f32,
    pub max_index: usize,
}

/// Index of an extreme that has not been seen yet.
const UNSET: usize = usize::MAX;

impl MinMax {
    const IDENTITY: MinMax = MinMax {
        min: f32::NAN,
        min_index: UNSET,
        max: f32::NAN,
        max_index: UNSET,
    };

    /// Every element was NaN: both extremes are NaN at index 0.
    fn settle(self) -> MinMax {
        if self.min_index == UNSET {
            MinMax {
                min: f32::NAN,
                min_index: 0,
                max: f32::NAN,
                max_index: 0,
            }
        } else {
            self
        }
    }

    fn merge(self, other: MinMax) -> MinMax {
        let (min, min_index) = pick(
            (self.min, self.min_index),
            (other.min, other.min_index),
            |a, b| a < b,
        );
        let (max, max_index) = pick(
            (self.max, self.max_index),
            (other.max, other.max_index),
            |a, b| a > b,
        );
        MinMax {
            min,
            min_index,
            max,
            max_index,
        }
    }
}

/// The better of two candidates; on a tie the lower index wins. A candidate
/// with index `UNSET` has seen no comparable value and always loses.
fn pick(a: (f32, usize), b: (f32, usize), better: impl Fn(f32, f32) -> bool) -> (f32, usize) {
    if a.1 == UNSET {
        return b;
    }
    if b.1 == UNSET {
        return a;
    }
    if better(b.0, a.0) || (b.0 == a.0 && b.1 < a.1) {
        b
    } else {
        a
    }
}

/// NaN elements are skipped.
fn scan(offset: usize, block: &[f32]) -> MinMax {
    block
        .iter()
        .enumerate()
        .filter(|(_, x)| !x.is_nan())
        .fold(MinMax::IDENTITY, |acc, (i, &x)| {
            let index = offset + i;
            let fresh = acc.min_index == UNSET;
            let (min, min_index) = if fresh || x < acc.min {
                (x, index)
            } else {
                (acc.min, acc.min_index)
            };
            let (max, max_index) = if fresh || x > acc.max {
                (x, index)
            } else {
                (acc.max, acc.max_index)
            };
            MinMax {
                min,
                min_index,
                max,
                max_index,
            }
        })
}

/// Distance between two equally sized tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    /// `1 - a·b / (|a| |b|)`; 1 when either norm is zero.
    Cosine,
    Euclidean,
    Manhattan,
    MeanSquared,
    SquaredEuclidean,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::MeanSquared => "mean-squared",
            DistanceMetric::SquaredEuclidean => "squared-euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "manhattan" => Ok(DistanceMetric::Manhattan),
            "mean-squared" | "mse" => Ok(DistanceMetric::MeanSquared),
            "squared-euclidean" => Ok(DistanceMetric::SquaredEuclidean),
            other => Err(TensorError::Config(format!("unknown distance metric '{other}'"))),
        }
    }
}

/// Reductions, available on every rank.
pub trait ReductionOps: Tensor {
    fn sum(&self) -> f32 {
        self.unit().kernels().sum(&self.segment().read())
    }

    fn average(&self) -> Result<f32, TensorError> {
        if self.size() == 0 {
            return Err(TensorError::Empty { op: "average" });
        }
        Ok(self.sum() / self.size() as f32)
    }

    fn l1_norm(&self) -> f32 {
        self.unit()
            .kernels()
            .map_sum(&self.segment().read(), f32::abs, simd::abs)
    }

    fn l2_norm(&self) -> f32 {
        self.unit()
            .kernels()
            .map_sum(&self.segment().read(), |x| x * x, |l| simd::mul(l, l))
            .sqrt()
    }

    /// Smallest and largest element with the index of their first
    /// occurrence. NaN elements are skipped; if every element is NaN both
    /// extremes are NaN at index 0.
    fn min_max(&self) -> Result<MinMax, TensorError> {
        if self.size() == 0 {
            return Err(TensorError::Empty { op: "min_max" });
        }
        let values = self.segment().read();
        Ok(self
            .unit()
            .kernels()
            .reduce(&values, MinMax::IDENTITY, scan, MinMax::merge)
            .settle())
    }

    /// Population standard deviation. `mean` is computed when not given.
    fn std_dev(&self, mean: Option<f32>) -> Result<f32, TensorError> {
        let mean = match mean {
            Some(mean) => mean,
            None => self.average()?,
        };
        if self.size() == 0 {
            return Err(TensorError::Empty { op: "std_dev" });
        }
        let squares = self.unit().kernels().map_sum(
            &self.segment().read(),
            |x| (x - mean) * (x - mean),
            |l| {
                let d = simd::shift(l, -mean);
                simd::mul(d, d)
            },
        );
        Ok((squares / self.size() as f32).sqrt())
    }

    fn dot_product(&self, other: &Self) -> Result<f32, TensorError> {
        crate::error::ensure_same("dot_product", self.size(), other.size())?;
        let (a, b) = (self.segment().read(), other.segment().read());
        Ok(self.unit().kernels().zip_sum(&a, &b, |x, y| x * y, simd::mul))
    }

    fn distance(&self, other: &Self, metric: DistanceMetric) -> Result<f32, TensorError> {
        crate::error::ensure_same(metric.as_str(), self.size(), other.size())?;
        let kernels = self.unit().kernels();
        let (a, b) = (self.segment().read(), other.segment().read());
        let squared = || {
            kernels.zip_sum(
                &a,
                &b,
                |x, y| (x - y) * (x - y),
                |x, y| {
                    let d = simd::sub(x, y);
                    simd::mul(d, d)
                },
            )
        };
        let distance = match metric {
            DistanceMetric::Cosine => {
                let dot = kernels.zip_sum(&a, &b, |x, y| x * y, simd::mul);
                let na = kernels.map_sum(&a, |x| x * x, |l| simd::mul(l, l)).sqrt();
                let nb = kernels.map_sum(&b, |x| x * x, |l| simd::mul(l, l)).sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
            DistanceMetric::Euclidean => squared().sqrt(),
            DistanceMetric::SquaredEuclidean => squared(),
            DistanceMetric::MeanSquared => {
                if a.is_empty() {
                    return Err(TensorError::Empty { op: "mean-squared" });
                }
                squared() / a.len() as f32
            }
            DistanceMetric::Manhattan => kernels.zip_sum(
                &a,
                &b,
                |x, y| (x - y).abs(),
                |x, y| simd::abs(simd::sub(x, y)),
            ),
        };
        Ok(distance)
    }

    fn cosine_distance(&self, other: &Self) -> Result<f32, TensorError> {
        self.distance(other, DistanceMetric::Cosine)
    }

    fn euclidean_distance(&self, other: &Self) -> Result<f32, TensorError> {
        self.distance(other, DistanceMetric::Euclidean)
    }

    fn manhattan_distance(&self, other: &Self) -> Result<f32, TensorError> {
        self.distance(other, DistanceMetric::Manhattan)
    }

    fn mean_squared_distance(&self, other: &Self) -> Result<f32, TensorError> {
        self.distance(other, DistanceMetric::MeanSquared)
    }

    fn squared_euclidean_distance(&self, other: &Self) -> Result<f32, TensorError> {
        self.distance(other, DistanceMetric::SquaredEuclidean)
    }
}

impl<T: Tensor> ReductionOps for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComputeUnit, KernelStrategy, UnitConfig, Vector};

    fn unit(strategy: KernelStrategy) -> ComputeUnit {
        let config = UnitConfig {
            num_threads: Some(3),
            parallel_threshold: 16,
            ..Default::default()
        };
        ComputeUnit::new(config.with_strategy(strategy)).unwrap()
    }

    fn vector(u: &ComputeUnit, values: &[f32]) -> Vector {
        u.create_vector_from(values.len(), values).unwrap()
    }

    #[test]
    fn test_basic_reductions() {
        for strategy in [KernelStrategy::ParallelScalar, KernelStrategy::Vectorized] {
            let u = unit(strategy);
            let v = vector(&u, &[1.0, 2.0, 3.0, 4.0]);
            assert_eq!(v.sum(), 10.0);
            assert_eq!(v.average().unwrap(), 2.5);
            assert!((v.l2_norm() - 30f32.sqrt()).abs() < 1e-6);
            assert_eq!(v.l1_norm(), 10.0);
        }
    }

    #[test]
    fn test_min_max_first_occurrence() {
        let u = unit(KernelStrategy::Vectorized);
        let values: Vec<f32> = (0..100).map(|i| ((i * 37) % 11) as f32).collect();
        let v = vector(&u, &values);
        let mm = v.min_max().unwrap();
        assert_eq!(mm.min, 0.0);
        assert_eq!(mm.min_index, 0);
        assert_eq!(mm.max, 10.0);
        assert_eq!(mm.max_index, values.iter().position(|&x| x == 10.0).unwrap());

        assert!(matches!(
            u.create_vector(0).unwrap().min_max(),
            Err(TensorError::Empty { .. })
        ));
    }

    #[test]
    fn test_min_max_skips_nan() {
        let u = unit(KernelStrategy::Vectorized);
        let v = vector(&u, &[f32::NAN, 3.0, f32::NAN, -1.0, 3.0]);
        let mm = v.min_max().unwrap();
        assert_eq!((mm.min, mm.min_index), (-1.0, 3));
        assert_eq!((mm.max, mm.max_index), (3.0, 1));

        let all_nan = vector(&u, &[f32::NAN; 3]).min_max().unwrap();
        assert!(all_nan.min.is_nan() && all_nan.max.is_nan());
        assert_eq!((all_nan.min_index, all_nan.max_index), (0, 0));
    }

    #[test]
    fn test_min_max_infinite_values_keep_index() {
        let u = unit(KernelStrategy::ParallelScalar);
        let mm = vector(&u, &[f32::INFINITY, f32::INFINITY]).min_max().unwrap();
        assert_eq!((mm.min, mm.min_index), (f32::INFINITY, 0));
        assert_eq!((mm.max, mm.max_index), (f32::INFINITY, 0));
    }

    #[test]
    fn test_std_dev() {
        let u = unit(KernelStrategy::Vectorized);
        let v = vector(&u, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((v.std_dev(None).unwrap() - 2.0).abs() < 1e-6);
        assert!((v.std_dev(Some(5.0)).unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_and_distances() {
        let u = unit(KernelStrategy::ParallelScalar);
        let a = vector(&u, &[1.0, 2.0, 3.0]);
        let b = vector(&u, &[4.0, 6.0, 3.0]);
        assert_eq!(a.dot_product(&b).unwrap(), 25.0);
        assert_eq!(a.squared_euclidean_distance(&b).unwrap(), 25.0);
        assert_eq!(a.euclidean_distance(&b).unwrap(), 5.0);
        assert_eq!(a.manhattan_distance(&b).unwrap(), 7.0);
        assert!((a.mean_squared_distance(&b).unwrap() - 25.0 / 3.0).abs() < 1e-6);
        assert!(a.cosine_distance(&a).unwrap().abs() < 1e-6);

        let zero = vector(&u, &[0.0, 0.0, 0.0]);
        assert_eq!(a.cosine_distance(&zero).unwrap(), 1.0);

        let short = vector(&u, &[1.0]);
        assert!(a.dot_product(&short).is_err());
    }

    #[test]
    fn test_large_reductions_agree() {
        let scalar = unit(KernelStrategy::ParallelScalar);
        let simd = unit(KernelStrategy::Vectorized);
        let values: Vec<f32> = (0..10_001).map(|i| ((i % 17) as f32 - 8.0) * 0.5).collect();
        let a = vector(&scalar, &values);
        let b = vector(&simd, &values);
        assert!((a.sum() - b.sum()).abs() < 1e-2);
        assert!((a.l2_norm() - b.l2_norm()).abs() < 1e-2);
        assert_eq!(a.min_max().unwrap(), b.min_max().unwrap());
    }

    #[test]
    fn test_metric_names() {
        assert_eq!("mse".parse::<DistanceMetric>().unwrap(), DistanceMetric::MeanSquared);
        assert_eq!(DistanceMetric::Cosine.to_string(), "cosine");
        assert!("hamming".parse::<DistanceMetric>().is_err());
    }
}
