// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Data-parallel element kernels.
//!
//! Every primitive takes both a scalar function and a lane function. Under
//! [`KernelStrategy::ParallelScalar`] only the scalar function runs; under
//! [`KernelStrategy::Vectorized`] full [`LANES`]-wide steps go through the
//! lane function and the tail (`len % LANES`) through the scalar one. In both
//! cases the buffer is split into blocks fanned out over the unit's worker
//! pool, unless it is shorter than the configured threshold.

pub mod simd;

use crate::TensorError;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

pub use simd::{Lane, LANES};

/// How element kernels walk a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KernelStrategy {
    /// One scalar call per element.
    ParallelScalar,
    /// Lane-wide steps with a scalar remainder loop.
    #[default]
    Vectorized,
}

impl KernelStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            KernelStrategy::ParallelScalar => "parallel-scalar",
            KernelStrategy::Vectorized => "vectorized",
        }
    }
}

impl FromStr for KernelStrategy {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vectorized" | "simd" => Ok(KernelStrategy::Vectorized),
            "parallel-scalar" | "scalar" => Ok(KernelStrategy::ParallelScalar),
            other => Err(TensorError::Config(format!(
                "unknown kernel strategy '{other}'; expected 'vectorized' or 'parallel-scalar'"
            ))),
        }
    }
}

impl fmt::Display for KernelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blocks handed to each worker, on average.
const BLOCKS_PER_WORKER: usize = 4;

/// Kernel executor bound to a dedicated worker pool.
pub struct Kernels {
    strategy: KernelStrategy,
    threads: usize,
    threshold: usize,
    workers: rayon::ThreadPool,
}

impl Kernels {
    /// Builds the executor and its worker pool.
    ///
    /// # Errors
    /// [`TensorError::Config`] if the thread pool cannot be started.
    pub fn new(
        strategy: KernelStrategy,
        threads: usize,
        threshold: usize,
    ) -> Result<Self, TensorError> {
        let threads = threads.max(1);
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tensor-kernel-{i}"))
            .build()
            .map_err(|e| TensorError::Config(format!("cannot start worker pool: {e}")))?;

        Ok(Self {
            strategy,
            threads,
            threshold,
            workers,
        })
    }

    pub fn strategy(&self) -> KernelStrategy {
        self.strategy
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn is_inline(&self, len: usize) -> bool {
        self.threads == 1 || len < self.threshold
    }

    /// Partition length: a multiple of [`LANES`] so only the last block has a tail.
    fn block_len(&self, len: usize) -> usize {
        let per_block = len.div_ceil(self.threads * BLOCKS_PER_WORKER).max(LANES);
        per_block.div_ceil(LANES) * LANES
    }

    /// `dst[i] = f(src[i])`.
    pub fn transform<S, L>(&self, src: &[f32], dst: &mut [f32], scalar: S, lane: L)
    where
        S: Fn(f32) -> f32 + Sync,
        L: Fn(Lane) -> Lane + Sync,
    {
        debug_assert_eq!(src.len(), dst.len());
        let strategy = self.strategy;
        let run = |src: &[f32], dst: &mut [f32]| match strategy {
            KernelStrategy::ParallelScalar => {
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = scalar(s);
                }
            }
            KernelStrategy::Vectorized => transform_lanes(src, dst, &scalar, &lane),
        };

        if self.is_inline(dst.len()) {
            run(src, dst);
            return;
        }
        let block = self.block_len(dst.len());
        self.workers.install(|| {
            dst.par_chunks_mut(block)
                .zip(src.par_chunks(block))
                .for_each(|(d, s)| run(s, d));
        });
    }

    /// `dst[i] = f(a[i], b[i])`.
    pub fn zip<S, L>(&self, a: &[f32], b: &[f32], dst: &mut [f32], scalar: S, lane: L)
    where
        S: Fn(f32, f32) -> f32 + Sync,
        L: Fn(Lane, Lane) -> Lane + Sync,
    {
        debug_assert_eq!(a.len(), dst.len());
        debug_assert_eq!(b.len(), dst.len());
        let strategy = self.strategy;
        let run = |a: &[f32], b: &[f32], dst: &mut [f32]| match strategy {
            KernelStrategy::ParallelScalar => {
                for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
                    *d = scalar(x, y);
                }
            }
            KernelStrategy::Vectorized => zip_lanes(a, b, dst, &scalar, &lane),
        };

        if self.is_inline(dst.len()) {
            run(a, b, dst);
            return;
        }
        let block = self.block_len(dst.len());
        self.workers.install(|| {
            dst.par_chunks_mut(block)
                .zip(a.par_chunks(block))
                .zip(b.par_chunks(block))
                .for_each(|((d, a), b)| run(a, b, d));
        });
    }

    /// `target[i] = f(target[i])`.
    pub fn mutate<S, L>(&self, target: &mut [f32], scalar: S, lane: L)
    where
        S: Fn(f32) -> f32 + Sync,
        L: Fn(Lane) -> Lane + Sync,
    {
        let strategy = self.strategy;
        let run = |target: &mut [f32]| match strategy {
            KernelStrategy::ParallelScalar => target.iter_mut().for_each(|x| *x = scalar(*x)),
            KernelStrategy::Vectorized => mutate_lanes(target, &scalar, &lane),
        };

        if self.is_inline(target.len()) {
            run(target);
            return;
        }
        let block = self.block_len(target.len());
        self.workers
            .install(|| target.par_chunks_mut(block).for_each(run));
    }

    /// `target[i] = f(target[i], other[i])`.
    pub fn mutate_zip<S, L>(&self, target: &mut [f32], other: &[f32], scalar: S, lane: L)
    where
        S: Fn(f32, f32) -> f32 + Sync,
        L: Fn(Lane, Lane) -> Lane + Sync,
    {
        debug_assert_eq!(target.len(), other.len());
        let strategy = self.strategy;
        let run = |target: &mut [f32], other: &[f32]| match strategy {
            KernelStrategy::ParallelScalar => {
                for (t, &o) in target.iter_mut().zip(other) {
                    *t = scalar(*t, o);
                }
            }
            KernelStrategy::Vectorized => mutate_zip_lanes(target, other, &scalar, &lane),
        };

        if self.is_inline(target.len()) {
            run(target, other);
            return;
        }
        let block = self.block_len(target.len());
        self.workers.install(|| {
            target
                .par_chunks_mut(block)
                .zip(other.par_chunks(block))
                .for_each(|(t, o)| run(t, o));
        });
    }

    /// Sum of all elements. Partial sums combine in no fixed order.
    pub fn sum(&self, values: &[f32]) -> f32 {
        let strategy = self.strategy;
        let run = |values: &[f32]| match strategy {
            KernelStrategy::ParallelScalar => values.iter().sum::<f32>(),
            KernelStrategy::Vectorized => simd::sum(values),
        };

        if self.is_inline(values.len()) {
            return run(values);
        }
        let block = self.block_len(values.len());
        self.workers
            .install(|| values.par_chunks(block).map(run).sum())
    }

    /// Sum of `f(x)` over all elements, without materialising `f(x)`.
    pub fn map_sum<S, L>(&self, values: &[f32], scalar: S, lane: L) -> f32
    where
        S: Fn(f32) -> f32 + Sync,
        L: Fn(Lane) -> Lane + Sync,
    {
        let strategy = self.strategy;
        let run = |values: &[f32]| match strategy {
            KernelStrategy::ParallelScalar => values.iter().map(|&x| scalar(x)).sum::<f32>(),
            KernelStrategy::Vectorized => {
                let chunks = values.chunks_exact(LANES);
                let tail = chunks.remainder();
                let acc = chunks.fold(simd::splat(0.0), |acc, c| simd::add(acc, lane(simd::load(c))));
                acc.iter().sum::<f32>() + tail.iter().map(|&x| scalar(x)).sum::<f32>()
            }
        };

        if self.is_inline(values.len()) {
            return run(values);
        }
        let block = self.block_len(values.len());
        self.workers
            .install(|| values.par_chunks(block).map(run).sum())
    }

    /// Sum of `f(a[i], b[i])` over the common length.
    pub fn zip_sum<S, L>(&self, a: &[f32], b: &[f32], scalar: S, lane: L) -> f32
    where
        S: Fn(f32, f32) -> f32 + Sync,
        L: Fn(Lane, Lane) -> Lane + Sync,
    {
        debug_assert_eq!(a.len(), b.len());
        let strategy = self.strategy;
        let run = |a: &[f32], b: &[f32]| match strategy {
            KernelStrategy::ParallelScalar => {
                a.iter().zip(b).map(|(&x, &y)| scalar(x, y)).sum::<f32>()
            }
            KernelStrategy::Vectorized => {
                let mut acc = simd::splat(0.0);
                let mut a_chunks = a.chunks_exact(LANES);
                let mut b_chunks = b.chunks_exact(LANES);
                for (x, y) in (&mut a_chunks).zip(&mut b_chunks) {
                    acc = simd::add(acc, lane(simd::load(x), simd::load(y)));
                }
                let tail: f32 = a_chunks
                    .remainder()
                    .iter()
                    .zip(b_chunks.remainder())
                    .map(|(&x, &y)| scalar(x, y))
                    .sum();
                acc.iter().sum::<f32>() + tail
            }
        };

        if self.is_inline(a.len()) {
            return run(a, b);
        }
        let block = self.block_len(a.len());
        self.workers.install(|| {
            a.par_chunks(block)
                .zip(b.par_chunks(block))
                .map(|(a, b)| run(a, b))
                .sum()
        })
    }

    /// Reduces blocks independently, then merges the partial results.
    ///
    /// `fold` receives the block's starting offset within `values`.
    pub fn reduce<R, F, M>(&self, values: &[f32], identity: R, fold: F, merge: M) -> R
    where
        R: Clone + Send + Sync,
        F: Fn(usize, &[f32]) -> R + Sync,
        M: Fn(R, R) -> R + Sync,
    {
        if self.is_inline(values.len()) {
            return merge(identity, fold(0, values));
        }
        let block = self.block_len(values.len());
        self.workers.install(|| {
            values
                .par_chunks(block)
                .enumerate()
                .map(|(i, chunk)| fold(i * block, chunk))
                .reduce(|| identity.clone(), &merge)
        })
    }

    /// `dst[i] = f(i)`; every output cell is computed independently.
    pub fn fill_indexed<F>(&self, dst: &mut [f32], f: F)
    where
        F: Fn(usize) -> f32 + Sync,
    {
        if self.is_inline(dst.len()) {
            dst.iter_mut().enumerate().for_each(|(i, d)| *d = f(i));
            return;
        }
        let block = self.block_len(dst.len());
        self.workers.install(|| {
            dst.par_chunks_mut(block).enumerate().for_each(|(b, chunk)| {
                let base = b * block;
                chunk
                    .iter_mut()
                    .enumerate()
                    .for_each(|(i, d)| *d = f(base + i));
            });
        });
    }

    /// Calls `f(row_index, row)` for every `row_len`-long row of `dst`.
    pub fn for_each_row<F>(&self, dst: &mut [f32], row_len: usize, f: F)
    where
        F: Fn(usize, &mut [f32]) + Sync,
    {
        if row_len == 0 {
            return;
        }
        if self.is_inline(dst.len()) {
            dst.chunks_mut(row_len)
                .enumerate()
                .for_each(|(i, row)| f(i, row));
            return;
        }
        self.workers.install(|| {
            dst.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(i, row)| f(i, row));
        });
    }

    /// Like [`Kernels::for_each_row`], walking two equally shaped buffers in step.
    pub fn for_each_row_pair<F>(&self, a: &mut [f32], b: &mut [f32], row_len: usize, f: F)
    where
        F: Fn(usize, &mut [f32], &mut [f32]) + Sync,
    {
        debug_assert_eq!(a.len(), b.len());
        if row_len == 0 {
            return;
        }
        if self.is_inline(a.len()) {
            a.chunks_mut(row_len)
                .zip(b.chunks_mut(row_len))
                .enumerate()
                .for_each(|(i, (x, y))| f(i, x, y));
            return;
        }
        self.workers.install(|| {
            a.par_chunks_mut(row_len)
                .zip(b.par_chunks_mut(row_len))
                .enumerate()
                .for_each(|(i, (x, y))| f(i, x, y));
        });
    }
}

impl fmt::Debug for Kernels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernels")
            .field("strategy", &self.strategy)
            .field("threads", &self.threads)
            .field("threshold", &self.threshold)
            .finish()
    }
}

fn transform_lanes<S, L>(src: &[f32], dst: &mut [f32], scalar: &S, lane: &L)
where
    S: Fn(f32) -> f32,
    L: Fn(Lane) -> Lane,
{
    let mut dst_chunks = dst.chunks_exact_mut(LANES);
    let mut src_chunks = src.chunks_exact(LANES);
    for (d, s) in (&mut dst_chunks).zip(&mut src_chunks) {
        d.copy_from_slice(&lane(simd::load(s)));
    }
    for (d, &s) in dst_chunks
        .into_remainder()
        .iter_mut()
        .zip(src_chunks.remainder())
    {
        *d = scalar(s);
    }
}

fn zip_lanes<S, L>(a: &[f32], b: &[f32], dst: &mut [f32], scalar: &S, lane: &L)
where
    S: Fn(f32, f32) -> f32,
    L: Fn(Lane, Lane) -> Lane,
{
    let mut dst_chunks = dst.chunks_exact_mut(LANES);
    let mut a_chunks = a.chunks_exact(LANES);
    let mut b_chunks = b.chunks_exact(LANES);
    for ((d, x), y) in (&mut dst_chunks).zip(&mut a_chunks).zip(&mut b_chunks) {
        d.copy_from_slice(&lane(simd::load(x), simd::load(y)));
    }
    for ((d, &x), &y) in dst_chunks
        .into_remainder()
        .iter_mut()
        .zip(a_chunks.remainder())
        .zip(b_chunks.remainder())
    {
        *d = scalar(x, y);
    }
}

fn mutate_lanes<S, L>(target: &mut [f32], scalar: &S, lane: &L)
where
    S: Fn(f32) -> f32,
    L: Fn(Lane) -> Lane,
{
    let mut chunks = target.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        let out = lane(simd::load(chunk));
        chunk.copy_from_slice(&out);
    }
    for x in chunks.into_remainder() {
        *x = scalar(*x);
    }
}

fn mutate_zip_lanes<S, L>(target: &mut [f32], other: &[f32], scalar: &S, lane: &L)
where
    S: Fn(f32, f32) -> f32,
    L: Fn(Lane, Lane) -> Lane,
{
    let mut t_chunks = target.chunks_exact_mut(LANES);
    let mut o_chunks = other.chunks_exact(LANES);
    for (t, o) in (&mut t_chunks).zip(&mut o_chunks) {
        let out = lane(simd::load(t), simd::load(o));
        t.copy_from_slice(&out);
    }
    for (t, &o) in t_chunks.into_remainder().iter_mut().zip(o_chunks.remainder()) {
        *t = scalar(*t, o);
    }
}
