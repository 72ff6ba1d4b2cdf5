// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fixed-width lane helpers and the horizontal-add summation kernel.
//!
//! A [`Lane`] is eight `f32`s held in a plain array. The element-wise helpers
//! below are written so that the optimiser lowers them to packed
//! instructions on any target; [`sum`] additionally dispatches to AVX2 or
//! NEON at runtime and falls back to an eight-accumulator portable loop.

/// Elements processed per vector step.
pub const LANES: usize = 8;

/// One vector step's worth of elements.
pub type Lane = [f32; LANES];

/// Loads exactly [`LANES`] elements.
///
/// # Panics
/// Panics if `chunk.len() != LANES`.
#[inline(always)]
pub fn load(chunk: &[f32]) -> Lane {
    let mut lane = [0.0; LANES];
    lane.copy_from_slice(chunk);
    lane
}

#[inline(always)]
pub fn splat(value: f32) -> Lane {
    [value; LANES]
}

/// Applies `f` to every element of the lane.
#[inline(always)]
pub fn map(lane: Lane, f: impl Fn(f32) -> f32) -> Lane {
    lane.map(f)
}

/// Combines two lanes element by element.
#[inline(always)]
pub fn zip(a: Lane, b: Lane, f: impl Fn(f32, f32) -> f32) -> Lane {
    std::array::from_fn(|i| f(a[i], b[i]))
}

#[inline(always)]
pub fn add(a: Lane, b: Lane) -> Lane {
    zip(a, b, |x, y| x + y)
}

#[inline(always)]
pub fn sub(a: Lane, b: Lane) -> Lane {
    zip(a, b, |x, y| x - y)
}

#[inline(always)]
pub fn mul(a: Lane, b: Lane) -> Lane {
    zip(a, b, |x, y| x * y)
}

#[inline(always)]
pub fn div(a: Lane, b: Lane) -> Lane {
    zip(a, b, |x, y| x / y)
}

#[inline(always)]
pub fn abs(a: Lane) -> Lane {
    map(a, f32::abs)
}

/// Multiplies every element by `factor`.
#[inline(always)]
pub fn scale(a: Lane, factor: f32) -> Lane {
    mul(a, splat(factor))
}

/// Adds `delta` to every element.
#[inline(always)]
pub fn shift(a: Lane, delta: f32) -> Lane {
    add(a, splat(delta))
}

#[inline(always)]
pub fn clamp(a: Lane, min: f32, max: f32) -> Lane {
    map(a, |x| x.max(min).min(max))
}

/// Adds the lanes of a slice into one accumulator lane; the tail shorter
/// than [`LANES`] is returned untouched.
#[inline]
fn accumulate(values: &[f32]) -> (Lane, &[f32]) {
    let chunks = values.chunks_exact(LANES);
    let tail = chunks.remainder();
    let acc = chunks.fold(splat(0.0), |acc, chunk| add(acc, load(chunk)));
    (acc, tail)
}

/// Dot product over the shorter of the two slices.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);

    let mut acc = splat(0.0);
    let mut a_chunks = a.chunks_exact(LANES);
    let mut b_chunks = b.chunks_exact(LANES);
    for (x, y) in (&mut a_chunks).zip(&mut b_chunks) {
        acc = add(acc, mul(load(x), load(y)));
    }
    let tail: f32 = a_chunks
        .remainder()
        .iter()
        .zip(b_chunks.remainder())
        .map(|(x, y)| x * y)
        .sum();
    acc.iter().sum::<f32>() + tail
}

/// Sums a slice using the widest horizontal add the CPU offers.
pub fn sum(values: &[f32]) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 support was checked at runtime just above.
            return unsafe { sum_avx2(values) };
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: NEON is part of the aarch64 baseline.
        return unsafe { sum_neon(values) };
    }

    #[cfg(not(target_arch = "aarch64"))]
    sum_portable(values)
}

/// Eight independent accumulators folded at the end.
#[cfg_attr(target_arch = "aarch64", allow(dead_code))]
pub(crate) fn sum_portable(values: &[f32]) -> f32 {
    let (acc, tail) = accumulate(values);
    acc.iter().sum::<f32>() + tail.iter().sum::<f32>()
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn sum_avx2(values: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let chunks = values.chunks_exact(LANES);
    let tail = chunks.remainder();

    let mut acc = _mm256_setzero_ps();
    for chunk in chunks {
        acc = _mm256_add_ps(acc, _mm256_loadu_ps(chunk.as_ptr()));
    }

    // Fold 8 → 4 lanes, then two horizontal adds take 4 → 1.
    let low = _mm256_castps256_ps128(acc);
    let high = _mm256_extractf128_ps(acc, 1);
    let quad = _mm_add_ps(low, high);
    let pair = _mm_hadd_ps(quad, quad);
    let single = _mm_hadd_ps(pair, pair);

    _mm_cvtss_f32(single) + tail.iter().sum::<f32>()
}

#[cfg(target_arch = "aarch64")]
unsafe fn sum_neon(values: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let chunks = values.chunks_exact(4);
    let tail = chunks.remainder();

    let mut acc = vdupq_n_f32(0.0);
    for chunk in chunks {
        acc = vaddq_f32(acc, vld1q_f32(chunk.as_ptr()));
    }
    vaddvq_f32(acc) + tail.iter().sum::<f32>()
}

/// Name of the summation path selected on this machine.
pub fn capability() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return "avx2";
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        return "neon";
    }

    #[cfg(not(target_arch = "aarch64"))]
    "portable"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 * 0.5 - 3.0).collect()
    }

    #[test]
    fn test_sum_matches_scalar() {
        for n in [0, 1, 7, 8, 9, 31, 64, 1001] {
            let v = ramp(n);
            let expected: f32 = v.iter().sum();
            assert!((sum(&v) - expected).abs() < 1e-2, "n = {n}");
            assert!((sum_portable(&v) - expected).abs() < 1e-2, "n = {n}");
        }
    }

    #[test]
    fn test_dot() {
        let a = ramp(19);
        let b: Vec<f32> = (0..19).map(|i| (i % 3) as f32).collect();
        let expected: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot(&a, &b) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_lane_helpers() {
        let a = load(&[1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0]);
        assert_eq!(abs(a)[1], 2.0);
        assert_eq!(scale(a, 2.0)[7], -16.0);
        assert_eq!(shift(a, 1.0)[0], 2.0);
        assert_eq!(clamp(a, -1.0, 1.0), [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);
        assert_eq!(div(a, splat(2.0))[2], 1.5);
        assert_eq!(sub(a, a), splat(0.0));
    }

    #[test]
    fn test_capability_is_known() {
        assert!(["avx2", "neon", "portable"].contains(&capability()));
    }
}
