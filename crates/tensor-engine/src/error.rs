// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use buffer_pool::PoolError;

/// Errors that can occur while creating or computing with tensors.
///
/// None of these are retryable: callers should abandon the current
/// evaluation when one surfaces.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// Operand sizes or shapes differ where the operation needs them equal.
    #[error("shape mismatch in {op}: expected {expected}, got {actual}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    /// A coordinate, saved index or view range falls outside its tensor.
    #[error("index {index} out of range in {op} (bound {bound})")]
    IndexOutOfRange {
        op: &'static str,
        index: usize,
        bound: usize,
    },

    /// The operation has no meaning for an empty input.
    #[error("{op} requires a non-empty input")]
    Empty { op: &'static str },

    /// This backend has no implementation of the operation.
    #[error("{op} is not implemented by the {backend} backend")]
    NotImplemented {
        op: &'static str,
        backend: &'static str,
    },

    /// Leasing a buffer from the pool failed.
    #[error("buffer pool: {0}")]
    Pool(#[from] PoolError),

    /// Invalid unit configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TensorError {
    /// Shorthand for a [`TensorError::ShapeMismatch`] from two debuggable shapes.
    pub(crate) fn mismatch(
        op: &'static str,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        TensorError::ShapeMismatch {
            op,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

/// Fails with a shape mismatch unless `expected == actual`.
pub(crate) fn ensure_same<D>(op: &'static str, expected: D, actual: D) -> Result<(), TensorError>
where
    D: PartialEq + std::fmt::Debug,
{
    if expected == actual {
        Ok(())
    } else {
        Err(TensorError::mismatch(op, expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message() {
        let err = TensorError::mismatch("add", 4usize, 5usize);
        assert_eq!(err.to_string(), "shape mismatch in add: expected 4, got 5");
    }

    #[test]
    fn test_ensure_same() {
        assert!(ensure_same("concat", [2, 3], [2, 3]).is_ok());
        assert!(matches!(
            ensure_same("concat", [2, 3], [3, 2]),
            Err(TensorError::ShapeMismatch { op: "concat", .. })
        ));
    }

    #[test]
    fn test_pool_error_converts() {
        let err: TensorError = PoolError::ZeroSizedLease.into();
        assert!(err.to_string().starts_with("buffer pool:"));
    }
}
