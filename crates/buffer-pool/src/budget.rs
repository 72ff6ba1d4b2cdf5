// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte ceilings for the buffer pool.

use crate::PoolError;
use std::fmt;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// Upper bound on the bytes a [`crate::BufferPool`] may have on loan at once.
///
/// # Parsing
/// `"256M"`, `"256MB"`, `"1G"`, `"64K"` and plain byte counts are accepted,
/// case-insensitive.
///
/// ```
/// use buffer_pool::PoolBudget;
///
/// let b = PoolBudget::parse("1G").unwrap();
/// assert_eq!(b.as_bytes(), 1 << 30);
/// assert_eq!(b.max_elements(), (1 << 30) / 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolBudget {
    bytes: usize,
}

impl PoolBudget {
    /// A budget of exactly `bytes`.
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    /// A budget of `mb` mebibytes.
    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MIB }
    }

    /// A budget with no practical limit.
    pub fn unlimited() -> Self {
        Self { bytes: usize::MAX }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Number of `f32` elements that fit in the budget.
    pub fn max_elements(&self) -> usize {
        self.bytes / std::mem::size_of::<f32>()
    }

    /// Parses a human-readable budget string.
    pub fn parse(input: &str) -> Result<Self, PoolError> {
        let invalid = |reason| PoolError::InvalidBudget {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty string"));
        }

        let upper = trimmed.to_ascii_uppercase();
        let digits_end = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (digits, suffix) = upper.split_at(digits_end);

        let multiplier = match suffix.trim() {
            "" | "B" => 1,
            "K" | "KB" => KIB,
            "M" | "MB" => MIB,
            "G" | "GB" => GIB,
            _ => return Err(invalid("expected a K, M or G suffix")),
        };

        let value: usize = digits.parse().map_err(|_| invalid("not a number"))?;
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("value overflows usize"))?;
        if bytes == 0 {
            return Err(invalid("budget must be non-zero"));
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for PoolBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes {
            usize::MAX => write!(f, "unlimited"),
            b if b >= GIB && b % GIB == 0 => write!(f, "{} GB", b / GIB),
            b if b >= MIB && b % MIB == 0 => write!(f, "{} MB", b / MIB),
            b if b >= KIB && b % KIB == 0 => write!(f, "{} KB", b / KIB),
            b => write!(f, "{b} B"),
        }
    }
}
