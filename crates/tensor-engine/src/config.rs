// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Computation-unit configuration loaded from TOML files or built in code.
//!
//! # TOML Format
//! ```toml
//! strategy = "vectorized"
//! num_threads = 4
//! parallel_threshold = 4096
//! pool_budget = "256M"
//! ```

use crate::kernels::KernelStrategy;
use crate::TensorError;
use buffer_pool::PoolBudget;
use std::path::Path;

/// Settings a [`crate::ComputeUnit`] is constructed from.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UnitConfig {
    /// Kernel strategy name: `"vectorized"` or `"parallel-scalar"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Worker threads for kernel fan-out (defaults to available parallelism).
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Buffers shorter than this many elements are processed on the calling thread.
    #[serde(default = "default_threshold")]
    pub parallel_threshold: usize,
    /// When set, segments are leased from a pool bounded by this budget (e.g. `"256M"`).
    #[serde(default)]
    pub pool_budget: Option<String>,
}

fn default_strategy() -> String {
    "vectorized".to_string()
}

fn default_threshold() -> usize {
    4096
}

impl UnitConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, TensorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TensorError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, TensorError> {
        toml::from_str(toml_str)
            .map_err(|e| TensorError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, TensorError> {
        toml::to_string_pretty(self)
            .map_err(|e| TensorError::Config(format!("TOML serialise error: {e}")))
    }

    /// Resolves the kernel strategy named by this config.
    pub fn kernel_strategy(&self) -> Result<KernelStrategy, TensorError> {
        self.strategy.parse()
    }

    /// Resolves the number of worker threads.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Parses the pool budget, if one is configured.
    pub fn parse_budget(&self) -> Result<Option<PoolBudget>, TensorError> {
        self.pool_budget
            .as_deref()
            .map(PoolBudget::parse)
            .transpose()
            .map_err(|e| TensorError::Config(format!("invalid pool budget: {e}")))
    }

    /// Same configuration with the given strategy.
    pub fn with_strategy(mut self, strategy: KernelStrategy) -> Self {
        self.strategy = strategy.as_str().to_string();
        self
    }
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            num_threads: None,
            parallel_threshold: default_threshold(),
            pool_budget: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = UnitConfig::default();
        assert_eq!(c.strategy, "vectorized");
        assert_eq!(c.parallel_threshold, 4096);
        assert!(c.pool_budget.is_none());
        assert_eq!(c.kernel_strategy().unwrap(), KernelStrategy::Vectorized);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
strategy = "parallel-scalar"
num_threads = 2
parallel_threshold = 64
pool_budget = "16M"
"#;
        let c = UnitConfig::from_toml(toml).unwrap();
        assert_eq!(c.kernel_strategy().unwrap(), KernelStrategy::ParallelScalar);
        assert_eq!(c.num_threads, Some(2));
        assert_eq!(c.parallel_threshold, 64);
        assert_eq!(c.parse_budget().unwrap(), Some(PoolBudget::from_mb(16)));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let c = UnitConfig::from_toml("num_threads = 3").unwrap();
        assert_eq!(c.strategy, "vectorized");
        assert_eq!(c.parallel_threshold, 4096);
        assert_eq!(c.parse_budget().unwrap(), None);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = UnitConfig {
            pool_budget: Some("1G".into()),
            num_threads: Some(6),
            ..Default::default()
        };
        let back = UnitConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            UnitConfig::from_toml("strategy = ["),
            Err(TensorError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_strategy() {
        let c = UnitConfig {
            strategy: "gpu".into(),
            ..Default::default()
        };
        assert!(matches!(c.kernel_strategy(), Err(TensorError::Config(_))));
    }

    #[test]
    fn test_bad_budget() {
        let c = UnitConfig {
            pool_budget: Some("plenty".into()),
            ..Default::default()
        };
        assert!(c.parse_budget().is_err());
    }

    #[test]
    fn test_resolve_threads() {
        let c = UnitConfig {
            num_threads: Some(8),
            ..Default::default()
        };
        assert_eq!(c.resolve_threads(), 8);
        assert!(UnitConfig::default().resolve_threads() >= 1);
    }

    #[test]
    fn test_missing_file() {
        let err = UnitConfig::from_file(Path::new("/nonexistent/unit.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config"));
    }
}
