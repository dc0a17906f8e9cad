//! Run configuration.
//!
//! Every option is optional: an absent config file, an empty JSON object,
//! and a fully specified file all produce a valid run. Per-symbol
//! configuration travels by value into workers; there is no process-wide
//! configuration state.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use quantdev_engine::{KernelParams, VariantConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The only symbol considered.
    pub symbol: String,
    /// Root of the store.
    pub base_dir: PathBuf,
    /// Worker pool size; 0 means the logical CPU count.
    pub worker_threads: usize,

    pub ring_capacity: usize,
    pub l_fast: f64,
    pub l_slow: f64,

    pub alpha_var_b: f64,
    /// Forward horizons in wall-clock milliseconds.
    pub horizons_ms: Vec<i64>,
    /// Days on or after this date aggregate out-of-sample.
    pub oos_boundary_date: String,
    pub num_buckets: usize,
    pub quantile_stride: usize,
    /// Reusable worker buffer ceiling, in rows.
    pub max_rows: usize,

    pub kernel: KernelParams,
    /// Explicit variant list; empty means the built-in pair derived from
    /// `l_fast` / `l_slow`.
    pub variants: Vec<VariantConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "ETHUSDT".to_string(),
            base_dir: PathBuf::from("data"),
            worker_threads: 0,
            ring_capacity: 20_000,
            l_fast: 2.0,
            l_slow: 300.0,
            alpha_var_b: 0.001,
            horizons_ms: vec![10_000, 30_000, 60_000, 180_000, 300_000],
            oos_boundary_date: "2024-01-01".to_string(),
            num_buckets: 5,
            quantile_stride: 10,
            max_rows: 10_000_000,
            kernel: KernelParams::default(),
            variants: Vec::new(),
        }
    }
}

impl Config {
    /// Load from an optional JSON file; absent path means pure defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let bytes = std::fs::read(p)
                    .with_context(|| format!("read config {}", p.display()))?;
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse config {}", p.display()))
            }
        }
    }

    pub fn workers(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    /// IS/OOS boundary as a numeric YYYYMMDD. Invalid dates are fatal at
    /// startup, before any work begins.
    pub fn oos_boundary_ymd(&self) -> Result<u32> {
        let date = NaiveDate::parse_from_str(&self.oos_boundary_date, "%Y-%m-%d")
            .with_context(|| format!("invalid oos_boundary_date {:?}", self.oos_boundary_date))?;
        Ok(date.year() as u32 * 10_000 + date.month() * 100 + date.day())
    }

    /// Variants to build/evaluate: the explicit list, or the built-in
    /// base/fast pair.
    pub fn resolved_variants(&self) -> Vec<VariantConfig> {
        if !self.variants.is_empty() {
            return self.variants.clone();
        }
        vec![
            VariantConfig {
                id: "adaptive_base".to_string(),
                ring_capacity: self.ring_capacity,
                l_fast: self.l_fast,
                l_slow: self.l_slow,
            },
            VariantConfig {
                id: "adaptive_fast".to_string(),
                ring_capacity: self.ring_capacity,
                l_fast: 0.5,
                l_slow: 60.0,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = Config::default();
        assert_eq!(cfg.symbol, "ETHUSDT");
        assert_eq!(cfg.horizons_ms.len(), 5);
        assert_eq!(cfg.oos_boundary_ymd().unwrap(), 20240101);
        assert_eq!(cfg.resolved_variants().len(), 2);
        assert!(cfg.workers() > 0);
    }

    #[test]
    fn partial_json_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"symbol":"BTCUSDT","num_buckets":10}"#).unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.num_buckets, 10);
        assert_eq!(cfg.l_slow, 300.0);
    }

    #[test]
    fn bad_boundary_date_is_fatal() {
        let cfg = Config {
            oos_boundary_date: "2024-13-40".to_string(),
            ..Config::default()
        };
        assert!(cfg.oos_boundary_ymd().is_err());
    }
}
