//! Per-day feature file construction.
//!
//! One worker builds one day end to end: locate the blob, decompress,
//! stream every tick through a fresh engine, and write the interleaved
//! feature rows (`f32_le × 5`, 20 bytes per tick) in a single call.
//! Builds are idempotent: an existing output file skips the day.

use crate::kernel::KernelParams;
use crate::ring::{RingConfig, Tick};
use crate::{FeatureEngine, VariantConfig};
use quantdev_codec::{self as codec, FEATURE_ROW_SIZE};
use quantdev_store::{self as store, DayTask, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one (variant, day) build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildOutcome {
    Built,
    /// Output already present; nothing touched (mtime preserved).
    SkippedExists,
    /// The day failed to load or write; logged and skipped.
    Failed,
}

impl BuildOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::SkippedExists => "skip_exists",
            Self::Failed => "failed",
        }
    }
}

/// Feature file path for one variant-day:
/// `<base>/features/<SYMBOL>/<VARIANT_ID>/<YYYYMMDD>.bin`.
pub fn feature_path(base: &Path, symbol: &str, variant_id: &str, ymd: u32) -> PathBuf {
    base.join("features")
        .join(symbol)
        .join(variant_id)
        .join(format!("{ymd:08}.bin"))
}

/// Build one day for one variant into `out`, reusing the worker's row
/// buffer. The buffer grows on demand with 25% slack and is never shrunk.
pub fn build_day(
    base: &Path,
    symbol: &str,
    task: &DayTask,
    variant: &VariantConfig,
    params: KernelParams,
    alpha_var_b: f64,
    buf: &mut Vec<u8>,
) -> BuildOutcome {
    let out_path = feature_path(base, symbol, &variant.id, task.ymd());
    if out_path.exists() {
        return BuildOutcome::SkippedExists;
    }

    let day = match store::load_task(base, symbol, task) {
        Ok(day) => day,
        Err(StoreError::MissingDay) => return BuildOutcome::Failed,
        Err(e) => {
            warn!(ymd = task.ymd(), error = %e, "day failed to load");
            return BuildOutcome::Failed;
        }
    };

    let n = day.row_count as usize;
    let need = n * FEATURE_ROW_SIZE;
    buf.clear();
    if buf.capacity() < need {
        buf.reserve_exact(need + need / 4);
    }

    let mut engine = FeatureEngine::new(
        RingConfig {
            capacity: variant.ring_capacity,
            l_fast: variant.l_fast,
            l_slow: variant.l_slow,
            alpha_var_b,
        },
        params,
    );

    for row in codec::rows(&day.body) {
        let tick = Tick {
            side: row.side(),
            qty: row.qty_f64(),
            price: row.price_f64(),
            ts: row.transact_time_ms as i64,
        };
        let k = engine.update(&tick);
        for v in k {
            buf.extend_from_slice(&(v as f32).to_le_bytes());
        }
    }

    if engine.oversubscribed() {
        warn!(
            ymd = task.ymd(),
            variant = %variant.id,
            "ring oversubscribed; windows carried stale boundaries"
        );
    }

    if let Some(parent) = out_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!(ymd = task.ymd(), error = %e, "cannot create feature dir");
            return BuildOutcome::Failed;
        }
    }
    if let Err(e) = fs::write(&out_path, &buf) {
        warn!(ymd = task.ymd(), error = %e, "feature write failed");
        // Never leave a truncated file behind.
        let _ = fs::remove_file(&out_path);
        return BuildOutcome::Failed;
    }

    debug!(ymd = task.ymd(), variant = %variant.id, rows = n, "day built");
    BuildOutcome::Built
}
