//! `build` - derive feature files for every stored day.
//!
//! Day jobs are independent, so they fan out over the worker pool with no
//! ordering requirement; each worker keeps one reusable row buffer. The
//! skip-if-exists contract makes repeated builds incremental.

use crate::config::Config;
use anyhow::{Context, Result};
use quantdev_engine::build::{build_day, BuildOutcome};
use quantdev_store as store;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

pub fn run(cfg: &Config, stop: &AtomicBool) -> Result<()> {
    let tasks = store::discover_days(&cfg.base_dir, &cfg.symbol);
    if tasks.is_empty() {
        info!(symbol = %cfg.symbol, "no stored days to build");
        return Ok(());
    }

    let variants = cfg.resolved_variants();
    info!(
        symbol = %cfg.symbol,
        days = tasks.len(),
        variants = variants.len(),
        workers = cfg.workers(),
        "building features"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers())
        .build()
        .context("build worker pool")?;

    for variant in &variants {
        let done = AtomicUsize::new(0);
        let outcomes: Mutex<BTreeMap<&'static str, usize>> = Mutex::new(BTreeMap::new());

        pool.install(|| {
            tasks.par_iter().for_each_init(Vec::new, |buf, task| {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let outcome = build_day(
                    &cfg.base_dir,
                    &cfg.symbol,
                    task,
                    variant,
                    cfg.kernel,
                    cfg.alpha_var_b,
                    buf,
                );
                *outcomes
                    .lock()
                    .unwrap()
                    .entry(outcome.as_str())
                    .or_insert(0) += 1;

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 100 == 0 {
                    info!(variant = %variant.id, built = n, total = tasks.len(), "progress");
                }
            });
        });

        let summary = outcomes.into_inner().unwrap();
        let failed = summary.get(BuildOutcome::Failed.as_str()).copied().unwrap_or(0);
        info!(variant = %variant.id, summary = ?summary, failed, "variant complete");
        if stop.load(Ordering::SeqCst) {
            break;
        }
    }
    Ok(())
}
