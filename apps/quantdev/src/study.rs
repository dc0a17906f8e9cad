//! `study` - score every feature file against forward returns.
//!
//! Workers evaluate whole days and hand immutable `DayResult`s to the main
//! thread over a bounded channel; only the main thread touches the IS/OOS
//! aggregates. Day order is irrelevant: moments and bucket sums are
//! additive, and the IS/OOS split depends only on each day's date.

use crate::config::Config;
use anyhow::{Context, Result};
use quantdev_codec::{self as codec, FEATURE_DIMS, FEATURE_ROW_SIZE};
use quantdev_eval::{
    align_pairs, day_buckets, finalize, save_report, BucketAgg, DayAccumulator, HorizonMetrics,
    HorizonProfile, HorizonReport, Moments, ReportEntry, SignalQuality,
};
use quantdev_store as store;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Display names for the five feature dimensions, in file order.
const DIM_NAMES: [&str; FEATURE_DIMS] = [
    "k1_trend", "k2_burst", "k3_align", "k4_break", "k5_revert",
];

pub fn run(cfg: &Config, stop: &AtomicBool) -> Result<()> {
    let boundary = cfg.oos_boundary_ymd()?;
    let feat_root = cfg.base_dir.join("features").join(&cfg.symbol);

    let variants = discover_variants(&feat_root);
    if variants.is_empty() {
        info!(root = %feat_root.display(), "no feature sets to study");
        return Ok(());
    }
    let days = discover_days(&feat_root.join(&variants[0]));
    info!(
        symbol = %cfg.symbol,
        variants = variants.len(),
        days = days.len(),
        boundary,
        "study start"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers())
        .build()
        .context("build study pool")?;

    let (tx, rx) = crossbeam_channel::bounded::<DayResult>(64);

    let mut merged = Aggregates::new(cfg.horizons_ms.len(), cfg.num_buckets);
    let mut report_entries: Vec<ReportEntry> = Vec::new();

    std::thread::scope(|scope| {
        let days = &days;
        let variants = &variants;
        let feat_root = &feat_root;
        scope.spawn(move || {
            pool.install(|| {
                days.par_iter().for_each_init(Scratch::default, |scratch, &ymd| {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if let Some(res) = process_day(cfg, ymd, variants, feat_root, scratch) {
                        // Receiver outlives all senders inside the scope.
                        let _ = tx.send(res);
                    }
                });
            });
            drop(tx);
        });

        for res in rx.iter() {
            let is_oos = res.ymd >= boundary;
            if is_oos {
                merged.oos_days += 1;
            } else {
                merged.is_days += 1;
            }
            for key_day in &res.keys {
                let mut horizons = BTreeMap::new();
                for (h_idx, horizon) in key_day.horizons.iter().enumerate() {
                    if horizon.moments.count == 0 {
                        continue;
                    }
                    merged.fold(&key_day.key, h_idx, is_oos, horizon);
                    horizons.insert(
                        cfg.horizons_ms[h_idx].to_string(),
                        HorizonReport {
                            metrics: finalize(&horizon.moments, &[]),
                            profile: horizon.profile,
                        },
                    );
                }
                if !horizons.is_empty() {
                    report_entries.push(ReportEntry {
                        label: ReportEntry::label_for(&cfg.symbol, &key_day.key, res.ymd),
                        n_rows: res.rows,
                        quality: key_day.quality,
                        horizons,
                    });
                }
            }
        }
    });

    if merged.is_days + merged.oos_days == 0 {
        info!("no evaluable days");
        return Ok(());
    }

    print_tables(cfg, &merged);

    report_entries.sort_by(|a, b| a.label.cmp(&b.label));
    let report_path = cfg
        .base_dir
        .join("reports")
        .join(format!("study_{}.json", cfg.symbol));
    save_report(&report_path, &report_entries)
        .with_context(|| format!("save report {}", report_path.display()))?;
    info!(report = %report_path.display(), entries = report_entries.len(), "report saved");
    Ok(())
}

// =============================================================================
// DISCOVERY
// =============================================================================

fn discover_variants(feat_root: &Path) -> Vec<String> {
    let mut variants = Vec::new();
    if let Ok(entries) = std::fs::read_dir(feat_root) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        variants.push(name.to_string());
                    }
                }
            }
        }
    }
    variants.sort();
    variants
}

fn discover_days(variant_dir: &Path) -> Vec<u32> {
    let mut days = Vec::new();
    if let Ok(entries) = std::fs::read_dir(variant_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".bin") {
                if let Ok(ymd) = stem.parse::<u32>() {
                    days.push(ymd);
                }
            }
        }
    }
    days.sort_unstable();
    days
}

// =============================================================================
// PER-DAY EVALUATION
// =============================================================================

/// Worker-owned reusable buffers, grown with 25% slack.
#[derive(Default)]
struct Scratch {
    prices: Vec<f64>,
    times: Vec<i64>,
    sig: Vec<f64>,
    qsig: Vec<f64>,
    qret: Vec<f64>,
}

fn reserve<T>(v: &mut Vec<T>, n: usize) {
    v.clear();
    if v.capacity() < n {
        v.reserve_exact(n + n / 4);
    }
}

struct HorizonDay {
    moments: Moments,
    buckets: Vec<BucketAgg>,
    profile: HorizonProfile,
}

struct KeyDay {
    key: String,
    quality: SignalQuality,
    horizons: Vec<HorizonDay>,
}

struct DayResult {
    ymd: u32,
    rows: u64,
    keys: Vec<KeyDay>,
}

fn process_day(
    cfg: &Config,
    ymd: u32,
    variants: &[String],
    feat_root: &Path,
    scratch: &mut Scratch,
) -> Option<DayResult> {
    let (year, month, day) = (ymd / 10_000, ymd / 100 % 100, ymd % 100);
    let blob = match store::load_day(&cfg.base_dir, &cfg.symbol, year as i32, month, day) {
        Ok(Some(blob)) => blob,
        Ok(None) => return None,
        Err(e) => {
            warn!(ymd, error = %e, "raw day unreadable");
            return None;
        }
    };
    let n = blob.row_count as usize;
    if n == 0 {
        return None;
    }
    if n > cfg.max_rows {
        warn!(ymd, rows = n, ceiling = cfg.max_rows, "day exceeds row ceiling");
        return None;
    }

    reserve(&mut scratch.prices, n);
    reserve(&mut scratch.times, n);
    for row in codec::rows(&blob.body) {
        scratch.prices.push(row.price_f64());
        scratch.times.push(row.transact_time_ms as i64);
    }

    let mut keys = Vec::new();
    for variant in variants {
        let sig_path = feat_root.join(variant).join(format!("{ymd:08}.bin"));
        let bytes = match std::fs::read(&sig_path) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        if bytes.len() != n * FEATURE_ROW_SIZE {
            warn!(
                ymd,
                variant = %variant,
                got = bytes.len(),
                want = n * FEATURE_ROW_SIZE,
                "feature file size mismatch"
            );
            continue;
        }

        for (dim, dim_name) in DIM_NAMES.iter().enumerate() {
            reserve(&mut scratch.sig, n);
            for i in 0..n {
                let off = i * FEATURE_ROW_SIZE + dim * 4;
                let v = f32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
                scratch.sig.push(f64::from(v));
            }

            let mut horizons = Vec::with_capacity(cfg.horizons_ms.len());
            for &h_ms in &cfg.horizons_ms {
                reserve(&mut scratch.qsig, n);
                reserve(&mut scratch.qret, n);
                let mut acc = DayAccumulator::new();
                {
                    let qsig = &mut scratch.qsig;
                    let qret = &mut scratch.qret;
                    align_pairs(&scratch.sig, &scratch.prices, &scratch.times, h_ms, |s, r| {
                        acc.push(s, r);
                        qsig.push(s);
                        qret.push(r);
                    });
                }
                horizons.push(HorizonDay {
                    moments: acc.finish(),
                    buckets: day_buckets(
                        &scratch.qsig,
                        &scratch.qret,
                        cfg.num_buckets,
                        cfg.quantile_stride,
                    ),
                    profile: HorizonProfile::compute(&scratch.qsig, &scratch.qret),
                });
            }
            keys.push(KeyDay {
                key: format!("{variant}:{dim_name}"),
                quality: SignalQuality::compute(&scratch.sig),
                horizons,
            });
        }
    }

    if keys.is_empty() {
        None
    } else {
        Some(DayResult {
            ymd,
            rows: n as u64,
            keys,
        })
    }
}

// =============================================================================
// MERGE & TABLES
// =============================================================================

#[derive(Clone)]
struct ScopeAgg {
    moments: Moments,
    daily_ics: Vec<f64>,
    buckets: Vec<BucketAgg>,
}

impl ScopeAgg {
    fn new(num_buckets: usize) -> Self {
        Self {
            moments: Moments::default(),
            daily_ics: Vec::new(),
            buckets: vec![BucketAgg::default(); num_buckets],
        }
    }

    fn fold(&mut self, day: &HorizonDay) {
        self.moments.merge(&day.moments);
        self.daily_ics.push(day.moments.ic());
        for (agg, b) in self.buckets.iter_mut().zip(&day.buckets) {
            if b.count > 0 {
                agg.add(b);
            }
        }
    }
}

struct Aggregates {
    horizons: usize,
    num_buckets: usize,
    is_days: usize,
    oos_days: usize,
    /// key -> per-horizon (IS, OOS) aggregates.
    per_key: BTreeMap<String, Vec<(ScopeAgg, ScopeAgg)>>,
}

impl Aggregates {
    fn new(horizons: usize, num_buckets: usize) -> Self {
        Self {
            horizons,
            num_buckets,
            is_days: 0,
            oos_days: 0,
            per_key: BTreeMap::new(),
        }
    }

    fn fold(&mut self, key: &str, h_idx: usize, is_oos: bool, day: &HorizonDay) {
        let (horizons, num_buckets) = (self.horizons, self.num_buckets);
        let slots = self.per_key.entry(key.to_string()).or_insert_with(|| {
            (0..horizons)
                .map(|_| (ScopeAgg::new(num_buckets), ScopeAgg::new(num_buckets)))
                .collect()
        });
        let slot = &mut slots[h_idx];
        if is_oos {
            slot.1.fold(day);
        } else {
            slot.0.fold(day);
        }
    }
}

fn print_tables(cfg: &Config, agg: &Aggregates) {
    for (h_idx, h_ms) in cfg.horizons_ms.iter().enumerate() {
        println!(
            "\n== Horizon {}s [IS days: {} | OOS days: {}] ==",
            h_ms / 1000,
            agg.is_days,
            agg.oos_days
        );
        println!(
            "{:<32} {:>8} {:>7} {:>8} {:>7} {:>8} {:>9} {:>7}",
            "FEATURE", "IS_IC", "IS_T", "OOS_IC", "OOS_T", "AC(L1)", "BPS/TRN", "HIT"
        );
        for (key, slots) in &agg.per_key {
            let (is, oos) = &slots[h_idx];
            let is_m: HorizonMetrics = finalize(&is.moments, &is.daily_ics);
            let oos_m: HorizonMetrics = finalize(&oos.moments, &oos.daily_ics);
            println!(
                "{:<32} {:>8.4} {:>7.2} {:>8.4} {:>7.2} {:>8.3} {:>9.2} {:>6.1}%",
                key,
                is_m.ic,
                is_m.t_stat,
                oos_m.ic,
                oos_m.t_stat,
                is_m.auto_corr_lag1,
                is_m.break_even_bps,
                is_m.hit_rate * 100.0
            );
        }

        println!("\n-- Monotonicity (IS) horizon {}s, mean ret bps --", h_ms / 1000);
        print!("{:<32}", "FEATURE");
        for b in 0..cfg.num_buckets {
            let tag = if b == 0 {
                "B1(sell)".to_string()
            } else if b == cfg.num_buckets - 1 {
                format!("B{}(buy)", cfg.num_buckets)
            } else {
                format!("B{}", b + 1)
            };
            print!(" {tag:>10}");
        }
        println!();
        for (key, slots) in &agg.per_key {
            let (is, _) = &slots[h_idx];
            print!("{key:<32}");
            for bucket in &is.buckets {
                print!(" {:>10.2}", bucket.avg_ret_bps());
            }
            println!();
        }
    }
}
