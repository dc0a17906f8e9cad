//! `sum` - rank variants from a previously saved study report.
//!
//! Reads the persisted JSON, aggregates per feature at one target horizon,
//! and prints a strict IS vs OOS comparison sorted by out-of-sample HAC
//! Sharpe. Cheap enough to rerun while iterating on parameters.

use crate::config::Config;
use anyhow::{Context, Result};
use quantdev_eval::ReportEntry;
use std::collections::BTreeMap;

#[derive(Default)]
struct Side {
    days: usize,
    start: String,
    end: String,
    sum_ic: f64,
    sum_hac: f64,
    sum_be: f64,
    sum_hit: f64,
}

impl Side {
    fn fold(&mut self, entry: &ReportEntry, date: &str, horizon_key: &str) {
        let Some(h) = entry.horizons.get(horizon_key) else {
            return;
        };
        self.days += 1;
        if self.start.is_empty() || date < self.start.as_str() {
            self.start = date.to_string();
        }
        if self.end.is_empty() || date > self.end.as_str() {
            self.end = date.to_string();
        }
        self.sum_ic += h.metrics.ic;
        self.sum_hac += h.profile.hac_sharpe;
        self.sum_be += h.metrics.break_even_bps;
        self.sum_hit += h.metrics.hit_rate;
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.days == 0 {
            0.0
        } else {
            sum / self.days as f64
        }
    }

    fn period(&self) -> String {
        match (self.start.is_empty(), self.end.is_empty()) {
            (true, true) => String::new(),
            _ => format!("{}..{}", self.start, self.end),
        }
    }
}

pub fn run(cfg: &Config, horizon_ms: i64) -> Result<()> {
    let boundary = &cfg.oos_boundary_date;
    cfg.oos_boundary_ymd()?;

    let path = cfg
        .base_dir
        .join("reports")
        .join(format!("study_{}.json", cfg.symbol));
    let entries = quantdev_eval::load_report(&path)
        .with_context(|| format!("load report {}", path.display()))?;
    if entries.is_empty() {
        println!("Report is empty: {}", path.display());
        return Ok(());
    }

    let horizon_key = horizon_ms.to_string();
    let mut per_feature: BTreeMap<String, (Side, Side)> = BTreeMap::new();

    for entry in &entries {
        let Some((_, feature, date)) = ReportEntry::split_label(&entry.label) else {
            continue;
        };
        let slot = per_feature.entry(feature.to_string()).or_default();
        // ISO dates compare correctly as strings.
        if date < boundary.as_str() {
            slot.0.fold(entry, date, &horizon_key);
        } else {
            slot.1.fold(entry, date, &horizon_key);
        }
    }

    let mut rows: Vec<(&String, &(Side, Side))> = per_feature
        .iter()
        .filter(|(_, (_, oos))| oos.days > 0)
        .collect();
    if rows.is_empty() {
        println!("No out-of-sample days at horizon {horizon_ms}ms.");
        return Ok(());
    }
    rows.sort_by(|(_, (_, oos_a)), (_, (_, oos_b))| {
        let ha = oos_a.mean(oos_a.sum_hac);
        let hb = oos_b.mean(oos_b.sum_hac);
        hb.partial_cmp(&ha).unwrap_or(std::cmp::Ordering::Equal)
    });

    println!(
        "\n== Variant summary | {} | horizon {}s | OOS boundary {} ==",
        cfg.symbol,
        horizon_ms / 1000,
        boundary
    );
    println!(
        "{:<32} {:>7} {:>8} {:>8} {:>8} {:>7} {:>8} {:>8} {:>8} {:>7} {:>23}",
        "FEATURE",
        "IS_DAYS",
        "OOS_DAYS",
        "IS_HAC",
        "OOS_HAC",
        "OOS/IS",
        "IS_IC",
        "OOS_IC",
        "OOS_BE",
        "OOS_HIT",
        "OOS_PERIOD"
    );
    for (feature, (is, oos)) in rows {
        let is_hac = is.mean(is.sum_hac);
        let oos_hac = oos.mean(oos.sum_hac);
        let ratio = if is_hac != 0.0 { oos_hac / is_hac } else { 0.0 };
        println!(
            "{:<32} {:>7} {:>8} {:>8.2} {:>8.2} {:>7.2} {:>8.4} {:>8.4} {:>8.2} {:>6.1}% {:>23}",
            feature,
            is.days,
            oos.days,
            is_hac,
            oos_hac,
            ratio,
            is.mean(is.sum_ic),
            oos.mean(oos.sum_ic),
            oos.mean(oos.sum_be),
            oos.mean(oos.sum_hit) * 100.0,
            oos.period()
        );
    }
    println!();
    Ok(())
}
