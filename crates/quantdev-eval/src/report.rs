//! Persisted evaluation report.
//!
//! One record per (label, day), where the label is
//! `"<SYMBOL>|<VARIANT_ID>|<YYYY-MM-DD>"`, carrying the signal's
//! distributional quality plus one entry per horizon. The report layer is
//! the only place metrics meet serialization; the numeric core never
//! formats.

use crate::metrics::HorizonMetrics;
use crate::profile::HorizonProfile;
use crate::quality::SignalQuality;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HorizonReport {
    pub metrics: HorizonMetrics,
    pub profile: HorizonProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    /// `"SYMBOL|VARIANT|YYYY-MM-DD"`.
    pub label: String,
    /// Tick rows evaluated for this day.
    pub n_rows: u64,
    pub quality: SignalQuality,
    /// Keyed by horizon in milliseconds (stringly, for JSON maps).
    pub horizons: BTreeMap<String, HorizonReport>,
}

impl ReportEntry {
    pub fn label_for(symbol: &str, variant: &str, ymd: u32) -> String {
        format!(
            "{symbol}|{variant}|{:04}-{:02}-{:02}",
            ymd / 10_000,
            ymd / 100 % 100,
            ymd % 100
        )
    }

    /// Split a label back into (symbol, variant, date).
    pub fn split_label(label: &str) -> Option<(&str, &str, &str)> {
        let mut parts = label.splitn(3, '|');
        Some((parts.next()?, parts.next()?, parts.next()?))
    }
}

/// Write the report as pretty JSON, creating parent directories.
pub fn save_report(path: &Path, entries: &[ReportEntry]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(entries)?;
    fs::write(path, json)
}

/// Read a previously saved report.
pub fn load_report(path: &Path) -> std::io::Result<Vec<ReportEntry>> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_roundtrip() {
        let label = ReportEntry::label_for("ETHUSDT", "adaptive_base:k1_trend", 20240107);
        assert_eq!(label, "ETHUSDT|adaptive_base:k1_trend|2024-01-07");
        let (sym, variant, date) = ReportEntry::split_label(&label).unwrap();
        assert_eq!(sym, "ETHUSDT");
        assert_eq!(variant, "adaptive_base:k1_trend");
        assert_eq!(date, "2024-01-07");
    }

    #[test]
    fn report_roundtrips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("study_ETHUSDT.json");

        let mut horizons = BTreeMap::new();
        horizons.insert(
            "30000".to_string(),
            HorizonReport {
                metrics: HorizonMetrics {
                    ic: 0.021,
                    pairs: 12_345,
                    ..Default::default()
                },
                profile: HorizonProfile {
                    beta: 0.0004,
                    ..Default::default()
                },
            },
        );
        let entries = vec![ReportEntry {
            label: ReportEntry::label_for("ETHUSDT", "adaptive_fast:k2_burst", 20231231),
            n_rows: 98_765,
            quality: SignalQuality {
                std_dev: 0.2,
                ..Default::default()
            },
            horizons,
        }];
        save_report(&path, &entries).unwrap();

        let back = load_report(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].label, "ETHUSDT|adaptive_fast:k2_burst|2023-12-31");
        assert_eq!(back[0].horizons["30000"].metrics.ic, 0.021);
        assert_eq!(back[0].horizons["30000"].profile.beta, 0.0004);
        assert_eq!(back[0].quality.std_dev, 0.2);
    }
}
