//! `data` - ingest daily aggTrades CSVs into the store.
//!
//! Reads `<base>/incoming/<SYMBOL>/<SYMBOL>-aggTrades-YYYY-MM-DD.csv`
//! (columns: agg_trade_id, price, qty, first_trade_id, last_trade_id,
//! transact_time, is_buyer_maker), converts to AGG3 with 1e8 fixed-point
//! scaling, and appends each day to the month archive. Days already in the
//! index are skipped, so ingestion is resumable. Downloading the files is
//! someone else's job.

use crate::config::Config;
use anyhow::{Context, Result};
use quantdev_codec::{build_blob, TickRow};
use quantdev_store as store;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

pub fn run(cfg: &Config, stop: &AtomicBool) -> Result<()> {
    let incoming = cfg.base_dir.join("incoming").join(&cfg.symbol);
    let files = discover_csvs(&incoming, &cfg.symbol);
    if files.is_empty() {
        info!(dir = %incoming.display(), "no incoming CSV files");
        return Ok(());
    }
    info!(
        files = files.len(),
        workers = cfg.workers(),
        "ingesting aggTrades CSVs"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.workers())
        .build()
        .context("build ingest pool")?;

    let outcomes: Mutex<BTreeMap<&'static str, usize>> = Mutex::new(BTreeMap::new());
    pool.install(|| {
        files.par_iter().for_each(|job| {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            let outcome = ingest_file(cfg, job);
            *outcomes.lock().unwrap().entry(outcome).or_insert(0) += 1;
        });
    });

    info!(summary = ?outcomes.into_inner().unwrap(), "ingest complete");
    Ok(())
}

#[derive(Debug, Clone)]
struct CsvJob {
    path: PathBuf,
    year: i32,
    month: u32,
    day: u32,
}

/// Match `<SYMBOL>-aggTrades-YYYY-MM-DD.csv` and pull the date out of the
/// file name.
fn discover_csvs(dir: &Path, symbol: &str) -> Vec<CsvJob> {
    let prefix = format!("{symbol}-aggTrades-");
    let mut jobs = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return jobs;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_part) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".csv"))
        else {
            continue;
        };
        let mut parts = date_part.splitn(3, '-');
        let (Some(y), Some(m), Some(d)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(year), Ok(month), Ok(day)) = (y.parse(), m.parse(), d.parse()) else {
            continue;
        };
        jobs.push(CsvJob {
            path,
            year,
            month,
            day,
        });
    }
    jobs.sort_by_key(|j| (j.year, j.month, j.day));
    jobs
}

fn ingest_file(cfg: &Config, job: &CsvJob) -> &'static str {
    // Cheap pre-check before parsing megabytes of CSV; append_day re-checks
    // under the month lock.
    if let Ok(days) = store::list_days(&cfg.base_dir, &cfg.symbol, job.year, job.month) {
        if days.contains(&(job.day as u16)) {
            return "skip";
        }
    }

    let rows = match parse_csv(&job.path) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(file = %job.path.display(), error = %e, "CSV parse failed");
            return "error_parse";
        }
    };
    if rows.is_empty() {
        return "empty";
    }

    let blob = build_blob(job.day as u8, &rows);
    match store::append_day(
        &cfg.base_dir,
        &cfg.symbol,
        job.year,
        job.month,
        job.day,
        &blob,
    ) {
        Ok(store::AppendOutcome::Appended) => "ok",
        Ok(store::AppendOutcome::AlreadyIndexed) => "skip_race",
        Err(e) => {
            warn!(file = %job.path.display(), error = %e, "append failed");
            "error_io"
        }
    }
}

fn parse_csv(path: &Path) -> Result<Vec<TickRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("line {}", line + 1))?;
        if record.len() < 7 {
            continue;
        }
        // Vendor files sometimes carry a header line; detect it by a
        // non-numeric id column instead of assuming.
        let Some(agg_trade_id) = parse_uint(&record[0]) else {
            if line == 0 {
                continue;
            }
            anyhow::bail!("non-numeric id at line {}", line + 1);
        };
        let first_trade_id = parse_uint(&record[3]).context("first_trade_id")?;
        let last_trade_id = parse_uint(&record[4]).context("last_trade_id")?;
        let transact_time_ms = parse_uint(&record[5]).context("transact_time")?;
        let maker = record[6].first().is_some_and(|c| *c == b't' || *c == b'T');

        rows.push(TickRow {
            agg_trade_id,
            price_fixed: parse_fixed(&record[1]).context("price")?,
            qty_fixed: parse_fixed(&record[2]).context("qty")?,
            first_trade_id,
            trade_count: (last_trade_id - first_trade_id + 1) as u32,
            flags: maker as u16,
            transact_time_ms,
        });
    }
    Ok(rows)
}

fn parse_uint(field: &[u8]) -> Option<u64> {
    if field.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &c in field {
        if !c.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(u64::from(c - b'0'))?;
    }
    Some(n)
}

/// Decimal string to 1e8 fixed point without a float detour:
/// `"123.45"` -> `12_345_000_000`.
fn parse_fixed(field: &[u8]) -> Option<u64> {
    const TARGET: u32 = 8;
    let mut n: u64 = 0;
    let mut seen_dot = false;
    let mut decimals: u32 = 0;
    for &c in field {
        if c == b'.' {
            if seen_dot {
                return None;
            }
            seen_dot = true;
            continue;
        }
        if !c.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(u64::from(c - b'0'))?;
        if seen_dot {
            decimals += 1;
        }
    }
    if field.is_empty() || (seen_dot && decimals == 0) {
        return None;
    }
    if decimals < TARGET {
        n = n.checked_mul(10u64.pow(TARGET - decimals))?;
    } else {
        n /= 10u64.pow(decimals - TARGET);
    }
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_parsing() {
        assert_eq!(parse_fixed(b"1"), Some(100_000_000));
        assert_eq!(parse_fixed(b"123.45"), Some(12_345_000_000));
        assert_eq!(parse_fixed(b"0.00000001"), Some(1));
        assert_eq!(parse_fixed(b"2500.123456789"), Some(250_012_345_678));
        assert_eq!(parse_fixed(b"abc"), None);
        assert_eq!(parse_fixed(b""), None);
    }

    #[test]
    fn csv_roundtrip_into_store() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_path_buf();
        let incoming = base.join("incoming").join("ETHUSDT");
        std::fs::create_dir_all(&incoming).unwrap();

        let csv_body = "\
agg_trade_id,price,qty,first_trade_id,last_trade_id,transact_time,is_buyer_maker
100,2500.50,0.25,500,502,1700000000000,false
101,2500.75,1.5,503,503,1700000000120,true
102,2500.25,0.1,504,505,1700000000300,false
";
        std::fs::write(
            incoming.join("ETHUSDT-aggTrades-2023-11-15.csv"),
            csv_body,
        )
        .unwrap();

        let cfg = Config {
            base_dir: base.clone(),
            worker_threads: 1,
            ..Config::default()
        };
        let stop = AtomicBool::new(false);
        run(&cfg, &stop).unwrap();

        let day = store::load_day(&base, "ETHUSDT", 2023, 11, 15)
            .unwrap()
            .expect("day ingested");
        assert_eq!(day.row_count, 3);

        let rows: Vec<TickRow> = quantdev_codec::rows(&day.body).collect();
        assert_eq!(rows[0].price_fixed, 250_050_000_000);
        assert_eq!(rows[0].trade_count, 3);
        assert_eq!(rows[0].flags, 0);
        assert_eq!(rows[1].flags, 1);
        assert_eq!(rows[2].transact_time_ms, 1_700_000_000_300);

        // Re-running skips the already-indexed day.
        run(&cfg, &stop).unwrap();
        assert_eq!(
            store::list_days(&base, "ETHUSDT", 2023, 11).unwrap(),
            vec![15]
        );
    }
}
