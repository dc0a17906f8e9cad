//! # quantdev store
//!
//! Per-(symbol, year, month) append-only archive of tick days.
//!
//! ## Layout
//! ```text
//! <base>/<SYMBOL>/<YYYY>/<MM>/
//!   data.quantdev     # concatenated zlib-compressed AGG3 blobs
//!   index.quantdev    # QIDX header + one 26-byte row per stored day
//! ```
//!
//! Blobs are never rewritten. Appends are serialized per month directory via
//! an interned lock; reads of other months proceed concurrently. A day is
//! located by a linear scan of the index rows (at most 31 entries).

use quantdev_codec::{
    self as codec, AggHeader, CodecError, IdxHeader, IdxRow, IDX_HEADER_SIZE, IDX_ROW_SIZE,
    IDX_VERSION,
};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::warn;

/// Name of the month-level data file.
pub const DATA_FILE: &str = "data.quantdev";
/// Name of the month-level index file.
pub const INDEX_FILE: &str = "index.quantdev";

/// Store failure kinds. `MissingDay` is quiet; the rest are logged by
/// callers and the affected day is skipped.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("day not present in index")]
    MissingDay,
    #[error("corrupt blob: {0}")]
    Corrupt(#[from] CodecError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Append result for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Another writer indexed the day first; nothing was written.
    AlreadyIndexed,
}

/// A decompressed, header-validated day of ticks.
#[derive(Debug)]
pub struct DayBlob {
    /// Row bytes only, AGG3 header stripped.
    pub body: Vec<u8>,
    pub row_count: u64,
    pub min_ts: i64,
    pub max_ts: i64,
}

/// One buildable day discovered from an index, with the blob location
/// cached so workers can seek directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTask {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub offset: u64,
    pub length: u64,
    pub checksum: u64,
}

impl DayTask {
    pub fn ymd(&self) -> u32 {
        self.year as u32 * 10_000 + self.month * 100 + self.day
    }
}

/// Month directory for a symbol: `<base>/<SYMBOL>/<YYYY>/<MM>`.
pub fn month_dir(base: &Path, symbol: &str, year: i32, month: u32) -> PathBuf {
    base.join(symbol)
        .join(format!("{year:04}"))
        .join(format!("{month:02}"))
}

// Interned per-directory append locks. Appends to the same month must not
// interleave; different months are independent.
fn dir_lock(dir: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = locks.lock().expect("dir lock registry poisoned");
    map.entry(dir.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

// =============================================================================
// READ PATH
// =============================================================================

/// Read and validate a month index, returning its rows.
fn read_index(idx_path: &Path) -> Result<Vec<IdxRow>, StoreError> {
    let mut f = File::open(idx_path)?;
    let mut hdr = [0u8; IDX_HEADER_SIZE];
    f.read_exact(&mut hdr)?;
    let header = IdxHeader::decode(&hdr)?;

    let mut rows = Vec::with_capacity(header.count as usize);
    let mut buf = [0u8; IDX_ROW_SIZE];
    for _ in 0..header.count {
        f.read_exact(&mut buf)?;
        rows.push(IdxRow::decode(&buf)?);
    }
    Ok(rows)
}

/// Sorted list of days present in a month. Rejects the file on bad magic.
pub fn list_days(base: &Path, symbol: &str, year: i32, month: u32) -> Result<Vec<u16>, StoreError> {
    let idx_path = month_dir(base, symbol, year, month).join(INDEX_FILE);
    let mut days: Vec<u16> = read_index(&idx_path)?.iter().map(|r| r.day).collect();
    days.sort_unstable();
    Ok(days)
}

/// Whether `day` is already present in the month index. Missing or
/// malformed index files read as "not indexed".
fn is_indexed(idx_path: &Path, day: u32) -> bool {
    match read_index(idx_path) {
        Ok(rows) => rows.iter().any(|r| u32::from(r.day) == day),
        Err(_) => false,
    }
}

/// Read `length` bytes at `offset` from the month data file.
pub fn read_compressed(
    base: &Path,
    symbol: &str,
    year: i32,
    month: u32,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>, StoreError> {
    let data_path = month_dir(base, symbol, year, month).join(DATA_FILE);
    let mut f = File::open(&data_path)?;
    f.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length as usize];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

fn decode_day_blob(compressed: &[u8]) -> Result<DayBlob, StoreError> {
    let blob = codec::decompress_blob(compressed)?;
    let header = AggHeader::decode(&blob)?;
    let expected = codec::HEADER_SIZE + header.row_count as usize * codec::ROW_SIZE;
    if blob.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: blob.len(),
        }
        .into());
    }
    let mut body = blob;
    body.drain(0..codec::HEADER_SIZE);
    Ok(DayBlob {
        body,
        row_count: header.row_count,
        min_ts: header.min_ts,
        max_ts: header.max_ts,
    })
}

/// Locate and decompress one day. `Ok(None)` when the day is simply absent.
pub fn load_day(
    base: &Path,
    symbol: &str,
    year: i32,
    month: u32,
    day: u32,
) -> Result<Option<DayBlob>, StoreError> {
    let dir = month_dir(base, symbol, year, month);
    let rows = match read_index(&dir.join(INDEX_FILE)) {
        Ok(rows) => rows,
        Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let Some(row) = rows.iter().find(|r| u32::from(r.day) == day) else {
        return Ok(None);
    };
    let compressed = read_compressed(base, symbol, year, month, row.offset, row.length)?;
    Ok(Some(decode_day_blob(&compressed)?))
}

/// Load a day from a discovered task (offset/length already known).
pub fn load_task(base: &Path, symbol: &str, task: &DayTask) -> Result<DayBlob, StoreError> {
    let compressed = read_compressed(
        base,
        symbol,
        task.year,
        task.month,
        task.offset,
        task.length,
    )?;
    decode_day_blob(&compressed)
}

// =============================================================================
// APPEND PATH
// =============================================================================

/// Append one day's raw (uncompressed) AGG3 blob to the month archive.
///
/// Under the month lock: re-checks the index, compresses at the fast zlib
/// tier, appends to the data file and flushes, initializes the index header
/// when the file is new, appends the 26-byte row, and rewrites the count
/// field in place.
pub fn append_day(
    base: &Path,
    symbol: &str,
    year: i32,
    month: u32,
    day: u32,
    raw_blob: &[u8],
) -> Result<AppendOutcome, StoreError> {
    let dir = month_dir(base, symbol, year, month);
    let idx_path = dir.join(INDEX_FILE);
    let data_path = dir.join(DATA_FILE);

    // Compression and checksum are CPU-bound; do them outside the lock.
    let checksum = codec::truncated_sha256(raw_blob);
    let compressed = codec::compress_blob(raw_blob)?;

    let lock = dir_lock(&dir);
    let _guard = lock.lock().expect("month lock poisoned");

    // Another worker may have finished this day while we compressed.
    if is_indexed(&idx_path, day) {
        return Ok(AppendOutcome::AlreadyIndexed);
    }

    fs::create_dir_all(&dir)?;

    // Data file: append and flush before the index references the bytes.
    let offset;
    {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&data_path)?;
        offset = f.seek(SeekFrom::End(0))?;
        f.write_all(&compressed)?;
        f.sync_all()?;
    }

    // Index file: header on first touch, then row append + count rewrite.
    let mut f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&idx_path)?;
    let size = f.metadata()?.len();
    if size == 0 {
        f.write_all(
            &IdxHeader {
                version: IDX_VERSION,
                count: 0,
            }
            .encode(),
        )?;
    }

    let row = IdxRow {
        day: day as u16,
        offset,
        length: compressed.len() as u64,
        checksum,
    };
    f.seek(SeekFrom::End(0))?;
    f.write_all(&row.encode())?;

    f.seek(SeekFrom::Start(8))?;
    let mut count_buf = [0u8; 8];
    f.read_exact(&mut count_buf)?;
    let count = u64::from_le_bytes(count_buf);
    f.seek(SeekFrom::Start(8))?;
    f.write_all(&(count + 1).to_le_bytes())?;
    f.sync_all()?;

    Ok(AppendOutcome::Appended)
}

// =============================================================================
// DISCOVERY
// =============================================================================

/// Walk `<base>/<SYMBOL>/<YYYY>/<MM>` and emit every indexed day, sorted
/// chronologically. Unreadable months are logged and skipped.
pub fn discover_days(base: &Path, symbol: &str) -> Vec<DayTask> {
    let mut tasks = Vec::new();
    let root = base.join(symbol);
    let Ok(years) = fs::read_dir(&root) else {
        return tasks;
    };

    for year_entry in years.flatten() {
        if !year_entry.path().is_dir() {
            continue;
        }
        let Some(year) = parse_dir_num::<i32>(&year_entry.path()) else {
            continue;
        };
        let Ok(months) = fs::read_dir(year_entry.path()) else {
            continue;
        };
        for month_entry in months.flatten() {
            if !month_entry.path().is_dir() {
                continue;
            }
            let Some(month) = parse_dir_num::<u32>(&month_entry.path()) else {
                continue;
            };
            let idx_path = month_entry.path().join(INDEX_FILE);
            let rows = match read_index(&idx_path) {
                Ok(rows) => rows,
                Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(month = %idx_path.display(), error = %e, "skipping unreadable index");
                    continue;
                }
            };
            for row in rows {
                let day = u32::from(row.day);
                if (1..=31).contains(&day) && row.length > 0 {
                    tasks.push(DayTask {
                        year,
                        month,
                        day,
                        offset: row.offset,
                        length: row.length,
                        checksum: row.checksum,
                    });
                }
            }
        }
    }

    tasks.sort_by_key(|t| t.ymd());
    tasks
}

/// List (year, month) pairs that carry an index file.
pub fn discover_months(base: &Path, symbol: &str) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let root = base.join(symbol);
    let Ok(years) = fs::read_dir(&root) else {
        return months;
    };
    for year_entry in years.flatten() {
        let Some(year) = parse_dir_num::<i32>(&year_entry.path()) else {
            continue;
        };
        let Ok(entries) = fs::read_dir(year_entry.path()) else {
            continue;
        };
        for month_entry in entries.flatten() {
            let Some(month) = parse_dir_num::<u32>(&month_entry.path()) else {
                continue;
            };
            if month_entry.path().join(INDEX_FILE).is_file() {
                months.push((year, month));
            }
        }
    }
    months.sort_unstable();
    months
}

fn parse_dir_num<T: std::str::FromStr>(path: &Path) -> Option<T> {
    path.file_name()?.to_str()?.parse().ok()
}
