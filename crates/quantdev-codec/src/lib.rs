//! # quantdev codec
//!
//! Byte-level codec for the two on-disk formats of the tick store:
//!
//! - **AGG3** - one decompressed day blob: a 48-byte header followed by
//!   `row_count` fixed-width 48-byte aggregate-trade rows.
//! - **QIDX** - the per-month index: a 16-byte header followed by 26-byte
//!   rows `(day, offset, length, checksum)`.
//!
//! Blobs are zlib-compressed individually and concatenated into one
//! month-level data file; the checksum is the first 8 bytes of the SHA-256
//! of the *decompressed* blob, read as a little-endian u64.
//!
//! Everything here is stateless and little-endian.

use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// Magic bytes identifying a day blob.
pub const AGG_MAGIC: &[u8; 4] = b"AGG3";
/// Magic bytes identifying a month index file.
pub const IDX_MAGIC: &[u8; 4] = b"QIDX";
/// Current index format version.
pub const IDX_VERSION: u32 = 1;

/// AGG3 header size in bytes.
pub const HEADER_SIZE: usize = 48;
/// AGG3 row size in bytes.
pub const ROW_SIZE: usize = 48;
/// QIDX header size in bytes.
pub const IDX_HEADER_SIZE: usize = 16;
/// QIDX row size in bytes.
pub const IDX_ROW_SIZE: usize = 26;

/// Fixed-point scale for prices (1.0 == 100_000_000).
pub const PX_SCALE: f64 = 100_000_000.0;
/// Fixed-point scale for quantities.
pub const QT_SCALE: f64 = 100_000_000.0;

/// Bytes per feature row: five little-endian f32 values.
pub const FEATURE_ROW_SIZE: usize = 20;
/// Feature dimensions per tick.
pub const FEATURE_DIMS: usize = 5;

/// Codec failure kinds. All are fatal for the affected day and recoverable
/// for the run.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad magic bytes")]
    BadMagic,
    #[error("truncated header: {got} bytes, need {need}")]
    TruncatedHeader { got: usize, need: usize },
    #[error("size mismatch: blob is {actual} bytes, header implies {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("checksum mismatch: stored {expected:#018x}, computed {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },
    #[error("zlib: {0}")]
    Deflate(#[from] std::io::Error),
}

// =============================================================================
// AGG3 HEADER
// =============================================================================

/// Decoded AGG3 day-blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggHeader {
    pub version: u8,
    pub day: u8,
    /// Compression-level descriptor, informational only.
    pub zlevel: u16,
    pub row_count: u64,
    pub min_ts: i64,
    pub max_ts: i64,
}

impl AggHeader {
    /// Encode into the fixed 48-byte layout. Bytes 32..48 are reserved zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(AGG_MAGIC);
        buf[4] = self.version;
        buf[5] = self.day;
        buf[6..8].copy_from_slice(&self.zlevel.to_le_bytes());
        buf[8..16].copy_from_slice(&self.row_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.min_ts.to_le_bytes());
        buf[24..32].copy_from_slice(&self.max_ts.to_le_bytes());
        buf
    }

    /// Decode from the front of a decompressed blob.
    pub fn decode(blob: &[u8]) -> Result<Self, CodecError> {
        if blob.len() < HEADER_SIZE {
            return Err(CodecError::TruncatedHeader {
                got: blob.len(),
                need: HEADER_SIZE,
            });
        }
        if &blob[0..4] != AGG_MAGIC {
            return Err(CodecError::BadMagic);
        }
        Ok(Self {
            version: blob[4],
            day: blob[5],
            zlevel: u16::from_le_bytes([blob[6], blob[7]]),
            row_count: u64::from_le_bytes(blob[8..16].try_into().unwrap()),
            min_ts: i64::from_le_bytes(blob[16..24].try_into().unwrap()),
            max_ts: i64::from_le_bytes(blob[24..32].try_into().unwrap()),
        })
    }
}

// =============================================================================
// AGG3 ROWS
// =============================================================================

/// One decoded aggregate-trade row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRow {
    pub agg_trade_id: u64,
    /// Price, fixed-point 1e8.
    pub price_fixed: u64,
    /// Quantity, fixed-point 1e8.
    pub qty_fixed: u64,
    pub first_trade_id: u64,
    /// last_trade_id - first_trade_id + 1.
    pub trade_count: u32,
    /// Bit 0: is_buyer_maker (1 => taker was the seller).
    pub flags: u16,
    pub transact_time_ms: u64,
}

impl TickRow {
    /// Decode one 48-byte row.
    pub fn decode(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= ROW_SIZE);
        Self {
            agg_trade_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            price_fixed: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            qty_fixed: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            first_trade_id: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            trade_count: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            flags: u16::from_le_bytes(buf[36..38].try_into().unwrap()),
            transact_time_ms: u64::from_le_bytes(buf[38..46].try_into().unwrap()),
        }
    }

    /// Encode into a 48-byte slot. Bytes 46..48 stay zero.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= ROW_SIZE);
        buf[0..8].copy_from_slice(&self.agg_trade_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.price_fixed.to_le_bytes());
        buf[16..24].copy_from_slice(&self.qty_fixed.to_le_bytes());
        buf[24..32].copy_from_slice(&self.first_trade_id.to_le_bytes());
        buf[32..36].copy_from_slice(&self.trade_count.to_le_bytes());
        buf[36..38].copy_from_slice(&self.flags.to_le_bytes());
        buf[38..46].copy_from_slice(&self.transact_time_ms.to_le_bytes());
        buf[46] = 0;
        buf[47] = 0;
    }

    pub fn price_f64(&self) -> f64 {
        self.price_fixed as f64 / PX_SCALE
    }

    pub fn qty_f64(&self) -> f64 {
        self.qty_fixed as f64 / QT_SCALE
    }

    /// Taker side: +1.0 when the taker bought, -1.0 when the taker sold.
    pub fn side(&self) -> f64 {
        if self.flags & 1 == 0 { 1.0 } else { -1.0 }
    }
}

/// Iterate the fixed-stride rows of a decompressed blob body (header
/// already stripped). Trailing partial bytes are ignored.
pub fn rows(body: &[u8]) -> impl Iterator<Item = TickRow> + '_ {
    body.chunks_exact(ROW_SIZE).map(TickRow::decode)
}

// =============================================================================
// QIDX
// =============================================================================

/// Decoded QIDX file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdxHeader {
    pub version: u32,
    pub count: u64,
}

impl IdxHeader {
    pub fn encode(&self) -> [u8; IDX_HEADER_SIZE] {
        let mut buf = [0u8; IDX_HEADER_SIZE];
        buf[0..4].copy_from_slice(IDX_MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < IDX_HEADER_SIZE {
            return Err(CodecError::TruncatedHeader {
                got: buf.len(),
                need: IDX_HEADER_SIZE,
            });
        }
        if &buf[0..4] != IDX_MAGIC {
            return Err(CodecError::BadMagic);
        }
        Ok(Self {
            version: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            count: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        })
    }
}

/// One 26-byte index row addressing a compressed day blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdxRow {
    pub day: u16,
    /// Byte offset of the compressed blob in the month data file.
    pub offset: u64,
    /// Compressed length in bytes.
    pub length: u64,
    /// First 8 bytes of SHA-256 of the decompressed blob, LE.
    pub checksum: u64,
}

impl IdxRow {
    pub fn encode(&self) -> [u8; IDX_ROW_SIZE] {
        let mut buf = [0u8; IDX_ROW_SIZE];
        buf[0..2].copy_from_slice(&self.day.to_le_bytes());
        buf[2..10].copy_from_slice(&self.offset.to_le_bytes());
        buf[10..18].copy_from_slice(&self.length.to_le_bytes());
        buf[18..26].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < IDX_ROW_SIZE {
            return Err(CodecError::TruncatedHeader {
                got: buf.len(),
                need: IDX_ROW_SIZE,
            });
        }
        Ok(Self {
            day: u16::from_le_bytes([buf[0], buf[1]]),
            offset: u64::from_le_bytes(buf[2..10].try_into().unwrap()),
            length: u64::from_le_bytes(buf[10..18].try_into().unwrap()),
            checksum: u64::from_le_bytes(buf[18..26].try_into().unwrap()),
        })
    }
}

// =============================================================================
// COMPRESSION & CHECKSUM
// =============================================================================

/// zlib-compress a blob at the fast tier (numeric payloads compress well
/// even at level 1, and append throughput dominates).
pub fn compress_blob(blob: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut enc =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    enc.write_all(blob)?;
    Ok(enc.finish()?)
}

/// zlib-decompress a stored blob.
pub fn decompress_blob(compressed: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut dec = flate2::read::ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    dec.read_to_end(&mut out)?;
    Ok(out)
}

/// First 8 bytes of SHA-256(data), read little-endian.
pub fn truncated_sha256(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    u64::from_le_bytes(digest[0..8].try_into().unwrap())
}

/// Full verification of one compressed day blob against its index checksum:
/// decompress, checksum, magic, size identity `len == 48 + row_count * 48`.
pub fn verify_day(compressed: &[u8], expected_checksum: u64) -> Result<AggHeader, CodecError> {
    let blob = decompress_blob(compressed)?;
    let actual = truncated_sha256(&blob);
    if actual != expected_checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: expected_checksum,
            actual,
        });
    }
    let header = AggHeader::decode(&blob)?;
    let expected_len = HEADER_SIZE + header.row_count as usize * ROW_SIZE;
    if blob.len() != expected_len {
        return Err(CodecError::SizeMismatch {
            expected: expected_len,
            actual: blob.len(),
        });
    }
    Ok(header)
}

/// Assemble a full AGG3 blob (header + rows) from decoded rows.
pub fn build_blob(day: u8, rows: &[TickRow]) -> Vec<u8> {
    let mut min_ts = i64::MAX;
    let mut max_ts = i64::MIN;
    for r in rows {
        let ts = r.transact_time_ms as i64;
        min_ts = min_ts.min(ts);
        max_ts = max_ts.max(ts);
    }
    if rows.is_empty() {
        min_ts = 0;
        max_ts = 0;
    }
    let header = AggHeader {
        version: 1,
        day,
        zlevel: 1,
        row_count: rows.len() as u64,
        min_ts,
        max_ts,
    };
    let mut blob = Vec::with_capacity(HEADER_SIZE + rows.len() * ROW_SIZE);
    blob.extend_from_slice(&header.encode());
    let mut slot = [0u8; ROW_SIZE];
    for r in rows {
        r.encode_into(&mut slot);
        blob.extend_from_slice(&slot);
    }
    blob
}
