//! Segment Module
//!
//! A **segment** is an immutable, sorted run of records together with a
//! sparse key → offset index. Segments are produced by flushing a frozen
//! memtable (level 0) or by compaction (level 1 and deeper) and are never
//! modified afterwards.
//!
//! ## In-memory image
//!
//! The payload is the concatenation of per-record cells in strictly
//! ascending key order:
//!
//! ```text
//! [KEY_LEN_LE (4 B)][VALUE_LEN_LE (4 B)][CRC32_LE (4 B)][KEY][VALUE]
//! [KEY_LEN_LE (4 B)][VALUE_LEN_LE (4 B)][CRC32_LE (4 B)][KEY][VALUE]
//! ...
//! ```
//!
//! Each cell is self-delimiting, so decoding can start at any cell
//! boundary and walk forward. The CRC32 covers the key and value bytes and
//! is verified on every decode.
//!
//! The sparse index maps the key of every *k*-th record (k = the
//! configured index sparsity) to that record's byte offset in the payload.
//! Record 0 is always indexed, so a probe key smaller than `first_key`
//! resolves to "absent" without touching the payload. The index is
//! recomputable from the payload and is never serialized.
//!
//! Each segment additionally carries a bloom filter over its keys, checked
//! before the index probe to short-circuit negative lookups.
//!
//! ## Sub-modules
//!
//! - [`builder`] — segment construction from an ascending record slice.
//! - [`iterator`] — [`SegmentIter`] for in-order traversal.
//!
//! ## Concurrency model
//!
//! Segments are immutable, so reads are lock-free and thread-safe. The
//! store shares them as `Arc<Segment>` between readers and background
//! tasks; a segment is dropped once removed from every level list and
//! released by its last reader.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use iterator::SegmentIter;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use bloomfilter::Bloom;
use crc32fast::Hasher as Crc32;
use thiserror::Error;

use crate::encoding::{self, EncodingError};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// False-positive rate for the per-segment bloom filter.
const SEGMENT_BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// Segment id allocation
// ------------------------------------------------------------------------------------------------

/// Process-wide monotonic counter for segment ids.
///
/// Ids exist for diagnostics and list bookkeeping only; uniqueness is the
/// only property anything relies on.
static NEXT_SEGMENT_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_segment_id() -> u64 {
    NEXT_SEGMENT_ID.fetch_add(1, Ordering::SeqCst)
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by segment operations (build, lookup, iterate).
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Encoding / decoding error in the payload.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A record cell's CRC32 did not match its key and value bytes.
    #[error("record checksum mismatch")]
    ChecksumMismatch,

    /// Internal invariant violation (unsorted input, offset outside the
    /// payload, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Record — the unit stored in memtables and segments
// ------------------------------------------------------------------------------------------------

/// A single key-value pair.
///
/// Both components are non-empty byte strings. A record whose value equals
/// the store's tombstone sentinel marks a logical deletion; segments and
/// the merge machinery carry tombstones exactly like ordinary records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The key.
    pub key: Vec<u8>,

    /// The value, or the tombstone sentinel.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a new record.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// RecordCell — fixed-size wire header preceding each record's bytes
// ------------------------------------------------------------------------------------------------

/// Wire header of a single payload cell.
pub(crate) struct RecordCell {
    /// Length of the key in bytes.
    pub(crate) key_len: u32,

    /// Length of the value in bytes.
    pub(crate) value_len: u32,

    /// CRC32 over the key bytes followed by the value bytes.
    pub(crate) checksum: u32,
}

impl encoding::Encode for RecordCell {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.key_len, buf)?;
        encoding::Encode::encode_to(&self.value_len, buf)?;
        encoding::Encode::encode_to(&self.checksum, buf)?;
        Ok(())
    }
}

impl encoding::Decode for RecordCell {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (key_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (value_len, n) = u32::decode_from(&buf[off..])?;
        off += n;
        let (checksum, n) = u32::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                key_len,
                value_len,
                checksum,
            },
            off,
        ))
    }
}

/// Appends the cell encoding of `record` to `buf`.
pub(crate) fn encode_record(record: &Record, buf: &mut Vec<u8>) -> Result<(), SegmentError> {
    let mut hasher = Crc32::new();
    hasher.update(&record.key);
    hasher.update(&record.value);

    let cell = RecordCell {
        key_len: encoding_len(&record.key)?,
        value_len: encoding_len(&record.value)?,
        checksum: hasher.finalize(),
    };
    encoding::Encode::encode_to(&cell, buf)?;
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);
    Ok(())
}

fn encoding_len(bytes: &[u8]) -> Result<u32, SegmentError> {
    u32::try_from(bytes.len()).map_err(|_| {
        SegmentError::Internal(format!("record component of {} bytes exceeds u32", bytes.len()))
    })
}

/// Decodes one record cell starting at `offset` in `payload`.
///
/// Returns the record and the total number of payload bytes it occupies.
pub(crate) fn decode_record(payload: &[u8], offset: usize) -> Result<(Record, usize), SegmentError> {
    if offset > payload.len() {
        return Err(SegmentError::Internal(format!(
            "record offset {offset} outside payload of {} bytes",
            payload.len()
        )));
    }
    let buf = &payload[offset..];
    let (cell, header) = encoding::decode_from_slice::<RecordCell>(buf)?;

    let key_len = cell.key_len as usize;
    let value_len = cell.value_len as usize;
    let total = header + key_len + value_len;
    if buf.len() < total {
        return Err(EncodingError::UnexpectedEof {
            needed: total,
            available: buf.len(),
        }
        .into());
    }

    let key = buf[header..header + key_len].to_vec();
    let value = buf[header + key_len..total].to_vec();

    let mut hasher = Crc32::new();
    hasher.update(&key);
    hasher.update(&value);
    if hasher.finalize() != cell.checksum {
        return Err(SegmentError::ChecksumMismatch);
    }

    Ok((Record { key, value }, total))
}

// ------------------------------------------------------------------------------------------------
// Segment — immutable sorted run
// ------------------------------------------------------------------------------------------------

/// An immutable sorted run of records with a sparse index.
pub struct Segment {
    /// Process-wide unique id, assigned at creation.
    pub(crate) id: u64,

    /// Level this segment belongs to (0 for direct flushes, ≥ 1 for
    /// compaction output).
    pub(crate) level: usize,

    /// Key of the first record (inclusive range bound).
    pub(crate) first_key: Vec<u8>,

    /// Key of the last record (inclusive range bound).
    pub(crate) last_key: Vec<u8>,

    /// Number of records in the payload.
    pub(crate) len: usize,

    /// The serialized records, strictly ascending by key.
    pub(crate) payload: Vec<u8>,

    /// Key → payload byte offset, one entry per *k*-th record. Record 0 is
    /// always present.
    pub(crate) sparse_index: BTreeMap<Vec<u8>, usize>,

    /// Bloom filter over all keys in this segment.
    pub(crate) bloom: Bloom<[u8]>,
}

impl Segment {
    /// The segment's unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The level this segment lives on.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Number of records stored in this segment.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when the segment holds no records. Construction rejects
    /// empty inputs, so a live segment always reports `false`.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The inclusive key range `[first_key, last_key]` covered by this
    /// segment.
    pub fn key_range(&self) -> (&[u8], &[u8]) {
        (&self.first_key, &self.last_key)
    }

    /// `true` when `key` falls inside this segment's inclusive key range.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.first_key.as_slice() <= key && key <= self.last_key.as_slice()
    }

    /// Looks up `key` in this segment.
    ///
    /// The probe brackets the candidate payload range with the sparse
    /// index: the lower bound gives the start offset (its absence means
    /// the key is smaller than every indexed key, hence smaller than
    /// `first_key` — absent without any payload scan), the upper bound
    /// gives the end offset (or the payload end). The bracketed cells are
    /// then decoded sequentially.
    ///
    /// Returns `Ok(Some(value))` on an exact match — tombstone values
    /// included — and `Ok(None)` when the segment holds no record for
    /// `key`.
    ///
    /// # Errors
    ///
    /// [`SegmentError::ChecksumMismatch`] or [`SegmentError::Encoding`] if
    /// a bracketed cell fails to decode; [`SegmentError::Internal`] if the
    /// sparse index points outside the payload.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>, SegmentError> {
        if !self.contains_key(key) {
            return Ok(None);
        }
        if !self.bloom.check(key) {
            return Ok(None);
        }

        let start = match self
            .sparse_index
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
        {
            Some((_, offset)) => *offset,
            None => return Ok(None),
        };
        let end = self
            .sparse_index
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map_or(self.payload.len(), |(_, offset)| *offset);

        if start > self.payload.len() || end > self.payload.len() {
            return Err(SegmentError::Internal(format!(
                "sparse index range [{start}, {end}) outside payload of {} bytes",
                self.payload.len()
            )));
        }

        let mut cursor = start;
        while cursor < end {
            let (record, consumed) = decode_record(&self.payload, cursor)?;
            if record.key.as_slice() == key {
                return Ok(Some(record.value));
            }
            if record.key.as_slice() > key {
                break;
            }
            cursor += consumed;
        }
        Ok(None)
    }

    /// Iterates all records in strictly ascending key order.
    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter::new(self)
    }

    /// Materializes all records of this segment, in order.
    pub fn records(&self) -> Result<Vec<Record>, SegmentError> {
        self.iter().collect()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("len", &self.len)
            .field("first_key", &String::from_utf8_lossy(&self.first_key))
            .field("last_key", &String::from_utf8_lossy(&self.last_key))
            .finish()
    }
}
