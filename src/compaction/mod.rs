//! # Compaction Module
//!
//! Merges the whole of level 0 against the overlapping subset of level 1,
//! producing a key-sorted sequence of new, size-bounded level-1 segments.
//!
//! ## Algorithm
//!
//! Given the level-0 snapshot `F0` (newest-first) and the contiguous
//! overlapping level-1 run `F1` (ascending):
//!
//! 1. **Fold level 0.** The `F0` iterators are merged with the
//!    recency-aware k-way merge ([`MergeIterator`]); duplicate keys across
//!    level-0 segments collapse to the newest version. The result `S0` is
//!    a single ascending stream.
//! 2. **Merge against level 1.** A cursor over `S0` advances against the
//!    records of each `F1` segment in ascending order. The smaller key is
//!    emitted; on equal keys the `S0` record wins (level 0 is newer) and
//!    the level-1 copy is discarded. Output records accumulate in a
//!    buffer that is sealed into a new level-1 segment whenever it
//!    reaches the configured level file size.
//! 3. **Drain.** Once `F1` is exhausted the remaining `S0` tail streams
//!    through the same buffer, and the final partial buffer is sealed.
//!
//! When `F1` is empty, `S0` is sliced directly into size-bounded level-1
//! segments.
//!
//! ## Tombstones
//!
//! Tombstones are **preserved**: they travel through the merge and into
//! the produced segments exactly like ordinary records. Shallower levels
//! may still shadow deeper data, so dropping a tombstone here could
//! resurrect a deleted key.
//!
//! ## Code organization
//!
//! This module holds the pure merge machinery — overlap selection, the
//! two-cursor merge, and the size-capped output buffer. Snapshotting the
//! level lists, swapping the merged segments in, and scheduling rounds are
//! the store's concern (`store::Store`), which keeps every list mutation
//! under its segment write lock.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::segment::{Record, Segment, SegmentError};
use crate::store::utils::MergeIterator;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors produced while merging segments.
#[derive(Debug, Error)]
pub enum CompactionError {
    /// Reading an input segment or building an output segment failed.
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),
}

// ------------------------------------------------------------------------------------------------
// Overlap selection
// ------------------------------------------------------------------------------------------------

/// Selects from a key-sorted level list the contiguous run of segments
/// whose key range intersects `[min_key, max_key]`.
///
/// Because the list is globally sorted and disjoint, a single pass
/// suffices: skip while `last_key < min_key`, collect while
/// `first_key ≤ max_key`, stop at the first segment past the bound.
pub(crate) fn select_overlapping(
    level: &[Arc<Segment>],
    min_key: &[u8],
    max_key: &[u8],
) -> Vec<Arc<Segment>> {
    level
        .iter()
        .skip_while(|seg| seg.key_range().1 < min_key)
        .take_while(|seg| seg.key_range().0 <= max_key)
        .cloned()
        .collect()
}

// ------------------------------------------------------------------------------------------------
// OutputBuffer — size-capped segment sink
// ------------------------------------------------------------------------------------------------

/// Accumulates merged records and seals them into level-1 segments of at
/// most `capacity` records each.
struct OutputBuffer {
    records: Vec<Record>,
    capacity: usize,
    sparsity: usize,
    sealed: Vec<Arc<Segment>>,
}

impl OutputBuffer {
    fn new(capacity: usize, sparsity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            sparsity,
            sealed: Vec::new(),
        }
    }

    /// Appends one record, sealing a segment when the buffer is full.
    fn push(&mut self, record: Record) -> Result<(), CompactionError> {
        self.records.push(record);
        if self.records.len() >= self.capacity {
            self.seal()?;
        }
        Ok(())
    }

    fn seal(&mut self) -> Result<(), CompactionError> {
        if self.records.is_empty() {
            return Ok(());
        }
        let segment = Segment::build(1, &self.records, self.sparsity)?;
        debug!(
            id = segment.id(),
            record_count = segment.len(),
            "compaction sealed level-1 segment"
        );
        self.sealed.push(Arc::new(segment));
        self.records.clear();
        Ok(())
    }

    /// Seals any remaining records and returns the produced segments.
    fn finish(mut self) -> Result<Vec<Arc<Segment>>, CompactionError> {
        self.seal()?;
        Ok(self.sealed)
    }
}

// ------------------------------------------------------------------------------------------------
// Merge — fold F0, merge against F1, drain
// ------------------------------------------------------------------------------------------------

/// Merges the level-0 snapshot `f0` (newest-first) with the overlapping
/// level-1 run `f1` (ascending), producing new level-1 segments of at
/// most `level_file_size` records each.
///
/// Recency rule: among records with the same key, level 0 beats level 1,
/// and within level 0 the newer segment beats the older one.
pub(crate) fn merge(
    f0: &[Arc<Segment>],
    f1: &[Arc<Segment>],
    level_file_size: usize,
    sparsity: usize,
) -> Result<Vec<Arc<Segment>>, CompactionError> {
    // Step A — fold level 0 into a single deduplicated ascending stream.
    let mut streams: Vec<Box<dyn Iterator<Item = Record>>> = Vec::with_capacity(f0.len());
    for segment in f0 {
        streams.push(Box::new(segment.records()?.into_iter()));
    }
    let mut s0 = MergeIterator::new(streams).peekable();

    let mut output = OutputBuffer::new(level_file_size, sparsity);

    // Step B — two-cursor merge against the level-1 run.
    for segment in f1 {
        for old in segment.records()? {
            loop {
                if let Some(new) = s0.next_if(|new| new.key < old.key) {
                    output.push(new)?;
                    continue;
                }
                if let Some(new) = s0.next_if(|new| new.key == old.key) {
                    // Equal keys: level 0 is newer, the level-1 copy is
                    // discarded.
                    output.push(new)?;
                } else {
                    output.push(old)?;
                }
                break;
            }
        }
    }

    // Step C — drain the remaining level-0 tail.
    for new in s0 {
        output.push(new)?;
    }

    output.finish()
}
