//! Store utilities — recency-aware k-way merge and level-list helpers.
//!
//! This module defines:
//!
//! - [`MergeIterator`] — a heap-based k-way merge over ascending record
//!   streams where **stream order encodes recency**: stream `i` is newer
//!   than stream `j` when `i < j`. Wherever the same key appears in more
//!   than one stream, only the newest stream's record is emitted.
//! - [`ordered_insert`] — splices a key-sorted batch of segments into a
//!   key-sorted level list at its unique fitting position.
//! - [`min_first_key`] / [`max_last_key`] — key-range bounds over a
//!   segment set.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::segment::{Record, Segment};

// ------------------------------------------------------------------------------------------------
// MergeIterator — k-way merge with recency dedup
// ------------------------------------------------------------------------------------------------

/// Merges multiple ascending record streams into one ascending stream,
/// collapsing duplicate keys by recency.
///
/// Stream index is the recency order: index 0 is the newest stream. For a
/// key present in several streams, the record from the lowest-index stream
/// is emitted and the strictly older occurrences are dropped. The output
/// is strictly ascending by key.
///
/// This is the fold applied to the (possibly overlapping) level-0 segment
/// set before merging against level 1.
pub struct MergeIterator<'a> {
    sources: Vec<Box<dyn Iterator<Item = Record> + 'a>>,
    heap: BinaryHeap<HeapEntry>,
    last_key: Option<Vec<u8>>,
}

struct HeapEntry {
    record: Record,
    source_idx: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest key pops first; on equal keys the newest
        // (lowest-index) source pops first.
        self.record
            .key
            .cmp(&other.record.key)
            .then(self.source_idx.cmp(&other.source_idx))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.key == other.record.key && self.source_idx == other.source_idx
    }
}

impl Eq for HeapEntry {}

impl<'a> MergeIterator<'a> {
    /// Creates a merge over `sources`, each of which must be ascending by
    /// key. `sources[0]` is the newest stream.
    pub fn new(mut sources: Vec<Box<dyn Iterator<Item = Record> + 'a>>) -> Self {
        let mut heap = BinaryHeap::new();
        for (idx, source) in sources.iter_mut().enumerate() {
            if let Some(record) = source.next() {
                heap.push(HeapEntry {
                    record,
                    source_idx: idx,
                });
            }
        }
        Self {
            sources,
            heap,
            last_key: None,
        }
    }

    fn pop_and_refill(&mut self) -> Option<HeapEntry> {
        let entry = self.heap.pop()?;
        if let Some(next) = self.sources[entry.source_idx].next() {
            self.heap.push(HeapEntry {
                record: next,
                source_idx: entry.source_idx,
            });
        }
        Some(entry)
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = self.pop_and_refill()?;
            if self.last_key.as_deref() == Some(entry.record.key.as_slice()) {
                // Older occurrence of an already-emitted key.
                continue;
            }
            self.last_key = Some(entry.record.key.clone());
            return Some(entry.record);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Level-list helpers
// ------------------------------------------------------------------------------------------------

/// Splices `batch` into the key-sorted level list `list` as one contiguous
/// run, preserving the global ordering invariant.
///
/// `batch` must be key-sorted, mutually disjoint, and disjoint from every
/// remaining entry of `list` — which holds for compaction output once the
/// replaced segments have been removed. Because the list stays globally
/// sorted, the position before the first entry whose `first_key` exceeds
/// the batch's maximum key is the unique fitting point.
pub(crate) fn ordered_insert(list: &mut Vec<Arc<Segment>>, batch: Vec<Arc<Segment>>) {
    let Some(batch_max) = max_last_key(&batch) else {
        return;
    };
    let pos = list.partition_point(|seg| seg.key_range().0 <= batch_max.as_slice());
    list.splice(pos..pos, batch);
}

/// Smallest `first_key` across `segments`, or `None` for an empty set.
pub(crate) fn min_first_key(segments: &[Arc<Segment>]) -> Option<Vec<u8>> {
    segments
        .iter()
        .map(|seg| seg.key_range().0)
        .min()
        .map(|key| key.to_vec())
}

/// Largest `last_key` across `segments`, or `None` for an empty set.
pub(crate) fn max_last_key(segments: &[Arc<Segment>]) -> Option<Vec<u8>> {
    segments
        .iter()
        .map(|seg| seg.key_range().1)
        .max()
        .map(|key| key.to_vec())
}
