//! In-order segment iteration.
//!
//! [`SegmentIter`] walks the sparse index in ascending order and decodes
//! the payload cells of each index block — the records between one index
//! entry's offset and the next entry's offset (or the payload end). Cells
//! are self-delimiting, so each block decodes front to back without any
//! per-record index entry.
//!
//! The iterator yields `Result<Record, SegmentError>` and fuses after the
//! first decode failure.

use std::collections::btree_map;
use std::iter::Peekable;

use super::{decode_record, Record, Segment, SegmentError};

/// Iterator over all records of a [`Segment`], in strictly ascending key
/// order.
pub struct SegmentIter<'a> {
    segment: &'a Segment,

    /// Remaining sparse-index block start offsets, in ascending key order.
    blocks: Peekable<btree_map::Values<'a, Vec<u8>, usize>>,

    /// Current decode position in the payload.
    cursor: usize,

    /// End of the current index block.
    block_end: usize,

    /// Set after a decode error; the iterator yields nothing further.
    failed: bool,
}

impl<'a> SegmentIter<'a> {
    pub(crate) fn new(segment: &'a Segment) -> Self {
        Self {
            segment,
            blocks: segment.sparse_index.values().peekable(),
            cursor: 0,
            block_end: 0,
            failed: false,
        }
    }
}

impl Iterator for SegmentIter<'_> {
    type Item = Result<Record, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while self.cursor >= self.block_end {
            let start = *self.blocks.next()?;
            self.cursor = start;
            self.block_end = self
                .blocks
                .peek()
                .map_or(self.segment.payload.len(), |offset| **offset);
        }

        match decode_record(&self.segment.payload, self.cursor) {
            Ok((record, consumed)) => {
                self.cursor += consumed;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
