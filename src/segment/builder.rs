//! Segment construction from an ascending record slice.
//!
//! Building is a single pass over the input: every *k*-th record (k = the
//! configured index sparsity) contributes a sparse-index entry keyed by
//! that record's key with the current payload offset as its value, then
//! the record's cell is appended to the payload. The bloom filter, the
//! key range, and the record count are fixed in the same pass.
//!
//! The produced byte image depends only on the input sequence and the
//! sparsity constant.

use std::collections::BTreeMap;

use bloomfilter::Bloom;
use tracing::debug;

use super::{
    next_segment_id, encode_record, Record, Segment, SegmentError,
    SEGMENT_BLOOM_FALSE_POSITIVE_RATE,
};

impl Segment {
    /// Builds a segment at `level` from `records`, which must be strictly
    /// ascending by key.
    ///
    /// # Errors
    ///
    /// [`SegmentError::Internal`] when `records` is empty, `sparsity` is
    /// zero, or the input is not strictly ascending.
    pub fn build(
        level: usize,
        records: &[Record],
        sparsity: usize,
    ) -> Result<Segment, SegmentError> {
        if records.is_empty() {
            return Err(SegmentError::Internal(
                "cannot build a segment from zero records".into(),
            ));
        }
        if sparsity == 0 {
            return Err(SegmentError::Internal("index sparsity must be ≥ 1".into()));
        }
        for pair in records.windows(2) {
            if pair[0].key >= pair[1].key {
                return Err(SegmentError::Internal(format!(
                    "input records not strictly ascending near key {:?}",
                    String::from_utf8_lossy(&pair[1].key)
                )));
            }
        }

        let mut bloom = Bloom::<[u8]>::new_for_fp_rate(records.len(), SEGMENT_BLOOM_FALSE_POSITIVE_RATE)
            .map_err(|e| SegmentError::Internal(e.to_string()))?;

        let mut payload = Vec::new();
        let mut sparse_index = BTreeMap::new();

        for (i, record) in records.iter().enumerate() {
            if i % sparsity == 0 {
                sparse_index.insert(record.key.clone(), payload.len());
            }
            encode_record(record, &mut payload)?;
            bloom.set(record.key.as_slice());
        }

        let segment = Segment {
            id: next_segment_id(),
            level,
            first_key: records[0].key.clone(),
            last_key: records[records.len() - 1].key.clone(),
            len: records.len(),
            payload,
            sparse_index,
            bloom,
        };

        debug!(
            id = segment.id,
            level,
            record_count = segment.len,
            payload_bytes = segment.payload.len(),
            "segment built"
        );

        Ok(segment)
    }
}
