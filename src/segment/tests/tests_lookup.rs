//! Point lookup coverage, including the index-bracketing boundaries.

#[cfg(test)]
mod tests {
    use crate::segment::{Record, Segment};

    fn build(n: usize, sparsity: usize) -> Segment {
        let records: Vec<Record> = (0..n)
            .map(|i| Record::new(format!("key{i:04}"), format!("val{i:04}")))
            .collect();
        Segment::build(0, &records, sparsity).unwrap()
    }

    #[test]
    fn every_key_is_found() {
        // Sparsity 3 leaves two of every three records unindexed; all must
        // still be reachable through the bracketed scan.
        let segment = build(20, 3);
        for i in 0..20 {
            let key = format!("key{i:04}");
            let value = segment.lookup(key.as_bytes()).unwrap();
            assert_eq!(value, Some(format!("val{i:04}").into_bytes()));
        }
    }

    #[test]
    fn first_and_last_keys_are_found() {
        let segment = build(10, 4);
        let (first, last) = {
            let (f, l) = segment.key_range();
            (f.to_vec(), l.to_vec())
        };
        assert!(segment.lookup(&first).unwrap().is_some());
        assert!(segment.lookup(&last).unwrap().is_some());
    }

    #[test]
    fn key_below_first_is_absent() {
        let segment = build(10, 3);
        assert_eq!(segment.lookup(b"key").unwrap(), None);
        assert_eq!(segment.lookup(&[0x00]).unwrap(), None);
    }

    #[test]
    fn key_above_last_is_absent() {
        let segment = build(10, 3);
        assert_eq!(segment.lookup(b"zzz").unwrap(), None);
    }

    #[test]
    fn key_between_residents_is_absent() {
        let segment = build(10, 3);
        // Sorts between key0004 and key0005.
        assert_eq!(segment.lookup(b"key0004a").unwrap(), None);
    }

    #[test]
    fn lookup_returns_tombstone_values_verbatim() {
        let records = vec![
            Record::new("a", "1"),
            Record::new("b", "__tombstone__"),
            Record::new("c", "3"),
        ];
        let segment = Segment::build(0, &records, 2).unwrap();
        assert_eq!(
            segment.lookup(b"b").unwrap(),
            Some(b"__tombstone__".to_vec())
        );
    }

    #[test]
    fn lookup_across_sparsity_settings() {
        for sparsity in [1, 2, 3, 5, 16, 100] {
            let segment = build(32, sparsity);
            for i in [0usize, 1, 15, 30, 31] {
                let key = format!("key{i:04}");
                assert_eq!(
                    segment.lookup(key.as_bytes()).unwrap(),
                    Some(format!("val{i:04}").into_bytes()),
                    "sparsity {sparsity}, key {key}"
                );
            }
            assert_eq!(segment.lookup(b"nope").unwrap(), None);
        }
    }
}
