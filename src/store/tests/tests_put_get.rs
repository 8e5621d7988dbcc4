//! Put/get behavior against the memory tier.

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use crate::store::tests::helpers::*;
    use crate::store::{GetResult, Store};

    /// # Scenario
    /// Put a handful of keys, read them all back, and probe a key that
    /// was never written.
    ///
    /// # Expected behavior
    /// Every written key returns its value; the unknown key reports
    /// `NotFound`.
    #[test]
    fn memtable__put_get_roundtrip() {
        let store = Store::new(memory_only_config()).unwrap();

        put_n(&store, 10);
        for i in 0..10 {
            let key = format!("key{i:04}");
            assert_eq!(
                store.get(key.as_bytes()).unwrap(),
                GetResult::Found(format!("val{i:04}").into_bytes())
            );
        }
        assert_eq!(store.get(b"missing").unwrap(), GetResult::NotFound);
    }

    /// # Scenario
    /// Overwrite a key twice without any flush in between.
    ///
    /// # Expected behavior
    /// The latest value wins; the record count does not grow on
    /// overwrite.
    #[test]
    fn memtable__overwrite_keeps_latest_value() {
        let store = Store::new(memory_only_config()).unwrap();

        store.put(b"key", b"v1").unwrap();
        store.put(b"key", b"v2").unwrap();
        store.put(b"key", b"v3").unwrap();

        assert_eq!(store.get(b"key").unwrap(), GetResult::Found(b"v3".to_vec()));
        assert_eq!(store.total_records(), 1);
    }

    /// # Scenario
    /// Writes below the flush threshold.
    ///
    /// # Expected behavior
    /// Everything stays in the memtable: no flushing memtables, no
    /// segments on any level.
    #[test]
    fn memtable__no_flush_below_threshold() {
        let store = Store::new(memory_only_config()).unwrap();
        put_n(&store, 100);

        let stats = store.stats().unwrap();
        assert_eq!(stats.memtable_len, 100);
        assert_eq!(stats.flushing_count, 0);
        assert!(stats.segments_per_level.iter().all(|&n| n == 0));
        assert_eq!(store.total_records(), 100);
    }

    /// # Scenario
    /// Read-your-writes across the flush boundary: keys written, flushed
    /// into level 0, then read.
    ///
    /// # Expected behavior
    /// Values are identical whether served from the memtable or from a
    /// segment.
    #[test]
    fn memtable_segment__values_survive_flush() {
        let store = small_store();
        put_n(&store, 8);
        store.quiesce();

        for i in 0..8 {
            let key = format!("key{i:04}");
            assert_eq!(
                store.get(key.as_bytes()).unwrap(),
                GetResult::Found(format!("val{i:04}").into_bytes()),
                "key {key}"
            );
        }
    }
}
