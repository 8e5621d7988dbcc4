//! Concurrency-under-mutation tests.
//!
//! These tests verify that concurrent readers and writers stay correct
//! while flushes and compactions run in the background. The store's two
//! reader-writer locks (memory, segments) are each taken once per read,
//! so readers always see one consistent memory view and one consistent
//! segment view.

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use std::thread;

    use crate::store::tests::helpers::*;
    use crate::store::{GetResult, Store};

    /// # Scenario
    /// Four writer threads insert disjoint key ranges while flushes and
    /// compactions run underneath.
    ///
    /// # Expected behavior
    /// After settling, every key from every thread is readable and the
    /// record count equals the number of distinct keys written.
    #[test]
    fn concurrent__disjoint_writers_with_background_flushes() {
        let store = small_store();

        let mut handles = Vec::new();
        for t in 0..4u32 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..50u32 {
                    let key = format!("t{t}-key{i:04}");
                    let val = format!("t{t}-val{i:04}");
                    store.put(key.as_bytes(), val.as_bytes()).expect("put");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }
        store.quiesce();

        for t in 0..4u32 {
            for i in 0..50u32 {
                let key = format!("t{t}-key{i:04}");
                assert_eq!(
                    store.get(key.as_bytes()).unwrap(),
                    GetResult::Found(format!("t{t}-val{i:04}").into_bytes()),
                    "{key}"
                );
            }
        }
        assert_eq!(store.total_records(), 200);
    }

    /// # Scenario
    /// Reader threads hammer `get` while the main thread keeps writing
    /// through flush thresholds.
    ///
    /// # Expected behavior
    /// Reads never error and never observe a torn value — every hit is a
    /// value that was actually written for that key.
    #[test]
    fn concurrent__gets_during_flush_see_consistent_values() {
        let store = small_store();
        put_n(&store, 50);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for round in 0..20 {
                    for i in 0..50 {
                        let key = format!("key{i:04}");
                        match store.get(key.as_bytes()).expect("get must not error") {
                            GetResult::Found(v) => {
                                assert_eq!(v, format!("val{i:04}").into_bytes(), "round {round}");
                            }
                            GetResult::Deleted => panic!("no deletes were issued"),
                            // A key may transiently miss only if it was
                            // never written; these 50 all were.
                            GetResult::NotFound => panic!("key{i:04} vanished"),
                        }
                    }
                }
            }));
        }

        // Keep the flush/compaction pipeline busy while readers run.
        for i in 50..150 {
            store
                .put(format!("key{i:04}").as_bytes(), format!("val{i:04}").as_bytes())
                .expect("put");
        }

        for handle in handles {
            handle.join().expect("reader thread panicked");
        }
        store.quiesce();

        for i in 0..150 {
            let key = format!("key{i:04}");
            assert_eq!(
                store.get(key.as_bytes()).unwrap(),
                GetResult::Found(format!("val{i:04}").into_bytes())
            );
        }
    }

    /// # Scenario
    /// Many threads race puts to the same key.
    ///
    /// # Expected behavior
    /// The observable value is always one that some thread wrote — no
    /// intermediate or mixed state — and a subsequent uncontended put
    /// wins outright.
    #[test]
    fn concurrent__same_key_races_resolve_to_a_written_value() {
        let store = Store::new(memory_only_config()).unwrap();

        let mut handles = Vec::new();
        for t in 0..8u32 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                store
                    .put(b"contended", format!("writer-{t}").as_bytes())
                    .expect("put");
            }));
        }
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }

        match store.get(b"contended").unwrap() {
            GetResult::Found(v) => {
                let v = String::from_utf8(v).unwrap();
                assert!(v.starts_with("writer-"), "unexpected value {v}");
            }
            other => panic!("expected a value, got {other:?}"),
        }
        assert_eq!(store.total_records(), 1);

        store.put(b"contended", b"final").unwrap();
        assert_eq!(
            store.get(b"contended").unwrap(),
            GetResult::Found(b"final".to_vec())
        );
    }

    /// # Scenario
    /// Writers and a deleter interleave on overlapping keys across flush
    /// boundaries.
    ///
    /// # Expected behavior
    /// After settling, deleted keys report `Deleted` and survivors carry
    /// their last value.
    #[test]
    fn concurrent__deletes_interleaved_with_writes() {
        let store = small_store();
        put_n(&store, 40);

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 40..80 {
                    store
                        .put(format!("key{i:04}").as_bytes(), format!("val{i:04}").as_bytes())
                        .expect("put");
                }
            })
        };
        let deleter = {
            let store = store.clone();
            thread::spawn(move || {
                for i in (0..40).step_by(2) {
                    store.delete(format!("key{i:04}").as_bytes()).expect("delete");
                }
            })
        };
        writer.join().expect("writer panicked");
        deleter.join().expect("deleter panicked");
        store.quiesce();

        for i in 0..80 {
            let key = format!("key{i:04}");
            let expected = if i < 40 && i % 2 == 0 {
                GetResult::Deleted
            } else {
                GetResult::Found(format!("val{i:04}").into_bytes())
            };
            assert_eq!(store.get(key.as_bytes()).unwrap(), expected, "{key}");
        }
    }
}
