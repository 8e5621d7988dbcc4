use crate::store::{Store, StoreConfig};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config whose thresholds are high enough that nothing ever flushes.
pub fn memory_only_config() -> StoreConfig {
    init_tracing();
    StoreConfig {
        flush_threshold: 1_000_000,
        ..StoreConfig::default()
    }
}

/// Small thresholds so freezes, flushes, and compactions happen quickly:
/// flush at 2 records, compact at 4 level-0 segments, 8 records per
/// level-1 segment, one index entry per 3 records.
pub fn small_threshold_config() -> StoreConfig {
    init_tracing();
    StoreConfig {
        flush_threshold: 2,
        max_level0_segments: 4,
        level_file_size: 8,
        index_sparsity: 3,
        tracing: true,
        ..StoreConfig::default()
    }
}

/// Opens a store with [`small_threshold_config`].
pub fn small_store() -> Store {
    Store::new(small_threshold_config()).expect("open store")
}

/// Puts `key{i} → val{i}` for `i` in `0..n`.
pub fn put_n(store: &Store, n: usize) {
    for i in 0..n {
        store
            .put(format!("key{i:04}").as_bytes(), format!("val{i:04}").as_bytes())
            .expect("put");
    }
}
