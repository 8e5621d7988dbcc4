//! # LSM Store
//!
//! This module implements an **in-process**, **embedded** ordered
//! key-value store organised as a leveled LSM tree. Keys and values are
//! opaque byte strings under lexicographic order.
//!
//! ## Design Overview
//!
//! The store organises data across three tiers, queried newest-first:
//!
//! 1. **Live memtable** — the mutable ordered write buffer.
//! 2. **Flushing memtables** — frozen snapshots of previous memtables,
//!    kept readable (newest-first) until their level-0 segment is
//!    installed.
//! 3. **Segments** — immutable sorted runs. Level 0 holds direct flushes
//!    (key ranges may overlap, newest-first); every level ≥ 1 holds
//!    key-sorted, disjoint segments.
//!
//! Writes go into the live memtable. When it reaches the flush threshold
//! it is frozen, a fresh memtable is installed, and a background task
//! converts the frozen snapshot into a level-0 segment. When level 0
//! reaches its segment limit, a background compaction merges it with the
//! overlapping part of level 1.
//!
//! ## Concurrency Model
//!
//! Two reader-writer locks partition the state:
//!
//! - the **memory lock** guards the live memtable and the flushing list;
//! - the **segment lock** guards every per-level segment list and the
//!   compaction-in-progress flag.
//!
//! When both are needed the memory lock is acquired first. A read takes
//! each lock once, in that order, so it sees one consistent memory view
//! and one consistent segment view; a freshly-flushed memtable leaves the
//! flushing list only *after* its segment is installed, so no key can
//! momentarily vanish from both views. Compaction swaps segment lists
//! under a single write acquisition, so readers never observe a partial
//! replacement.
//!
//! At most one compaction runs at a time; flushes may run concurrently
//! (each produces one independent level-0 segment).
//!
//! ## Guarantees
//!
//! - **Read-your-writes:** a `get` following a `put` with no intervening
//!   write to that key returns the put value; after a `delete` it reports
//!   the key as deleted.
//! - **Recency:** the traversal order is strictly newest-first, so the
//!   first hit — tombstones included — is authoritative.
//! - **Atomic installs:** flush and compaction mutate the segment lists
//!   only under the segment write lock.
//!
//! Background tasks never surface errors to callers: a failed flush or
//! compaction logs the error and aborts, leaving the store consistent.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, info, trace};

use crate::compaction::{self, CompactionError};
use crate::memtable::{Memtable, MemtableError};
use crate::segment::Segment;

pub mod utils;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Default tombstone sentinel. Writes of this exact value through
/// [`Store::put`] are rejected.
pub const DEFAULT_TOMBSTONE_VALUE: &[u8] = b"__tombstone__";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller passed an argument the store rejects: an empty key, a
    /// value equal to the tombstone sentinel, or an invalid configuration.
    /// The store is unchanged.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store has been closed; writes are no longer accepted.
    #[error("store is closed")]
    Closed,

    /// Error originating from the compaction subsystem.
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactionError),

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MemtableError> for StoreError {
    fn from(e: MemtableError) -> Self {
        // Every memtable error is an argument error: the write was
        // rejected without side effect.
        StoreError::InvalidArgument(e.to_string())
    }
}

fn lock_poisoned(which: &str) -> StoreError {
    StoreError::Internal(format!("{which} lock poisoned"))
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`Store`] instance.
///
/// Owned by the store — two stores with different configurations can
/// coexist in one process.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Byte string reserved to mark deletions. [`Store::put`] rejects this
    /// exact value.
    pub tombstone_value: Vec<u8>,

    /// One sparse-index entry per this many consecutive records in a
    /// segment. Must be ≥ 1.
    pub index_sparsity: usize,

    /// Memtable record count that triggers a freeze-and-flush.
    pub flush_threshold: usize,

    /// Level-0 segment count that triggers a compaction.
    pub max_level0_segments: usize,

    /// Maximum records per level-≥1 segment.
    pub level_file_size: usize,

    /// Total number of levels, including level 0. Must be ≥ 2.
    pub level_count: usize,

    /// When `true`, detailed per-key events are logged at `trace` level;
    /// otherwise they are suppressed entirely.
    pub tracing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tombstone_value: DEFAULT_TOMBSTONE_VALUE.to_vec(),
            index_sparsity: 10,
            flush_threshold: 10_000,
            max_level0_segments: 4,
            level_file_size: 40_000,
            level_count: 5,
            tracing: false,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), StoreError> {
        if self.tombstone_value.is_empty() {
            return Err(StoreError::InvalidArgument(
                "tombstone_value must not be empty".into(),
            ));
        }
        if self.index_sparsity == 0 {
            return Err(StoreError::InvalidArgument(
                "index_sparsity must be ≥ 1".into(),
            ));
        }
        if self.flush_threshold == 0 {
            return Err(StoreError::InvalidArgument(
                "flush_threshold must be ≥ 1".into(),
            ));
        }
        if self.max_level0_segments == 0 {
            return Err(StoreError::InvalidArgument(
                "max_level0_segments must be ≥ 1".into(),
            ));
        }
        if self.level_file_size == 0 {
            return Err(StoreError::InvalidArgument(
                "level_file_size must be ≥ 1".into(),
            ));
        }
        if self.level_count < 2 {
            return Err(StoreError::InvalidArgument(
                "level_count must be ≥ 2".into(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Public result / stats types
// ------------------------------------------------------------------------------------------------

/// Result of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    /// The key exists; its most recent value is returned.
    Found(Vec<u8>),

    /// The key's most recent observation is a tombstone.
    Deleted,

    /// The key is absent from every tier.
    NotFound,
}

/// Snapshot of store statistics returned by [`Store::stats`].
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Records resident in the live memtable.
    pub memtable_len: usize,

    /// Frozen memtables awaiting flush.
    pub flushing_count: usize,

    /// Segment count per level, index 0 = level 0.
    pub segments_per_level: Vec<usize>,
}

// ------------------------------------------------------------------------------------------------
// Store state
// ------------------------------------------------------------------------------------------------

/// State behind the memory lock: the live memtable and the flushing list.
struct MemoryState {
    /// Mutable memtable receiving writes.
    active: Memtable,

    /// Frozen memtables awaiting flush, newest-first. Kept readable until
    /// their level-0 segment is installed.
    flushing: Vec<Arc<Memtable>>,
}

/// State behind the segment lock: the per-level segment lists and the
/// single-compactor flag.
struct SegmentState {
    /// `levels[0]` is newest-first with freely overlapping key ranges;
    /// every `levels[l ≥ 1]` is ascending and disjoint by key range.
    levels: Vec<Vec<Arc<Segment>>>,

    /// `true` while a compaction task owns the (single) compaction slot.
    compacting: bool,
}

struct StoreInner {
    config: StoreConfig,
    memory: RwLock<MemoryState>,
    segments: RwLock<SegmentState>,

    /// Global record count across all tiers. Grows with inserting writes,
    /// shrinks by the duplicates collapsed in each compaction.
    total_records: AtomicU64,

    /// Set by [`Store::close`]; consulted by the compaction loop before
    /// each re-invocation and by the write path.
    closing: AtomicBool,

    /// Join handles of spawned background tasks, drained by
    /// [`Store::quiesce`] / [`Store::close`].
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StoreInner {
    /// Spawns a background task bound to this store and registers its
    /// join handle.
    fn spawn_task(
        self: &Arc<Self>,
        name: &str,
        f: impl FnOnce(Arc<StoreInner>) + Send + 'static,
    ) {
        let task_inner = Arc::clone(self);
        match thread::Builder::new()
            .name(name.to_string())
            .spawn(move || f(task_inner))
        {
            Ok(handle) => {
                if let Ok(mut tasks) = self.tasks.lock() {
                    tasks.push(handle);
                }
            }
            Err(e) => error!(task = name, error = %e, "failed to spawn background task"),
        }
    }
}

/// The main LSM store handle.
///
/// Thread-safe — can be cloned and shared across threads; all clones
/// address the same underlying store.
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Store {
    /// Creates a store with the given configuration.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        info!(
            flush_threshold = config.flush_threshold,
            max_level0_segments = config.max_level0_segments,
            level_file_size = config.level_file_size,
            level_count = config.level_count,
            index_sparsity = config.index_sparsity,
            "store opened"
        );

        let levels = vec![Vec::new(); config.level_count];
        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                memory: RwLock::new(MemoryState {
                    active: Memtable::new(),
                    flushing: Vec::new(),
                }),
                segments: RwLock::new(SegmentState {
                    levels,
                    compacting: false,
                }),
                total_records: AtomicU64::new(0),
                closing: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Creates a store with the default configuration, overriding only the
    /// flush threshold. A threshold of `0` means "use the configured
    /// default".
    pub fn with_flush_threshold(flush_threshold: usize) -> Result<Self, StoreError> {
        let mut config = StoreConfig::default();
        if flush_threshold > 0 {
            config.flush_threshold = flush_threshold;
        }
        Self::new(config)
    }

    // --------------------------------------------------------------------------------------------
    // Write path
    // --------------------------------------------------------------------------------------------

    /// Inserts or updates a key.
    ///
    /// Rejects an empty key, an empty value, and a value equal to the
    /// reserved tombstone sentinel — in each case with no change to the
    /// store.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if value == self.inner.config.tombstone_value.as_slice() {
            error!(
                key = %KeyDisplay(key),
                "rejected put of the reserved tombstone value"
            );
            return Err(StoreError::InvalidArgument(
                "value equals the reserved tombstone sentinel".into(),
            ));
        }
        self.write_record(key, value)
    }

    /// Deletes a key by recording a tombstone for it.
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let tombstone = self.inner.config.tombstone_value.clone();
        self.write_record(key, &tombstone)
    }

    fn write_record(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }

        let mut memory = self
            .inner
            .memory
            .write()
            .map_err(|_| lock_poisoned("memory"))?;

        let grew = memory.active.insert(key, value)?;
        if grew {
            self.inner.total_records.fetch_add(1, Ordering::SeqCst);
        }

        if self.inner.config.tracing {
            trace!(key = %KeyDisplay(key), grew, "write applied to memtable");
        }

        if memory.active.len() >= self.inner.config.flush_threshold {
            self.freeze_and_schedule_flush(&mut memory);
        }
        Ok(())
    }

    /// Freezes the live memtable and schedules its flush. The caller holds
    /// the memory write lock.
    fn freeze_and_schedule_flush(&self, memory: &mut MemoryState) {
        let frozen = Arc::new(std::mem::take(&mut memory.active));
        memory.flushing.insert(0, Arc::clone(&frozen));

        debug!(
            record_count = frozen.len(),
            flushing_count = memory.flushing.len(),
            "memtable frozen, flush scheduled"
        );

        self.inner
            .spawn_task("stratumdb-flush", move |inner| flush_task(inner, frozen));
    }

    // --------------------------------------------------------------------------------------------
    // Read path
    // --------------------------------------------------------------------------------------------

    /// Looks up a key.
    ///
    /// The traversal is strictly newest-first: live memtable, flushing
    /// memtables, level-0 segments, then one range-matching segment per
    /// deeper level. The first hit — tombstones included — is
    /// authoritative.
    pub fn get(&self, key: &[u8]) -> Result<GetResult, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("empty key".into()));
        }

        // Memory view: live memtable, then flushing memtables newest-first.
        {
            let memory = self
                .inner
                .memory
                .read()
                .map_err(|_| lock_poisoned("memory"))?;

            if let Some(value) = memory.active.get(key) {
                return Ok(self.resolve(key, value, "memtable"));
            }
            for frozen in &memory.flushing {
                if let Some(value) = frozen.get(key) {
                    return Ok(self.resolve(key, value, "flushing memtable"));
                }
            }
        }

        // Segment view: level 0 newest-first, then at most one
        // range-matching segment per deeper level.
        let segments = self
            .inner
            .segments
            .read()
            .map_err(|_| lock_poisoned("segment"))?;

        for segment in &segments.levels[0] {
            match segment.lookup(key) {
                Ok(Some(value)) => return Ok(self.resolve(key, &value, "level-0 segment")),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        segment = segment.id(),
                        error = %e,
                        "segment lookup failed; read reports not-found"
                    );
                    return Ok(GetResult::NotFound);
                }
            }
        }

        for level in &segments.levels[1..] {
            let idx = level.partition_point(|seg| seg.key_range().1 < key);
            let Some(segment) = level.get(idx) else {
                continue;
            };
            if !segment.contains_key(key) {
                continue;
            }
            match segment.lookup(key) {
                Ok(Some(value)) => {
                    return Ok(self.resolve(key, &value, "leveled segment"));
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        segment = segment.id(),
                        error = %e,
                        "segment lookup failed; read reports not-found"
                    );
                    return Ok(GetResult::NotFound);
                }
            }
        }

        if self.inner.config.tracing {
            trace!(key = %KeyDisplay(key), "get: key absent from every tier");
        }
        Ok(GetResult::NotFound)
    }

    fn resolve(&self, key: &[u8], value: &[u8], tier: &str) -> GetResult {
        if self.inner.config.tracing {
            trace!(key = %KeyDisplay(key), tier, "get: hit");
        }
        if value == self.inner.config.tombstone_value.as_slice() {
            GetResult::Deleted
        } else {
            GetResult::Found(value.to_vec())
        }
    }

    // --------------------------------------------------------------------------------------------
    // Introspection
    // --------------------------------------------------------------------------------------------

    /// Total record count across all tiers: live memtable, flushing
    /// memtables, and every segment on every level.
    pub fn total_records(&self) -> u64 {
        self.inner.total_records.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of store statistics.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let (memtable_len, flushing_count) = {
            let memory = self
                .inner
                .memory
                .read()
                .map_err(|_| lock_poisoned("memory"))?;
            (memory.active.len(), memory.flushing.len())
        };
        let segments_per_level = {
            let segments = self
                .inner
                .segments
                .read()
                .map_err(|_| lock_poisoned("segment"))?;
            segments.levels.iter().map(Vec::len).collect()
        };
        Ok(StoreStats {
            memtable_len,
            flushing_count,
            segments_per_level,
        })
    }

    /// Returns a snapshot of the per-level segment lists, `levels[0]`
    /// newest-first and deeper levels ascending by key range.
    pub fn segment_levels(&self) -> Result<Vec<Vec<Arc<Segment>>>, StoreError> {
        let segments = self
            .inner
            .segments
            .read()
            .map_err(|_| lock_poisoned("segment"))?;
        Ok(segments.levels.clone())
    }

    // --------------------------------------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------------------------------------

    /// Blocks until every outstanding background flush and compaction has
    /// finished. New work scheduled by in-flight tasks is waited for too.
    pub fn quiesce(&self) {
        loop {
            let handles = match self.inner.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => {
                    error!("task registry lock poisoned; quiesce aborted");
                    return;
                }
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if handle.join().is_err() {
                    error!("background task panicked");
                }
            }
        }
    }

    /// Closes the store: rejects further writes, stops compaction
    /// re-invocation, and drains all outstanding background work.
    pub fn close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.quiesce();
        info!("store closed");
    }
}

// ------------------------------------------------------------------------------------------------
// Background tasks
// ------------------------------------------------------------------------------------------------

/// Converts a frozen memtable into a level-0 segment, installs it, and
/// unlinks the frozen memtable from the flushing list — in that order, so
/// the key set stays visible throughout.
///
/// Flushes build their segments concurrently, but installs are serialized
/// in freeze order: a task may only install once its memtable is the
/// oldest one still flushing. Installing out of order would place an older
/// segment above a newer one in level 0 and break the newest-first read
/// invariant.
fn flush_task(inner: Arc<StoreInner>, frozen: Arc<Memtable>) {
    let records = frozen.to_records();
    let segment = match Segment::build(0, &records, inner.config.index_sparsity) {
        Ok(segment) => Arc::new(segment),
        Err(e) => {
            error!(
                error = %e,
                dropped_records = frozen.len(),
                "flush aborted: could not build level-0 segment"
            );
            // Unlink the unflushable memtable so younger flushes can
            // proceed, and keep the global count in step with the tiers.
            if let Ok(mut memory) = inner.memory.write() {
                memory.flushing.retain(|m| !Arc::ptr_eq(m, &frozen));
            }
            inner
                .total_records
                .fetch_sub(frozen.len() as u64, Ordering::SeqCst);
            return;
        }
    };

    // Wait for every older flush to install and unlink first. The frozen
    // list is newest-first, so "last" is the oldest pending memtable.
    loop {
        match inner.memory.read() {
            Ok(memory) => match memory.flushing.last() {
                Some(oldest) if Arc::ptr_eq(oldest, &frozen) => break,
                Some(_) => {}
                None => {
                    error!("frozen memtable missing from the flushing list; flush aborted");
                    return;
                }
            },
            Err(_) => {
                error!("memory lock poisoned; flush aborted");
                return;
            }
        }
        thread::yield_now();
    }

    {
        let mut segments = match inner.segments.write() {
            Ok(guard) => guard,
            Err(_) => {
                error!("segment lock poisoned; flush aborted");
                return;
            }
        };
        segments.levels[0].insert(0, Arc::clone(&segment));

        info!(
            id = segment.id(),
            record_count = segment.len(),
            level0_count = segments.levels[0].len(),
            "flushed memtable into level 0"
        );

        if segments.levels[0].len() >= inner.config.max_level0_segments && !segments.compacting {
            segments.compacting = true;
            inner.spawn_task("stratumdb-compaction", compaction_task);
        }
    }

    match inner.memory.write() {
        Ok(mut memory) => memory.flushing.retain(|m| !Arc::ptr_eq(m, &frozen)),
        Err(_) => error!("memory lock poisoned; frozen memtable not unlinked"),
    }
}

/// Runs compaction rounds until level 0 drops below its threshold, the
/// store is closing, or a round fails. Owns the single compaction slot.
fn compaction_task(inner: Arc<StoreInner>) {
    loop {
        if inner.closing.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = compact_level_zero(&inner) {
            error!(error = %e, "compaction task aborted");
            break;
        }
        // Concurrent flushes may have refilled level 0 while the merge ran
        // without the lock; keep going while the threshold holds.
        match inner.segments.write() {
            Ok(mut segments) => {
                if segments.levels[0].len() >= inner.config.max_level0_segments
                    && !inner.closing.load(Ordering::SeqCst)
                {
                    continue;
                }
                segments.compacting = false;
                return;
            }
            Err(_) => {
                error!("segment lock poisoned; compaction task exiting");
                return;
            }
        }
    }

    if let Ok(mut segments) = inner.segments.write() {
        segments.compacting = false;
    }
}

/// One compaction round: merge the level-0 snapshot with the overlapping
/// level-1 run and swap the result in atomically.
fn compact_level_zero(inner: &StoreInner) -> Result<(), StoreError> {
    // Snapshot under the segment read lock; the merge itself runs
    // lock-free on immutable segments.
    let (f0, f1) = {
        let segments = inner
            .segments
            .read()
            .map_err(|_| lock_poisoned("segment"))?;
        let f0 = segments.levels[0].clone();
        let (Some(min_key), Some(max_key)) =
            (utils::min_first_key(&f0), utils::max_last_key(&f0))
        else {
            return Ok(());
        };
        let f1 = compaction::select_overlapping(&segments.levels[1], &min_key, &max_key);
        (f0, f1)
    };

    info!(
        level0_count = f0.len(),
        level1_overlap = f1.len(),
        "compaction round started"
    );

    let n1 = compaction::merge(
        &f0,
        &f1,
        inner.config.level_file_size,
        inner.config.index_sparsity,
    )?;

    let mut segments = inner
        .segments
        .write()
        .map_err(|_| lock_poisoned("segment"))?;

    let f0_ids: Vec<u64> = f0.iter().map(|s| s.id()).collect();
    let f1_ids: Vec<u64> = f1.iter().map(|s| s.id()).collect();
    segments.levels[0].retain(|seg| !f0_ids.contains(&seg.id()));
    segments.levels[1].retain(|seg| !f1_ids.contains(&seg.id()));

    let before: usize = f0.iter().chain(f1.iter()).map(|s| s.len()).sum();
    let after: usize = n1.iter().map(|s| s.len()).sum();
    let installed = n1.len();
    utils::ordered_insert(&mut segments.levels[1], n1);

    inner
        .total_records
        .fetch_sub((before - after) as u64, Ordering::SeqCst);

    info!(
        removed = f0_ids.len() + f1_ids.len(),
        installed,
        collapsed = before - after,
        "compaction round installed"
    );
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Tracing Helper
// ------------------------------------------------------------------------------------------------

/// Renders a key for log output: printable ASCII keys verbatim, anything
/// else as truncated hex.
struct KeyDisplay<'a>(&'a [u8]);

impl std::fmt::Display for KeyDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let printable = self.0.len() <= 40
            && self
                .0
                .iter()
                .all(|b| b.is_ascii_graphic() || *b == b' ');
        if printable {
            for b in self.0 {
                write!(f, "{}", *b as char)?;
            }
        } else {
            for b in self.0.iter().take(16) {
                write!(f, "{b:02x}")?;
            }
            if self.0.len() > 16 {
                write!(f, "…[{} bytes]", self.0.len())?;
            }
        }
        Ok(())
    }
}
