//! # StratumDB
//!
//! An embeddable, in-process ordered key-value store built on a **leveled
//! Log-Structured Merge tree (LSM-tree)**. Keys and values are opaque byte
//! strings under lexicographic order. Designed for fast writes with
//! background flushing and compaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                       Store                           │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────┐  │
//! │  │   Live      │  │   Flushing   │  │   Segments   │  │
//! │  │   memtable  │  │   memtables  │  │  L0, L1, …   │  │
//! │  └─────┬───────┘  └──────┬───────┘  └──────┬───────┘  │
//! │        │   freeze        │   flush         │          │
//! │        └─────────►       └────────►        │          │
//! │                                            │          │
//! │  ┌─────────────────────────────────────────┘          │
//! │  │  Compaction (level 0 → level 1, recency-folding)   │
//! │  └────────────────────────────────────────────────────│
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`store`] | The LSM store — put, delete, get, flush and compaction scheduling |
//! | [`memtable`] | Mutable ordered write buffer with bound probes |
//! | [`segment`] | Immutable sorted runs with sparse indices and bloom filters |
//! | [`compaction`] | Level-0 → level-1 merge engine |
//! | [`encoding`] | Deterministic binary encoding of segment payloads |
//!
//! ## Key Properties
//!
//! - **Newest wins** — reads traverse the tiers newest-first; the first
//!   hit, tombstones included, is authoritative.
//! - **Background maintenance** — flushes and compactions run on
//!   dedicated tasks; callers only block on the two state locks.
//! - **Per-record integrity** — every record cell in a segment payload
//!   carries a CRC32 verified on decode.
//! - **Bounded levels** — level-≥1 segments are key-disjoint, globally
//!   sorted, and capped in record count.
//!
//! ## Quick Start
//!
//! ```rust
//! use stratumdb::{GetResult, Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::default()).unwrap();
//!
//! // Write
//! store.put(b"hello", b"world").unwrap();
//! assert_eq!(
//!     store.get(b"hello").unwrap(),
//!     GetResult::Found(b"world".to_vec())
//! );
//!
//! // Delete
//! store.delete(b"hello").unwrap();
//! assert_eq!(store.get(b"hello").unwrap(), GetResult::Deleted);
//!
//! // Never written
//! assert_eq!(store.get(b"absent").unwrap(), GetResult::NotFound);
//!
//! // Graceful shutdown: drain background flushes and compactions.
//! store.close();
//! ```

pub mod compaction;
pub mod encoding;
pub mod memtable;
pub mod segment;
pub mod store;

pub use store::{DEFAULT_TOMBSTONE_VALUE, GetResult, Store, StoreConfig, StoreError, StoreStats};
