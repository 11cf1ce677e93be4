//! # burrowdb - Embedded Disk B-Tree Multi-Map
//!
//! burrowdb is an embedded, disk-resident ordered multi-map: every key (an
//! opaque byte string) maps to an ordered list of opaque byte values,
//! persisted in a single data file through a page-addressed B-tree of
//! minimum degree T. Value lists that outgrow their node spill into chains
//! of overflow pages; freed pages are tracked in a sidecar file and reused
//! before the data file grows.
//!
//! ## Quick Start
//!
//! ```ignore
//! use burrowdb::BTree;
//!
//! let tree = BTree::open("./data/index", 3)?;
//! tree.put(b"user:1", b"alice")?;
//! tree.put(b"user:1", b"alice@example.com")?;
//!
//! let values = tree.get(b"user:1")?;          // both values, in order
//! let keys = tree.range(b"user:0", b"user:9")?;
//! tree.close()?;
//! ```
//!
//! ## Architecture
//!
//! Two layers, leaves first:
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │    Public API (BTree, ValueIter)      │
//! ├───────────────────────────────────────┤
//! │  B-tree: split/merge, overflow chains │
//! │  per-page locks, key comparator       │
//! ├───────────────────────────────────────┤
//! │  Pager: slotted data file, free list  │
//! └───────────────────────────────────────┘
//! ```
//!
//! The pager owns two files per tree: `<name>` (fixed-size physical slots
//! of header + payload) and `<name>.del` (the persisted free-page list).
//! The root node always lives at logical page 0.
//!
//! ## Concurrency
//!
//! A `BTree` is `Send + Sync`; all operations take `&self`. Readers take
//! per-page read locks down the search path; writers serialize on the root
//! page lock; whole-key `delete` takes a tree-wide write lock because it
//! frees pages and rebuilds the lock map.
//!
//! ## Durability
//!
//! Best effort only: there is no write-ahead log and no crash recovery. An
//! error mid-mutation leaves the file in the state of the last successful
//! page write. `close` flushes the data file and the free list.
//!
//! ## Module Overview
//!
//! - [`storage`]: pager, slot layout, free-list persistence
//! - [`btree`]: the tree, node records and codec, iterator, locking

pub mod btree;
pub mod storage;

pub use btree::{BTree, KeyRecord, Node, ValueIter, ROOT_PAGE};
pub use storage::{Pager, HEADER_SIZE, PAGE_SIZE, SLOT_SIZE};
