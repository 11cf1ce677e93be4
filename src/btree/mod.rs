//! # B-Tree Module
//!
//! The tree layer on top of the pager: node records and their codec, the
//! key comparator, per-page locking, the tree algorithms, and the per-key
//! value iterator.
//!
//! ## Module Organization
//!
//! - `node`: `Node` and `KeyRecord`, the persisted records
//! - `codec`: bincode serialization, bounded by `PAGE_SIZE`
//! - `compare`: unsigned lexicographic key ordering
//! - `locks`: the per-page lock map
//! - `tree`: `BTree` and every public operation
//! - `iter`: `ValueIter`, the per-key value cursor

pub mod codec;
pub mod compare;
mod iter;
mod locks;
pub mod node;
mod tree;

pub use iter::ValueIter;
pub use node::{KeyRecord, Node};
pub use tree::{BTree, ROOT_PAGE};
