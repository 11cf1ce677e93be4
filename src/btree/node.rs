//! # Node Records
//!
//! A node is the unit the tree persists: an ordered run of key records,
//! child page ids (empty for leaves), and the flags that drive the overflow
//! and reclamation protocols. Keys and values are opaque byte strings; the
//! codec in [`super::codec`] round-trips the whole record.

use serde::{Deserialize, Serialize};

use super::compare;

/// One key and its ordered value list, plus the link to an overflow chain
/// when the list no longer fits in the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: Vec<u8>,
    pub values: Vec<Vec<u8>>,
    pub overflowed: bool,
    pub overflow_page: u64,
}

impl KeyRecord {
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            values: vec![value.to_vec()],
            overflowed: false,
            overflow_page: 0,
        }
    }
}

/// A B-tree node as stored on one logical page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Logical page id. Normalized from the page being read, so stored
    /// bytes never go stale when a node is copied between pages.
    pub page: u64,
    pub keys: Vec<KeyRecord>,
    /// Child page ids; empty iff `leaf`.
    pub children: Vec<u64>,
    pub leaf: bool,
    /// Set on nodes that extend a key's value list off-page.
    pub overflow: bool,
    /// Marks a detached overflow node as reclaimable by a future overflow
    /// allocation.
    pub reuse: bool,
}

impl Node {
    pub fn new(page: u64, leaf: bool) -> Self {
        Self {
            page,
            keys: Vec::new(),
            children: Vec::new(),
            leaf,
            overflow: false,
            reuse: false,
        }
    }

    /// A node at the split threshold for minimum degree `t`.
    pub fn is_full(&self, t: usize) -> bool {
        self.keys.len() == 2 * t - 1
    }

    /// Binary-locates `key`: `Ok(i)` when `keys[i]` holds it, `Err(i)` with
    /// the child index to descend into (equally, the insertion position).
    pub fn search(&self, key: &[u8]) -> Result<usize, usize> {
        self.keys
            .binary_search_by(|record| compare::key_cmp(&record.key, key))
    }
}
