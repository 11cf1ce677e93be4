//! # Page-Level Locking
//!
//! The tree keeps a map of per-page reader-writer locks so readers of
//! disjoint pages never contend and a writer only excludes traffic on the
//! pages it mutates. Locks are created on first touch and handed out as
//! `Arc<RwLock<()>>` so a caller can hold a guard across pager I/O.
//!
//! Whole-key delete runs under the tree-wide lock and rebuilds this map
//! from scratch, since merges free pages and change the id space.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

/// Map of per-page locks, created lazily on first access.
#[derive(Debug, Default)]
pub(crate) struct PageLocks {
    map: Mutex<HashMap<u64, Arc<RwLock<()>>>>,
}

impl PageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates locks for pages `0..pages`, mirroring what an open
    /// does for an existing file.
    pub fn with_pages(pages: u64) -> Self {
        let locks = Self::new();
        locks.fill(pages);
        locks
    }

    /// Returns the lock for `page`, creating it on first touch.
    pub fn lock_for(&self, page: u64) -> Arc<RwLock<()>> {
        let mut map = self.map.lock();
        Arc::clone(map.entry(page).or_default())
    }

    /// Drops every lock and re-creates entries for pages `0..pages`.
    pub fn rebuild(&self, pages: u64) {
        self.map.lock().clear();
        self.fill(pages);
    }

    fn fill(&self, pages: u64) {
        let mut map = self.map.lock();
        for page in 0..pages {
            map.entry(page).or_default();
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }
}
