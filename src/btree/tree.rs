//! # Disk B-Tree
//!
//! This module implements the tree itself: a B-tree of minimum degree T
//! whose nodes live on pager-managed logical pages. Every key maps to an
//! ordered list of values, and a value list that outgrows its node spills
//! into a chain of dedicated overflow pages.
//!
//! ## Layout Invariants
//!
//! - The root always occupies logical page 0 for the lifetime of the tree.
//!   Splits move the root's *contents* to a fresh page and rebuild page 0;
//!   merges that empty an internal root copy the lone child back into
//!   page 0.
//! - Non-root nodes hold between T−1 and 2T−1 keys; an internal node with
//!   k keys has exactly k+1 children; all leaves sit at the same depth.
//! - A node whose encoded form would exceed half a page sheds the newest
//!   value of the offending key into an overflow node: a single-key leaf on
//!   its own page that may chain further through its own overflow link.
//!
//! ## Insert
//!
//! `put` follows the classic top-down scheme: a full root is split before
//! the descent, every full child is split on the way down, and the key
//! lands in a non-full node. Appending to an existing key re-checks the
//! encoded size and hands the value to the overflow protocol when the node
//! crosses the threshold.
//!
//! ## Delete
//!
//! Whole-key `delete` is the textbook top-down algorithm: an under-full child
//! is fixed before the descent by borrowing from a sibling or merging, and
//! a key found in an internal node is replaced by its predecessor or
//! successor (or merged around) and removed recursively. Pages freed by
//! merges return to the pager's free list; pages of the key's overflow
//! chain are instead marked `reuse` in-band and picked up by the next
//! overflow allocation.
//!
//! ## Locking
//!
//! A tree-wide reader-writer lock is held in read mode by every operation
//! except whole-key `delete`, which takes it in write mode (it frees pages
//! and rebuilds the page-lock map). Below that, `put` keeps the root page
//! write-locked for the whole operation and write-locks each child it
//! descends into; reads take per-page read locks down the search path.
//! Writers therefore serialize at the root while readers of disjoint pages
//! proceed concurrently.

use std::fs::OpenOptions;
use std::path::Path;

use eyre::{bail, ensure, Result};
use log::debug;
use parking_lot::RwLock;

use crate::storage::{Pager, PAGE_SIZE};

use super::codec;
use super::compare;
use super::iter::ValueIter;
use super::locks::PageLocks;
use super::node::{KeyRecord, Node};

/// The root's logical page id, fixed for the lifetime of a tree.
pub const ROOT_PAGE: u64 = 0;

/// An embedded, disk-resident ordered multi-map.
///
/// All operations take `&self`; a `BTree` can be shared across threads
/// behind an `Arc`.
#[derive(Debug)]
pub struct BTree {
    pager: Pager,
    t: usize,
    tree_lock: RwLock<()>,
    page_locks: PageLocks,
}

impl BTree {
    /// Opens (creating if missing) the tree stored at `path` with minimum
    /// degree `t`. A fresh file gets an empty leaf root at page 0.
    pub fn open<P: AsRef<Path>>(path: P, t: usize) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        Self::open_with(&options, path, t)
    }

    /// Opens the tree with caller-supplied open options for the data file.
    pub fn open_with<P: AsRef<Path>>(options: &OpenOptions, path: P, t: usize) -> Result<Self> {
        ensure!(t >= 2, "minimum degree must be at least 2, got {t}");

        let pager = Pager::open_with(options, path)?;
        let page_locks = PageLocks::with_pages(pager.page_total()?);
        let tree = Self {
            pager,
            t,
            tree_lock: RwLock::new(()),
            page_locks,
        };

        // Synthesizes the empty leaf root on a fresh file.
        tree.root()?;
        Ok(tree)
    }

    /// Persists the free list and flushes the data file.
    pub fn close(self) -> Result<()> {
        self.pager.sync()
    }

    /// The configured minimum degree.
    pub fn degree(&self) -> usize {
        self.t
    }

    /// The underlying pager.
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Inserts `value` under `key`. An existing key gains the value at the
    /// end of its list; a brand-new key is placed in order.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _tree = self.tree_lock.read();
        let root_lock = self.page_locks.lock_for(ROOT_PAGE);
        let _root_guard = root_lock.write();

        let mut root = self.root()?;
        if root.is_full(self.t) {
            self.split_root()?;
            root = self.read_node(ROOT_PAGE)?;
        }
        self.insert_non_full(&mut root, key, value)
    }

    /// Returns every value stored under `key` in insertion order: the
    /// inline values followed by the overflow chain. A missing key yields
    /// an empty list.
    pub fn get(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let _tree = self.tree_lock.read();
        let root = self.root()?;
        self.search_values(&root, key)
    }

    /// Removes the first occurrence of `value` from `key`'s list, checking
    /// inline values before the overflow chain.
    ///
    /// A key whose list becomes empty stays in the tree with zero values.
    pub fn remove(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _tree = self.tree_lock.read();
        let root_lock = self.page_locks.lock_for(ROOT_PAGE);
        let _root_guard = root_lock.write();

        let mut x = self.root()?;
        loop {
            match x.search(key) {
                Ok(i) => {
                    if let Some(pos) = x.keys[i].values.iter().position(|v| v == value) {
                        x.keys[i].values.remove(pos);
                        return self.write_node(&x);
                    }

                    let mut overflowed = x.keys[i].overflowed;
                    let mut page = x.keys[i].overflow_page;
                    while overflowed {
                        let mut node = self.read_node(page)?;
                        ensure!(
                            !node.keys.is_empty(),
                            "overflow page {page} holds no key record"
                        );
                        if let Some(pos) = node.keys[0].values.iter().position(|v| v == value) {
                            node.keys[0].values.remove(pos);
                            return self.write_node(&node);
                        }
                        overflowed = node.keys[0].overflowed;
                        page = node.keys[0].overflow_page;
                    }
                    bail!("value not found");
                }
                Err(_) if x.leaf => bail!("key not found"),
                Err(i) => x = self.read_node(x.children[i])?,
            }
        }
    }

    /// Deletes `key` and its entire value list. Pages of the key's overflow
    /// chain are marked reusable; a missing key is a no-op.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let _tree = self.tree_lock.write();
        self.page_locks.rebuild(0);

        let mut root = self.root()?;
        self.delete_key(&mut root, key, true)?;

        let root = self.read_node(ROOT_PAGE)?;
        if !root.leaf && root.keys.is_empty() {
            // Height shrinks: the lone child becomes the root in place.
            let child = self.read_node(root.children[0])?;
            let mut collapsed = child.clone();
            collapsed.page = ROOT_PAGE;
            self.write_node(&collapsed)?;
            self.pager.delete(child.page)?;
            debug!("collapsed root, freed page {}", child.page);
        }

        self.page_locks.rebuild(self.pager.page_total()?);
        Ok(())
    }

    /// Keys in `[start, end]`, both inclusive, in order. Records carry
    /// inline values only.
    pub fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<KeyRecord>> {
        let _tree = self.tree_lock.read();
        let root = self.root()?;
        let mut out = Vec::new();
        self.collect_range(&root, start, end, &mut out)?;
        Ok(out)
    }

    /// Keys outside `[start, end]`, in order.
    pub fn n_range(&self, start: &[u8], end: &[u8]) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|k| compare::less(k, start) || compare::greater(k, end))
    }

    /// Keys strictly below `key`, in order.
    pub fn less_than(&self, key: &[u8]) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|k| compare::less(k, key))
    }

    /// Keys at or below `key`, in order.
    pub fn less_than_eq(&self, key: &[u8]) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|k| compare::less_eq(k, key))
    }

    /// Keys strictly above `key`, in order.
    pub fn greater_than(&self, key: &[u8]) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|k| compare::greater(k, key))
    }

    /// Keys at or above `key`, in order.
    pub fn greater_than_eq(&self, key: &[u8]) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|k| compare::greater_eq(k, key))
    }

    /// Every key except `key`, in order.
    pub fn n_get(&self, key: &[u8]) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|k| k != key)
    }

    /// Every key, in order.
    pub fn in_order(&self) -> Result<Vec<KeyRecord>> {
        self.scan_filtered(&|_| true)
    }

    /// A cursor over `key`'s values, in insertion order across the inline
    /// list and the overflow chain. Errors when `key` is absent.
    pub fn iterator_from(&self, key: &[u8]) -> Result<ValueIter<'_>> {
        let (node, key_index) = {
            let _tree = self.tree_lock.read();
            let root = self.root()?;
            self.find_key(&root, key)?
        };
        Ok(ValueIter::new(self, node, key_index))
    }

    /// Validates the structural invariants: child/key arity, strict key
    /// ordering within and across subtrees, uniform leaf depth, and the
    /// root's residence at page 0.
    pub fn check_integrity(&self) -> Result<()> {
        let _tree = self.tree_lock.read();
        let root = self.root()?;
        ensure!(root.page == ROOT_PAGE, "root has strayed from page 0");
        ensure!(
            root.keys.len() <= 2 * self.t - 1,
            "root holds {} keys, more than {}",
            root.keys.len(),
            2 * self.t - 1
        );

        if root.leaf && root.keys.is_empty() {
            return Ok(());
        }
        let mut leaf_depth = None;
        self.check_subtree(&root, None, None, 0, &mut leaf_depth, true)
    }

    /// Renders the keys of every node, one line per node with its level.
    pub fn dump(&self) -> Result<String> {
        let _tree = self.tree_lock.read();
        let root = self.root()?;
        let mut out = String::new();
        self.dump_node(&root, 0, &mut out)?;
        Ok(out)
    }

    // ---- node I/O ----------------------------------------------------

    /// Loads the root, synthesizing an empty leaf at page 0 when the data
    /// file does not reach that far yet.
    fn root(&self) -> Result<Node> {
        match self.pager.get(ROOT_PAGE) {
            Ok(bytes) if !bytes.is_empty() => {
                let mut node = codec::decode(&bytes)?;
                node.page = ROOT_PAGE;
                Ok(node)
            }
            Ok(_) => bail!("root page is on the free list"),
            Err(err) if is_past_eof(&err) => {
                let root = Node::new(ROOT_PAGE, true);
                self.write_node(&root)?;
                debug!("synthesized empty root");
                Ok(root)
            }
            Err(err) => Err(err),
        }
    }

    fn read_node(&self, page: u64) -> Result<Node> {
        let bytes = self.pager.get(page)?;
        ensure!(!bytes.is_empty(), "page {page} is on the free list");
        let mut node = codec::decode(&bytes)?;
        node.page = page;
        Ok(node)
    }

    fn write_node(&self, node: &Node) -> Result<()> {
        let bytes = codec::encode(node)?;
        self.pager.write_to(node.page, &bytes)
    }

    /// Allocates a page and writes a fresh node to it.
    fn new_node(&self, leaf: bool, overflow: bool) -> Result<Node> {
        let page = self.pager.write(&[])?;
        let mut node = Node::new(page, leaf);
        node.overflow = overflow;
        self.write_node(&node)?;
        Ok(node)
    }

    /// Reads an overflow-chain node under its page read lock. Used by the
    /// value iterator between `next` calls.
    pub(crate) fn chain_node(&self, page: u64) -> Result<Node> {
        let _tree = self.tree_lock.read();
        let lock = self.page_locks.lock_for(page);
        let _guard = lock.read();
        self.read_node(page)
    }

    // ---- insertion ---------------------------------------------------

    /// Moves the full root's contents to a fresh page and rebuilds page 0
    /// as an internal root over it.
    fn split_root(&self) -> Result<()> {
        let old_root = self.read_node(ROOT_PAGE)?;

        let mut carried = self.new_node(old_root.leaf, false)?;
        let carried_lock = self.page_locks.lock_for(carried.page);
        let _carried_guard = carried_lock.write();
        carried.keys = old_root.keys;
        carried.children = old_root.children;

        let mut new_root = Node::new(ROOT_PAGE, false);
        new_root.children.push(carried.page);
        self.split_child(&mut new_root, 0, &mut carried)?;
        debug!("root split, contents moved to page {}", carried.page);
        Ok(())
    }

    /// Splits full child `y` of `x` at child index `i`, promoting the
    /// median into `x`. Persists `y`, the new sibling, and `x`, in that
    /// order.
    fn split_child(&self, x: &mut Node, i: usize, y: &mut Node) -> Result<()> {
        let t = self.t;
        let mut z = self.new_node(y.leaf, false)?;
        let z_lock = self.page_locks.lock_for(z.page);
        let _z_guard = z_lock.write();

        z.keys = y.keys.split_off(t);
        if !y.leaf {
            z.children = y.children.split_off(t);
        }
        let median = y
            .keys
            .pop()
            .ok_or_else(|| eyre::eyre!("split of node {} found no median", y.page))?;

        x.keys.insert(i, median);
        x.children.insert(i + 1, z.page);

        self.write_node(y)?;
        self.write_node(&z)?;
        self.write_node(x)
    }

    fn insert_non_full(&self, x: &mut Node, key: &[u8], value: &[u8]) -> Result<()> {
        match x.search(key) {
            Ok(i) => self.append_value(x, i, key, value),
            Err(i) if x.leaf => {
                x.keys.insert(i, KeyRecord::new(key, value));
                self.write_node(x)
            }
            Err(mut i) => {
                let mut child = self.read_node(x.children[i])?;
                if child.is_full(self.t) {
                    self.split_child(x, i, &mut child)?;
                    if compare::greater(key, &x.keys[i].key) {
                        i += 1;
                    } else if key == x.keys[i].key.as_slice() {
                        // The promoted median is the key itself.
                        return self.append_value(x, i, key, value);
                    }
                }
                let mut child = self.read_node(x.children[i])?;
                let child_lock = self.page_locks.lock_for(child.page);
                let _child_guard = child_lock.write();
                self.insert_non_full(&mut child, key, value)
            }
        }
    }

    /// Appends `value` to the key at `x.keys[i]`, diverting to the
    /// overflow protocol when the node would cross the size threshold.
    fn append_value(&self, x: &mut Node, i: usize, key: &[u8], value: &[u8]) -> Result<()> {
        x.keys[i].values.push(value.to_vec());
        if self.node_overflowed(x)? {
            x.keys[i].values.pop();
            return self.handle_key_overflow(x, i, key, value);
        }
        self.write_node(x)
    }

    /// Whether `node`'s encoded form exceeds the overflow threshold of
    /// half a page.
    fn node_overflowed(&self, node: &Node) -> Result<bool> {
        Ok(codec::encoded_size(node)? > (PAGE_SIZE / 2) as u64)
    }

    // ---- overflow protocol -------------------------------------------

    /// Diverts `value` into `key`'s overflow chain: the first overflow
    /// links a (preferably reclaimed) single-key node off `x.keys[i]`;
    /// later ones append at the chain tail, growing the chain when the
    /// tail itself crosses the threshold.
    fn handle_key_overflow(&self, x: &mut Node, i: usize, key: &[u8], value: &[u8]) -> Result<()> {
        if x.keys[i].overflowed {
            let mut tail = self.read_node(x.keys[i].overflow_page)?;
            loop {
                ensure!(
                    !tail.keys.is_empty(),
                    "overflow page {} holds no key record",
                    tail.page
                );
                if !tail.keys[0].overflowed {
                    break;
                }
                tail = self.read_node(tail.keys[0].overflow_page)?;
            }

            tail.keys[0].values.push(value.to_vec());
            if self.node_overflowed(&tail)? {
                tail.keys[0].values.pop();
                let fresh = self.new_overflow_node(key, value)?;
                tail.keys[0].overflowed = true;
                tail.keys[0].overflow_page = fresh.page;
                debug!("overflow chain extended to page {}", fresh.page);
            }
            self.write_node(&tail)
        } else {
            let target = match self.reusable_overflow_node()? {
                Some(mut node) => {
                    // Reclaimed node: reset it so no stale records survive.
                    node.keys = vec![KeyRecord::new(key, value)];
                    node.children.clear();
                    node.leaf = true;
                    node.overflow = true;
                    node.reuse = false;
                    node
                }
                None => {
                    let mut node = self.new_node(true, true)?;
                    node.keys.push(KeyRecord::new(key, value));
                    node
                }
            };

            x.keys[i].overflowed = true;
            x.keys[i].overflow_page = target.page;
            self.write_node(&target)?;
            self.write_node(x)
        }
    }

    fn new_overflow_node(&self, key: &[u8], value: &[u8]) -> Result<Node> {
        let mut node = self.new_node(true, true)?;
        node.keys.push(KeyRecord::new(key, value));
        self.write_node(&node)?;
        Ok(node)
    }

    /// Scans the file for a node marked `reuse`, the in-band reclamation
    /// path fed by whole-key deletes.
    fn reusable_overflow_node(&self) -> Result<Option<Node>> {
        let total = self.pager.page_total()?;
        for page in 0..total {
            let bytes = self.pager.get(page)?;
            if bytes.is_empty() {
                continue;
            }
            let Ok(mut node) = codec::decode(&bytes) else {
                continue;
            };
            if node.reuse {
                node.page = page;
                debug!("reclaiming overflow page {page}");
                return Ok(Some(node));
            }
        }
        Ok(None)
    }

    // ---- search ------------------------------------------------------

    fn search_values(&self, x: &Node, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let lock = self.page_locks.lock_for(x.page);
        let _guard = lock.read();

        match x.search(key) {
            Ok(i) => {
                let mut values = x.keys[i].values.clone();
                let mut overflowed = x.keys[i].overflowed;
                let mut page = x.keys[i].overflow_page;
                while overflowed {
                    let node = self.read_node(page)?;
                    ensure!(
                        !node.keys.is_empty(),
                        "overflow page {page} holds no key record"
                    );
                    values.extend(node.keys[0].values.iter().cloned());
                    overflowed = node.keys[0].overflowed;
                    page = node.keys[0].overflow_page;
                }
                Ok(values)
            }
            Err(_) if x.leaf => Ok(Vec::new()),
            Err(i) => {
                let child = self.read_node(x.children[i])?;
                self.search_values(&child, key)
            }
        }
    }

    /// Locates the node and key index holding `key`, for the iterator.
    fn find_key(&self, x: &Node, key: &[u8]) -> Result<(Node, usize)> {
        let lock = self.page_locks.lock_for(x.page);
        let _guard = lock.read();

        match x.search(key) {
            Ok(i) => Ok((x.clone(), i)),
            Err(_) if x.leaf => bail!("key not found"),
            Err(i) => {
                let child = self.read_node(x.children[i])?;
                self.find_key(&child, key)
            }
        }
    }

    // ---- scans -------------------------------------------------------

    fn scan_filtered(&self, pred: &dyn Fn(&[u8]) -> bool) -> Result<Vec<KeyRecord>> {
        let _tree = self.tree_lock.read();
        let root = self.root()?;
        let mut out = Vec::new();
        self.collect_filtered(&root, pred, &mut out)?;
        Ok(out)
    }

    /// In-order walk pushing every record whose key satisfies `pred`.
    fn collect_filtered(
        &self,
        x: &Node,
        pred: &dyn Fn(&[u8]) -> bool,
        out: &mut Vec<KeyRecord>,
    ) -> Result<()> {
        let lock = self.page_locks.lock_for(x.page);
        let _guard = lock.read();

        for i in 0..x.keys.len() {
            if !x.leaf {
                let child = self.read_node(x.children[i])?;
                self.collect_filtered(&child, pred, out)?;
            }
            if pred(&x.keys[i].key) {
                out.push(x.keys[i].clone());
            }
        }
        if !x.leaf {
            let child = self.read_node(x.children[x.keys.len()])?;
            self.collect_filtered(&child, pred, out)?;
        }
        Ok(())
    }

    /// In-order walk restricted to `[start, end]`, pruning subtrees the
    /// bounds exclude.
    fn collect_range(
        &self,
        x: &Node,
        start: &[u8],
        end: &[u8],
        out: &mut Vec<KeyRecord>,
    ) -> Result<()> {
        let lock = self.page_locks.lock_for(x.page);
        let _guard = lock.read();

        let mut i = x
            .keys
            .partition_point(|record| compare::less(&record.key, start));
        while i < x.keys.len() && compare::less_eq(&x.keys[i].key, end) {
            if !x.leaf {
                let child = self.read_node(x.children[i])?;
                self.collect_range(&child, start, end, out)?;
            }
            out.push(x.keys[i].clone());
            i += 1;
        }
        if !x.leaf && i < x.children.len() {
            let child = self.read_node(x.children[i])?;
            self.collect_range(&child, start, end, out)?;
        }
        Ok(())
    }

    // ---- deletion ----------------------------------------------------

    /// Textbook B-tree delete. `reclaim` marks the found key's overflow chain
    /// reusable; the inner recursions that remove a predecessor, successor,
    /// or merged-down separator pass `false` because the chain either moved
    /// with the promoted record or was already reclaimed.
    fn delete_key(&self, x: &mut Node, key: &[u8], reclaim: bool) -> Result<()> {
        let t = self.t;
        match x.search(key) {
            Ok(i) => {
                if reclaim {
                    self.reclaim_overflow_chain(&x.keys[i])?;
                }

                if x.leaf {
                    x.keys.remove(i);
                    return self.write_node(x);
                }

                let mut y = self.read_node(x.children[i])?;
                let mut z = self.read_node(x.children[i + 1])?;
                if y.keys.len() >= t {
                    let pred = self.max_key(&y)?;
                    x.keys[i] = pred.clone();
                    self.write_node(x)?;
                    self.delete_key(&mut y, &pred.key, false)
                } else if z.keys.len() >= t {
                    let succ = self.min_key(&z)?;
                    x.keys[i] = succ.clone();
                    self.write_node(x)?;
                    self.delete_key(&mut z, &succ.key, false)
                } else {
                    // Merge y, the separator, and z; the key comes out of
                    // the merged node.
                    let separator = x.keys.remove(i);
                    x.children.remove(i + 1);
                    y.keys.push(separator);
                    y.keys.extend(z.keys.iter().cloned());
                    y.children.extend(z.children.iter().cloned());
                    self.write_node(x)?;
                    self.write_node(&y)?;
                    self.pager.delete(z.page)?;
                    self.delete_key(&mut y, key, false)
                }
            }
            Err(_) if x.leaf => Ok(()),
            Err(i) => {
                let mut child = self.read_node(x.children[i])?;
                if child.keys.len() < t {
                    child = self.fix_child(x, i)?;
                }
                self.delete_key(&mut child, key, reclaim)
            }
        }
    }

    /// Brings the child at index `i` of `x` up to at least `t` keys before
    /// a delete descends into it: borrow from a sibling with keys to
    /// spare, else merge with one. Returns the node to descend into.
    fn fix_child(&self, x: &mut Node, i: usize) -> Result<Node> {
        let t = self.t;
        let mut child = self.read_node(x.children[i])?;

        if i > 0 {
            let mut left = self.read_node(x.children[i - 1])?;
            if left.keys.len() >= t {
                // Rotate right through the separator.
                child.keys.insert(0, x.keys[i - 1].clone());
                x.keys[i - 1] = left
                    .keys
                    .pop()
                    .ok_or_else(|| eyre::eyre!("sibling {} emptied during borrow", left.page))?;
                if !left.leaf {
                    let grandchild = left
                        .children
                        .pop()
                        .ok_or_else(|| eyre::eyre!("sibling {} has no child to move", left.page))?;
                    child.children.insert(0, grandchild);
                }
                self.write_node(&left)?;
                self.write_node(&child)?;
                self.write_node(x)?;
                return Ok(child);
            }
        }

        if i + 1 < x.children.len() {
            let mut right = self.read_node(x.children[i + 1])?;
            if right.keys.len() >= t {
                // Rotate left through the separator.
                child.keys.push(x.keys[i].clone());
                x.keys[i] = right.keys.remove(0);
                if !right.leaf {
                    child.children.push(right.children.remove(0));
                }
                self.write_node(&right)?;
                self.write_node(&child)?;
                self.write_node(x)?;
                return Ok(child);
            }

            // Merge the child with its right sibling.
            let separator = x.keys.remove(i);
            x.children.remove(i + 1);
            child.keys.push(separator);
            child.keys.extend(right.keys.iter().cloned());
            child.children.extend(right.children.iter().cloned());
            self.write_node(x)?;
            self.write_node(&child)?;
            self.pager.delete(right.page)?;
            return Ok(child);
        }

        // Rightmost child: merge the left sibling into it instead.
        let mut left = self.read_node(x.children[i - 1])?;
        let separator = x.keys.remove(i - 1);
        x.children.remove(i);
        left.keys.push(separator);
        left.keys.extend(child.keys.iter().cloned());
        left.children.extend(child.children.iter().cloned());
        self.write_node(x)?;
        self.write_node(&left)?;
        self.pager.delete(child.page)?;
        Ok(left)
    }

    /// Marks every page of `record`'s overflow chain reusable.
    fn reclaim_overflow_chain(&self, record: &KeyRecord) -> Result<()> {
        let mut overflowed = record.overflowed;
        let mut page = record.overflow_page;
        while overflowed {
            let mut node = self.read_node(page)?;
            node.reuse = true;
            self.write_node(&node)?;
            debug!("marked overflow page {page} reusable");
            match node.keys.first() {
                Some(first) => {
                    overflowed = first.overflowed;
                    page = first.overflow_page;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// The greatest key record in the subtree rooted at `x`.
    fn max_key(&self, x: &Node) -> Result<KeyRecord> {
        if x.leaf {
            return x
                .keys
                .last()
                .cloned()
                .ok_or_else(|| eyre::eyre!("leaf {} holds no keys", x.page));
        }
        let last = *x
            .children
            .last()
            .ok_or_else(|| eyre::eyre!("internal node {} has no children", x.page))?;
        let child = self.read_node(last)?;
        self.max_key(&child)
    }

    /// The smallest key record in the subtree rooted at `x`.
    fn min_key(&self, x: &Node) -> Result<KeyRecord> {
        if x.leaf {
            return x
                .keys
                .first()
                .cloned()
                .ok_or_else(|| eyre::eyre!("leaf {} holds no keys", x.page));
        }
        let child = self.read_node(x.children[0])?;
        self.min_key(&child)
    }

    // ---- diagnostics -------------------------------------------------

    fn check_subtree(
        &self,
        x: &Node,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        is_root: bool,
    ) -> Result<()> {
        let t = self.t;
        if !is_root {
            ensure!(
                x.keys.len() >= t - 1 && x.keys.len() <= 2 * t - 1,
                "node {} holds {} keys, outside [{}, {}]",
                x.page,
                x.keys.len(),
                t - 1,
                2 * t - 1
            );
        }

        for pair in x.keys.windows(2) {
            ensure!(
                compare::less(&pair[0].key, &pair[1].key),
                "node {} keys out of order",
                x.page
            );
        }
        for record in &x.keys {
            if let Some(lo) = lower {
                ensure!(
                    compare::greater(&record.key, lo),
                    "node {} violates its lower bound",
                    x.page
                );
            }
            if let Some(hi) = upper {
                ensure!(
                    compare::less(&record.key, hi),
                    "node {} violates its upper bound",
                    x.page
                );
            }
        }

        if x.leaf {
            ensure!(
                x.children.is_empty(),
                "leaf {} carries children",
                x.page
            );
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) => ensure!(d == depth, "leaves at unequal depths ({d} vs {depth})"),
            }
            return Ok(());
        }

        ensure!(
            x.children.len() == x.keys.len() + 1,
            "internal node {} has {} children for {} keys",
            x.page,
            x.children.len(),
            x.keys.len()
        );
        for i in 0..x.children.len() {
            let child = self.read_node(x.children[i])?;
            let lo = if i == 0 {
                lower
            } else {
                Some(x.keys[i - 1].key.as_slice())
            };
            let hi = if i == x.keys.len() {
                upper
            } else {
                Some(x.keys[i].key.as_slice())
            };
            self.check_subtree(&child, lo, hi, depth + 1, leaf_depth, false)?;
        }
        Ok(())
    }

    fn dump_node(&self, x: &Node, level: usize, out: &mut String) -> Result<()> {
        out.push_str(&format!("level {level}:"));
        for record in &x.keys {
            out.push(' ');
            out.push_str(&String::from_utf8_lossy(&record.key));
        }
        out.push('\n');
        for &child in &x.children {
            let node = self.read_node(child)?;
            self.dump_node(&node, level + 1, out)?;
        }
        Ok(())
    }
}

fn is_past_eof(err: &eyre::Report) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof)
}
