//! # Per-Key Value Cursor
//!
//! A `ValueIter` walks one key's values in insertion order: the inline list
//! first, then each node of the overflow chain. The cursor owns a snapshot
//! of the node it is positioned on and re-reads chain nodes on demand, so a
//! long value list never has to be materialized at once.

use eyre::Result;

use super::node::Node;
use super::tree::BTree;

/// Stateful cursor over a single key's value list.
///
/// Yields `Err` when a chain page cannot be read; the cursor is exhausted
/// once the chain ends.
#[derive(Debug)]
pub struct ValueIter<'a> {
    tree: &'a BTree,
    node: Option<Node>,
    key_index: usize,
    value_index: usize,
}

impl<'a> ValueIter<'a> {
    pub(crate) fn new(tree: &'a BTree, node: Node, key_index: usize) -> Self {
        Self {
            tree,
            node: Some(node),
            key_index,
            value_index: 0,
        }
    }

    fn advance(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(node) = self.node.as_ref() else {
                return Ok(None);
            };
            let Some(record) = node.keys.get(self.key_index) else {
                self.node = None;
                return Ok(None);
            };

            if self.value_index < record.values.len() {
                let value = record.values[self.value_index].clone();
                self.value_index += 1;
                return Ok(Some(value));
            }

            if record.overflowed {
                let next = self.tree.chain_node(record.overflow_page)?;
                self.node = Some(next);
                self.key_index = 0;
                self.value_index = 0;
            } else {
                self.node = None;
                return Ok(None);
            }
        }
    }
}

impl Iterator for ValueIter<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
