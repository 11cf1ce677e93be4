//! # Node Codec
//!
//! Nodes are serialized with bincode. The codec is the pager's only view of
//! a node: `encode` refuses any node whose serialized form exceeds
//! `PAGE_SIZE`, which is what guarantees that node records are always
//! single-slot at the pager level. `encoded_size` backs the overflow
//! threshold check without materializing the bytes.
//!
//! Decoding tolerates the zero padding the pager appends to a slot's
//! payload.

use eyre::{ensure, Result, WrapErr};

use crate::storage::PAGE_SIZE;

use super::node::Node;

/// Serializes a node, refusing encodings that cannot fit one page.
pub fn encode(node: &Node) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(node).wrap_err("failed to encode node")?;
    ensure!(
        bytes.len() <= PAGE_SIZE,
        "node too large to encode: {} > {} bytes",
        bytes.len(),
        PAGE_SIZE
    );
    Ok(bytes)
}

/// Deserializes a node from a page payload, ignoring trailing padding.
pub fn decode(bytes: &[u8]) -> Result<Node> {
    bincode::deserialize(bytes).wrap_err("failed to decode node")
}

/// Serialized length of `node` without encoding it into a buffer.
pub fn encoded_size(node: &Node) -> Result<u64> {
    bincode::serialized_size(node).wrap_err("failed to size node")
}
