//! Merkle root computation over a block's transaction ids.
//!
//! Plain SHA-256 (no domain separation, no double-hashing): each internal
//! node is `SHA256(hex(left) || hex(right))` — the hex-string encoding of
//! each child is concatenated and hashed as UTF-8 bytes, not the raw
//! 32-byte digest. Odd-length layers are padded by duplicating the last
//! element. The root of an empty transaction list is `SHA256(b"")`,
//! hex-encoded.

use sha2::{Digest, Sha256};

use crate::types::Hash256;

fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let combined = format!("{left}{right}");
    Hash256(Sha256::digest(combined.as_bytes()).into())
}

fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

/// Compute the Merkle root over a block's transaction ids, hex-encoded.
///
/// An empty transaction list yields `SHA256(b"")`, hex-encoded.
pub fn merkle_root(txids: &[Hash256]) -> String {
    if txids.is_empty() {
        return hex::encode(Sha256::digest([]));
    }

    let mut current = txids.to_vec();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    current[0].to_string()
}
