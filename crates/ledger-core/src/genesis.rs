//! Genesis block definition.
//!
//! The genesis block is the first block in the chain (height 0): an empty
//! transaction list, a literal merkle root of `"0"`, the all-zero previous
//! hash, and [`INITIAL_DIFFICULTY`]. It carries no coinbase — the regular
//! mining reward schedule starts at height 1.
//!
//! All values are hardcoded and deterministic — every node computes the
//! identical genesis block.

use std::sync::LazyLock;

use crate::constants::{INITIAL_DIFFICULTY, ZERO_HASH_HEX};
use crate::types::{Block, BlockHeader, Hash256};

/// Genesis block timestamp: January 1, 2026 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_767_225_600;

/// Cached genesis data, computed once on first access.
struct GenesisData {
    block: Block,
    hash: Hash256,
}

static GENESIS: LazyLock<GenesisData> = LazyLock::new(build_genesis);

fn build_genesis() -> GenesisData {
    let block = Block {
        header: BlockHeader {
            index: 0,
            timestamp: GENESIS_TIMESTAMP,
            prev_hash: Hash256::from_hex(ZERO_HASH_HEX).expect("ZERO_HASH_HEX is valid hex"),
            difficulty: INITIAL_DIFFICULTY,
            merkle_root: "0".to_string(),
            nonce: 0,
        },
        transactions: Vec::new(),
    };
    let hash = block.header.hash();

    GenesisData { block, hash }
}

/// The genesis block (height 0).
pub fn genesis_block() -> &'static Block {
    &GENESIS.block
}

/// The genesis block header hash.
pub fn genesis_hash() -> Hash256 {
    GENESIS.hash
}

/// Check whether a block is the genesis block by comparing header hashes.
pub fn is_genesis(block: &Block) -> bool {
    block.header.hash() == GENESIS.hash
}
