//! # ledger-consensus
//!
//! Block-level and whole-chain validation ([`engine`]) and block
//! production ([`miner`]) built on top of `ledger-core`'s transaction
//! validation, difficulty retarget, and UTXO primitives.

pub mod engine;
pub mod miner;

pub use engine::{
    check_pow, leading_hex_zeros, should_replace_chain, validate_block, validate_block_structure, validate_chain,
    BlockContext, ChainValidationError, ValidatedBlock,
};
pub use miner::{build_block_template, mine_nonce, select_transactions};
