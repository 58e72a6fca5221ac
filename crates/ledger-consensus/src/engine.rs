//! Block-level and whole-chain validation, and the fork-choice rule.
//!
//! [`validate_block`] runs the single-block checks a well-formed chain must
//! satisfy at every height: sequential linkage, proof of work, coinbase
//! placement, merkle integrity, and — against a UTXO lookup — that no
//! transaction in the block is internally double-spent or under-funded.
//! [`validate_chain`] replays those checks over an entire candidate chain
//! from its own genesis, rebuilding a throwaway UTXO set as it goes.
//! [`should_replace_chain`] is the tie-break a node applies when it learns
//! of a competing chain at or above its own height.

use std::collections::HashSet;

use thiserror::Error;

use ledger_core::error::{BlockError, ChainStateError, LedgerError, TransactionError};
use ledger_core::types::{Block, BlockHeader, OutPoint, UtxoEntry};
use ledger_core::utxo::{MemoryUtxoSet, UtxoStore};
use ledger_core::{codec, merkle, validation};

/// Apply a block to `utxo`, translating the storage-level error into the
/// same per-index shape [`validate_block`] produces. Only reachable if a
/// block passes [`validate_block`] against a UTXO snapshot that then
/// disagrees with `utxo` itself — a caller bug, not a protocol violation.
fn apply_or_err(utxo: &mut MemoryUtxoSet, block: &Block, index: u64) -> Result<(), ChainValidationError> {
    ledger_core::utxo::apply_block(utxo, block).map(|_| ()).map_err(|e| {
        let source = match e {
            LedgerError::Transaction(t) => t,
            other => TransactionError::InvalidCoinbase(other.to_string()),
        };
        ChainValidationError::Block { index, source: BlockError::TransactionError { index: 0, source } }
    })
}

/// Context a single block is validated against: everything about its
/// parent and expected position that the block itself doesn't carry.
#[derive(Debug, Clone)]
pub struct BlockContext {
    pub height: u64,
    pub prev_hash: ledger_core::types::Hash256,
    pub expected_difficulty: u32,
}

/// Fee and coinbase totals collected while validating a block, useful for
/// logging and mempool bookkeeping. The coinbase's own value is not
/// constrained against this total: this protocol pays a fixed subsidy and
/// does not credit fees to the miner (see `ledger-core::constants::SUBSIDY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedBlock {
    pub total_fees: u64,
    pub coinbase_value: u64,
}

/// Count of leading hex-zero characters in a header's hash.
pub fn leading_hex_zeros(header: &BlockHeader) -> u32 {
    header.hash().to_string().chars().take_while(|&c| c == '0').count() as u32
}

/// Whether a header's hash satisfies its own claimed difficulty.
pub fn check_pow(header: &BlockHeader) -> bool {
    leading_hex_zeros(header) >= header.difficulty
}

/// Structural checks on a block that require no external context: coinbase
/// placement, per-transaction structure, duplicate txids, merkle root, and
/// proof of work.
pub fn validate_block_structure(block: &Block) -> Result<(), BlockError> {
    if block.transactions.is_empty() {
        return Err(BlockError::NoCoinbase);
    }
    if !block.transactions[0].is_coinbase() {
        return Err(BlockError::FirstTxNotCoinbase);
    }
    for tx in &block.transactions[1..] {
        if tx.is_coinbase() {
            return Err(BlockError::MultipleCoinbase);
        }
    }

    if block.transactions.len() > ledger_core::constants::MAX_BLOCK_TXS {
        return Err(BlockError::OversizedBlock {
            count: block.transactions.len(),
            max: ledger_core::constants::MAX_BLOCK_TXS,
        });
    }

    let mut seen = HashSet::with_capacity(block.transactions.len());
    let mut txids = Vec::with_capacity(block.transactions.len());
    for (index, tx) in block.transactions.iter().enumerate() {
        validation::validate_transaction_structure(tx)
            .map_err(|source| BlockError::TransactionError { index, source })?;
        let txid = codec::txid(tx);
        if !seen.insert(txid) {
            return Err(BlockError::DuplicateTxid(txid.to_string()));
        }
        txids.push(txid);
    }

    let computed_root = merkle::merkle_root(&txids);
    if computed_root != block.header.merkle_root {
        return Err(BlockError::InvalidMerkleRoot);
    }

    if !check_pow(&block.header) {
        return Err(BlockError::InvalidPoW);
    }

    Ok(())
}

/// Full single-block validation: structure plus linkage to `context` and
/// contextual validation of every non-coinbase transaction against
/// `get_utxo`.
///
/// Transactions are validated in order against a set of outpoints spent
/// earlier in the same block (the "shadow" set), so a block cannot spend
/// the same output twice even when no single transaction repeats an input.
pub fn validate_block<F>(block: &Block, context: &BlockContext, get_utxo: F) -> Result<ValidatedBlock, BlockError>
where
    F: Fn(&OutPoint) -> Option<UtxoEntry>,
{
    validate_block_structure(block)?;

    if block.header.index != context.height {
        return Err(BlockError::InvalidHeight { expected: context.height, got: block.header.index });
    }
    if block.header.prev_hash != context.prev_hash {
        return Err(BlockError::InvalidPrevHash);
    }
    if block.header.difficulty != context.expected_difficulty {
        return Err(BlockError::InvalidDifficulty { got: block.header.difficulty, expected: context.expected_difficulty });
    }

    let mut spent_in_block: HashSet<OutPoint> = HashSet::new();
    let mut total_fees: u64 = 0;

    for (index, tx) in block.transactions.iter().enumerate().skip(1) {
        for vin in &tx.vins {
            if !spent_in_block.insert(vin.previous_output) {
                return Err(BlockError::IntraBlockDoubleSpend(vin.previous_output.to_string()));
            }
        }

        let validated = validation::validate_transaction(tx, &get_utxo)
            .map_err(|source| BlockError::TransactionError { index, source })?;
        total_fees = total_fees.checked_add(validated.fee).ok_or(BlockError::TransactionError {
            index,
            source: TransactionError::ValueOverflow,
        })?;
    }

    let coinbase_value = block.transactions[0]
        .total_output_value()
        .ok_or(BlockError::TransactionError { index: 0, source: TransactionError::ValueOverflow })?;

    Ok(ValidatedBlock { total_fees, coinbase_value })
}

/// Errors surfaced while replaying an entire candidate chain.
#[derive(Debug, Error)]
pub enum ChainValidationError {
    #[error("chain structure: {0}")]
    Structure(#[from] ChainStateError),
    #[error("block at height {index} failed validation: {source}")]
    Block { index: u64, source: BlockError },
}

/// Validate a complete chain from its own genesis: the genesis block must
/// match the hardcoded canonical genesis exactly (it carries no coinbase
/// and is exempt from the regular per-block structural rules), then every
/// later block's single-block rules are checked against a UTXO set rebuilt
/// from scratch as the replay advances.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainValidationError> {
    let genesis = chain.first().ok_or(ChainStateError::EmptyChain)?;

    if genesis != ledger_core::genesis::genesis_block() {
        return Err(ChainStateError::InvalidGenesis("genesis block does not match the canonical genesis".into()).into());
    }

    let expected_count = genesis.header.index + chain.len() as u64;
    if chain.len() as u64 != expected_count {
        return Err(ChainStateError::HeightCountMismatch { height: expected_count - 1, count: chain.len() }.into());
    }

    let mut utxo = MemoryUtxoSet::new();
    apply_or_err(&mut utxo, genesis, 0)?;

    for (i, block) in chain.iter().enumerate().skip(1) {
        if block.header.index != i as u64 {
            return Err(ChainStateError::NonSequentialHeight(i as u64).into());
        }

        let parent = &chain[i - 1];
        let expected_difficulty = ledger_core::difficulty::difficulty_for_height(
            block.header.index,
            parent.header.difficulty,
            |h| chain.get(h as usize).map(|b| b.header.timestamp).unwrap_or(0),
        );
        let context = BlockContext { height: block.header.index, prev_hash: parent.header.hash(), expected_difficulty };
        validate_block(block, &context, |op| utxo.lookup(op))
            .map_err(|source| ChainValidationError::Block { index: block.header.index, source })?;

        apply_or_err(&mut utxo, block, block.header.index)?;
    }

    Ok(())
}

/// Whether a candidate chain should replace the locally held tip: strictly
/// greater height, or equal height with strictly greater accumulated work.
pub fn should_replace_chain(local_height: u64, local_work: u128, candidate_height: u64, candidate_work: u128) -> bool {
    candidate_height > local_height || (candidate_height == local_height && candidate_work > local_work)
}
