//! Block template assembly and proof-of-work search.
//!
//! [`select_transactions`] walks mempool candidates in the fee-descending
//! order `ledger_core::mempool::Mempool::top` already produces, dropping
//! anything that collides with an output spent earlier in the same
//! template or that fails re-validation against the live UTXO set.
//! [`build_block_template`] assembles the sealed-but-unmined block around
//! that selection, and [`mine_nonce`] searches for a nonce satisfying the
//! block's difficulty using a per-process shuffled nonce wheel rather than
//! a plain sequential scan, so that two miners racing the same template
//! diverge instead of retracing each other's steps.

use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::debug;

use ledger_core::codec;
use ledger_core::constants::NONCE_WHEEL_SIZE;
use ledger_core::mempool::MempoolEntry;
use ledger_core::merkle;
use ledger_core::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput, UtxoEntry};
use ledger_core::validation;

use crate::engine::check_pow;

/// Select candidates for a block template: re-validates each against
/// `get_utxo`, skipping (not aborting on) anything that no longer applies
/// or would double-spend an output already claimed earlier in this same
/// selection.
///
/// Returns the selected transactions in the order given and the sum of
/// their fees.
pub fn select_transactions<F>(candidates: &[&MempoolEntry], get_utxo: F) -> (Vec<Transaction>, u64)
where
    F: Fn(&OutPoint) -> Option<UtxoEntry>,
{
    let mut included = Vec::new();
    let mut claimed = std::collections::HashSet::new();
    let mut total_fees = 0u64;

    for entry in candidates {
        if entry.tx.vins.iter().any(|vin| claimed.contains(&vin.previous_output)) {
            debug!(txid = %entry.txid, "skipping mempool candidate: conflicts with an earlier selection");
            continue;
        }

        match validation::validate_transaction(&entry.tx, &get_utxo) {
            Ok(validated) => {
                for vin in &entry.tx.vins {
                    claimed.insert(vin.previous_output);
                }
                total_fees = total_fees.saturating_add(validated.fee);
                included.push(entry.tx.clone());
            }
            Err(error) => {
                debug!(txid = %entry.txid, %error, "skipping mempool candidate: failed revalidation");
            }
        }
    }

    (included, total_fees)
}

/// Build a coinbase transaction paying the fixed block subsidy to
/// `miner_address`. This protocol does not credit mempool fees to the
/// coinbase; see `ledger_core::constants::SUBSIDY`.
fn build_coinbase(height: u64, subsidy: u64, miner_address: &str, rng: &mut impl RngCore) -> Transaction {
    Transaction {
        vins: vec![TxInput {
            previous_output: OutPoint::null(),
            pubkey: vec![],
            signature: codec::mix_coinbase_extra_nonce(height, rng),
        }],
        vouts: vec![TxOutput { value: subsidy, pubkey_hash: miner_address.to_string() }],
        n_lock_time: 0,
    }
}

/// Assemble an unmined block: a coinbase paying `subsidy` plus the
/// transactions `select_transactions` accepted, with the header's merkle
/// root already computed and its nonce left at zero for [`mine_nonce`].
///
/// `candidates` should already be fee-descending (the order
/// `Mempool::top` returns) and capped to leave room for the coinbase
/// within the block's transaction-count limit.
pub fn build_block_template<F>(
    height: u64,
    prev_hash: Hash256,
    difficulty: u32,
    timestamp: u64,
    subsidy: u64,
    miner_address: &str,
    candidates: &[&MempoolEntry],
    get_utxo: F,
    rng: &mut impl RngCore,
) -> Block
where
    F: Fn(&OutPoint) -> Option<UtxoEntry>,
{
    let (selected, total_fees) = select_transactions(candidates, get_utxo);
    debug!(height, included = selected.len(), total_fees, "assembled block template");

    let coinbase = build_coinbase(height, subsidy, miner_address, rng);

    let mut transactions = Vec::with_capacity(1 + selected.len());
    transactions.push(coinbase);
    transactions.extend(selected);

    let txids: Vec<Hash256> = transactions.iter().map(codec::txid).collect();
    let merkle_root = merkle::merkle_root(&txids);

    Block {
        header: BlockHeader { index: height, timestamp, prev_hash, difficulty, merkle_root, nonce: 0 },
        transactions,
    }
}

/// Search for a nonce satisfying `header`'s own difficulty.
///
/// Nonces are drawn from a randomly shuffled `0..NONCE_WHEEL_SIZE` wheel,
/// repeated with an incrementing base (`base * NONCE_WHEEL_SIZE + offset`)
/// once a wheel is exhausted, rather than a plain sequential scan: two
/// processes racing the same template with different RNG seeds explore
/// disjoint orderings instead of retracing each other's attempts.
///
/// Returns `true` and leaves `header.nonce` set to the winning value if a
/// solution is found within `max_attempts` tries, `false` (with `nonce`
/// left at its last attempted value) otherwise.
pub fn mine_nonce(header: &mut BlockHeader, rng: &mut impl RngCore, max_attempts: u64) -> bool {
    let mut wheel: Vec<u64> = (0..NONCE_WHEEL_SIZE).collect();
    let mut base: u64 = 0;
    let mut tried: u64 = 0;

    while tried < max_attempts {
        wheel.shuffle(rng);
        for &offset in &wheel {
            header.nonce = base.saturating_mul(NONCE_WHEEL_SIZE).saturating_add(offset);
            if check_pow(header) {
                return true;
            }
            tried += 1;
            if tried >= max_attempts {
                return false;
            }
        }
        base += 1;
    }
    false
}
