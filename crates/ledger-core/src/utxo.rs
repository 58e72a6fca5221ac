//! The unspent-transaction-output set.
//!
//! Provides the [`UtxoStore`] trait and an in-memory [`MemoryUtxoSet`]
//! implementation. The production node backs this with RocksDB
//! (`ledger-node::storage`) behind the same trait.
//!
//! There is deliberately no operation that reverts a single connected
//! block. A reorg onto a heavier fork is handled by [`rebuild_from_blocks`]
//! replaying every block of the new best chain from an empty set — undo
//! logs and per-block rollback are out of scope for this protocol.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::codec;
use crate::error::{LedgerError, TransactionError};
use crate::types::{Block, OutPoint, UtxoEntry};
#[cfg(test)]
use crate::types::Transaction;

/// Storage interface for the UTXO set.
///
/// Distinguishes "never existed" from "exists but spent": [`lookup`](Self::lookup)
/// and [`is_spent`](Self::is_spent) answer different questions, so callers
/// can tell a double-spend (spent outpoint) apart from a reference to an
/// outpoint that was never created ([`TransactionError::UnknownUtxo`] vs
/// [`TransactionError::AlreadySpent`]).
///
/// Implementors need not be thread-safe on their own — the node wraps
/// access in a lock (see `ledger-node`'s state lock).
pub trait UtxoStore: Send + Sync {
    /// Add a new unspent output. Idempotent: adding an outpoint that is
    /// already unspent, or already spent, is a logged no-op rather than an
    /// overwrite or a panic.
    fn add(&mut self, outpoint: OutPoint, entry: UtxoEntry);

    /// Look up an unspent output. `None` if it was never created or has
    /// since been spent — use [`is_spent`](Self::is_spent) to tell those
    /// apart.
    fn lookup(&self, outpoint: &OutPoint) -> Option<UtxoEntry>;

    /// Whether `outpoint` has been spent. `false` for an outpoint that was
    /// never created at all.
    fn is_spent(&self, outpoint: &OutPoint) -> bool;

    /// Spend an unspent output, moving it out of the lookup set and into
    /// the spent set. Returns the entry that was spent, or `None` if the
    /// outpoint was not present as unspent (already spent, or never
    /// existed — idempotent either way: state does not change).
    fn mark_spent(&mut self, outpoint: &OutPoint) -> Option<UtxoEntry>;

    fn len(&self) -> usize;
    fn iter(&self) -> Vec<(OutPoint, UtxoEntry)>;
    fn clear(&mut self);

    /// Flush buffered writes to durable storage. A no-op for purely
    /// in-memory implementations.
    fn flush(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }

    fn contains(&self, outpoint: &OutPoint) -> bool {
        self.lookup(outpoint).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory UTXO set backed by a `HashMap`, with a side `HashSet` of
/// spent outpoints. Used for testing and as the reference implementation
/// the RocksDB-backed store mirrors.
#[derive(Default)]
pub struct MemoryUtxoSet {
    entries: HashMap<OutPoint, UtxoEntry>,
    spent: HashSet<OutPoint>,
}

impl MemoryUtxoSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UtxoStore for MemoryUtxoSet {
    fn add(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        if self.spent.contains(&outpoint) {
            debug!(%outpoint, "add: outpoint already spent, ignoring");
            return;
        }
        if self.entries.contains_key(&outpoint) {
            debug!(%outpoint, "add: outpoint already unspent, ignoring");
            return;
        }
        self.entries.insert(outpoint, entry);
    }

    fn lookup(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.entries.get(outpoint).cloned()
    }

    fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.spent.contains(outpoint)
    }

    fn mark_spent(&mut self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        match self.entries.remove(outpoint) {
            Some(entry) => {
                self.spent.insert(*outpoint);
                Some(entry)
            }
            None => {
                if self.spent.contains(outpoint) {
                    debug!(%outpoint, "mark_spent: already spent, ignoring");
                }
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> Vec<(OutPoint, UtxoEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.spent.clear();
    }
}

/// Sum the value of every unspent output locked to `address`.
pub fn balance_of(store: &dyn UtxoStore, address: &str) -> u64 {
    store
        .iter()
        .into_iter()
        .filter(|(_, entry)| entry.pubkey_hash == address)
        .map(|(_, entry)| entry.value)
        .sum()
}

/// Apply one already-validated block's effect on the UTXO set: spend every
/// non-coinbase input, then create an entry for every output.
///
/// Returns `(created, spent)`. An input referencing an outpoint that was
/// already spent fails with [`TransactionError::AlreadySpent`]; one that
/// was never created fails with [`TransactionError::UnknownUtxo`].
pub fn apply_block(store: &mut dyn UtxoStore, block: &Block) -> Result<(usize, usize), LedgerError> {
    let mut created = 0;
    let mut spent = 0;

    for tx in &block.transactions {
        if !tx.is_coinbase() {
            for input in &tx.vins {
                let outpoint = &input.previous_output;
                if store.is_spent(outpoint) {
                    return Err(TransactionError::AlreadySpent(outpoint.to_string()).into());
                }
                store.mark_spent(outpoint).ok_or_else(|| TransactionError::UnknownUtxo(outpoint.to_string()))?;
                spent += 1;
            }
        }

        let txid = codec::txid(tx);
        for (index, output) in tx.vouts.iter().enumerate() {
            let outpoint = OutPoint { ref_txid: txid, ref_index: index as u32 };
            store.add(outpoint, UtxoEntry { value: output.value, pubkey_hash: output.pubkey_hash.clone() });
            created += 1;
        }
    }

    Ok((created, spent))
}

/// Rebuild the entire UTXO set from scratch by replaying `blocks` in order.
///
/// Used after a reorg onto a heavier fork: the caller clears its chain
/// store down to the fork point (or further), then replays every block of
/// the new best chain from genesis. There is no incremental rollback path.
pub fn rebuild_from_blocks<'a>(
    store: &mut dyn UtxoStore,
    blocks: impl Iterator<Item = &'a Block>,
) -> Result<(), LedgerError> {
    store.clear();
    for block in blocks {
        apply_block(store, block)?;
    }
    Ok(())
}

#[cfg(test)]
fn sample_tx_spending(inputs: &[OutPoint], outputs: &[(u64, &str)]) -> Transaction {
    use crate::types::TxInput;
    use crate::types::TxOutput;

    Transaction {
        vins: inputs
            .iter()
            .map(|op| TxInput { previous_output: *op, pubkey: vec![1; 33], signature: vec![2; 70] })
            .collect(),
        vouts: outputs
            .iter()
            .map(|(v, a)| TxOutput { value: *v, pubkey_hash: a.to_string() })
            .collect(),
        n_lock_time: 0,
    }
}

#[cfg(test)]
fn coinbase_tx(value: u64, address: &str, nonce: u8) -> Transaction {
    use crate::types::{OutPoint as Op, TxInput, TxOutput};

    Transaction {
        vins: vec![TxInput { previous_output: Op::null(), pubkey: vec![], signature: vec![nonce; 8] }],
        vouts: vec![TxOutput { value, pubkey_hash: address.to_string() }],
        n_lock_time: 0,
    }
}

#[cfg(test)]
fn block_with(prev_index: u64, txs: Vec<Transaction>) -> Block {
    use crate::merkle;
    use crate::types::{BlockHeader, Hash256};

    let txids: Vec<Hash256> = txs.iter().map(codec::txid).collect();
    Block {
        header: BlockHeader {
            index: prev_index + 1,
            timestamp: 1_000_000 + prev_index * 60,
            prev_hash: Hash256::ZERO,
            difficulty: 1,
            merkle_root: merkle::merkle_root(&txids),
            nonce: 0,
        },
        transactions: txs,
    }
}
