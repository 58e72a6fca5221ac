//! In-memory pool of unconfirmed transactions (mempool).
//!
//! The mempool stores pre-validated transactions awaiting inclusion in
//! blocks. It provides:
//! - O(1) lookup by txid
//! - O(1) conflict detection via spent-outpoint index
//! - O(n log n) fee-descending selection for block templates, ties broken
//!   by insertion order
//! - Size-limited storage, evicting the lowest fee/size ratio entry first
//!
//! Transactions must be structurally and contextually validated by the
//! caller before insertion (see `ledger-core::validation`). The mempool
//! itself only tracks duplicates, input conflicts, and capacity.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::constants::{DEFAULT_MEMPOOL_MAX_BYTES, DEFAULT_MEMPOOL_MAX_COUNT, MIN_TX_FEE};
use crate::error::MempoolError;
use crate::types::{Block, Hash256, OutPoint, Transaction};
use crate::{codec, merkle};

/// Fee-rate precision multiplier, used only for eviction ordering.
///
/// Stored as `fee * FEE_RATE_PRECISION / size`, giving milli-units per byte.
const FEE_RATE_PRECISION: u128 = 1_000;

fn compute_fee_rate(fee: u64, size: usize) -> u64 {
    if size == 0 {
        return u64::MAX;
    }
    let rate = (fee as u128) * FEE_RATE_PRECISION / (size as u128);
    rate.min(u64::MAX as u128) as u64
}

/// A transaction stored in the mempool with precomputed metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash256,
    /// Fee in the smallest unit (`total_input - total_output`).
    pub fee: u64,
    /// Serialized size in bytes, per [`crate::codec::serialize`].
    pub size: usize,
    /// Monotonic insertion sequence, used to break fee ties in [`Mempool::top`].
    seq: u64,
}

/// In-memory pool of unconfirmed transactions.
///
/// Not thread-safe — `ledger-node` wraps it in a lock alongside the UTXO set
/// so block acceptance and mempool pruning stay consistent.
pub struct Mempool {
    entries: HashMap<Hash256, MempoolEntry>,
    /// Spent outpoint → txid of the pool transaction that spends it.
    by_outpoint: HashMap<OutPoint, Hash256>,
    /// Fee-rate-ordered index: `(fee_rate, txid)`, ascending — lowest first,
    /// which is exactly eviction order.
    by_fee_rate: BTreeSet<(u64, Hash256)>,
    max_count: usize,
    max_bytes: usize,
    total_bytes: usize,
    next_seq: u64,
}

impl Mempool {
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_outpoint: HashMap::new(),
            by_fee_rate: BTreeSet::new(),
            max_count,
            max_bytes,
            total_bytes: 0,
            next_seq: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MEMPOOL_MAX_COUNT, DEFAULT_MEMPOOL_MAX_BYTES)
    }

    /// Admit a transaction. The caller has already run full validation
    /// (signatures, UTXO lookups, address well-formedness) and supplies the
    /// computed `fee`; this call only enforces duplicate/conflict/capacity
    /// rules.
    ///
    /// On capacity pressure, evicts the lowest fee/size-ratio entries until
    /// the new transaction fits, but only while each evicted entry has a
    /// strictly lower rate than the incoming one; otherwise admission fails.
    pub fn insert(&mut self, tx: Transaction, fee: u64) -> Result<Hash256, MempoolError> {
        if fee < MIN_TX_FEE {
            return Err(MempoolError::FeeTooLow { fee, minimum: MIN_TX_FEE });
        }

        let txid = codec::txid(&tx);
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists(txid.to_string()));
        }

        for vin in &tx.vins {
            if let Some(&conflicting) = self.by_outpoint.get(&vin.previous_output) {
                return Err(MempoolError::Conflict {
                    new_txid: txid.to_string(),
                    existing_txid: conflicting.to_string(),
                    outpoint: vin.previous_output.to_string(),
                });
            }
        }

        let size = codec::serialize(&tx).len();
        self.make_room(size, compute_fee_rate(fee, size))?;

        for vin in &tx.vins {
            self.by_outpoint.insert(vin.previous_output, txid);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_fee_rate.insert((compute_fee_rate(fee, size), txid));
        self.total_bytes += size;
        self.entries.insert(txid, MempoolEntry { tx, txid, fee, size, seq });

        Ok(txid)
    }

    /// Evict lowest fee/size-ratio entries until `incoming_size` fits under
    /// both caps, refusing to evict an entry whose rate is not strictly
    /// lower than the incoming transaction's.
    fn make_room(&mut self, incoming_size: usize, incoming_rate: u64) -> Result<(), MempoolError> {
        while (self.entries.len() >= self.max_count
            || self.total_bytes + incoming_size > self.max_bytes)
            && !self.entries.is_empty()
        {
            let &(lowest_rate, lowest_txid) = self.by_fee_rate.iter().next().expect("non-empty");
            if lowest_rate >= incoming_rate {
                return Err(MempoolError::PoolFull);
            }
            self.remove_entry(lowest_txid);
        }

        if self.entries.len() >= self.max_count || self.total_bytes + incoming_size > self.max_bytes {
            return Err(MempoolError::PoolFull);
        }
        Ok(())
    }

    /// Remove a transaction by txid.
    pub fn remove(&mut self, txid: &Hash256) -> Option<MempoolEntry> {
        self.remove_entry(*txid)
    }

    fn remove_entry(&mut self, txid: Hash256) -> Option<MempoolEntry> {
        let entry = self.entries.remove(&txid)?;
        for vin in &entry.tx.vins {
            self.by_outpoint.remove(&vin.previous_output);
        }
        self.by_fee_rate.remove(&(compute_fee_rate(entry.fee, entry.size), txid));
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Replace-by-fee: `new_tx` must strictly exceed `old_txid`'s fee.
    /// Fails, without state change, if `old_txid` is unknown or the new fee
    /// does not strictly exceed the old one.
    pub fn replace(
        &mut self,
        old_txid: &Hash256,
        new_tx: Transaction,
        new_fee: u64,
    ) -> Result<Hash256, MempoolError> {
        let old_fee = self
            .entries
            .get(old_txid)
            .ok_or_else(|| MempoolError::NotFound(old_txid.to_string()))?
            .fee;

        if new_fee <= old_fee {
            return Err(MempoolError::ReplacementNotHigherFee { new_fee, old_fee });
        }

        self.remove_entry(*old_txid);
        self.insert(new_tx, new_fee)
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    /// Whether any of `tx`'s inputs conflict with a pool entry.
    pub fn has_conflict(&self, tx: &Transaction) -> bool {
        tx.vins.iter().any(|vin| self.by_outpoint.contains_key(&vin.previous_output))
    }

    /// Deduplicated txids of pool entries conflicting with `tx`.
    pub fn conflicting_txids(&self, tx: &Transaction) -> Vec<Hash256> {
        let mut seen = HashSet::new();
        tx.vins
            .iter()
            .filter_map(|vin| self.by_outpoint.get(&vin.previous_output).copied())
            .filter(|txid| seen.insert(*txid))
            .collect()
    }

    /// The `n` highest-fee transactions, ties broken by insertion order
    /// (earlier insertion ranks first).
    pub fn top(&self, n: usize) -> Vec<&MempoolEntry> {
        let mut all: Vec<&MempoolEntry> = self.entries.values().collect();
        all.sort_by(|a, b| b.fee.cmp(&a.fee).then(a.seq.cmp(&b.seq)));
        all.truncate(n);
        all
    }

    /// Drop transactions confirmed in `block`, plus any pool transaction
    /// whose input the block already spent.
    pub fn remove_confirmed_block(&mut self, block: &Block) {
        let mut confirmed = HashSet::new();
        let mut spent = HashSet::new();

        for tx in &block.transactions {
            confirmed.insert(codec::txid(tx));
            for vin in &tx.vins {
                if !vin.previous_output.is_null() {
                    spent.insert(vin.previous_output);
                }
            }
        }

        for txid in confirmed {
            self.remove_entry(txid);
        }

        let conflicting: HashSet<Hash256> = spent
            .iter()
            .filter_map(|op| self.by_outpoint.get(op).copied())
            .collect();
        for txid in conflicting {
            self.remove_entry(txid);
        }
    }

    /// Drop every entry. Used on fork-choice chain replacement: the new
    /// chain may have consumed inputs the mempool assumed were live.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_outpoint.clear();
        self.by_fee_rate.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current total serialized bytes held in the pool.
    pub fn current_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn total_fees(&self) -> u64 {
        self.entries.values().map(|e| e.fee).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MempoolEntry> {
        self.entries.values()
    }

    pub fn txids(&self) -> Vec<Hash256> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
fn make_tx(outpoints: &[OutPoint], output_value: u64, address: &str, lock_time: u32) -> Transaction {
    use crate::types::{TxInput, TxOutput};

    Transaction {
        vins: outpoints
            .iter()
            .map(|op| TxInput { previous_output: *op, pubkey: vec![1; 33], signature: vec![2; 70] })
            .collect(),
        vouts: vec![TxOutput { value: output_value, pubkey_hash: address.to_string() }],
        n_lock_time: lock_time,
    }
}

#[cfg(test)]
fn outpoint(seed: u8, index: u32) -> OutPoint {
    OutPoint { ref_txid: crate::types::Hash256([seed; 32]), ref_index: index }
}

#[cfg(test)]
fn coinbase_tx() -> Transaction {
    use crate::types::{TxInput, TxOutput};

    Transaction {
        vins: vec![TxInput { previous_output: OutPoint::null(), pubkey: vec![], signature: vec![0; 8] }],
        vouts: vec![TxOutput { value: 50 * crate::constants::COIN, pubkey_hash: "miner".into() }],
        n_lock_time: 0,
    }
}

#[cfg(test)]
fn block_with(txs: Vec<Transaction>) -> Block {
    use crate::types::BlockHeader;

    let txids: Vec<Hash256> = txs.iter().map(codec::txid).collect();
    Block {
        header: BlockHeader {
            index: 1,
            timestamp: 1_000_000,
            prev_hash: Hash256::ZERO,
            difficulty: 1,
            merkle_root: merkle::merkle_root(&txids),
            nonce: 0,
        },
        transactions: txs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    #[test]
    fn new_mempool_is_empty() {
        let pool = Mempool::new(100, 100_000);
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.current_bytes(), 0);
        assert_eq!(pool.total_fees(), 0);
    }

    #[test]
    fn with_defaults_creates_pool() {
        let pool = Mempool::with_defaults();
        assert_eq!(pool.max_count(), DEFAULT_MEMPOOL_MAX_COUNT);
        assert_eq!(pool.max_bytes(), DEFAULT_MEMPOOL_MAX_BYTES);
    }

    #[test]
    fn insert_and_get() {
        let mut pool = Mempool::new(100, 100_000);
        let tx = make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0);
        let txid = pool.insert(tx.clone(), COIN).unwrap();

        let entry = pool.get(&txid).unwrap();
        assert_eq!(entry.txid, txid);
        assert_eq!(entry.fee, COIN);
        assert_eq!(entry.tx, tx);
        assert!(entry.size > 0);
    }

    #[test]
    fn rejects_duplicate_txid() {
        let mut pool = Mempool::new(100, 100_000);
        let tx = make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0);
        pool.insert(tx.clone(), COIN).unwrap();
        let err = pool.insert(tx, COIN).unwrap_err();
        assert!(matches!(err, MempoolError::AlreadyExists(_)));
    }

    #[test]
    fn rejects_conflicting_outpoint() {
        let mut pool = Mempool::new(100, 100_000);
        let op = outpoint(1, 0);
        pool.insert(make_tx(&[op], 49 * COIN, "addrA", 0), COIN).unwrap();
        let tx2 = make_tx(&[op], 48 * COIN, "addrB", 1);
        let err = pool.insert(tx2, 2 * COIN).unwrap_err();
        assert!(matches!(err, MempoolError::Conflict { .. }));
    }

    #[test]
    fn has_conflict_true_and_false() {
        let mut pool = Mempool::new(100, 100_000);
        let op = outpoint(1, 0);
        pool.insert(make_tx(&[op], 49 * COIN, "addrA", 0), COIN).unwrap();
        assert!(pool.has_conflict(&make_tx(&[op], 40 * COIN, "addrB", 1)));
        assert!(!pool.has_conflict(&make_tx(&[outpoint(2, 0)], 40 * COIN, "addrB", 1)));
    }

    #[test]
    fn conflicting_txids_deduplicates() {
        let mut pool = Mempool::new(100, 100_000);
        let op1 = outpoint(1, 0);
        let op2 = outpoint(1, 1);
        let txid = pool.insert(make_tx(&[op1, op2], 49 * COIN, "addrA", 0), COIN).unwrap();
        let conflicts = pool.conflicting_txids(&make_tx(&[op1, op2], 40 * COIN, "addrB", 1));
        assert_eq!(conflicts, vec![txid]);
    }

    #[test]
    fn top_orders_by_fee_descending() {
        let mut pool = Mempool::new(100, 1_000_000);
        let low = pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 1_000).unwrap();
        let high = pool.insert(make_tx(&[outpoint(2, 0)], 49 * COIN, "addrB", 0), 10_000).unwrap();
        let med = pool.insert(make_tx(&[outpoint(3, 0)], 49 * COIN, "addrC", 0), 5_000).unwrap();

        let top = pool.top(3);
        assert_eq!(top.iter().map(|e| e.txid).collect::<Vec<_>>(), vec![high, med, low]);
    }

    #[test]
    fn top_breaks_fee_ties_by_insertion_order() {
        let mut pool = Mempool::new(100, 1_000_000);
        let first = pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 5_000).unwrap();
        let second = pool.insert(make_tx(&[outpoint(2, 0)], 49 * COIN, "addrB", 0), 5_000).unwrap();

        let top = pool.top(2);
        assert_eq!(top[0].txid, first);
        assert_eq!(top[1].txid, second);
    }

    #[test]
    fn top_truncates_to_n() {
        let mut pool = Mempool::new(100, 1_000_000);
        pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 1_000).unwrap();
        pool.insert(make_tx(&[outpoint(2, 0)], 49 * COIN, "addrB", 0), 2_000).unwrap();
        assert_eq!(pool.top(1).len(), 1);
    }

    #[test]
    fn evicts_lowest_fee_rate_on_count_pressure() {
        let mut pool = Mempool::new(2, 1_000_000);
        let low = pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 1_000).unwrap();
        let high = pool.insert(make_tx(&[outpoint(2, 0)], 49 * COIN, "addrB", 0), 10_000).unwrap();
        let med = pool.insert(make_tx(&[outpoint(3, 0)], 49 * COIN, "addrC", 0), 5_000).unwrap();

        assert!(!pool.contains(&low));
        assert!(pool.contains(&high));
        assert!(pool.contains(&med));
    }

    #[test]
    fn rejects_when_no_lower_rate_entry_to_evict() {
        let mut pool = Mempool::new(2, 1_000_000);
        pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 5_000).unwrap();
        pool.insert(make_tx(&[outpoint(2, 0)], 49 * COIN, "addrB", 0), 10_000).unwrap();

        let err = pool.insert(make_tx(&[outpoint(3, 0)], 49 * COIN, "addrC", 0), 1_000).unwrap_err();
        assert!(matches!(err, MempoolError::PoolFull));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn respects_max_bytes() {
        let tx = make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0);
        let size = codec::serialize(&tx).len();
        let mut pool = Mempool::new(100, size);

        pool.insert(tx, COIN).unwrap();
        assert_eq!(pool.len(), 1);

        pool.insert(make_tx(&[outpoint(2, 0)], 48 * COIN, "addrB", 0), 2 * COIN).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn replace_requires_strictly_higher_fee() {
        let mut pool = Mempool::new(100, 100_000);
        let old = pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 1_000).unwrap();

        let err = pool
            .replace(&old, make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 1), 1_000)
            .unwrap_err();
        assert!(matches!(err, MempoolError::ReplacementNotHigherFee { .. }));
        assert!(pool.contains(&old));
    }

    #[test]
    fn replace_swaps_in_new_transaction() {
        let mut pool = Mempool::new(100, 100_000);
        let old = pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 1_000).unwrap();

        let new_txid = pool
            .replace(&old, make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 1), 2_000)
            .unwrap();
        assert!(!pool.contains(&old));
        assert!(pool.contains(&new_txid));
        assert_eq!(pool.get(&new_txid).unwrap().fee, 2_000);
    }

    #[test]
    fn replace_unknown_txid_fails() {
        let mut pool = Mempool::new(100, 100_000);
        let err = pool
            .replace(&Hash256::ZERO, make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 2_000)
            .unwrap_err();
        assert!(matches!(err, MempoolError::NotFound(_)));
    }

    #[test]
    fn remove_confirmed_removes_block_txids_and_conflicts() {
        let mut pool = Mempool::new(100, 100_000);
        let op = outpoint(1, 0);
        let pool_txid = pool.insert(make_tx(&[op], 49 * COIN, "addrA", 0), COIN).unwrap();
        let survivor = pool.insert(make_tx(&[outpoint(9, 0)], 49 * COIN, "addrZ", 0), COIN).unwrap();

        let block_tx = make_tx(&[op], 48 * COIN, "addrB", 99);
        let block = block_with(vec![coinbase_tx(), block_tx]);

        pool.remove_confirmed_block(&block);
        assert!(!pool.contains(&pool_txid));
        assert!(pool.contains(&survivor));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn clear_empties_all_indices() {
        let mut pool = Mempool::new(100, 100_000);
        pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), COIN).unwrap();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.current_bytes(), 0);
        assert!(!pool.has_conflict(&make_tx(&[outpoint(1, 0)], 1, "x", 0)));
    }

    #[test]
    fn rejects_fee_below_minimum() {
        let mut pool = Mempool::new(100, 100_000);
        let tx = make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0);
        let err = pool.insert(tx, 0).unwrap_err();
        assert!(matches!(err, MempoolError::FeeTooLow { fee: 0, .. }));
    }

    #[test]
    fn total_fees_tracks_insert_and_remove() {
        let mut pool = Mempool::new(100, 100_000);
        let txid = pool.insert(make_tx(&[outpoint(1, 0)], 49 * COIN, "addrA", 0), 1_000).unwrap();
        pool.insert(make_tx(&[outpoint(2, 0)], 49 * COIN, "addrB", 0), 2_000).unwrap();
        assert_eq!(pool.total_fees(), 3_000);

        pool.remove(&txid);
        assert_eq!(pool.total_fees(), 2_000);
    }
}
