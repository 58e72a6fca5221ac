//! Storage trait surface shared between the in-memory implementations
//! defined here and the RocksDB-backed collaborator `ledger-node` wires up
//! in production (`ledger-node::storage::RocksStore`).
//!
//! Two traits live here: [`BlockStore`] for the append-only block chain,
//! and [`MetadataStore`] for the small key-value surface peer records and
//! mempool snapshots are mirrored to. The UTXO set's own trait,
//! [`crate::utxo::UtxoStore`], lives next to its implementation instead.

use std::collections::HashMap;

use crate::error::LedgerError;
use crate::types::{Block, BlockHeader, Hash256, Transaction};

/// Append-only persistent store for the block chain.
///
/// There is deliberately no operation to disconnect or pop the tip: a
/// reorg onto a heavier fork goes through [`BlockStore::replace_with`],
/// which substitutes the entire chain atomically rather than rolling back
/// one block at a time (see [`crate::utxo`]'s matching design note).
pub trait BlockStore: Send + Sync {
    /// Append `block` as the new tip and write it through to the backing
    /// store. The caller has already validated `block` against the current
    /// tip.
    fn append(&mut self, block: Block) -> Result<(), LedgerError>;

    /// Current chain height. The genesis block is height 0.
    fn height(&self) -> u64;

    /// Header hash of the current tip, if any block has been appended.
    fn tip(&self) -> Option<Hash256>;

    /// The block at `index`, if the chain reaches that far.
    fn block_at(&self, index: u64) -> Option<Block>;

    /// Look up a block by its header hash.
    fn block_by_hash(&self, hash: &Hash256) -> Option<Block>;

    /// Sum of [`crate::difficulty::work_for_difficulty`] across every block
    /// in the chain. Used by fork choice to compare candidate chains that
    /// share the same height.
    fn total_work(&self) -> u128;

    /// Atomically replace the entire chain with `chain`. The caller has
    /// already validated `chain` in full (whole-chain validation lives in
    /// `ledger-consensus`). Implementations must apply it all-or-nothing
    /// and fail closed — leaving the prior chain untouched — if
    /// persistence fails partway through.
    fn replace_with(&mut self, chain: Vec<Block>) -> Result<(), LedgerError>;

    /// Reload chain state from the backing store at startup.
    fn load_from_storage(&mut self) -> Result<(), LedgerError>;

    /// Durably persist `block` without altering in-memory chain state.
    /// `append` calls this internally; exposed separately so startup
    /// replay and tests can drive persistence on its own.
    fn persist(&mut self, block: &Block) -> Result<(), LedgerError>;

    /// The tip's header, if any.
    fn tip_header(&self) -> Option<BlockHeader> {
        let hash = self.tip()?;
        self.block_by_hash(&hash).map(|b| b.header)
    }
}

/// Key under which the mempool's pending transactions are mirrored.
pub const MEMPOOL_SNAPSHOT_KEY: &str = "mempool/snapshot";

/// Key prefix under which peer records are mirrored, one key per peer
/// address (`peer/<address>`).
pub const PEER_RECORD_PREFIX: &str = "peer/";

/// Small key-value collaborator mirrored for persistence of things that
/// aren't blocks: peer records (`ledger-network`) and mempool snapshots
/// (below). Callers serialize their own values and hand this trait raw
/// bytes, so `ledger-core` doesn't need to know about `ledger-network`'s
/// peer-record type.
pub trait MetadataStore: Send + Sync {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), LedgerError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;
    fn delete(&mut self, key: &str) -> Result<(), LedgerError>;
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, LedgerError>;
}

/// Mirror the mempool's current contents under [`MEMPOOL_SNAPSHOT_KEY`] so
/// a restart can reload pending transactions.
pub fn put_mempool_snapshot(store: &mut dyn MetadataStore, txs: &[Transaction]) -> Result<(), LedgerError> {
    let bytes = serde_json::to_vec(txs).map_err(|e| LedgerError::Storage(e.to_string()))?;
    store.put(MEMPOOL_SNAPSHOT_KEY, &bytes)
}

/// Load the most recently mirrored mempool snapshot, or an empty list if
/// none has been written yet.
pub fn load_mempool_snapshot(store: &dyn MetadataStore) -> Result<Vec<Transaction>, LedgerError> {
    match store.get(MEMPOOL_SNAPSHOT_KEY)? {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| LedgerError::Storage(e.to_string())),
        None => Ok(Vec::new()),
    }
}

/// In-memory [`BlockStore`]. Used for testing and as the reference
/// implementation the RocksDB-backed store mirrors.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Vec<Block>,
    by_hash: HashMap<Hash256, u64>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn append(&mut self, block: Block) -> Result<(), LedgerError> {
        self.persist(&block)?;
        let hash = block.header.hash();
        let index = block.header.index;
        self.blocks.push(block);
        self.by_hash.insert(hash, index);
        Ok(())
    }

    fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn tip(&self) -> Option<Hash256> {
        self.blocks.last().map(|b| b.header.hash())
    }

    fn block_at(&self, index: u64) -> Option<Block> {
        self.blocks.get(index as usize).cloned()
    }

    fn block_by_hash(&self, hash: &Hash256) -> Option<Block> {
        let index = *self.by_hash.get(hash)?;
        self.block_at(index)
    }

    fn total_work(&self) -> u128 {
        self.blocks
            .iter()
            .map(|b| crate::difficulty::work_for_difficulty(b.header.difficulty))
            .sum()
    }

    fn replace_with(&mut self, chain: Vec<Block>) -> Result<(), LedgerError> {
        let mut by_hash = HashMap::with_capacity(chain.len());
        for block in &chain {
            by_hash.insert(block.header.hash(), block.header.index);
        }
        self.blocks = chain;
        self.by_hash = by_hash;
        Ok(())
    }

    fn load_from_storage(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }

    fn persist(&mut self, _block: &Block) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// In-memory [`MetadataStore`]. Used for testing and as the reference
/// implementation the RocksDB-backed store mirrors.
#[derive(Default)]
pub struct MemoryMetadataStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), LedgerError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.entries.get(key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<(), LedgerError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, LedgerError> {
        Ok(self.entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle;
    use crate::types::{OutPoint, TxInput, TxOutput};

    fn coinbase_tx(value: u64, address: &str, nonce: u8) -> Transaction {
        Transaction {
            vins: vec![TxInput { previous_output: OutPoint::null(), pubkey: vec![], signature: vec![nonce; 8] }],
            vouts: vec![TxOutput { value, pubkey_hash: address.to_string() }],
            n_lock_time: 0,
        }
    }

    fn block_at_height(index: u64, difficulty: u32, prev_hash: Hash256, nonce: u8) -> Block {
        let cb = coinbase_tx(5000, "addrA", nonce);
        let txid = crate::codec::txid(&cb);
        Block {
            header: BlockHeader {
                index,
                timestamp: 1_000_000 + index * 60,
                prev_hash,
                difficulty,
                merkle_root: merkle::merkle_root(&[txid]),
                nonce: 0,
            },
            transactions: vec![cb],
        }
    }

    #[test]
    fn empty_store_has_no_tip() {
        let store = MemoryBlockStore::new();
        assert_eq!(store.height(), 0);
        assert!(store.tip().is_none());
    }

    #[test]
    fn append_advances_height_and_tip() {
        let mut store = MemoryBlockStore::new();
        let b0 = block_at_height(0, 1, Hash256::ZERO, 1);
        let hash0 = b0.header.hash();
        store.append(b0).unwrap();

        assert_eq!(store.height(), 1);
        assert_eq!(store.tip(), Some(hash0));

        let b1 = block_at_height(1, 1, hash0, 2);
        let hash1 = b1.header.hash();
        store.append(b1).unwrap();

        assert_eq!(store.height(), 2);
        assert_eq!(store.tip(), Some(hash1));
    }

    #[test]
    fn block_at_returns_none_past_tip() {
        let store = MemoryBlockStore::new();
        assert!(store.block_at(0).is_none());
    }

    #[test]
    fn block_by_hash_finds_appended_block() {
        let mut store = MemoryBlockStore::new();
        let b0 = block_at_height(0, 1, Hash256::ZERO, 1);
        let hash0 = b0.header.hash();
        store.append(b0.clone()).unwrap();

        assert_eq!(store.block_by_hash(&hash0), Some(b0));
        assert!(store.block_by_hash(&Hash256([0xFF; 32])).is_none());
    }

    #[test]
    fn total_work_sums_per_block_difficulty() {
        let mut store = MemoryBlockStore::new();
        let b0 = block_at_height(0, 2, Hash256::ZERO, 1);
        let hash0 = b0.header.hash();
        store.append(b0).unwrap();
        store.append(block_at_height(1, 3, hash0, 2)).unwrap();

        let expected = crate::difficulty::work_for_difficulty(2) + crate::difficulty::work_for_difficulty(3);
        assert_eq!(store.total_work(), expected);
    }

    #[test]
    fn replace_with_swaps_entire_chain() {
        let mut store = MemoryBlockStore::new();
        store.append(block_at_height(0, 1, Hash256::ZERO, 1)).unwrap();

        let fork0 = block_at_height(0, 1, Hash256::ZERO, 9);
        let fork0_hash = fork0.header.hash();
        let fork1 = block_at_height(1, 1, fork0_hash, 10);
        let fork1_hash = fork1.header.hash();

        store.replace_with(vec![fork0, fork1]).unwrap();

        assert_eq!(store.height(), 2);
        assert_eq!(store.tip(), Some(fork1_hash));
    }

    #[test]
    fn tip_header_matches_tip_block() {
        let mut store = MemoryBlockStore::new();
        let b0 = block_at_height(0, 1, Hash256::ZERO, 1);
        store.append(b0.clone()).unwrap();
        assert_eq!(store.tip_header(), Some(b0.header));
    }

    #[test]
    fn metadata_store_put_get_delete() {
        let mut store = MemoryMetadataStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.put("k", b"v1").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v1".to_vec()));

        store.put("k", b"v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v2".to_vec()));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn metadata_store_keys_with_prefix() {
        let mut store = MemoryMetadataStore::new();
        store.put("peer/a", b"1").unwrap();
        store.put("peer/b", b"2").unwrap();
        store.put("mempool/snapshot", b"3").unwrap();

        let mut peers = store.keys_with_prefix(PEER_RECORD_PREFIX).unwrap();
        peers.sort();
        assert_eq!(peers, vec!["peer/a".to_string(), "peer/b".to_string()]);
    }

    #[test]
    fn mempool_snapshot_round_trips() {
        let mut store = MemoryMetadataStore::new();
        assert_eq!(load_mempool_snapshot(&store).unwrap(), Vec::<Transaction>::new());

        let cb = coinbase_tx(100, "addrA", 1);
        put_mempool_snapshot(&mut store, &[cb.clone()]).unwrap();

        let loaded = load_mempool_snapshot(&store).unwrap();
        assert_eq!(loaded, vec![cb]);
    }

    #[test]
    fn mempool_snapshot_overwrites_prior_value() {
        let mut store = MemoryMetadataStore::new();
        let cb1 = coinbase_tx(100, "addrA", 1);
        let cb2 = coinbase_tx(200, "addrB", 2);

        put_mempool_snapshot(&mut store, &[cb1]).unwrap();
        put_mempool_snapshot(&mut store, &[cb2.clone()]).unwrap();

        assert_eq!(load_mempool_snapshot(&store).unwrap(), vec![cb2]);
    }
}
