//! RocksDB-backed persistent storage.
//!
//! Implements [`BlockStore`] and [`MetadataStore`] over three column
//! families: blocks by hash, a height index, and a flat metadata table
//! that also backs [`MetadataStore`]'s own namespaced keys (peer records,
//! mempool snapshot). The UTXO set is NOT persisted here — see
//! [`crate::node`]'s module doc for why it stays in memory, rebuilt from
//! the block store at startup.
//!
//! All multi-key mutations (`append`, `replace_with`) use an atomic
//! [`WriteBatch`] so a crash mid-write never leaves the height index and
//! block table disagreeing.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};

use ledger_core::error::LedgerError;
use ledger_core::traits::{BlockStore, MetadataStore};
use ledger_core::types::{Block, Hash256};

const CF_BLOCKS: &str = "blocks";
const CF_HEIGHT_INDEX: &str = "height_index";
const CF_METADATA: &str = "metadata";
const ALL_CFS: &[&str] = &[CF_BLOCKS, CF_HEIGHT_INDEX, CF_METADATA];

const META_TIP_HEIGHT: &str = "block_store/tip_height";
const META_TIP_HASH: &str = "block_store/tip_hash";
const META_TOTAL_WORK: &str = "block_store/total_work";

/// RocksDB-backed [`BlockStore`] and [`MetadataStore`].
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at `path`, creating column
    /// families on first use. Does not seed the genesis block — callers
    /// check [`BlockStore::height`] and append it themselves if empty (see
    /// `Node::new`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> =
            ALL_CFS.iter().map(|name| ColumnFamilyDescriptor::new(*name, Options::default())).collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(Self { db })
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, LedgerError> {
        self.db.cf_handle(name).ok_or_else(|| LedgerError::Storage(format!("missing column family: {name}")))
    }

    fn height_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }

    fn get_meta_u64(&self, key: &str) -> Result<Option<u64>, LedgerError> {
        match self.get(key)? {
            Some(bytes) => {
                let arr: [u8; 8] =
                    bytes.try_into().map_err(|_| LedgerError::Storage(format!("corrupt u64 metadata: {key}")))?;
                Ok(Some(u64::from_le_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn get_meta_u128(&self, key: &str) -> Result<Option<u128>, LedgerError> {
        match self.get(key)? {
            Some(bytes) => {
                let arr: [u8; 16] =
                    bytes.try_into().map_err(|_| LedgerError::Storage(format!("corrupt u128 metadata: {key}")))?;
                Ok(Some(u128::from_le_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn get_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, LedgerError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        match self.db.get_cf(&cf, hash.as_bytes()).map_err(|e| LedgerError::Storage(e.to_string()))? {
            Some(bytes) => {
                let block = serde_json::from_slice(&bytes).map_err(|e| LedgerError::Storage(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    fn hash_at_height(&self, index: u64) -> Result<Option<Hash256>, LedgerError> {
        let cf = self.cf_handle(CF_HEIGHT_INDEX)?;
        match self.db.get_cf(&cf, Self::height_key(index)).map_err(|e| LedgerError::Storage(e.to_string()))? {
            Some(bytes) => {
                let arr: [u8; 32] = bytes.try_into().map_err(|_| LedgerError::Storage("corrupt hash index".into()))?;
                Ok(Some(Hash256::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }
}

impl BlockStore for RocksStore {
    fn append(&mut self, block: Block) -> Result<(), LedgerError> {
        self.persist(&block)?;

        let height = self.height();
        let total_work = self.total_work();

        let mut batch = WriteBatch::default();
        let cf_height = self.cf_handle(CF_HEIGHT_INDEX)?;
        batch.put_cf(cf_height, Self::height_key(block.header.index), block.header.hash().as_bytes());
        let cf_meta = self.cf_handle(CF_METADATA)?;
        batch.put_cf(cf_meta, META_TIP_HEIGHT.as_bytes(), (height + 1).to_le_bytes());
        batch.put_cf(cf_meta, META_TIP_HASH.as_bytes(), block.header.hash().as_bytes());
        let new_work = total_work + ledger_core::difficulty::work_for_difficulty(block.header.difficulty);
        batch.put_cf(cf_meta, META_TOTAL_WORK.as_bytes(), new_work.to_le_bytes());
        self.db.write(batch).map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn height(&self) -> u64 {
        self.get_meta_u64(META_TIP_HEIGHT).ok().flatten().unwrap_or(0)
    }

    fn tip(&self) -> Option<Hash256> {
        let bytes = self.get(META_TIP_HASH).ok().flatten()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash256::from_bytes(arr))
    }

    fn block_at(&self, index: u64) -> Option<Block> {
        let hash = self.hash_at_height(index).ok().flatten()?;
        self.get_block_by_hash(&hash).ok().flatten()
    }

    fn block_by_hash(&self, hash: &Hash256) -> Option<Block> {
        self.get_block_by_hash(hash).ok().flatten()
    }

    fn total_work(&self) -> u128 {
        self.get_meta_u128(META_TOTAL_WORK).ok().flatten().unwrap_or(0)
    }

    fn replace_with(&mut self, chain: Vec<Block>) -> Result<(), LedgerError> {
        let mut batch = WriteBatch::default();
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_height = self.cf_handle(CF_HEIGHT_INDEX)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        // Clear every block from the abandoned chain before writing the
        // replacement, in the same batch, so no orphaned fork data persists.
        for item in self.db.iterator_cf(cf_blocks, rocksdb::IteratorMode::Start) {
            let (key, _) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            batch.delete_cf(cf_blocks, key);
        }
        for item in self.db.iterator_cf(cf_height, rocksdb::IteratorMode::Start) {
            let (key, _) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            batch.delete_cf(cf_height, key);
        }

        let mut total_work: u128 = 0;
        let mut tip_hash = Hash256::ZERO;
        for block in &chain {
            let bytes = serde_json::to_vec(block).map_err(|e| LedgerError::Storage(e.to_string()))?;
            let hash = block.header.hash();
            batch.put_cf(cf_blocks, hash.as_bytes(), &bytes);
            batch.put_cf(cf_height, Self::height_key(block.header.index), hash.as_bytes());
            total_work += ledger_core::difficulty::work_for_difficulty(block.header.difficulty);
            tip_hash = hash;
        }

        batch.put_cf(cf_meta, META_TIP_HEIGHT.as_bytes(), (chain.len() as u64).to_le_bytes());
        batch.put_cf(cf_meta, META_TIP_HASH.as_bytes(), tip_hash.as_bytes());
        batch.put_cf(cf_meta, META_TOTAL_WORK.as_bytes(), total_work.to_le_bytes());

        self.db.write(batch).map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn load_from_storage(&mut self) -> Result<(), LedgerError> {
        // RocksDB reads are already live against disk; nothing to warm up.
        Ok(())
    }

    fn persist(&mut self, block: &Block) -> Result<(), LedgerError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let bytes = serde_json::to_vec(block).map_err(|e| LedgerError::Storage(e.to_string()))?;
        self.db.put_cf(&cf, block.header.hash().as_bytes(), &bytes).map_err(|e| LedgerError::Storage(e.to_string()))
    }
}

impl MetadataStore for RocksStore {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), LedgerError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db.put_cf(&cf, key.as_bytes(), value).map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db.get_cf(&cf, key.as_bytes()).map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn delete(&mut self, key: &str) -> Result<(), LedgerError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db.delete_cf(&cf, key.as_bytes()).map_err(|e| LedgerError::Storage(e.to_string()))
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, LedgerError> {
        let cf = self.cf_handle(CF_METADATA)?;
        let mode = rocksdb::IteratorMode::From(prefix.as_bytes(), rocksdb::Direction::Forward);
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, _) = item.map_err(|e| LedgerError::Storage(e.to_string()))?;
            let Ok(key) = String::from_utf8(key.to_vec()) else { continue };
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::codec;
    use ledger_core::merkle;
    use ledger_core::types::{BlockHeader, OutPoint, Transaction, TxInput, TxOutput};

    fn coinbase(value: u64, address: &str, nonce: u8) -> Transaction {
        Transaction {
            vins: vec![TxInput { previous_output: OutPoint::null(), pubkey: vec![], signature: vec![nonce; 4] }],
            vouts: vec![TxOutput { value, pubkey_hash: address.to_string() }],
            n_lock_time: 0,
        }
    }

    fn block_at(index: u64, difficulty: u32, prev_hash: Hash256, nonce: u8) -> Block {
        let cb = coinbase(5_000, "addrA", nonce);
        let txid = codec::txid(&cb);
        Block {
            header: BlockHeader {
                index,
                timestamp: 1_000_000 + index,
                prev_hash,
                difficulty,
                merkle_root: merkle::merkle_root(&[txid]),
                nonce: 0,
            },
            transactions: vec![cb],
        }
    }

    fn temp_store() -> (tempfile::TempDir, RocksStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn fresh_store_is_empty() {
        let (_dir, store) = temp_store();
        assert_eq!(store.height(), 0);
        assert!(store.tip().is_none());
    }

    #[test]
    fn append_advances_height_and_tip() {
        let (_dir, mut store) = temp_store();
        let b0 = block_at(0, 1, Hash256::ZERO, 1);
        let hash0 = b0.header.hash();
        store.append(b0).unwrap();

        assert_eq!(store.height(), 1);
        assert_eq!(store.tip(), Some(hash0));
    }

    #[test]
    fn block_at_and_by_hash_agree() {
        let (_dir, mut store) = temp_store();
        let b0 = block_at(0, 1, Hash256::ZERO, 1);
        let hash0 = b0.header.hash();
        store.append(b0.clone()).unwrap();

        assert_eq!(store.block_at(0), Some(b0.clone()));
        assert_eq!(store.block_by_hash(&hash0), Some(b0));
    }

    #[test]
    fn total_work_accumulates_across_appends() {
        let (_dir, mut store) = temp_store();
        let b0 = block_at(0, 2, Hash256::ZERO, 1);
        let hash0 = b0.header.hash();
        store.append(b0).unwrap();
        store.append(block_at(1, 3, hash0, 2)).unwrap();

        let expected =
            ledger_core::difficulty::work_for_difficulty(2) + ledger_core::difficulty::work_for_difficulty(3);
        assert_eq!(store.total_work(), expected);
    }

    #[test]
    fn replace_with_swaps_entire_chain() {
        let (_dir, mut store) = temp_store();
        let abandoned = block_at(0, 1, Hash256::ZERO, 1);
        let abandoned_hash = abandoned.header.hash();
        store.append(abandoned).unwrap();

        let fork0 = block_at(0, 1, Hash256::ZERO, 9);
        let fork0_hash = fork0.header.hash();
        let fork1 = block_at(1, 1, fork0_hash, 10);
        let fork1_hash = fork1.header.hash();
        store.replace_with(vec![fork0, fork1]).unwrap();

        assert_eq!(store.height(), 2);
        assert_eq!(store.tip(), Some(fork1_hash));
        assert!(store.block_at(0).is_some_and(|b| b.header.hash() == fork0_hash));
        assert!(store.block_by_hash(&abandoned_hash).is_none());
    }

    #[test]
    fn replace_with_deletes_the_abandoned_forks_blocks() {
        let (_dir, mut store) = temp_store();
        let short_fork = block_at(0, 1, Hash256::ZERO, 1);
        let short_fork_hash = short_fork.header.hash();
        store.append(short_fork).unwrap();

        let heavy0 = block_at(0, 1, Hash256::ZERO, 9);
        let heavy0_hash = heavy0.header.hash();
        let heavy1 = block_at(1, 1, heavy0_hash, 10);
        store.replace_with(vec![heavy0, heavy1]).unwrap();

        assert!(store.block_by_hash(&short_fork_hash).is_none());
    }

    #[test]
    fn reopening_store_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let hash0 = {
            let mut store = RocksStore::open(dir.path()).unwrap();
            let b0 = block_at(0, 1, Hash256::ZERO, 1);
            let hash0 = b0.header.hash();
            store.append(b0).unwrap();
            hash0
        };

        let reopened = RocksStore::open(dir.path()).unwrap();
        assert_eq!(reopened.height(), 1);
        assert_eq!(reopened.tip(), Some(hash0));
    }

    #[test]
    fn metadata_put_get_delete() {
        let (_dir, mut store) = temp_store();
        assert_eq!(MetadataStore::get(&store, "k").unwrap(), None);

        store.put("k", b"v1").unwrap();
        assert_eq!(MetadataStore::get(&store, "k").unwrap(), Some(b"v1".to_vec()));

        store.delete("k").unwrap();
        assert_eq!(MetadataStore::get(&store, "k").unwrap(), None);
    }

    #[test]
    fn metadata_keys_with_prefix_is_scoped() {
        let (_dir, mut store) = temp_store();
        store.put("peer/a", b"1").unwrap();
        store.put("peer/b", b"2").unwrap();
        store.put("mempool/snapshot", b"3").unwrap();

        let mut peers = store.keys_with_prefix("peer/").unwrap();
        peers.sort();
        assert_eq!(peers, vec!["peer/a".to_string(), "peer/b".to_string()]);
    }
}
