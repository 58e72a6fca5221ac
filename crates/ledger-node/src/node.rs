//! Full-node state: the single chain/UTXO lock, the mempool, the neighbor
//! table, and the operations the HTTP surface and CLI both call through.
//!
//! The UTXO set is NOT persisted by [`RocksStore`](crate::storage::RocksStore):
//! `ledger_core::utxo::UtxoStore`'s methods are all infallible, which rules
//! out a RocksDB-backed implementation without panicking on I/O errors. So
//! `Node` keeps the live set as [`MemoryUtxoSet`], rebuilt at startup (and
//! after every chain replacement) by replaying the persisted block store
//! with [`rebuild_from_blocks`] — itself a spec-mandated operation, not a
//! workaround, since the rebuilt set must always equal the live one.
//!
//! One `parking_lot::RwLock` co-protects the block store and UTXO set
//! (write mode for block append, chain replacement, and mempool-pruning
//! block acceptance; read mode for queries). The mempool and neighbor
//! table each have their own lock and are never held across network I/O.

use parking_lot::{Mutex, RwLock};
use rand::rngs::OsRng;
use tracing::{info, warn};

use ledger_consensus::{build_block_template, validate_block, validate_block_structure, validate_chain, BlockContext};
use ledger_core::constants::SUBSIDY;
use ledger_core::difficulty::difficulty_for_height;
use ledger_core::error::{BlockError, LedgerError, MempoolError, TransactionError};
use ledger_core::mempool::Mempool;
use ledger_core::traits::{load_mempool_snapshot, put_mempool_snapshot};
use ledger_core::types::{Block, Hash256, Transaction};
use ledger_core::utxo::{rebuild_from_blocks, MemoryUtxoSet, UtxoStore};
use ledger_core::validation::validate_transaction;
use ledger_network::{ChainSnapshot, NeighborTable, SyncTarget};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

/// Chain and UTXO state behind the single state lock.
struct ChainState {
    store: RocksStore,
    utxo: MemoryUtxoSet,
}

impl ChainState {
    fn rebuild_utxo(&mut self) -> Result<(), LedgerError> {
        let height = self.store.height();
        let blocks: Vec<Block> = (0..height).filter_map(|i| self.store.block_at(i)).collect();
        rebuild_from_blocks(&mut self.utxo, blocks.iter())
    }
}

/// A full node: storage, mempool, neighbor table, configuration.
pub struct Node {
    chain: RwLock<ChainState>,
    mempool: Mutex<Mempool>,
    neighbors: Mutex<NeighborTable>,
    config: NodeConfig,
}

impl Node {
    /// Open (or create) the node's RocksDB store, connecting the canonical
    /// genesis block if it's empty, then rebuild the UTXO set and reload
    /// the mempool and neighbor table from their mirrored snapshots.
    pub fn open(config: NodeConfig) -> Result<Self, LedgerError> {
        let mut store = RocksStore::open(config.db_path())?;

        if store.height() == 0 && store.tip().is_none() {
            store.append(ledger_core::genesis::genesis_block().clone())?;
            info!("connected canonical genesis block to empty store");
        }

        let mut utxo = MemoryUtxoSet::new();
        let height = store.height();
        let blocks: Vec<Block> = (0..height).filter_map(|i| store.block_at(i)).collect();
        rebuild_from_blocks(&mut utxo, blocks.iter())?;

        let mut mempool = Mempool::with_defaults();
        for tx in load_mempool_snapshot(&store)? {
            if let Ok(validated) = validate_transaction(&tx, |op| utxo.lookup(op)) {
                let _ = mempool.insert(tx, validated.fee);
            }
        }

        let neighbors = NeighborTable::load(&store)?;

        Ok(Self {
            chain: RwLock::new(ChainState { store, utxo }),
            mempool: Mutex::new(mempool),
            neighbors: Mutex::new(neighbors),
            config,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Current height and tip hash, for HTTP/CLI status queries.
    pub fn height(&self) -> u64 {
        self.chain.read().store.height()
    }

    pub fn tip(&self) -> Option<Hash256> {
        self.chain.read().store.tip()
    }

    pub fn total_difficulty(&self) -> u128 {
        self.chain.read().store.total_work()
    }

    pub fn block_at(&self, index: u64) -> Option<Block> {
        self.chain.read().store.block_at(index)
    }

    pub fn full_chain(&self) -> Vec<Block> {
        let chain = self.chain.read();
        let height = chain.store.height();
        (0..height).filter_map(|i| chain.store.block_at(i)).collect()
    }

    fn next_difficulty(store: &RocksStore, parent_height: u64, parent_difficulty: u32) -> u32 {
        difficulty_for_height(parent_height + 1, parent_difficulty, |h| {
            store.block_at(h).map(|b| b.header.timestamp).unwrap_or(0)
        })
    }

    /// Mirror the mempool's current contents to the metadata table. Called
    /// with the state lock already held for writing.
    fn persist_mempool_locked(&self, store: &mut RocksStore) {
        let entries: Vec<Transaction> = self.mempool.lock().iter().map(|e| e.tx.clone()).collect();
        if let Err(error) = put_mempool_snapshot(store, &entries) {
            warn!(%error, "failed to persist mempool snapshot");
        }
    }

    /// Accept a block submitted by a peer or mined locally: validate it
    /// against the current tip, append it, advance the UTXO set, and
    /// prune any mempool entries it confirmed or conflicted with. This is
    /// the single-block path; a strictly-better competing chain only
    /// replaces local state via [`Self::apply_if_better`].
    pub fn submit_block(&self, block: Block) -> Result<(), BlockError> {
        let mut chain = self.chain.write();

        let tip_header = chain.store.tip_header();

        if tip_header.is_none() {
            // Only the canonical genesis may be submitted onto an empty store.
            if block != *ledger_core::genesis::genesis_block() {
                return Err(BlockError::InvalidHeight { expected: 0, got: block.header.index });
            }
            chain.store.append(block).map_err(|e| BlockError::TransactionError {
                index: 0,
                source: TransactionError::InvalidCoinbase(e.to_string()),
            })?;
            return Ok(());
        }

        let header = tip_header.expect("checked above");
        let expected_index = header.index + 1;
        let prev_hash = header.hash();
        let expected_difficulty = Self::next_difficulty(&chain.store, header.index, header.difficulty);
        let context = BlockContext { height: expected_index, prev_hash, expected_difficulty };

        validate_block(&block, &context, |op| chain.utxo.lookup(op))?;

        ledger_core::utxo::apply_block(&mut chain.utxo, &block).map_err(|e| {
            let source = match e {
                LedgerError::Transaction(t) => t,
                other => TransactionError::InvalidCoinbase(other.to_string()),
            };
            BlockError::TransactionError { index: 0, source }
        })?;

        chain.store.append(block.clone()).map_err(|e| BlockError::TransactionError {
            index: 0,
            source: TransactionError::InvalidCoinbase(e.to_string()),
        })?;

        self.mempool.lock().remove_confirmed_block(&block);
        self.persist_mempool_locked(&mut chain.store);

        Ok(())
    }

    /// Validate and admit a transaction into the mempool, returning its
    /// txid.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Hash256, TransactionError> {
        let fee = {
            let chain = self.chain.read();
            validate_transaction(&tx, |op| chain.utxo.lookup(op))?.fee
        };

        let txid = {
            let mut mempool = self.mempool.lock();
            mempool.insert(tx, fee).map_err(|e| match e {
                MempoolError::FeeTooLow { fee, minimum } => {
                    TransactionError::InsufficientFunds { have: fee, need: minimum }
                }
                other => TransactionError::InvalidCoinbase(other.to_string()),
            })?
        };

        let mut chain = self.chain.write();
        self.persist_mempool_locked(&mut chain.store);

        Ok(txid)
    }

    /// Build an unmined block template for `miner_address` atop the
    /// current tip, using the highest-fee mempool entries that still
    /// validate against the live UTXO set.
    pub fn build_template(&self, miner_address: &str, timestamp: u64) -> Block {
        let chain = self.chain.read();
        let mempool = self.mempool.lock();

        let (height, prev_hash, difficulty) = match chain.store.tip_header() {
            Some(header) => {
                let difficulty = Self::next_difficulty(&chain.store, header.index, header.difficulty);
                (header.index + 1, header.hash(), difficulty)
            }
            None => (0, Hash256::ZERO, ledger_core::constants::INITIAL_DIFFICULTY),
        };

        let candidates = mempool.top(ledger_core::constants::MAX_BLOCK_TXS - 1);
        let utxo = &chain.utxo;
        let mut rng = OsRng;

        build_block_template(
            height,
            prev_hash,
            difficulty,
            timestamp,
            SUBSIDY,
            miner_address,
            &candidates,
            |op| utxo.lookup(op),
            &mut rng,
        )
    }

    /// Validate a freshly-mined block's structure before handing it to
    /// [`Self::submit_block`]; cheap enough to call off the state lock
    /// between mining attempts.
    pub fn check_mined_block(block: &Block) -> Result<(), BlockError> {
        validate_block_structure(block)
    }

    pub fn peer_addresses(&self) -> Vec<String> {
        self.neighbors.lock().addresses()
    }

    /// Register `address` as a known peer without probing it — the caller
    /// (the HTTP handler) probes asynchronously afterward and reports the
    /// outcome through [`SyncTarget::record_peer_success`] /
    /// [`SyncTarget::record_peer_failure`], so network I/O never happens
    /// under the state lock.
    pub fn add_peer(&self, address: &str) -> Result<(), LedgerError> {
        let mut chain = self.chain.write();
        self.neighbors.lock().add(&mut chain.store, address)
    }

    pub fn remove_peer(&self, address: &str) -> Result<bool, LedgerError> {
        let mut chain = self.chain.write();
        self.neighbors.lock().remove(&mut chain.store, address)
    }
}

impl SyncTarget for Node {
    fn active_peer_addresses(&self) -> Vec<String> {
        self.neighbors.lock().active_addresses()
    }

    fn snapshot(&self) -> ChainSnapshot {
        let chain = self.chain.read();
        ChainSnapshot { height: chain.store.height(), total_work: chain.store.total_work() }
    }

    fn apply_if_better(&self, candidate: Vec<Block>) -> Result<bool, LedgerError> {
        let mut chain = self.chain.write();

        let local_height = chain.store.height();
        let local_work = chain.store.total_work();
        let candidate_height = candidate.len() as u64;
        let candidate_work: u128 =
            candidate.iter().map(|b| ledger_core::difficulty::work_for_difficulty(b.header.difficulty)).sum();

        if !ledger_consensus::should_replace_chain(local_height, local_work, candidate_height, candidate_work) {
            return Ok(false);
        }

        if validate_chain(&candidate).is_err() {
            return Ok(false);
        }

        chain.store.replace_with(candidate)?;
        chain.rebuild_utxo()?;

        self.mempool.lock().clear();
        self.persist_mempool_locked(&mut chain.store);

        Ok(true)
    }

    fn record_peer_success(&self, address: &str, known_height: u64) {
        let mut chain = self.chain.write();
        let _ = self.neighbors.lock().record_success(&mut chain.store, address, Some(known_height));
    }

    fn record_peer_failure(&self, address: &str) {
        let mut chain = self.chain.write();
        let _ = self.neighbors.lock().record_failure(&mut chain.store, address, self.config.network.failure_threshold);
    }

    fn prune_stale_peers(&self) -> usize {
        let mut chain = self.chain.write();
        let prune_after_secs = self.config.network.prune_after.as_secs();
        match self.neighbors.lock().prune_stale(&mut chain.store, prune_after_secs) {
            Ok(pruned) => pruned,
            Err(error) => {
                warn!(%error, "failed to prune stale neighbor-table entries");
                0
            }
        }
    }
}
