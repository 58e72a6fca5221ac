//! Integration tests driving `RocksStore` purely through the shared
//! `ledger_core::traits` surface, the way `ledger_node::Node` does.

use ledger_core::genesis;
use ledger_core::traits::{
    load_mempool_snapshot, put_mempool_snapshot, BlockStore, MetadataStore, PEER_RECORD_PREFIX,
};
use ledger_core::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};
use ledger_node::storage::RocksStore;

fn coinbase(height: u64, reward: u64, pubkey_hash: &str) -> Transaction {
    Transaction {
        vins: vec![TxInput {
            previous_output: OutPoint::null(),
            pubkey: vec![],
            signature: height.to_le_bytes().to_vec(),
        }],
        vouts: vec![TxOutput { value: reward, pubkey_hash: pubkey_hash.to_string() }],
        n_lock_time: height,
    }
}

fn child_block(parent: &Block, timestamp: u64, reward: u64) -> Block {
    let height = parent.header.index + 1;
    let transactions = vec![coinbase(height, reward, "miner")];
    Block {
        header: BlockHeader {
            index: height,
            timestamp,
            prev_hash: parent.header.hash(),
            difficulty: parent.header.difficulty,
            merkle_root: "0".to_string(),
            nonce: 0,
        },
        transactions,
    }
}

#[test]
fn appends_build_a_chain_on_top_of_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();
    store.append(genesis::genesis_block().clone()).unwrap();

    let block1 = child_block(genesis::genesis_block(), genesis::GENESIS_TIMESTAMP + 60, 50);
    let block2 = child_block(&block1, genesis::GENESIS_TIMESTAMP + 120, 50);
    store.append(block1.clone()).unwrap();
    store.append(block2.clone()).unwrap();

    assert_eq!(store.height(), 2);
    assert_eq!(store.tip(), Some(block2.header.hash()));
    assert_eq!(store.block_at(1).unwrap().header.hash(), block1.header.hash());
}

#[test]
fn reopened_store_reflects_prior_session_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let block1;
    {
        let mut store = RocksStore::open(dir.path()).unwrap();
        store.append(genesis::genesis_block().clone()).unwrap();
        block1 = child_block(genesis::genesis_block(), genesis::GENESIS_TIMESTAMP + 60, 50);
        store.append(block1.clone()).unwrap();
    }

    let reopened = RocksStore::open(dir.path()).unwrap();
    assert_eq!(reopened.height(), 1);
    assert_eq!(reopened.tip(), Some(block1.header.hash()));
    assert_eq!(reopened.total_work(), {
        let mut store = RocksStore::open(dir.path()).unwrap();
        store.load_from_storage().unwrap();
        store.total_work()
    });
}

#[test]
fn replace_with_swaps_the_whole_chain_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();
    store.append(genesis::genesis_block().clone()).unwrap();
    let short_fork = child_block(genesis::genesis_block(), genesis::GENESIS_TIMESTAMP + 60, 50);
    let short_fork_hash = short_fork.header.hash();
    store.append(short_fork).unwrap();

    let heavy1 = child_block(genesis::genesis_block(), genesis::GENESIS_TIMESTAMP + 90, 50);
    let heavy2 = child_block(&heavy1, genesis::GENESIS_TIMESTAMP + 150, 50);
    let heavy_chain = vec![genesis::genesis_block().clone(), heavy1, heavy2.clone()];
    store.replace_with(heavy_chain).unwrap();

    assert_eq!(store.height(), 2);
    assert_eq!(store.tip(), Some(heavy2.header.hash()));
    assert!(
        store.block_by_hash(&short_fork_hash).is_none(),
        "abandoned fork's block must be purged from the store, not just unreachable by height"
    );
}

#[test]
fn mempool_snapshot_round_trips_through_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();

    assert!(load_mempool_snapshot(&store).unwrap().is_empty());

    let pending = vec![coinbase(1, 10, "someone")];
    put_mempool_snapshot(&mut store, &pending).unwrap();

    let reloaded = load_mempool_snapshot(&store).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].vouts[0].pubkey_hash, "someone");
}

#[test]
fn peer_record_prefix_scan_is_scoped_to_peers() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();

    store.put(&format!("{PEER_RECORD_PREFIX}127.0.0.1:7878"), b"a").unwrap();
    store.put(&format!("{PEER_RECORD_PREFIX}127.0.0.1:7879"), b"b").unwrap();
    store.put("block_store/tip_height", b"irrelevant").unwrap();

    let keys = store.keys_with_prefix(PEER_RECORD_PREFIX).unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.starts_with(PEER_RECORD_PREFIX)));
}

#[test]
fn block_by_hash_finds_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RocksStore::open(dir.path()).unwrap();
    store.append(genesis::genesis_block().clone()).unwrap();

    let found = store.block_by_hash(&genesis::genesis_hash()).unwrap();
    assert_eq!(found.header.hash(), genesis::genesis_hash());
    assert!(store.block_by_hash(&Hash256([0xAB; 32])).is_none());
}
