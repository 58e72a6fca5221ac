//! The neighbor table: known peer addresses and what we last heard from
//! each, mirrored to a [`MetadataStore`] under [`PEER_RECORD_PREFIX`].
//!
//! Held behind its own lock by callers (see `ledger-node::node`), never
//! across network I/O — probing a peer and persisting the result are two
//! separate critical sections.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use ledger_core::error::LedgerError;
use ledger_core::traits::{MetadataStore, PEER_RECORD_PREFIX};

/// Whether a peer is currently believed reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Connected,
    Disconnected,
}

/// What the neighbor table remembers about one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: String,
    /// Chain height last reported by (or inferred for) this peer.
    pub known_height: u64,
    /// Unix timestamp of the last successful contact, `None` if never.
    pub last_seen: Option<u64>,
    pub status: PeerStatus,
    /// Consecutive failed broadcasts/probes since the last success.
    pub retry_count: u32,
}

impl PeerRecord {
    fn new(address: String) -> Self {
        Self { address, known_height: 0, last_seen: None, status: PeerStatus::Disconnected, retry_count: 0 }
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn record_key(address: &str) -> String {
    format!("{PEER_RECORD_PREFIX}{address}")
}

/// In-memory neighbor table, mirrored to a [`MetadataStore`] on every
/// mutation so a restart can reload it.
pub struct NeighborTable {
    peers: HashMap<String, PeerRecord>,
}

impl NeighborTable {
    /// Load every persisted peer record from `store`.
    pub fn load(store: &dyn MetadataStore) -> Result<Self, LedgerError> {
        let mut peers = HashMap::new();
        for key in store.keys_with_prefix(PEER_RECORD_PREFIX)? {
            if let Some(bytes) = store.get(&key)? {
                match serde_json::from_slice::<PeerRecord>(&bytes) {
                    Ok(record) => {
                        peers.insert(record.address.clone(), record);
                    }
                    Err(error) => warn!(%key, %error, "dropping unreadable peer record"),
                }
            }
        }
        Ok(Self { peers })
    }

    fn persist(&self, store: &mut dyn MetadataStore, record: &PeerRecord) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec(record).map_err(|e| LedgerError::Storage(e.to_string()))?;
        store.put(&record_key(&record.address), &bytes)
    }

    /// Add `address` to the table if not already present. Does not probe —
    /// the caller probes the peer and calls [`Self::record_success`] or
    /// [`Self::record_failure`] once it knows the outcome.
    pub fn add(&mut self, store: &mut dyn MetadataStore, address: &str) -> Result<(), LedgerError> {
        if self.peers.contains_key(address) {
            return Ok(());
        }
        let record = PeerRecord::new(address.to_string());
        self.persist(store, &record)?;
        self.peers.insert(address.to_string(), record);
        Ok(())
    }

    /// Remove `address` locally, regardless of whether the peer could be
    /// notified beforehand (that notification is the caller's job, done
    /// before this call, best-effort).
    pub fn remove(&mut self, store: &mut dyn MetadataStore, address: &str) -> Result<bool, LedgerError> {
        if self.peers.remove(address).is_none() {
            return Ok(false);
        }
        store.delete(&record_key(address))?;
        Ok(true)
    }

    pub fn get(&self, address: &str) -> Option<&PeerRecord> {
        self.peers.get(address)
    }

    /// All known peer addresses.
    pub fn addresses(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// All connected, non-stale peer addresses — the set the sync daemon
    /// and broadcast both operate over.
    pub fn active_addresses(&self) -> Vec<String> {
        self.peers.values().filter(|p| p.status == PeerStatus::Connected).map(|p| p.address.clone()).collect()
    }

    /// Record a successful probe or broadcast: resets `retry_count`, marks
    /// the peer connected, and updates `known_height` if given.
    pub fn record_success(
        &mut self,
        store: &mut dyn MetadataStore,
        address: &str,
        known_height: Option<u64>,
    ) -> Result<(), LedgerError> {
        let record = self.peers.entry(address.to_string()).or_insert_with(|| PeerRecord::new(address.to_string()));
        record.status = PeerStatus::Connected;
        record.retry_count = 0;
        record.last_seen = Some(now_unix());
        if let Some(height) = known_height {
            record.known_height = height;
        }
        let record = record.clone();
        self.persist(store, &record)
    }

    /// Record a failed probe or broadcast: increments `retry_count`,
    /// downgrading to disconnected past `failure_threshold`.
    pub fn record_failure(
        &mut self,
        store: &mut dyn MetadataStore,
        address: &str,
        failure_threshold: u32,
    ) -> Result<(), LedgerError> {
        let record = self.peers.entry(address.to_string()).or_insert_with(|| PeerRecord::new(address.to_string()));
        record.retry_count += 1;
        if record.retry_count >= failure_threshold {
            record.status = PeerStatus::Disconnected;
        }
        let record = record.clone();
        self.persist(store, &record)
    }

    /// Drop peers that have been disconnected for longer than `prune_after`
    /// seconds (peers never successfully contacted are never pruned by
    /// this rule alone — they simply stay at height 0 until removed).
    pub fn prune_stale(&mut self, store: &mut dyn MetadataStore, prune_after_secs: u64) -> Result<usize, LedgerError> {
        let now = now_unix();
        let stale: Vec<String> = self
            .peers
            .values()
            .filter(|p| {
                p.status == PeerStatus::Disconnected
                    && p.last_seen.map(|seen| now.saturating_sub(seen) > prune_after_secs).unwrap_or(false)
            })
            .map(|p| p.address.clone())
            .collect();

        for address in &stale {
            self.remove(store, address)?;
        }
        Ok(stale.len())
    }
}
