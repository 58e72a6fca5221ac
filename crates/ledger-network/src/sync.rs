//! The periodic chain-synchronization daemon.
//!
//! This is the ONLY path through which the local chain can shrink or be
//! replaced: every `SYNC_INTERVAL` it polls each active neighbor's height
//! and total work, and if a neighbor is strictly ahead by the fork-choice
//! rule, pulls and validates their full chain before handing it to
//! [`SyncTarget::apply_if_better`] for the atomic swap.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ledger_consensus::validate_chain;
use ledger_core::error::LedgerError;
use ledger_core::types::Block;

use crate::client::PeerClient;
use crate::config::NetworkConfig;

/// Local chain position the daemon compares candidates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub height: u64,
    pub total_work: u128,
}

/// The node-side surface the sync daemon needs. Implemented by
/// `ledger-node`'s node type, which owns the state lock and neighbor
/// table; this trait lets the daemon stay ignorant of concrete storage.
pub trait SyncTarget: Send + Sync {
    /// Addresses of currently connected neighbors.
    fn active_peer_addresses(&self) -> Vec<String>;
    /// Current local height and accumulated work.
    fn snapshot(&self) -> ChainSnapshot;
    /// Atomically compare `chain` against the current snapshot (which may
    /// have moved since [`Self::snapshot`] was read) and, if it is still
    /// strictly better, replace the local chain, rebuild the UTXO set, and
    /// clear the mempool. Returns whether the chain was applied.
    fn apply_if_better(&self, chain: Vec<Block>) -> Result<bool, LedgerError>;
    fn record_peer_success(&self, address: &str, known_height: u64);
    fn record_peer_failure(&self, address: &str);
    /// Drop neighbor-table entries disconnected longer than the configured
    /// prune window. Returns the number removed.
    fn prune_stale_peers(&self) -> usize;
}

/// Outcome of one sync round, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No active peers to compare against.
    NoPeers,
    /// Already at least as good as every peer polled.
    AlreadyCurrent,
    /// Found a better chain but it failed validation.
    CandidateRejected,
    /// Adopted a peer's chain.
    Replaced { new_height: u64 },
}

/// Run a single sync round against `target` through `client`.
pub async fn run_once(client: &PeerClient, target: &dyn SyncTarget) -> SyncOutcome {
    let peers = target.active_peer_addresses();
    if peers.is_empty() {
        return SyncOutcome::NoPeers;
    }

    let local = target.snapshot();
    let mut best: Option<(String, u64, u128)> = None;

    for address in &peers {
        let height = match client.get_height(address).await {
            Ok(h) => h,
            Err(error) => {
                warn!(%address, %error, "sync: failed to query peer height");
                target.record_peer_failure(address);
                continue;
            }
        };
        let total_work = match client.get_total_difficulty(address).await {
            Ok(w) => w,
            Err(error) => {
                warn!(%address, %error, "sync: failed to query peer total work");
                target.record_peer_failure(address);
                continue;
            }
        };
        target.record_peer_success(address, height);

        let is_better = match &best {
            None => true,
            Some((_, best_height, best_work)) => {
                total_work > *best_work || (total_work == *best_work && height > *best_height)
            }
        };
        if is_better {
            best = Some((address.clone(), height, total_work));
        }
    }

    let Some((address, height, total_work)) = best else {
        return SyncOutcome::NoPeers;
    };

    let strictly_better =
        total_work > local.total_work || (total_work == local.total_work && height > local.height);
    if !strictly_better {
        debug!(local_height = local.height, "sync: local chain already current");
        return SyncOutcome::AlreadyCurrent;
    }

    let chain = match client.get_full_chain(&address).await {
        Ok(chain) => chain,
        Err(error) => {
            warn!(%address, %error, "sync: failed to fetch candidate chain");
            target.record_peer_failure(&address);
            return SyncOutcome::CandidateRejected;
        }
    };

    if let Err(error) = validate_chain(&chain) {
        warn!(%address, %error, "sync: candidate chain failed validation");
        return SyncOutcome::CandidateRejected;
    }

    match target.apply_if_better(chain) {
        Ok(true) => {
            info!(%address, new_height = height, "sync: adopted peer chain");
            SyncOutcome::Replaced { new_height: height }
        }
        Ok(false) => SyncOutcome::AlreadyCurrent,
        Err(error) => {
            warn!(%address, %error, "sync: failed to apply candidate chain");
            SyncOutcome::CandidateRejected
        }
    }
}

/// Run the sync daemon until `shutdown` is cancelled: sleep the remainder
/// of the interval after each round, backing off to
/// `min(recovery_interval, 2 × sync_interval)` after a round that errored
/// all the way through (no peers reachable at all).
pub async fn run_daemon(
    client: PeerClient,
    target: &dyn SyncTarget,
    config: &NetworkConfig,
    recovery_interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let started = Instant::now();
        let outcome = run_once(&client, target).await;

        let pruned = target.prune_stale_peers();
        if pruned > 0 {
            debug!(pruned, "sync: dropped stale neighbor-table entries");
        }

        let elapsed = started.elapsed();

        let sleep_for = match outcome {
            SyncOutcome::NoPeers => config.sync_backoff(recovery_interval),
            _ => config.sync_interval.saturating_sub(elapsed),
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("sync: shutting down");
                return;
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct FakeTarget {
        peers: Vec<String>,
        height: AtomicU64,
        total_work: AtomicU64,
        applied: AtomicBool,
        last_applied_len: AtomicU64,
    }

    impl SyncTarget for FakeTarget {
        fn active_peer_addresses(&self) -> Vec<String> {
            self.peers.clone()
        }
        fn snapshot(&self) -> ChainSnapshot {
            ChainSnapshot { height: self.height.load(Ordering::SeqCst), total_work: self.total_work.load(Ordering::SeqCst) as u128 }
        }
        fn apply_if_better(&self, chain: Vec<Block>) -> Result<bool, LedgerError> {
            self.applied.store(true, Ordering::SeqCst);
            self.last_applied_len.store(chain.len() as u64, Ordering::SeqCst);
            Ok(true)
        }
        fn record_peer_success(&self, _address: &str, _known_height: u64) {}
        fn record_peer_failure(&self, _address: &str) {}
        fn prune_stale_peers(&self) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn run_once_with_no_peers_returns_no_peers() {
        let target = FakeTarget {
            peers: vec![],
            height: AtomicU64::new(0),
            total_work: AtomicU64::new(0),
            applied: AtomicBool::new(false),
            last_applied_len: AtomicU64::new(0),
        };
        let client = PeerClient::new(&NetworkConfig::default());
        assert_eq!(run_once(&client, &target).await, SyncOutcome::NoPeers);
    }

    #[test]
    fn snapshot_reads_atomics() {
        let target = FakeTarget {
            peers: vec!["a".into()],
            height: AtomicU64::new(7),
            total_work: AtomicU64::new(100),
            applied: AtomicBool::new(false),
            last_applied_len: AtomicU64::new(0),
        };
        let snap = target.snapshot();
        assert_eq!(snap.height, 7);
        assert_eq!(snap.total_work, 100);
    }

    #[test]
    fn apply_if_better_records_chain_length() {
        let target = FakeTarget {
            peers: vec![],
            height: AtomicU64::new(0),
            total_work: AtomicU64::new(0),
            applied: AtomicBool::new(false),
            last_applied_len: AtomicU64::new(0),
        };
        let applied = target.apply_if_better(vec![ledger_core::genesis::genesis_block().clone()]).unwrap();
        assert!(applied);
        assert_eq!(target.last_applied_len.load(Ordering::SeqCst), 1);
    }
}
