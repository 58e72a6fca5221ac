//! Network configuration for the HTTP peer layer.

use std::time::Duration;

use ledger_core::constants::{DEFAULT_HTTP_PORT, SYNC_INTERVAL_SECS};

/// Configuration for the outbound HTTP client and sync daemon.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// This node's own advertised port, sent as the `X-P2P-Port` header on
    /// outbound `/block` broadcasts so receivers can dial us back.
    pub advertised_port: u16,
    /// Bootstrap peer addresses (`host:port`) to add on startup.
    pub bootstrap_peers: Vec<String>,
    /// Timeout for lightweight outbound calls (height, total work, peers).
    pub light_timeout: Duration,
    /// Timeout for heavier outbound calls (full chain transfer).
    pub heavy_timeout: Duration,
    /// How often the sync daemon wakes to compare chains with neighbors.
    pub sync_interval: Duration,
    /// Failed broadcasts before a peer is marked disconnected.
    pub failure_threshold: u32,
    /// How long a disconnected peer survives before being pruned.
    pub prune_after: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            advertised_port: DEFAULT_HTTP_PORT,
            bootstrap_peers: Vec::new(),
            light_timeout: Duration::from_secs(3),
            heavy_timeout: Duration::from_secs(15),
            sync_interval: Duration::from_secs(SYNC_INTERVAL_SECS),
            failure_threshold: ledger_core::constants::PEER_FAILURE_THRESHOLD,
            prune_after: Duration::from_secs(ledger_core::constants::PEER_PRUNE_AFTER_SECS),
        }
    }
}

impl NetworkConfig {
    /// The backoff interval used after a failed sync round: the configured
    /// recovery interval, capped at twice the normal sync interval.
    pub fn sync_backoff(&self, recovery: Duration) -> Duration {
        recovery.min(self.sync_interval * 2)
    }
}
