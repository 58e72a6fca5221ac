//! Wire payloads for the node-to-node HTTP surface.
//!
//! Blocks and transactions travel as plain JSON using `ledger_core`'s own
//! `Serialize`/`Deserialize` derives — there is no separate wire framing.
//! Everything else here is the small set of request/response envelopes the
//! HTTP table needs around those two payloads.

use serde::{Deserialize, Serialize};

use ledger_core::types::Block;

/// Response to a successfully accepted `POST /block`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Response to a successfully accepted `POST /tx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxidResponse {
    pub txid: String,
}

/// Response body for `GET /blocks/full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullChainResponse {
    pub blockchain: Vec<Block>,
}

/// Response body for `GET /blocks/height`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeightResponse {
    pub height: u64,
}

/// Response body for `GET /blocks/total_difficulty`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TotalDifficultyResponse {
    pub total_difficulty: u128,
}

/// Request body for `POST /peers` and `POST /peers/remove`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAddressRequest {
    pub address: String,
}

/// Response body for `POST /peers/remove`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRemovedResponse {
    pub status: String,
}

impl Default for PeerRemovedResponse {
    fn default() -> Self {
        Self { status: "removed".to_string() }
    }
}

/// Header carrying the sender's canonical `ip:port` on inbound `/block`, so
/// the receiver can record where the gossip came from rather than relying
/// on the TCP peer address (which may be an ephemeral outbound port).
pub const P2P_PORT_HEADER: &str = "X-P2P-Port";
