//! Outbound HTTP calls to other nodes, with per-endpoint timeouts.
//!
//! Every call maps `reqwest` failures (connect, timeout, decode) onto
//! [`NetworkError`] so callers never need to know the transport is HTTP.
//! Retries and backoff live one layer up, in [`crate::sync`] — this module
//! makes one attempt per call.

use std::time::Duration;

use ledger_core::error::NetworkError;
use ledger_core::types::{Block, Transaction};

use crate::config::NetworkConfig;
use crate::wire::{
    FullChainResponse, HeightResponse, MessageResponse, PeerAddressRequest, TotalDifficultyResponse, TxidResponse,
    P2P_PORT_HEADER,
};

/// Outbound HTTP client for the node-to-node surface.
pub struct PeerClient {
    http: reqwest::Client,
    light_timeout: Duration,
    heavy_timeout: Duration,
    advertised_port: u16,
}

impl PeerClient {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            light_timeout: config.light_timeout,
            heavy_timeout: config.heavy_timeout,
            advertised_port: config.advertised_port,
        }
    }

    fn base_url(address: &str) -> String {
        format!("http://{address}")
    }

    async fn get_light<T: serde::de::DeserializeOwned>(&self, address: &str, path: &str) -> Result<T, NetworkError> {
        let url = format!("{}{path}", Self::base_url(address));
        let response = self
            .http
            .get(&url)
            .timeout(self.light_timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(address, &e))?;

        if !response.status().is_success() {
            return Err(NetworkError::BadResponse(format!("{address}: status {}", response.status())));
        }
        response.json::<T>().await.map_err(|e| NetworkError::BadResponse(format!("{address}: {e}")))
    }

    /// `GET /blocks/height`.
    pub async fn get_height(&self, address: &str) -> Result<u64, NetworkError> {
        self.get_light::<HeightResponse>(address, "/blocks/height").await.map(|r| r.height)
    }

    /// `GET /blocks/total_difficulty`.
    pub async fn get_total_difficulty(&self, address: &str) -> Result<u128, NetworkError> {
        self.get_light::<TotalDifficultyResponse>(address, "/blocks/total_difficulty")
            .await
            .map(|r| r.total_difficulty)
    }

    /// `GET /blocks/full`.
    pub async fn get_full_chain(&self, address: &str) -> Result<Vec<Block>, NetworkError> {
        let url = format!("{}/blocks/full", Self::base_url(address));
        let response = self
            .http
            .get(&url)
            .timeout(self.heavy_timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(address, &e))?;

        if !response.status().is_success() {
            return Err(NetworkError::BadResponse(format!("{address}: status {}", response.status())));
        }
        response
            .json::<FullChainResponse>()
            .await
            .map(|r| r.blockchain)
            .map_err(|e| NetworkError::BadResponse(format!("{address}: {e}")))
    }

    /// `POST /block`, carrying our own advertised port in `X-P2P-Port` so
    /// the receiver can dial us back.
    pub async fn post_block(&self, address: &str, block: &Block) -> Result<String, NetworkError> {
        let url = format!("{}/block", Self::base_url(address));
        let response = self
            .http
            .post(&url)
            .timeout(self.heavy_timeout)
            .header(P2P_PORT_HEADER, self.advertised_port.to_string())
            .json(block)
            .send()
            .await
            .map_err(|e| map_reqwest_error(address, &e))?;

        if !response.status().is_success() {
            return Err(NetworkError::BadResponse(format!("{address}: status {}", response.status())));
        }
        response.json::<MessageResponse>().await.map(|r| r.message).map_err(|e| NetworkError::BadResponse(e.to_string()))
    }

    /// `POST /tx`.
    pub async fn post_tx(&self, address: &str, tx: &Transaction) -> Result<String, NetworkError> {
        let url = format!("{}/tx", Self::base_url(address));
        let response = self
            .http
            .post(&url)
            .timeout(self.light_timeout)
            .json(tx)
            .send()
            .await
            .map_err(|e| map_reqwest_error(address, &e))?;

        if !response.status().is_success() {
            return Err(NetworkError::BadResponse(format!("{address}: status {}", response.status())));
        }
        response.json::<TxidResponse>().await.map(|r| r.txid).map_err(|e| NetworkError::BadResponse(e.to_string()))
    }

    /// `GET /peers`.
    pub async fn get_peers(&self, address: &str) -> Result<Vec<String>, NetworkError> {
        self.get_light(address, "/peers").await
    }

    /// `POST /peers`.
    pub async fn post_peer_add(&self, address: &str, peer_address: &str) -> Result<(), NetworkError> {
        let url = format!("{}/peers", Self::base_url(address));
        let response = self
            .http
            .post(&url)
            .timeout(self.light_timeout)
            .json(&PeerAddressRequest { address: peer_address.to_string() })
            .send()
            .await
            .map_err(|e| map_reqwest_error(address, &e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NetworkError::BadResponse(format!("{address}: status {}", response.status())))
        }
    }

    /// `POST /peers/remove`, best-effort: the caller removes the peer
    /// locally regardless of whether this notification succeeds.
    pub async fn post_peer_remove(&self, address: &str, peer_address: &str) -> Result<(), NetworkError> {
        let url = format!("{}/peers/remove", Self::base_url(address));
        let response = self
            .http
            .post(&url)
            .timeout(self.light_timeout)
            .json(&PeerAddressRequest { address: peer_address.to_string() })
            .send()
            .await
            .map_err(|e| map_reqwest_error(address, &e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NetworkError::BadResponse(format!("{address}: status {}", response.status())))
        }
    }
}

fn map_reqwest_error(address: &str, error: &reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout
    } else if error.is_connect() {
        NetworkError::PeerUnreachable(address.to_string())
    } else {
        NetworkError::BadResponse(format!("{address}: {error}"))
    }
}
