//! Inbound HTTP surface: the bit-exact request/response table other nodes
//! (and local tooling) speak against this node.
//!
//! Built on `axum`, sharing the DTOs `ledger_network::wire` defines so the
//! shapes this server emits are exactly what `ledger_network::client`
//! expects to parse back out.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use ledger_core::types::{Block, Transaction};
use ledger_network::wire::{
    FullChainResponse, HeightResponse, MessageResponse, PeerAddressRequest, PeerRemovedResponse,
    TotalDifficultyResponse, TxidResponse, P2P_PORT_HEADER,
};
use ledger_network::{PeerClient, SyncTarget};

use crate::node::Node;

#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
    pub client: Arc<PeerClient>,
}

/// Build the router. `tests::app` in this module exercises it directly
/// with `tower::ServiceExt::oneshot`; `bins/ledger-node` serves it with
/// `axum::serve`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/block", post(post_block))
        .route("/blocks/:index", get(get_block_at))
        .route("/blocks/latest", get(get_latest_block))
        .route("/blocks/full", get(get_full_chain))
        .route("/blocks/height", get(get_height))
        .route("/blocks/total_difficulty", get(get_total_difficulty))
        .route("/tx", post(post_tx))
        .route("/peers", get(get_peers).post(post_peer_add))
        .route("/peers/remove", post(post_peer_remove))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl ToString) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message.to_string() }))
}

async fn post_block(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(block): Json<Block>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.node.submit_block(block).map_err(bad_request)?;

    if let Some(port) = headers.get(P2P_PORT_HEADER).and_then(|v| v.to_str().ok()) {
        let address = format!("{}:{port}", remote.ip());
        if state.node.add_peer(&address).is_ok() {
            let height = state.node.height();
            state.node.record_peer_success(&address, height);
        }
    }

    Ok(Json(MessageResponse::new("block accepted")))
}

async fn get_block_at(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> Result<Json<Block>, StatusCode> {
    if index == 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    state.node.block_at(index - 1).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_latest_block(State(state): State<AppState>) -> Result<Json<Block>, StatusCode> {
    let height = state.node.height();
    if height == 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    state.node.block_at(height - 1).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_full_chain(State(state): State<AppState>) -> Json<FullChainResponse> {
    Json(FullChainResponse { blockchain: state.node.full_chain() })
}

async fn get_height(State(state): State<AppState>) -> Result<Json<HeightResponse>, StatusCode> {
    let height = state.node.height();
    if height == 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(HeightResponse { height }))
}

async fn get_total_difficulty(State(state): State<AppState>) -> Result<Json<TotalDifficultyResponse>, StatusCode> {
    if state.node.height() == 0 {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(TotalDifficultyResponse { total_difficulty: state.node.total_difficulty() }))
}

async fn post_tx(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<Json<TxidResponse>, (StatusCode, Json<ErrorResponse>)> {
    let txid = state.node.submit_transaction(tx).map_err(bad_request)?;
    Ok(Json(TxidResponse { txid: txid.to_string() }))
}

async fn get_peers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.node.peer_addresses())
}

async fn post_peer_add(
    State(state): State<AppState>,
    Json(request): Json<PeerAddressRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.node.add_peer(&request.address).map_err(bad_request)?;

    let client = Arc::clone(&state.client);
    let node = Arc::clone(&state.node);
    let address = request.address.clone();
    tokio::spawn(async move {
        match client.get_height(&address).await {
            Ok(height) => node.record_peer_success(&address, height),
            Err(error) => {
                warn!(%address, %error, "failed to probe newly added peer");
                node.record_peer_failure(&address);
            }
        }
    });

    Ok(StatusCode::CREATED)
}

async fn post_peer_remove(
    State(state): State<AppState>,
    Json(request): Json<PeerAddressRequest>,
) -> Result<Json<PeerRemovedResponse>, StatusCode> {
    let client = Arc::clone(&state.client);
    let address = request.address.clone();
    tokio::spawn(async move {
        let _ = client.post_peer_remove(&address, &address).await;
    });

    let removed = state.node.remove_peer(&request.address).map_err(|error| {
        warn!(%error, "failed to remove peer locally");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if removed {
        info!(address = %request.address, "peer removed");
        Ok(Json(PeerRemovedResponse::default()))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
