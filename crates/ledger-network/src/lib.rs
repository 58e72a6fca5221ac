//! # ledger-network — HTTP peer layer.
//!
//! Nodes speak plain HTTP/JSON to each other rather than a P2P swarm
//! protocol: [`client::PeerClient`] makes outbound calls against the
//! bit-exact request/response surface [`wire`] describes, [`peer`] tracks
//! what each neighbor last reported, and [`sync`] is the periodic daemon
//! that polls neighbors and adopts a heavier chain when it finds one.
//!
//! Inbound serving of the same surface (the `axum` router) lives in
//! `ledger-node::http`, which depends on this crate for the shared DTOs.

pub mod client;
pub mod config;
pub mod peer;
pub mod sync;
pub mod wire;

pub use client::PeerClient;
pub use config::NetworkConfig;
pub use peer::{NeighborTable, PeerRecord, PeerStatus};
pub use sync::{run_daemon, run_once, ChainSnapshot, SyncOutcome, SyncTarget};
