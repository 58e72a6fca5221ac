//! # ledger-node — full node: RocksDB storage, state, HTTP surface.
//!
//! Composes the other crates into a running full node:
//! - [`storage::RocksStore`] — persistent block storage backed by RocksDB
//! - [`node::Node`] — the state lock, mempool, and neighbor table, with
//!   the operations the HTTP surface and CLI both call through
//! - [`http`] — the inbound `axum` server implementing the node-to-node
//!   and operator-facing HTTP table
//! - [`cli`] — one-shot operator subcommands (status, block, send, peers)
//!   over the node's HTTP surface, not an interactive shell
//! - [`config::NodeConfig`] — node configuration

pub mod cli;
pub mod config;
pub mod http;
pub mod node;
pub mod storage;

pub use config::NodeConfig;
pub use node::Node;
pub use storage::RocksStore;
