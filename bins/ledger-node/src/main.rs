//! ledgerd — full node binary.
//!
//! Wires together the HTTP server, the periodic sync daemon, and
//! (optionally) a mining loop, all sharing one [`Node`] and shutting down
//! cooperatively on Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::rngs::OsRng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ledger_network::{NetworkConfig, PeerClient};
use ledger_node::http::{router, AppState};
use ledger_node::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "ledgerd", version, about = "ledgerd full node")]
struct Args {
    /// Data directory for chain storage and the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// HTTP server bind address.
    #[arg(long, default_value = "127.0.0.1")]
    http_bind: String,

    /// HTTP server port.
    #[arg(long, default_value_t = ledger_core::constants::DEFAULT_HTTP_PORT)]
    http_port: u16,

    /// Bootstrap peer addresses (comma-separated `ip:port`).
    #[arg(long, value_delimiter = ',')]
    bootstrap_peers: Vec<String>,

    /// Address to credit block subsidies to. Mining runs only if set.
    #[arg(long)]
    miner_address: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional config file (layered under CLI args and `LEDGERD_*` env vars).
    #[arg(long)]
    config_file: Option<String>,
}

impl Args {
    fn into_config(self) -> NodeConfig {
        let mut config = NodeConfig::load(self.config_file.as_deref()).unwrap_or_default();
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        config.http_bind = self.http_bind;
        config.http_port = self.http_port;
        if self.miner_address.is_some() {
            config.miner_address = self.miner_address;
        }
        config.log_level = self.log_level;
        if !self.bootstrap_peers.is_empty() {
            config.network.bootstrap_peers = self.bootstrap_peers;
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = args.into_config();

    init_logging(&config.log_level);

    info!(data_dir = ?config.data_dir, http_addr = %config.http_addr(), "starting ledgerd");

    if let Err(error) = std::fs::create_dir_all(&config.data_dir) {
        error!(%error, "failed to create data_dir");
        process::exit(1);
    }

    let bootstrap_peers = config.network.bootstrap_peers.clone();
    let miner_address = config.miner_address.clone();
    let network_config = config.network.clone();
    let http_addr = config.http_addr();

    let node = match Node::open(config) {
        Ok(node) => Arc::new(node),
        Err(error) => {
            error!(%error, "failed to open node storage");
            process::exit(1);
        }
    };
    info!(height = node.height(), "chain loaded");

    let client = Arc::new(PeerClient::new(&network_config));

    for address in &bootstrap_peers {
        if let Err(error) = node.add_peer(address) {
            warn!(%address, %error, "failed to register bootstrap peer");
        }
    }

    let shutdown = CancellationToken::new();

    let http_task = {
        let state = AppState { node: Arc::clone(&node), client: Arc::clone(&client) };
        let addr: SocketAddr = http_addr.parse().expect("valid socket address");
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(error) => {
                    error!(%error, "failed to bind HTTP listener");
                    return;
                }
            };
            info!(%addr, "HTTP server listening");
            let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
            let serve = axum::serve(listener, app);
            tokio::select! {
                result = serve => {
                    if let Err(error) = result {
                        error!(%error, "HTTP server exited with error");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("HTTP server shutting down");
                }
            }
        })
    };

    let sync_task = {
        let node = Arc::clone(&node);
        let client_for_sync = PeerClient::new(&network_config);
        let network_config = network_config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let recovery_interval = network_config.sync_interval;
            ledger_network::run_daemon(client_for_sync, node.as_ref(), &network_config, recovery_interval, shutdown)
                .await;
        })
    };

    let mining_task = miner_address.map(|miner_address| {
        let node = Arc::clone(&node);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_mining_loop(node, miner_address, shutdown).await })
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }
    shutdown.cancel();

    let _ = http_task.await;
    let _ = sync_task.await;
    if let Some(task) = mining_task {
        let _ = task.await;
    }

    info!("ledgerd shutdown complete");
}

/// Mine against the current tip outside any lock, submitting each solved
/// block through the same path HTTP-submitted blocks take.
async fn run_mining_loop(node: Arc<Node>, miner_address: String, shutdown: CancellationToken) {
    const ATTEMPTS_PER_TICK: u64 = 200_000;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let node = Arc::clone(&node);
        let address = miner_address.clone();
        let mined = tokio::task::spawn_blocking(move || {
            let timestamp = unix_timestamp();
            let mut template = node.build_template(&address, timestamp);
            let mut rng = OsRng;
            if ledger_consensus::mine_nonce(&mut template.header, &mut rng, ATTEMPTS_PER_TICK) {
                Some(template)
            } else {
                None
            }
        })
        .await
        .unwrap_or(None);

        if let Some(block) = mined {
            let node = Arc::clone(&node);
            let height = block.header.index;
            match tokio::task::spawn_blocking(move || node.submit_block(block)).await {
                Ok(Ok(())) => info!(height, "mined and accepted a new block"),
                Ok(Err(error)) => warn!(%error, "mined block rejected by submit_block"),
                Err(error) => warn!(%error, "mining submit task panicked"),
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn init_logging(level: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true)).init();
}
