//! Node configuration for the ledgerd full node.
//!
//! Defaults are reasonable for a single local node; production deployments
//! load overrides through the `config` crate's layered file/env sources
//! (see [`NodeConfig::load`]).

use std::path::PathBuf;

use ledger_core::constants::DEFAULT_HTTP_PORT;
use ledger_network::NetworkConfig;

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the HTTP server to bind to.
    pub http_bind: String,
    /// Port for the HTTP server.
    pub http_port: u16,
    /// Address credited with mined block subsidies. `None` disables mining.
    pub miner_address: Option<String>,
    /// Peer network configuration.
    pub network: NetworkConfig,
    /// Log level filter string (e.g. "info", "debug", "ledger_node=trace").
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("ledgerd");

        Self {
            data_dir,
            http_bind: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            miner_address: None,
            network: NetworkConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Path to the RocksDB chain data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }

    /// Socket address string for the HTTP server.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_bind, self.http_port)
    }

    /// Load configuration from (in increasing precedence) a config file at
    /// `path` if present, then `LEDGERD_`-prefixed environment variables,
    /// layered over [`NodeConfig::default`].
    ///
    /// Only the fields the `config` crate can sensibly flatten (bind
    /// address, port, log level, data dir, miner address) are sourced this
    /// way; network presets stay code-level.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("LEDGERD").separator("_"));
        let layered = builder.build()?;

        let mut cfg = Self::default();
        if let Ok(dir) = layered.get_string("data_dir") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(bind) = layered.get_string("http_bind") {
            cfg.http_bind = bind;
        }
        if let Ok(port) = layered.get_int("http_port") {
            cfg.http_port = port as u16;
        }
        if let Ok(addr) = layered.get_string("miner_address") {
            cfg.miner_address = Some(addr);
        }
        if let Ok(level) = layered.get_string("log_level") {
            cfg.log_level = level;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_http_port() {
        assert_eq!(NodeConfig::default().http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn default_http_bind_is_localhost() {
        assert_eq!(NodeConfig::default().http_bind, "127.0.0.1");
    }

    #[test]
    fn default_mining_disabled() {
        assert!(NodeConfig::default().miner_address.is_none());
    }

    #[test]
    fn http_addr_format() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.http_addr(), format!("127.0.0.1:{DEFAULT_HTTP_PORT}"));
    }

    #[test]
    fn http_addr_custom() {
        let cfg = NodeConfig { http_bind: "0.0.0.0".to_string(), http_port: 9999, ..NodeConfig::default() };
        assert_eq!(cfg.http_addr(), "0.0.0.0:9999");
    }

    #[test]
    fn db_path_appends_chaindata() {
        let cfg = NodeConfig { data_dir: PathBuf::from("/tmp/ledgerd-test"), ..NodeConfig::default() };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/ledgerd-test/chaindata"));
    }

    #[test]
    fn config_is_clone_and_debug() {
        let cfg = NodeConfig::default();
        let cfg2 = cfg.clone();
        assert!(format!("{cfg2:?}").contains("NodeConfig"));
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = NodeConfig::load(Some("/nonexistent/ledgerd.toml")).unwrap();
        assert_eq!(cfg.http_port, DEFAULT_HTTP_PORT);
    }
}
