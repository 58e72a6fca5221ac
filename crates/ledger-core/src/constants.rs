//! Protocol constants.

pub const COIN: u64 = 100_000_000;

/// Block subsidy paid to the miner's coinbase. The protocol never credits
/// transaction fees to the coinbase (see DESIGN.md open-question log).
pub const SUBSIDY: u64 = 50 * COIN;

/// Target mean seconds between blocks.
pub const TARGET_INTERVAL: u64 = 60;

/// Number of blocks between difficulty retarget checks.
pub const RETARGET_WINDOW: u64 = 5;

/// Genesis difficulty: required leading hex zeros in the header hash.
pub const INITIAL_DIFFICULTY: u32 = 4;

/// Minimum difficulty the retarget algorithm will settle at.
pub const MIN_DIFFICULTY: u32 = 1;

/// Maximum number of transactions in a block (coinbase included).
pub const MAX_BLOCK_TXS: usize = 1024;

/// Maximum size in bytes of a single serialized transaction.
pub const MAX_TX_SIZE: usize = 100_000;

/// Upper bound on nonces tried per shuffled wheel before the base advances.
pub const NONCE_WHEEL_SIZE: u64 = 10_000;

/// Default node-to-node / operator-facing HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 7878;

/// Default mempool transaction-count cap.
pub const DEFAULT_MEMPOOL_MAX_COUNT: usize = 5_000;

/// Default mempool byte-size cap (5 MiB).
pub const DEFAULT_MEMPOOL_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Minimum fee accepted into the mempool.
pub const MIN_TX_FEE: u64 = 1;

/// Default periodic sync interval, seconds.
pub const SYNC_INTERVAL_SECS: u64 = 120;

/// Peer failure count after which a peer is marked disconnected.
pub const PEER_FAILURE_THRESHOLD: u32 = 3;

/// Peers disconnected longer than this are pruned from the neighbor table.
pub const PEER_PRUNE_AFTER_SECS: u64 = 3600;

/// The all-zero hash, as 64 hex characters: the genesis `prev_hash`.
pub const ZERO_HASH_HEX: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_hex_is_64_zero_chars() {
        assert_eq!(ZERO_HASH_HEX.len(), 64);
        assert!(ZERO_HASH_HEX.chars().all(|c| c == '0'));
    }

    #[test]
    fn subsidy_is_fifty_coin() {
        assert_eq!(SUBSIDY, 50 * COIN);
    }

    #[test]
    fn retarget_window_is_five_blocks() {
        assert_eq!(RETARGET_WINDOW, 5);
    }
}
