//! Core protocol types: transactions, blocks, outpoints.
//!
//! `value` fields are counts of the smallest unit (see
//! [`crate::constants::COIN`]). All multi-byte integer fields use
//! little-endian encoding when hashed or signed (see [`crate::codec`]).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte hash value, displayed as 64 lowercase hex characters.
///
/// Used for transaction ids and block hashes (both double-SHA-256).
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used for the coinbase's null outpoint `ref_txid`.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string into a hash.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Double-SHA-256 of `data`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        Self(Sha256::digest(first).into())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({self})")
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Transaction id containing the referenced output.
    pub ref_txid: Hash256,
    /// Index of the output within that transaction.
    pub ref_index: u32,
}

impl OutPoint {
    /// The sentinel outpoint used by coinbase inputs.
    pub const fn null() -> Self {
        Self {
            ref_txid: Hash256::ZERO,
            ref_index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.ref_txid.is_zero() && self.ref_index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ref_txid, self.ref_index)
    }
}

/// A transaction input (vin): spends a previous output, or — for the
/// coinbase — carries a block-height prefix and extra-nonce bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    /// The outpoint being spent. [`OutPoint::null`] for coinbase.
    pub previous_output: OutPoint,
    /// Locking-script data: the signer's public key (SEC1, 33 or 65 bytes).
    /// For coinbase, the conventional system-wide public key.
    pub pubkey: Vec<u8>,
    /// DER-encoded ECDSA signature. For coinbase, a height prefix plus
    /// random extra-nonce bytes (see [`crate::codec`]).
    pub signature: Vec<u8>,
}

/// A transaction output (vout): creates a new spendable UTXO.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in the smallest unit.
    pub value: u64,
    /// Base58Check address locking this output (P2PKH).
    pub pubkey_hash: String,
}

/// A transaction transferring value between addresses.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub vins: Vec<TxInput>,
    pub vouts: Vec<TxOutput>,
    pub n_lock_time: u32,
}

impl Transaction {
    /// Coinbase transactions have exactly one vin with a null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.vins.len() == 1 && self.vins[0].previous_output.is_null()
    }

    /// Sum of all output values. `None` on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.vouts.iter().try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }
}

/// Block header containing the proof-of-work puzzle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: u64,
    pub prev_hash: Hash256,
    pub difficulty: u32,
    /// Hex-encoded merkle root over the block's txids.
    pub merkle_root: String,
    pub nonce: u64,
}

impl BlockHeader {
    /// Canonical header hash: double-SHA-256 over the header fields
    /// serialized as a JSON object with lexicographically sorted keys.
    /// `BTreeMap`'s `Serialize` impl sorts by key, giving the field order
    /// bit-exactly rather than relying on field declaration order.
    pub fn hash(&self) -> Hash256 {
        let mut fields: BTreeMap<&'static str, serde_json::Value> = BTreeMap::new();
        fields.insert("index", self.index.into());
        fields.insert("timestamp", self.timestamp.into());
        fields.insert("prev_hash", self.prev_hash.to_string().into());
        fields.insert("difficulty", self.difficulty.into());
        fields.insert("merkle_root", self.merkle_root.clone().into());
        fields.insert("nonce", self.nonce.into());

        let canonical = serde_json::to_string(&fields).expect("header fields always serialize");
        Hash256::double_sha256(canonical.as_bytes())
    }
}

/// A complete block: header plus an ordered list of transactions. The
/// first transaction must be coinbase.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

/// An entry in the unspent-transaction-output set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UtxoEntry {
    pub value: u64,
    pub pubkey_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_displays_as_64_zeros() {
        assert_eq!(Hash256::ZERO.to_string(), "0".repeat(64));
    }

    #[test]
    fn null_outpoint_round_trips() {
        let op = OutPoint::null();
        assert!(op.is_null());
        assert_eq!(op.ref_txid, Hash256::ZERO);
        assert_eq!(op.ref_index, u32::MAX);
    }

    #[test]
    fn non_null_outpoint_is_not_null() {
        let op = OutPoint {
            ref_txid: Hash256([1; 32]),
            ref_index: 0,
        };
        assert!(!op.is_null());
    }

    #[test]
    fn coinbase_detection() {
        let tx = Transaction {
            vins: vec![TxInput {
                previous_output: OutPoint::null(),
                pubkey: vec![],
                signature: vec![],
            }],
            vouts: vec![TxOutput { value: 10, pubkey_hash: "abc".into() }],
            n_lock_time: 0,
        };
        assert!(tx.is_coinbase());
    }

    #[test]
    fn non_coinbase_with_real_outpoint() {
        let tx = Transaction {
            vins: vec![TxInput {
                previous_output: OutPoint { ref_txid: Hash256([9; 32]), ref_index: 0 },
                pubkey: vec![],
                signature: vec![],
            }],
            vouts: vec![],
            n_lock_time: 0,
        };
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn total_output_value_overflow_detected() {
        let tx = Transaction {
            vins: vec![],
            vouts: vec![
                TxOutput { value: u64::MAX, pubkey_hash: "a".into() },
                TxOutput { value: 1, pubkey_hash: "b".into() },
            ],
            n_lock_time: 0,
        };
        assert!(tx.total_output_value().is_none());
    }

    #[test]
    fn hash_from_hex_round_trips() {
        let h = Hash256([0xAB; 32]);
        let hex = h.to_string();
        assert_eq!(Hash256::from_hex(&hex), Some(h));
    }
}
