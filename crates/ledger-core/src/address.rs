//! Address encoding for the ledgerd network.
//!
//! Addresses are Base58Check-encoded `RIPEMD160(SHA256(pubkey))` hashes
//! (P2PKH, Bitcoin-style): a one-byte version prefix, the 20-byte hash, and
//! a 4-byte checksum, all in Base58.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::AddressError;

/// Version byte identifying this protocol's single address format.
pub const ADDRESS_VERSION: u8 = 0x00;

/// `RIPEMD160(SHA256(pubkey))`: the 20-byte value an address commits to.
pub fn hash_pubkey(pubkey_bytes: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(pubkey_bytes);
    let ripemd = Ripemd160::digest(sha);
    ripemd.into()
}

/// Derive the Base58Check address string for a raw public key.
pub fn address_from_pub(pubkey_bytes: &[u8]) -> String {
    let hash = hash_pubkey(pubkey_bytes);
    encode_hash(&hash)
}

/// Base58Check-encode a 20-byte pubkey hash with [`ADDRESS_VERSION`].
pub fn encode_hash(hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

/// Decode a Base58Check address string, verifying the checksum and version
/// byte, and returning the 20-byte pubkey hash it commits to.
pub fn decode(address: &str) -> Result<[u8; 20], AddressError> {
    let bytes = bs58::decode(address)
        .with_check(Some(ADDRESS_VERSION))
        .into_vec()
        .map_err(|_| AddressError::InvalidEncoding)?;

    // `with_check` strips the version byte into the returned vec's head.
    if bytes.len() != 21 {
        return Err(AddressError::InvalidLength { expected: 21, got: bytes.len() });
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&bytes[1..]);
    Ok(hash)
}

/// Whether `address` is a well-formed, checksum-valid address.
pub fn is_valid(address: &str) -> bool {
    decode(address).is_ok()
}
