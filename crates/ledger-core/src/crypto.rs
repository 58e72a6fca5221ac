//! SECP256k1 cryptographic operations for the ledgerd protocol.
//!
//! Provides key generation, deterministic (RFC 6979) ECDSA signing, and
//! signature verification over SHA-256 digests. Verification accepts
//! either compressed (33-byte) or uncompressed (65-byte) public keys.
//!
//! All failure conditions (malformed key length, bad signature) return a
//! negative verdict through [`CryptoError`] rather than propagating a
//! fault further than necessary — callers that only need a yes/no answer
//! should use [`verify`].

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::error::CryptoError;
use crate::types::Transaction;
use crate::{address, codec};

/// A SECP256k1 keypair used to sign transaction inputs.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let secret = SecretKey::new(&mut rng);
        Self { secret }
    }

    /// Derive a keypair from 32 bytes of secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        SecretKey::from_slice(&bytes)
            .map(|secret| Self { secret })
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// The compressed (33-byte) public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let secp = Secp256k1::new();
        PublicKey::from_secret_key(&secp, &self.secret)
            .serialize()
            .to_vec()
    }

    /// Derive the P2PKH address for this keypair.
    pub fn address(&self) -> String {
        address::address_from_pub(&self.public_key_bytes())
    }

    /// Sign a 32-byte message digest, returning a DER-encoded signature.
    pub fn sign(&self, message: &[u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(*message);
        secp.sign_ecdsa(&msg, &self.secret).serialize_der().to_vec()
    }
}

/// Generate a new random keypair: `(priv_bytes, pub_bytes)`.
pub fn generate_keypair() -> ([u8; 32], Vec<u8>) {
    let kp = KeyPair::generate();
    (kp.secret_bytes(), kp.public_key_bytes())
}

/// Derive the compressed public key from 32 bytes of private key material.
pub fn pub_from_priv(priv_bytes: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let kp = KeyPair::from_secret_bytes(*priv_bytes)?;
    Ok(kp.public_key_bytes())
}

/// Sign `msg` (already a 32-byte digest) with `priv_bytes`, returning a
/// DER-encoded ECDSA signature.
pub fn sign(priv_bytes: &[u8; 32], msg: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let kp = KeyPair::from_secret_bytes(*priv_bytes)?;
    Ok(kp.sign(msg))
}

/// Verify a DER-encoded signature over a 32-byte digest against a public
/// key. Accepts both compressed (33-byte) and uncompressed (65-byte)
/// public keys. Any malformed input yields `false` rather than an error.
pub fn verify(pubkey_bytes: &[u8], signature_bytes: &[u8], msg: &[u8; 32]) -> bool {
    let secp = Secp256k1::verification_only();

    let Ok(pubkey) = PublicKey::from_slice(pubkey_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(signature_bytes) else {
        return false;
    };
    let message = Message::from_digest(*msg);

    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// Verify the signature on `tx.vins[index]` against the expected pubkey
/// hash of the output it spends.
///
/// Checks both that the declared pubkey hashes to `expected_pubkey_hash`
/// and that the signature verifies over the transaction's signature
/// message. Returns `Ok(())` on success, `Err` naming the failure
/// otherwise — both paths are non-panicking for malformed input.
pub fn verify_transaction_input(
    tx: &Transaction,
    index: usize,
    expected_pubkey_hash: &str,
) -> Result<(), CryptoError> {
    let input = tx
        .vins
        .get(index)
        .ok_or(CryptoError::InputIndexOutOfBounds { index, len: tx.vins.len() })?;

    let derived = address::address_from_pub(&input.pubkey);
    if derived != expected_pubkey_hash {
        return Err(CryptoError::PubkeyHashMismatch);
    }

    let msg = codec::signature_message(tx);
    if verify(&input.pubkey, &input.signature, &msg) {
        Ok(())
    } else {
        Err(CryptoError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let msg = [7u8; 32];
        let sig = kp.sign(&msg);
        assert!(verify(&kp.public_key_bytes(), &sig, &msg));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let msg = [7u8; 32];
        let sig = kp.sign(&msg);
        assert!(!verify(&other.public_key_bytes(), &sig, &msg));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = KeyPair::generate();
        let msg = [7u8; 32];
        let sig = kp.sign(&msg);
        assert!(!verify(&kp.public_key_bytes(), &sig, &[8u8; 32]));
    }

    #[test]
    fn verify_rejects_malformed_key_without_panicking() {
        let msg = [1u8; 32];
        assert!(!verify(&[0, 1, 2], &[0, 1, 2], &msg));
    }

    #[test]
    fn verify_rejects_malformed_signature_without_panicking() {
        let kp = KeyPair::generate();
        let msg = [1u8; 32];
        assert!(!verify(&kp.public_key_bytes(), &[1, 2, 3], &msg));
    }

    #[test]
    fn signing_is_deterministic() {
        let kp = KeyPair::generate();
        let msg = [3u8; 32];
        assert_eq!(kp.sign(&msg), kp.sign(&msg));
    }
}
