//! Canonical transaction serialization, used both for txid hashing and for
//! constructing the signature message presented to signer and verifier.
//!
//! Layout (little-endian unless noted):
//!
//! ```text
//! version(4) || vin_count(1)
//!   for each vin: ref_txid(32, reversed) || ref_index(4)
//!                || scriptSig_len(1) || scriptSig_bytes || sequence(4)
//! || vout_count(1)
//!   for each vout: value(8) || script_len(1) || address_bytes
//! || lockTime(4)
//! ```
//!
//! The scriptSig carries the pubkey+signature pair for a vin; the
//! signature message clears every vin's scriptSig before hashing so that
//! signatures commit to structure but never to their own bytes.

use rand::RngCore;

use crate::types::{Hash256, Transaction, TxInput};

/// Fixed protocol version embedded in every serialized transaction.
const VERSION: u32 = 1;

/// `sequence` is unused by this protocol (no RBF-at-the-script-level); it
/// is carried for wire-format compatibility and always zero.
const SEQUENCE: u32 = 0;

/// Build the scriptSig bytes for one vin: `pubkey_len(1) || pubkey || sig_len(1) || sig`.
fn script_sig_bytes(input: &TxInput) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + input.pubkey.len() + input.signature.len());
    out.push(input.pubkey.len() as u8);
    out.extend_from_slice(&input.pubkey);
    out.push(input.signature.len() as u8);
    out.extend_from_slice(&input.signature);
    out
}

/// Serialize a transaction, optionally clearing every vin's scriptSig
/// (used to build the signature message).
fn serialize_inner(tx: &Transaction, clear_script_sigs: bool) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(&VERSION.to_le_bytes());
    out.push(tx.vins.len() as u8);

    for vin in &tx.vins {
        let mut reversed = *vin.previous_output.ref_txid.as_bytes();
        reversed.reverse();
        out.extend_from_slice(&reversed);
        out.extend_from_slice(&vin.previous_output.ref_index.to_le_bytes());

        if clear_script_sigs {
            out.push(0u8);
        } else {
            let script = script_sig_bytes(vin);
            out.push(script.len() as u8);
            out.extend_from_slice(&script);
        }
        out.extend_from_slice(&SEQUENCE.to_le_bytes());
    }

    out.push(tx.vouts.len() as u8);
    for vout in &tx.vouts {
        out.extend_from_slice(&vout.value.to_le_bytes());
        let addr_bytes = vout.pubkey_hash.as_bytes();
        out.push(addr_bytes.len() as u8);
        out.extend_from_slice(addr_bytes);
    }

    out.extend_from_slice(&tx.n_lock_time.to_le_bytes());
    out
}

/// The canonical byte image used for txid hashing (scriptSigs included).
pub fn serialize(tx: &Transaction) -> Vec<u8> {
    serialize_inner(tx, false)
}

/// Compute the transaction id: `reverse(dSHA256(serialize(tx)))`, hex-encoded.
///
/// For coinbase transactions the caller is expected to have already mixed
/// the block height and extra-nonce into the input's scriptSig (see
/// [`mix_coinbase_extra_nonce`]) so that distinct coinbases at the same
/// height never collide.
pub fn txid(tx: &Transaction) -> Hash256 {
    let digest = Hash256::double_sha256(&serialize(tx));
    let mut bytes = *digest.as_bytes();
    bytes.reverse();
    Hash256::from_bytes(bytes)
}

/// The signature message presented to signer and verifier: the
/// double-SHA-256 digest of the transaction with every vin's scriptSig
/// cleared, so signatures commit to structure but not to their own bytes.
pub fn signature_message(tx: &Transaction) -> [u8; 32] {
    *Hash256::double_sha256(&serialize_inner(tx, true)).as_bytes()
}

/// Mix the block height and 8 random extra-nonce bytes into a coinbase
/// input's signature field, so two coinbases at the same height by the
/// same miner produce distinct txids with overwhelming probability.
///
/// The signature field of a coinbase input is a conventional location for
/// this data (it is never a real ECDSA signature for coinbase inputs).
pub fn mix_coinbase_extra_nonce(height: u64, rng: &mut impl RngCore) -> Vec<u8> {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&height.to_le_bytes());
    let mut extra = [0u8; 8];
    rng.fill_bytes(&mut extra);
    data.extend_from_slice(&extra);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutPoint, TxOutput};

    fn sample_tx() -> Transaction {
        Transaction {
            vins: vec![TxInput {
                previous_output: OutPoint { ref_txid: Hash256([7; 32]), ref_index: 1 },
                pubkey: vec![2; 33],
                signature: vec![9; 70],
            }],
            vouts: vec![TxOutput { value: 500, pubkey_hash: "1SomeAddress".into() }],
            n_lock_time: 0,
        }
    }

    #[test]
    fn txid_is_deterministic() {
        let tx = sample_tx();
        assert_eq!(txid(&tx), txid(&tx));
    }

    #[test]
    fn txid_changes_when_signature_changes() {
        let mut tx = sample_tx();
        let id1 = txid(&tx);
        tx.vins[0].signature = vec![1; 70];
        let id2 = txid(&tx);
        assert_ne!(id1, id2, "txid must commit to scriptSig bytes");
    }

    #[test]
    fn signature_message_ignores_scriptsig_bytes() {
        let mut tx = sample_tx();
        let msg1 = signature_message(&tx);
        tx.vins[0].signature = vec![0xFF; 12];
        tx.vins[0].pubkey = vec![0xEE; 5];
        let msg2 = signature_message(&tx);
        assert_eq!(msg1, msg2, "signature message must not commit to scriptSig bytes");
    }

    #[test]
    fn signature_message_changes_with_outputs() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.vouts[0].value = 999;
        assert_ne!(signature_message(&tx1), signature_message(&tx2));
    }

    #[test]
    fn mix_coinbase_extra_nonce_is_random_per_call() {
        let mut rng = rand::rngs::OsRng;
        let a = mix_coinbase_extra_nonce(10, &mut rng);
        let b = mix_coinbase_extra_nonce(10, &mut rng);
        assert_ne!(a, b, "two coinbases at the same height should differ with overwhelming probability");
        assert_eq!(&a[0..8], &10u64.to_le_bytes());
    }
}
