//! Transaction validation.
//!
//! Two levels:
//!
//! - **Structural** ([`validate_transaction_structure`]): context-free
//!   checks on transaction shape. No external state required.
//! - **Contextual** ([`validate_transaction`]): UTXO-aware checks including
//!   signature verification and value conservation, used for both mempool
//!   admission and single-block validation.
//!
//! Coinbase transactions are only structurally validated here; their
//! reward amount is checked during block validation (`ledger-consensus`).

use std::collections::HashSet;

use crate::address;
use crate::constants::MAX_TX_SIZE;
use crate::crypto;
use crate::error::TransactionError;
use crate::types::{OutPoint, Transaction, UtxoEntry};

/// Summary of a successfully validated transaction: the fee and value
/// totals needed by block template assembly and mempool bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransaction {
    pub total_input: u64,
    pub total_output: u64,
    pub fee: u64,
}

/// Validate transaction structure (context-free).
///
/// Common to both coinbase and regular transactions:
/// - non-empty vins and vouts
/// - every output value is non-zero
/// - total output value does not overflow
/// - serialized size is within [`MAX_TX_SIZE`]
/// - every output address is well-formed Base58Check
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.vins.is_empty() || tx.vouts.is_empty() {
        return Err(TransactionError::EmptyInputsOrOutputs);
    }

    for (i, output) in tx.vouts.iter().enumerate() {
        if output.value == 0 {
            return Err(TransactionError::ZeroValueOutput(i));
        }
        if !address::is_valid(&output.pubkey_hash) {
            return Err(TransactionError::MalformedAddress(output.pubkey_hash.clone()));
        }
    }

    if tx.total_output_value().is_none() {
        return Err(TransactionError::ValueOverflow);
    }

    let size = crate::codec::serialize(tx).len();
    if size > MAX_TX_SIZE {
        return Err(TransactionError::OversizedTransaction { size, max: MAX_TX_SIZE });
    }

    if tx.is_coinbase() {
        validate_coinbase_structure(tx)
    } else {
        validate_regular_structure(tx)
    }
}

/// Coinbase-specific structure: exactly one input with a null outpoint.
fn validate_coinbase_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.vins.len() != 1 {
        return Err(TransactionError::InvalidCoinbase("must have exactly one input".into()));
    }
    if !tx.vins[0].previous_output.is_null() {
        return Err(TransactionError::InvalidCoinbase("input must be null outpoint".into()));
    }
    Ok(())
}

/// Non-coinbase structure: no null outpoints, no duplicate inputs.
fn validate_regular_structure(tx: &Transaction) -> Result<(), TransactionError> {
    let mut seen = HashSet::with_capacity(tx.vins.len());

    for (i, input) in tx.vins.iter().enumerate() {
        if input.previous_output.is_null() {
            return Err(TransactionError::NullOutpointInRegularTx(i));
        }
        if !seen.insert(&input.previous_output) {
            return Err(TransactionError::DuplicateInput(input.previous_output.to_string()));
        }
    }

    Ok(())
}

/// Validate a non-coinbase transaction against the UTXO set (contextual).
///
/// Runs structural validation, then for every vin: the referenced output
/// must exist (`get_utxo`), and its signature must verify against the
/// output's pubkey hash. Fails if total input value is less than total
/// output value. On success, returns the computed fee.
///
/// `get_utxo` abstracts the lookup source (in-memory set, RocksDB, a
/// shadow set during block validation) — see [`crate::utxo::UtxoStore`].
pub fn validate_transaction<F>(tx: &Transaction, get_utxo: F) -> Result<ValidatedTransaction, TransactionError>
where
    F: Fn(&OutPoint) -> Option<UtxoEntry>,
{
    if tx.is_coinbase() {
        return Err(TransactionError::InvalidCoinbase(
            "coinbase cannot be contextually validated standalone".into(),
        ));
    }

    validate_transaction_structure(tx)?;

    let mut total_input: u64 = 0;

    for (i, input) in tx.vins.iter().enumerate() {
        let utxo = get_utxo(&input.previous_output)
            .ok_or_else(|| TransactionError::UnknownUtxo(input.previous_output.to_string()))?;

        crypto::verify_transaction_input(tx, i, &utxo.pubkey_hash)
            .map_err(|_| TransactionError::InvalidSignature { index: i })?;

        total_input = total_input.checked_add(utxo.value).ok_or(TransactionError::ValueOverflow)?;
    }

    let total_output = tx.total_output_value().ok_or(TransactionError::ValueOverflow)?;

    if total_input < total_output {
        return Err(TransactionError::InsufficientFunds { have: total_input, need: total_output });
    }

    Ok(ValidatedTransaction {
        total_input,
        total_output,
        fee: total_input - total_output,
    })
}
