//! Error types for the ledgerd protocol.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("already spent UTXO: {0}")] AlreadySpent(String),
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("invalid signature on input {index}")] InvalidSignature { index: usize },
    #[error("duplicate input: {0}")] DuplicateInput(String),
    #[error("oversized: {size} > {max}")] OversizedTransaction { size: usize, max: usize },
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
    #[error("invalid coinbase: {0}")] InvalidCoinbase(String),
    #[error("malformed address: {0}")] MalformedAddress(String),
    #[error("zero-value output at index {0}")] ZeroValueOutput(usize),
    #[error("null outpoint in non-coinbase input {0}")] NullOutpointInRegularTx(usize),
    #[error("duplicate transaction id: {0}")] DuplicateTxid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("invalid proof of work")] InvalidPoW,
    #[error("invalid prev hash")] InvalidPrevHash,
    #[error("invalid height: expected {expected}, got {got}")] InvalidHeight { expected: u64, got: u64 },
    #[error("invalid block hash")] InvalidBlockHash,
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("oversized: {count} > {max} transactions")] OversizedBlock { count: usize, max: usize },
    #[error("no coinbase")] NoCoinbase,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("multiple coinbase transactions")] MultipleCoinbase,
    #[error("duplicate txid: {0}")] DuplicateTxid(String),
    #[error("double spend within block: {0}")] IntraBlockDoubleSpend(String),
    #[error("invalid difficulty: got {got}, expected {expected}")] InvalidDifficulty { got: u32, expected: u32 },
    #[error("insufficient input value for fee in tx {index}")] InsufficientInputValue { index: usize },
    #[error("tx error in {index}: {source}")] TransactionError { index: usize, source: TransactionError },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainStateError {
    #[error("empty chain: no blocks connected")] EmptyChain,
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("height mismatch: expected {expected}, got {got}")] HeightMismatch { expected: u64, got: u64 },
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("invalid genesis: {0}")] InvalidGenesis(String),
    #[error("non-sequential height at index {0}")] NonSequentialHeight(u64),
    #[error("height/block-count mismatch: height {height}, count {count}")] HeightCountMismatch { height: u64, count: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("peer unreachable: {0}")] PeerUnreachable(String),
    #[error("request timed out")] Timeout,
    #[error("peer not found: {0}")] PeerNotFound(String),
    #[error("bad response from peer: {0}")] BadResponse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("pubkey hash does not match expected")] PubkeyHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58check encoding")] InvalidEncoding,
    #[error("invalid length: expected {expected}, got {got}")] InvalidLength { expected: usize, got: usize },
    #[error("invalid version byte: {0}")] InvalidVersion(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyExists(String),
    #[error("conflicts with pool tx {existing_txid} on outpoint {outpoint}")] Conflict { new_txid: String, existing_txid: String, outpoint: String },
    #[error("pool full, no evictable entry")] PoolFull,
    #[error("replacement fee {new_fee} does not exceed existing fee {old_fee}")] ReplacementNotHigherFee { new_fee: u64, old_fee: u64 },
    #[error("unknown transaction: {0}")] NotFound(String),
    #[error("fee below minimum: {fee} < {minimum}")] FeeTooLow { fee: u64, minimum: u64 },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] ChainState(#[from] ChainStateError),
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Address(#[from] AddressError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error("storage: {0}")] Storage(String),
}
