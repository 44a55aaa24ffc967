//! Error handling for the ledger
//!
//! Precondition failures (chain exists / missing, insufficient funds) are
//! ordinary errors the caller can report. Integrity failures (corrupt records,
//! missing referenced transactions) abort the operation that hit them.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone)]
pub enum LedgerError {
    /// The key-value store cannot be opened or read
    StorageUnavailable(String),
    /// A ledger already exists at the requested location
    ChainAlreadyExists,
    /// No ledger exists at the requested location
    ChainNotFound,
    /// A referenced transaction (hex id) is not on the chain
    TransactionNotFound(String),
    /// Spendable total below the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// Stored bytes do not decode into a valid block
    CorruptBlockRecord(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Signing, key parsing or other cryptographic failures
    Crypto(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// A transaction failed construction or chain verification
    InvalidTransaction(String),
    /// Block construction or audit errors
    InvalidBlock(String),
    /// Wallet lookup/persistence errors
    Wallet(String),
    /// Proof-of-work search hit its nonce ceiling
    MiningExhausted { max_nonce: i64 },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {msg}"),
            LedgerError::ChainAlreadyExists => write!(f, "Blockchain already exists"),
            LedgerError::ChainNotFound => {
                write!(f, "No existing blockchain found. Create one first.")
            }
            LedgerError::TransactionNotFound(id) => write!(f, "Transaction not found: {id}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::CorruptBlockRecord(msg) => write!(f, "Corrupt block record: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {msg}"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            LedgerError::MiningExhausted { max_nonce } => {
                write!(f, "No valid nonce found below {max_nonce}")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::StorageUnavailable(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
