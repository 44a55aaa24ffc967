//! # utxo-ledger
//!
//! A single-node educational ledger: a hash-linked chain of proof-of-work
//! blocks holding transactions that move value through unspent transaction
//! outputs, each input authorised by an ECDSA P-256 signature.
//!
//! ## Layout
//! - `core/`: blocks, transactions, proof-of-work, the chain and its iterator
//! - `storage/`: balance and spendable-output resolution over the chain
//! - `wallet/`: key pairs, public-key hashes, Base58Check addresses
//! - `config/`: storage paths and mining difficulty from the environment
//! - `utils/`: hashing, signatures, bincode helpers
//! - `cli/`: command-line definitions used by `main.rs`
//!
//! Balances are derived by replaying the whole chain on every query. That is
//! O(total transactions) per call.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, MiningConfig, ProofOfWork, Signer, TXInput, TXOutput,
    Transaction, SUBSIDY,
};
pub use error::{LedgerError, Result};
pub use storage::{UTXOSet, UnspentOutputs, UnspentTransaction};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
};
