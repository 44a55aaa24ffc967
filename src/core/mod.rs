//! Ledger integrity core
//!
//! Blocks, the UTXO transaction model, proof-of-work, and the chain itself.

pub mod block;
pub mod blockchain;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator};
pub use proof_of_work::{MiningConfig, ProofOfWork, MAX_DIFFICULTY, TARGET_BITS};
pub use transaction::{
    PrevTransactions, Signer, TXInput, TXOutput, Transaction, COINBASE_VOUT, SUBSIDY,
};
