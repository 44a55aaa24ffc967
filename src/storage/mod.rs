//! Balance and spendable-output resolution
//!
//! Every query replays the chain from tip to genesis; there is no persistent
//! UTXO index. The scan sits behind `UnspentOutputs` so an index could be
//! swapped in without touching callers.

pub mod utxo_set;

pub use utxo_set::{UTXOSet, UnspentOutputs, UnspentTransaction};
