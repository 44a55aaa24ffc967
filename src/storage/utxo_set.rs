use crate::core::{Blockchain, TXOutput, Transaction};
use crate::error::Result;
use data_encoding::HEXLOWER;
use log::debug;
use std::collections::HashMap;

/// A transaction still holding unspent outputs for one owner
#[derive(Debug, Clone)]
pub struct UnspentTransaction {
    pub transaction: Transaction,
    /// Indices of the owner's outputs not yet spent, ascending
    pub outputs: Vec<usize>,
}

impl UnspentTransaction {
    pub fn unspent_outputs(&self) -> impl Iterator<Item = (usize, &TXOutput)> + '_ {
        self.outputs
            .iter()
            .filter_map(|idx| self.transaction.get_vout().get(*idx).map(|out| (*idx, out)))
    }
}

/// Source of per-owner unspent outputs.
///
/// The result is scoped to `pub_key_hash`: outputs are only ever marked spent
/// by inputs signed with that owner's key.
pub trait UnspentOutputs {
    fn unspent_outputs_for(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentTransaction>>;
}

impl UnspentOutputs for Blockchain {
    fn unspent_outputs_for(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentTransaction>> {
        self.find_unspent_transactions(pub_key_hash)
    }
}

pub struct UTXOSet<'a, S: UnspentOutputs + ?Sized> {
    source: &'a S,
}

impl<'a, S: UnspentOutputs + ?Sized> UTXOSet<'a, S> {
    pub fn new(source: &'a S) -> UTXOSet<'a, S> {
        UTXOSet { source }
    }

    /// Accumulate the owner's outputs in traversal order until `amount` is
    /// covered. Returns the sum and `txid_hex -> [output index]`.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0u64;

        'work: for entry in self.source.unspent_outputs_for(pub_key_hash)? {
            let txid_hex = HEXLOWER.encode(entry.transaction.get_id());
            for (idx, out) in entry.unspent_outputs() {
                if !out.is_locked_with_key(pub_key_hash) {
                    continue;
                }
                accumulated = accumulated.saturating_add(out.get_value());
                unspent_outputs
                    .entry(txid_hex.clone())
                    .or_default()
                    .push(idx);

                if accumulated >= amount {
                    break 'work;
                }
            }
        }

        debug!(
            "Selected {} outputs worth {accumulated} for a target of {amount}",
            unspent_outputs.values().map(Vec::len).sum::<usize>()
        );
        Ok((accumulated, unspent_outputs))
    }

    /// Every unspent output locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];
        for entry in self.source.unspent_outputs_for(pub_key_hash)? {
            for (_, out) in entry.unspent_outputs() {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out.clone());
                }
            }
        }
        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(TXOutput::get_value)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOutputs(Vec<UnspentTransaction>);

    impl UnspentOutputs for FixedOutputs {
        fn unspent_outputs_for(&self, _pub_key_hash: &[u8]) -> Result<Vec<UnspentTransaction>> {
            Ok(self.0.clone())
        }
    }

    fn rewards(owner: &[u8], count: usize) -> FixedOutputs {
        FixedOutputs(
            (0..count)
                .map(|i| UnspentTransaction {
                    transaction: Transaction::new_coinbase_tx(owner, &format!("reward {i}"))
                        .unwrap(),
                    outputs: vec![0],
                })
                .collect(),
        )
    }

    #[test]
    fn test_find_spendable_outputs_stops_at_target() {
        let source = rewards(b"alice", 3);
        let utxo_set = UTXOSet::new(&source);

        let (accumulated, outputs) = utxo_set.find_spendable_outputs(b"alice", 150).unwrap();
        assert_eq!(accumulated, 200);
        assert_eq!(outputs.len(), 2);

        // First-fit: the selection follows traversal order
        let first = HEXLOWER.encode(source.0[0].transaction.get_id());
        assert_eq!(outputs.get(&first), Some(&vec![0]));
    }

    #[test]
    fn test_find_spendable_outputs_returns_total_when_short() {
        let source = rewards(b"alice", 2);
        let utxo_set = UTXOSet::new(&source);

        let (accumulated, outputs) = utxo_set.find_spendable_outputs(b"alice", 1_000).unwrap();
        assert_eq!(accumulated, 200);
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_find_utxo_and_balance_filter_by_owner() {
        let source = rewards(b"alice", 2);
        let utxo_set = UTXOSet::new(&source);

        assert_eq!(utxo_set.find_utxo(b"alice").unwrap().len(), 2);
        assert_eq!(utxo_set.get_balance(b"alice").unwrap(), 200);
        assert!(utxo_set.find_utxo(b"bob").unwrap().is_empty());
        assert_eq!(utxo_set.get_balance(b"bob").unwrap(), 0);
    }

    #[test]
    fn test_spent_siblings_are_skipped() {
        let tx = Transaction::new_coinbase_tx(b"alice", "reward").unwrap();
        let source = FixedOutputs(vec![UnspentTransaction {
            transaction: tx,
            outputs: vec![],
        }]);
        let utxo_set = UTXOSet::new(&source);
        assert_eq!(utxo_set.get_balance(b"alice").unwrap(), 0);
    }

    #[test]
    fn test_selection_stops_inside_a_transaction() {
        let mut tx = Transaction::new_coinbase_tx(b"alice", "split").unwrap();
        tx.vout_mut().push(TXOutput::new(30, b"alice"));
        tx.vout_mut().push(TXOutput::new(30, b"alice"));
        let source = FixedOutputs(vec![UnspentTransaction {
            transaction: tx,
            outputs: vec![0, 1, 2],
        }]);
        let utxo_set = UTXOSet::new(&source);

        let (accumulated, outputs) = utxo_set.find_spendable_outputs(b"alice", 120).unwrap();
        assert_eq!(accumulated, 130);
        assert_eq!(outputs.values().next(), Some(&vec![0, 1]));
    }
}
