// This is where value moves. I follow the UTXO model: inputs consume outputs
// of earlier transactions and outputs lock new value to a public-key hash.
// I keep signatures out of the id so signing never changes it.

use crate::error::{LedgerError, Result};
use crate::storage::{UTXOSet, UnspentOutputs};
use crate::utils::{deserialize, ecdsa_p256_sha256_sign_verify, serialize, sha256_digest};
use crate::wallet::hash_pub_key;
use data_encoding::HEXLOWER;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Fixed reward carried by every coinbase transaction
pub const SUBSIDY: u64 = 100;

/// Output index a coinbase input points at; no real output has this index
pub const COINBASE_VOUT: usize = usize::MAX;

/// Signing capability supplied by the wallet layer.
///
/// `sign` receives the hash of a per-input signing payload and returns raw
/// signature bytes; `public_key` is stored in the input so verifiers can check
/// both the signature and ownership of the spent output.
pub trait Signer {
    fn public_key(&self) -> &[u8];
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Referenced transactions keyed by hex-encoded id
pub type PrevTransactions = HashMap<String, Transaction>;

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: usize,
    signature: Vec<u8>,
    // Signer's public key once signed; the free-form note for a coinbase
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    /// True when this input was signed by the owner of `pub_key_hash`
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()).eq(pub_key_hash)
    }

    #[cfg(test)]
    pub(crate) fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.signature
    }

    #[cfg(test)]
    pub(crate) fn pub_key_mut(&mut self) -> &mut Vec<u8> {
        &mut self.pub_key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, pub_key_hash: &[u8]) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash: pub_key_hash.to_vec(),
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }

    #[cfg(test)]
    pub(crate) fn set_value(&mut self, value: u64) {
        self.value = value;
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Reward transaction paying `SUBSIDY` to `to_pub_key_hash`.
    ///
    /// The note is kept in the sentinel input and covered by the id, so two
    /// rewards to the same key stay distinct. An empty note gets a random one.
    pub fn new_coinbase_tx(to_pub_key_hash: &[u8], note: &str) -> Result<Transaction> {
        let note = if note.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            note.to_string()
        };
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: note.into_bytes(),
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![TXOutput::new(SUBSIDY, to_pub_key_hash)],
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    /// Build an unsigned transfer of `amount` from `from` to `to`.
    ///
    /// Spends the first-fit selection returned by the UTXO set and sends any
    /// surplus back to `from` as change.
    pub fn new_utxo_transaction<S: UnspentOutputs + ?Sized>(
        from_pub_key_hash: &[u8],
        to_pub_key_hash: &[u8],
        amount: u64,
        utxo_set: &UTXOSet<'_, S>,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidTransaction(
                "Amount must be positive".to_string(),
            ));
        }

        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(from_pub_key_hash, amount)?;
        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                LedgerError::InvalidTransaction(format!("Invalid transaction ID: {e}"))
            })?;
            for out in outs {
                inputs.push(TXInput::new(txid.as_slice(), out));
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to_pub_key_hash)];
        if accumulated > amount {
            outputs.push(TXOutput::new(accumulated - amount, from_pub_key_hash));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    /// Copy with every spending input's signature and public key blanked.
    /// Coinbase inputs are never signed and keep their note.
    fn trimmed_copy(&self) -> Transaction {
        let vin = if self.is_coinbase() {
            self.vin.clone()
        } else {
            self.vin
                .iter()
                .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
                .collect()
        };
        Transaction {
            id: vec![],
            vin,
            vout: self.vout.clone(),
        }
    }

    // I hash the encoding with the id left out
    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    /// Id derived from inputs and outputs with signature material removed
    pub fn compute_id(&self) -> Result<Vec<u8>> {
        self.trimmed_copy().hash()
    }

    fn referenced_output<'a>(
        input: &TXInput,
        prev_txs: &'a PrevTransactions,
    ) -> Result<Option<&'a TXOutput>> {
        let txid_hex = HEXLOWER.encode(input.get_txid());
        let prev_tx = prev_txs
            .get(txid_hex.as_str())
            .ok_or(LedgerError::TransactionNotFound(txid_hex))?;
        Ok(prev_tx.vout.get(input.get_vout()))
    }

    /// Sign every input.
    ///
    /// Each input signs a copy where only that input carries the `pub_key_hash`
    /// of the output it spends and every other input is blank, so a signature
    /// can't be replayed for a different input.
    pub fn sign<S: Signer + ?Sized>(
        &mut self,
        signer: &S,
        prev_txs: &PrevTransactions,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_out = Self::referenced_output(vin, prev_txs)?.ok_or_else(|| {
                LedgerError::InvalidTransaction(format!(
                    "Output {} of {} does not exist",
                    vin.get_vout(),
                    HEXLOWER.encode(vin.get_txid())
                ))
            })?;

            // I put the spent output's key hash in this input's slot only while hashing
            tx_copy.vin[idx].pub_key = prev_out.get_pub_key_hash().to_vec();
            let digest = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            vin.signature = signer.sign(digest.as_slice())?;
            vin.pub_key = signer.public_key().to_vec();
        }
        Ok(())
    }

    /// Check every input's signature against the payload it was signed over.
    ///
    /// Returns `Ok(false)` on the first bad input and `Err` when a referenced
    /// transaction is missing from `prev_txs`.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        // First I make sure nobody edited the contents after the id was set
        if self.id != self.compute_id()? {
            warn!("Transaction id does not match its contents");
            return Ok(false);
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_out = match Self::referenced_output(vin, prev_txs)? {
                Some(out) => out,
                None => {
                    warn!(
                        "Input {idx} spends missing output {} of {}",
                        vin.get_vout(),
                        HEXLOWER.encode(vin.get_txid())
                    );
                    return Ok(false);
                }
            };

            // I also require the input's key to own the output it spends
            if !vin.uses_key(prev_out.get_pub_key_hash()) {
                warn!("Input {idx} is not signed by the owner of the output it spends");
                return Ok(false);
            }

            tx_copy.vin[idx].pub_key = prev_out.get_pub_key_hash().to_vec();
            let digest = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_sign_verify(
                vin.get_pub_key(),
                vin.get_signature(),
                digest.as_slice(),
            ) {
                warn!("Signature check failed for input {idx}");
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        let mut total = 0u64;
        for vout in &self.vout {
            total = total.checked_add(vout.get_value()).ok_or_else(|| {
                LedgerError::InvalidTransaction("Output value overflow".to_string())
            })?;
        }
        Ok(total)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub(crate) fn vin_mut(&mut self) -> &mut Vec<TXInput> {
        &mut self.vin
    }

    #[cfg(test)]
    pub(crate) fn vout_mut(&mut self) -> &mut Vec<TXOutput> {
        &mut self.vout
    }

    #[cfg(test)]
    pub(crate) fn id_mut(&mut self) -> &mut Vec<u8> {
        &mut self.id
    }
}
