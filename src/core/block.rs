use crate::core::{MiningConfig, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    // Empty for the genesis block
    pre_block_hash: Vec<u8>,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
    difficulty: u32,
}

impl Block {
    /// Mine a block over `transactions` on top of `pre_block_hash`.
    ///
    /// This is the only constructor; the returned block already carries the
    /// nonce and hash found by proof-of-work.
    pub fn new_block(
        pre_block_hash: &[u8],
        transactions: &[Transaction],
        mining: &MiningConfig,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            pre_block_hash: pre_block_hash.to_vec(),
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
            difficulty: mining.difficulty,
        };

        // I mine with nonce 0 and an empty hash, then fill both in
        info!(
            "Starting proof-of-work over {} transactions with difficulty {}",
            block.transactions.len(),
            block.difficulty
        );
        let (nonce, hash) = ProofOfWork::new_proof_of_work(&block)?.run(mining.max_nonce)?;
        block.nonce = nonce;
        block.hash = hash;
        info!("Proof-of-work completed for block {}", block.get_hash_hex());

        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction, mining: &MiningConfig) -> Result<Block> {
        Block::new_block(&[], std::slice::from_ref(coinbase), mining)
    }

    /// Decode a stored record; any decoding failure means the record is corrupt
    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes).map_err(|e| LedgerError::CorruptBlockRecord(e.to_string()))
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// SHA-256 over the concatenated transaction ids, in block order
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut txhashs = vec![];
        for transaction in &self.transactions {
            txhashs.extend(transaction.get_id());
        }
        sha256_digest(txhashs.as_slice())
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(self.hash.as_slice())
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    #[cfg(test)]
    pub(crate) fn hash_mut(&mut self) -> &mut Vec<u8> {
        &mut self.hash
    }

    #[cfg(test)]
    pub(crate) fn pre_block_hash_mut(&mut self) -> &mut Vec<u8> {
        &mut self.pre_block_hash
    }

    #[cfg(test)]
    pub(crate) fn nonce_mut(&mut self) -> &mut i64 {
        &mut self.nonce
    }

    #[cfg(test)]
    pub(crate) fn difficulty_mut(&mut self) -> &mut u32 {
        &mut self.difficulty
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn easy() -> MiningConfig {
        MiningConfig::with_difficulty(4)
    }

    #[test]
    fn test_genesis_has_empty_prev_hash() {
        let coinbase = Transaction::new_coinbase_tx(b"miner", "genesis").unwrap();
        let block = Block::generate_genesis_block(&coinbase, &easy()).unwrap();

        assert!(block.is_genesis());
        assert!(block.get_pre_block_hash().is_empty());
        assert_eq!(block.get_transactions().len(), 1);
        assert!(ProofOfWork::validate(&block));
    }

    #[test]
    fn test_empty_block_rejected() {
        let result = Block::new_block(b"prev", &[], &easy());
        assert!(matches!(result, Err(LedgerError::InvalidBlock(_))));
    }

    #[test]
    fn test_round_trip_preserves_hash() {
        let coinbase = Transaction::new_coinbase_tx(b"miner", "round trip").unwrap();
        let block = Block::new_block(b"prev", &[coinbase], &easy()).unwrap();

        let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();
        assert_eq!(decoded, block);
        assert!(ProofOfWork::validate(&decoded));
        assert_eq!(decoded.serialize().unwrap(), block.serialize().unwrap());
    }

    #[test]
    fn test_transaction_order_changes_digest() {
        let a = Transaction::new_coinbase_tx(b"a", "first").unwrap();
        let b = Transaction::new_coinbase_tx(b"b", "second").unwrap();
        let forward = Block::new_block(b"prev", &[a.clone(), b.clone()], &easy()).unwrap();
        let reversed = Block::new_block(b"prev", &[b, a], &easy()).unwrap();
        assert_ne!(forward.hash_transactions(), reversed.hash_transactions());
    }

    #[test]
    fn test_garbage_is_corrupt_record() {
        let result = Block::deserialize(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(LedgerError::CorruptBlockRecord(_))));
    }
}
