// The ledger itself. I keep an append-only chain of blocks in a sled tree:
// each block lives under its own hash and one well-known key holds the tip.
// Every query walks back from the tip, I don't keep any index.

use crate::core::transaction::PrevTransactions;
use crate::core::{Block, MiningConfig, ProofOfWork, Signer, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{UTXOSet, UnspentTransaction};
use crate::wallet::hash_pub_key;
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use sled::Tree;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";
const BLOCKS_TREE: &str = "blocks";
// sled writes this file when a database directory is first opened
const DB_MANIFEST_FILE: &str = "conf";
const GENESIS_COINBASE_DATA: &str = "First Transaction from Genesis";

pub struct Blockchain {
    tip_hash: Vec<u8>,
    blocks: Tree,
    db_path: PathBuf,
    mining: MiningConfig,
}

impl Blockchain {
    /// Whether a ledger database already exists at `db_path`
    pub fn db_exists(db_path: &Path) -> bool {
        db_path.join(DB_MANIFEST_FILE).exists()
    }

    /// Create a ledger whose genesis block pays the coinbase reward to
    /// `genesis_pub_key_hash`.
    pub fn create_blockchain(
        genesis_pub_key_hash: &[u8],
        db_path: impl AsRef<Path>,
        mining: MiningConfig,
    ) -> Result<Blockchain> {
        let path = db_path.as_ref().to_path_buf();
        if Self::db_exists(&path) {
            return Err(LedgerError::ChainAlreadyExists);
        }

        // I mine genesis before touching the disk, so a failed mine leaves
        // the path free for another attempt
        info!(
            "Creating genesis block for {}",
            HEXLOWER.encode(genesis_pub_key_hash)
        );
        let coinbase_tx =
            Transaction::new_coinbase_tx(genesis_pub_key_hash, GENESIS_COINBASE_DATA)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx, &mining)?;

        let blocks = Self::open_store(&path)?;
        Self::update_blocks_tree(&blocks, &genesis)?;
        info!("Genesis block created: {}", genesis.get_hash_hex());

        Ok(Blockchain {
            tip_hash: genesis.get_hash().to_vec(),
            blocks,
            db_path: path,
            mining,
        })
    }

    /// Open an existing ledger
    pub fn open(db_path: impl AsRef<Path>, mining: MiningConfig) -> Result<Blockchain> {
        let path = db_path.as_ref().to_path_buf();
        if !Self::db_exists(&path) {
            return Err(LedgerError::ChainNotFound);
        }

        let blocks = Self::open_store(&path)?;
        let tip_hash = blocks
            .get(TIP_BLOCK_HASH_KEY)?
            .ok_or(LedgerError::ChainNotFound)?
            .to_vec();

        Ok(Blockchain {
            tip_hash,
            blocks,
            db_path: path,
            mining,
        })
    }

    // No background flusher: every write is flushed explicitly, and the file
    // lock goes away as soon as the last handle is dropped
    fn open_store(path: &Path) -> Result<Tree> {
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(None)
            .open()
            .map_err(|e| LedgerError::StorageUnavailable(format!("Failed to open database: {e}")))?;
        let blocks = db.open_tree(BLOCKS_TREE).map_err(|e| {
            LedgerError::StorageUnavailable(format!("Failed to open blocks tree: {e}"))
        })?;
        Ok(blocks)
    }

    // I write the block record and the tip pointer in one sled transaction
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;

        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block_hash, block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash)?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                LedgerError::StorageUnavailable(format!("Failed to update blocks tree: {e}"))
            })?;
        blocks_tree.flush()?;

        Ok(())
    }

    pub fn get_db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub fn get_tip_hash(&self) -> &[u8] {
        self.tip_hash.as_slice()
    }

    /// Append a block holding `transactions` on top of the stored tip.
    ///
    /// Every non-coinbase transaction must verify against the current chain
    /// and no output may be spent twice within the block.
    pub fn mine_block(&mut self, transactions: &[Transaction]) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        for (i, transaction) in transactions.iter().enumerate() {
            if !self.verify_transaction(transaction)? {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Transaction {} at index {i} failed verification",
                    HEXLOWER.encode(transaction.get_id())
                )));
            }
        }
        Self::check_for_double_spending(transactions)?;

        // I read the tip from the store, not from my cached copy
        let tip_hash = self
            .blocks
            .get(TIP_BLOCK_HASH_KEY)?
            .ok_or(LedgerError::ChainNotFound)?
            .to_vec();

        let block = Block::new_block(&tip_hash, transactions, &self.mining)?;
        Self::update_blocks_tree(&self.blocks, &block)?;
        self.tip_hash = block.get_hash().to_vec();

        info!(
            "Appended block {} with {} transactions",
            block.get_hash_hex(),
            transactions.len()
        );
        Ok(block)
    }

    /// Build, sign and append a transfer of `amount` to `to_pub_key_hash`
    pub fn send<S: Signer + ?Sized>(
        &mut self,
        from: &S,
        to_pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<Block> {
        let from_pub_key_hash = hash_pub_key(from.public_key());
        let mut tx = {
            let utxo_set = UTXOSet::new(&*self);
            Transaction::new_utxo_transaction(
                &from_pub_key_hash,
                to_pub_key_hash,
                amount,
                &utxo_set,
            )?
        };
        self.sign_transaction(&mut tx, from)?;
        self.mine_block(&[tx])
    }

    /// Newest-to-oldest traversal starting at the current tip
    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.tip_hash.clone(), self.blocks.clone())
    }

    /// Transactions holding outputs still unspent by `pub_key_hash`.
    ///
    /// Outputs are marked spent only by inputs signed with the queried key, so
    /// the result is correct for that owner alone and is not a global UTXO set.
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<UnspentTransaction>> {
        let mut unspent = vec![];
        let mut spent_txos: HashMap<String, Vec<usize>> = HashMap::new();

        for block in self.iterator() {
            let block = block?;
            for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());
                let spent = spent_txos.get(txid_hex.as_str());
                let outputs: Vec<usize> = tx
                    .get_vout()
                    .iter()
                    .enumerate()
                    .filter(|(idx, out)| {
                        out.is_locked_with_key(pub_key_hash)
                            && !spent.is_some_and(|outs| outs.contains(idx))
                    })
                    .map(|(idx, _)| idx)
                    .collect();
                if !outputs.is_empty() {
                    unspent.push(UnspentTransaction {
                        transaction: tx.clone(),
                        outputs,
                    });
                }

                if tx.is_coinbase() {
                    continue;
                }
                // I only mark outputs spent by this owner's own inputs
                for txin in tx.get_vin() {
                    if txin.uses_key(pub_key_hash) {
                        spent_txos
                            .entry(HEXLOWER.encode(txin.get_txid()))
                            .or_default()
                            .push(txin.get_vout());
                    }
                }
            }
        }

        debug!(
            "Found {} transactions with unspent outputs for {}",
            unspent.len(),
            HEXLOWER.encode(pub_key_hash)
        );
        Ok(unspent)
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            for transaction in block?.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(transaction.clone());
                }
            }
        }
        Err(LedgerError::TransactionNotFound(HEXLOWER.encode(txid)))
    }

    fn prev_transactions(&self, transaction: &Transaction) -> Result<PrevTransactions> {
        let mut prev_txs = PrevTransactions::new();
        if transaction.is_coinbase() {
            return Ok(prev_txs);
        }
        for vin in transaction.get_vin() {
            let prev_tx = self.find_transaction(vin.get_txid())?;
            prev_txs.insert(HEXLOWER.encode(prev_tx.get_id()), prev_tx);
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction<S: Signer + ?Sized>(
        &self,
        transaction: &mut Transaction,
        signer: &S,
    ) -> Result<()> {
        let prev_txs = self.prev_transactions(transaction)?;
        transaction.sign(signer, &prev_txs)
    }

    /// Verify signatures and check the transaction against chain state:
    /// no input may spend an output already consumed on chain, and inputs
    /// must carry exactly the value the outputs pay out.
    pub fn verify_transaction(&self, transaction: &Transaction) -> Result<bool> {
        if transaction.is_coinbase() {
            return Ok(true);
        }

        let prev_txs = self.prev_transactions(transaction)?;
        if !transaction.verify(&prev_txs)? {
            return Ok(false);
        }

        let mut input_value = 0u64;
        for input in transaction.get_vin() {
            if self.is_output_spent(input.get_txid(), input.get_vout())? {
                warn!(
                    "Input already spent: {}:{}",
                    HEXLOWER.encode(input.get_txid()),
                    input.get_vout()
                );
                return Ok(false);
            }
            let value = prev_txs
                .get(HEXLOWER.encode(input.get_txid()).as_str())
                .and_then(|prev_tx| prev_tx.get_vout().get(input.get_vout()))
                .map(|out| out.get_value())
                .unwrap_or_default();
            input_value = input_value.checked_add(value).ok_or_else(|| {
                LedgerError::InvalidTransaction("Input value overflow".to_string())
            })?;
        }

        let output_value = transaction.get_output_value()?;
        if input_value != output_value {
            warn!("Transaction balance violation: inputs={input_value}, outputs={output_value}");
            return Ok(false);
        }
        Ok(true)
    }

    /// Whether any input anywhere on the chain spends `txid:vout`
    pub fn is_output_spent(&self, txid: &[u8], vout: usize) -> Result<bool> {
        for block in self.iterator() {
            for transaction in block?.get_transactions() {
                if transaction.is_coinbase() {
                    continue;
                }
                if transaction
                    .get_vin()
                    .iter()
                    .any(|input| input.get_txid() == txid && input.get_vout() == vout)
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn check_for_double_spending(transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(Vec<u8>, usize)> = HashSet::new();

        for (tx_index, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_outputs.insert(output_reference) {
                    return Err(LedgerError::InvalidTransaction(format!(
                        "Double spend in transaction {tx_index}: output {}:{} already spent in this block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self.blocks.get(block_hash)? {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        self.iterator()
            .map(|block| block.map(|b| b.get_hash().to_vec()))
            .collect()
    }

    /// Number of blocks from tip to genesis
    pub fn height(&self) -> Result<usize> {
        let mut count = 0;
        for block in self.iterator() {
            block?;
            count += 1;
        }
        Ok(count)
    }

    /// Audit every stored block: proof-of-work, transaction ids and
    /// signatures. Returns the number of blocks checked.
    pub fn verify_chain(&self) -> Result<usize> {
        let mut count = 0;
        for block in self.iterator() {
            let block = block?;
            if !ProofOfWork::validate(&block) {
                return Err(LedgerError::InvalidBlock(format!(
                    "Block {} fails proof-of-work",
                    block.get_hash_hex()
                )));
            }
            for tx in block.get_transactions() {
                if tx.get_id() != tx.compute_id()?.as_slice() {
                    return Err(LedgerError::InvalidBlock(format!(
                        "Block {} holds transaction {} with a mismatched id",
                        block.get_hash_hex(),
                        HEXLOWER.encode(tx.get_id())
                    )));
                }
                if !tx.verify(&self.prev_transactions(tx)?)? {
                    return Err(LedgerError::InvalidBlock(format!(
                        "Block {} holds transaction {} with an invalid signature",
                        block.get_hash_hex(),
                        HEXLOWER.encode(tx.get_id())
                    )));
                }
            }
            count += 1;
        }
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) fn blocks_tree(&self) -> &Tree {
        &self.blocks
    }
}

/// Lazy cursor over the chain from a starting hash back to genesis.
///
/// Yields `Err` once and stops if a record is missing, corrupt or stored under
/// the wrong key.
pub struct BlockchainIterator {
    blocks: Tree,
    current_hash: Option<Vec<u8>>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, blocks: Tree) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: Some(tip_hash),
            blocks,
        }
    }

    fn load(&self, block_hash: &[u8]) -> Result<Block> {
        let data = self.blocks.get(block_hash)?.ok_or_else(|| {
            LedgerError::CorruptBlockRecord(format!(
                "Block {} is missing",
                HEXLOWER.encode(block_hash)
            ))
        })?;
        let block = Block::deserialize(data.as_ref())?;
        if block.get_hash() != block_hash {
            return Err(LedgerError::CorruptBlockRecord(format!(
                "Record stored under {} holds block {}",
                HEXLOWER.encode(block_hash),
                block.get_hash_hex()
            )));
        }
        Ok(block)
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let current_hash = self.current_hash.take()?;
        let block = self.load(&current_hash);
        if let Ok(block) = &block {
            if !block.is_genesis() {
                self.current_hash = Some(block.get_pre_block_hash().to_vec());
            }
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{create_test_blockchain, test_mining_config};
    use crate::wallet::Wallet;

    #[test]
    fn test_genesis_only_chain() {
        let (blockchain, owner, _temp_dir) = create_test_blockchain().unwrap();

        assert_eq!(blockchain.height().unwrap(), 1);
        let genesis = blockchain.iterator().next().unwrap().unwrap();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.get_hash(), blockchain.get_tip_hash());
        assert!(genesis.get_transactions()[0].is_coinbase());
        assert!(genesis.get_transactions()[0].get_vout()[0]
            .is_locked_with_key(&owner.pub_key_hash()));
    }

    #[test]
    fn test_iterator_walks_back_to_genesis() {
        let (mut blockchain, owner, _temp_dir) = create_test_blockchain().unwrap();
        for i in 0..3 {
            let reward = Transaction::new_coinbase_tx(&owner.pub_key_hash(), &format!("r{i}"))
                .unwrap();
            blockchain.mine_block(&[reward]).unwrap();
        }

        let blocks: Vec<Block> = blockchain.iterator().collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 4);
        assert!(blocks.last().unwrap().is_genesis());
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].get_pre_block_hash(), pair[1].get_hash());
        }

        // Each call starts a fresh traversal
        assert_eq!(blockchain.iterator().count(), 4);
    }

    #[test]
    fn test_unspent_outputs_follow_spends() {
        let (mut blockchain, alice, _temp_dir) = create_test_blockchain().unwrap();
        let bob = Wallet::new().unwrap();

        blockchain.send(&alice, &bob.pub_key_hash(), 40).unwrap();

        let alice_unspent = blockchain
            .find_unspent_transactions(&alice.pub_key_hash())
            .unwrap();
        assert_eq!(alice_unspent.len(), 1);
        assert_eq!(alice_unspent[0].outputs, vec![1]);

        let bob_unspent = blockchain
            .find_unspent_transactions(&bob.pub_key_hash())
            .unwrap();
        assert_eq!(bob_unspent.len(), 1);
        assert_eq!(bob_unspent[0].outputs, vec![0]);
    }

    #[test]
    fn test_find_transaction_missing() {
        let (blockchain, _owner, _temp_dir) = create_test_blockchain().unwrap();
        let result = blockchain.find_transaction(b"no such transaction");
        assert!(matches!(result, Err(LedgerError::TransactionNotFound(_))));
    }

    #[test]
    fn test_double_spend_within_block_rejected() {
        let (mut blockchain, alice, _temp_dir) = create_test_blockchain().unwrap();
        let bob = Wallet::new().unwrap();

        let mut tx = {
            let utxo_set = UTXOSet::new(&blockchain);
            Transaction::new_utxo_transaction(
                &alice.pub_key_hash(),
                &bob.pub_key_hash(),
                10,
                &utxo_set,
            )
            .unwrap()
        };
        blockchain.sign_transaction(&mut tx, &alice).unwrap();

        let result = blockchain.mine_block(&[tx.clone(), tx]);
        assert!(matches!(result, Err(LedgerError::InvalidTransaction(_))));
        assert_eq!(blockchain.height().unwrap(), 1);
    }

    #[test]
    fn test_corrupt_record_stops_traversal() {
        let (blockchain, _owner, _temp_dir) = create_test_blockchain().unwrap();
        blockchain
            .blocks_tree()
            .insert(blockchain.get_tip_hash(), vec![0xFF, 0x01])
            .unwrap();

        let mut iterator = blockchain.iterator();
        assert!(matches!(
            iterator.next(),
            Some(Err(LedgerError::CorruptBlockRecord(_)))
        ));
        assert!(iterator.next().is_none());
        assert!(blockchain.verify_chain().is_err());
    }

    #[test]
    fn test_record_under_wrong_key_is_corrupt() {
        let (mut blockchain, owner, _temp_dir) = create_test_blockchain().unwrap();
        let genesis_hash = blockchain.get_tip_hash().to_vec();
        let reward = Transaction::new_coinbase_tx(&owner.pub_key_hash(), "second").unwrap();
        let second = blockchain.mine_block(&[reward]).unwrap();

        blockchain
            .blocks_tree()
            .insert(genesis_hash.as_slice(), second.serialize().unwrap())
            .unwrap();
        assert!(matches!(
            blockchain.height(),
            Err(LedgerError::CorruptBlockRecord(_))
        ));
    }

    #[test]
    fn test_reopen_keeps_tip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("chain");
        let owner = Wallet::new().unwrap();

        let tip = {
            let mut blockchain =
                Blockchain::create_blockchain(&owner.pub_key_hash(), &path, test_mining_config())
                    .unwrap();
            let reward = Transaction::new_coinbase_tx(&owner.pub_key_hash(), "more").unwrap();
            blockchain.mine_block(&[reward]).unwrap();
            blockchain.get_tip_hash().to_vec()
        };

        let blockchain = Blockchain::open(&path, test_mining_config()).unwrap();
        assert_eq!(blockchain.get_tip_hash(), tip.as_slice());
        assert_eq!(blockchain.verify_chain().unwrap(), 2);
    }

    #[test]
    fn test_failed_genesis_leaves_path_reusable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("chain");
        let owner = Wallet::new().unwrap();

        let starved = MiningConfig::with_difficulty(64).with_max_nonce(4);
        let result = Blockchain::create_blockchain(&owner.pub_key_hash(), &path, starved);
        assert!(matches!(
            result,
            Err(LedgerError::MiningExhausted { max_nonce: 4 })
        ));
        assert!(!Blockchain::db_exists(&path));

        let blockchain =
            Blockchain::create_blockchain(&owner.pub_key_hash(), &path, test_mining_config())
                .unwrap();
        assert_eq!(blockchain.height().unwrap(), 1);
    }

    #[test]
    fn test_reopen_right_after_drop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("chain");
        let owner = Wallet::new().unwrap();
        let tip = Blockchain::create_blockchain(&owner.pub_key_hash(), &path, test_mining_config())
            .unwrap()
            .get_tip_hash()
            .to_vec();

        // The store lock must be free the moment the previous handle is gone
        for _ in 0..10 {
            let blockchain = Blockchain::open(&path, test_mining_config()).unwrap();
            assert_eq!(blockchain.get_tip_hash(), tip.as_slice());
        }
    }
}
