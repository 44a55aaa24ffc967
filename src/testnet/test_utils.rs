use crate::core::{Blockchain, MiningConfig};
use crate::error::{LedgerError, Result};
use crate::wallet::Wallet;
use tempfile::TempDir;

/// Low difficulty so mining finishes after a handful of attempts
pub const TEST_DIFFICULTY: u32 = 4;

pub fn test_mining_config() -> MiningConfig {
    MiningConfig::with_difficulty(TEST_DIFFICULTY)
}

pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| LedgerError::Io(e.to_string()))
}

/// A fresh ledger whose genesis reward belongs to the returned wallet.
/// Keep the `TempDir` alive for as long as the ledger is used.
pub fn create_test_blockchain() -> Result<(Blockchain, Wallet, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let owner = Wallet::new()?;
    let blockchain = Blockchain::create_blockchain(
        &owner.pub_key_hash(),
        temp_dir.path().join("test_blockchain"),
        test_mining_config(),
    )?;
    Ok((blockchain, owner, temp_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UTXOSet;
    use crate::SUBSIDY;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, owner, _temp_dir) = create_test_blockchain().unwrap();
        assert_eq!(blockchain.height().unwrap(), 1);
        assert_eq!(
            UTXOSet::new(&blockchain)
                .get_balance(&owner.pub_key_hash())
                .unwrap(),
            SUBSIDY
        );
    }

    #[test]
    fn test_test_chains_are_isolated() {
        let (a, _, _dir_a) = create_test_blockchain().unwrap();
        let (b, _, _dir_b) = create_test_blockchain().unwrap();
        assert_ne!(a.get_db_path(), b.get_db_path());
        assert_ne!(a.get_tip_hash(), b.get_tip_hash());
    }
}
