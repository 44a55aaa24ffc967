use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Leading zero bits every block hash must have
pub const TARGET_BITS: u32 = 12;

pub const MAX_DIFFICULTY: u32 = 255;

const MAX_NONCE: i64 = i64::MAX;

// I log progress once per this many attempts
const PROGRESS_INTERVAL: i64 = 1 << 20;

/// Mining parameters shared by every block of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningConfig {
    pub difficulty: u32,
    /// Exclusive upper bound on the nonce search
    pub max_nonce: i64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            difficulty: TARGET_BITS,
            max_nonce: MAX_NONCE,
        }
    }
}

impl MiningConfig {
    pub fn with_difficulty(difficulty: u32) -> MiningConfig {
        MiningConfig {
            difficulty,
            ..Default::default()
        }
    }

    pub fn with_max_nonce(mut self, max_nonce: i64) -> MiningConfig {
        self.max_nonce = max_nonce;
        self
    }
}

pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: BigInt,
}

impl<'a> ProofOfWork<'a> {
    pub fn new_proof_of_work(block: &'a Block) -> Result<ProofOfWork<'a>> {
        let difficulty = block.get_difficulty();
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidBlock(format!(
                "Difficulty {difficulty} exceeds {MAX_DIFFICULTY}"
            )));
        }
        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty);
        Ok(ProofOfWork { block, target })
    }

    /// Recompute a stored block's hash from its nonce and check it against
    /// both the stored hash and the target.
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block) {
            Ok(pow) => pow,
            Err(_) => return false,
        };
        let hash = sha256_digest(pow.prepare_data(block.get_nonce()).as_slice());
        hash.as_slice() == block.get_hash() && pow.meets_target(&hash)
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < self.target
    }

    // transactions digest ‖ prev hash ‖ nonce ‖ difficulty
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.hash_transactions());
        data_bytes.extend(self.block.get_pre_block_hash());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(i64::from(self.block.get_difficulty()).to_be_bytes());
        data_bytes
    }

    /// Search nonces from zero until a hash falls below the target.
    pub fn run(&self, max_nonce: i64) -> Result<(i64, Vec<u8>)> {
        let mut nonce = 0;
        while nonce < max_nonce {
            let hash = sha256_digest(self.prepare_data(nonce).as_slice());
            if self.meets_target(&hash) {
                info!(
                    "Found nonce {nonce} for hash {}",
                    HEXLOWER.encode(hash.as_slice())
                );
                return Ok((nonce, hash));
            }
            nonce += 1;
            if nonce % PROGRESS_INTERVAL == 0 {
                debug!("Tried {nonce} nonces");
            }
        }
        Err(LedgerError::MiningExhausted { max_nonce })
    }
}
