use crate::core::{MiningConfig, MAX_DIFFICULTY, TARGET_BITS};
use log::warn;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

const DEFAULT_DATA_DIR: &str = "./data/blocks";
const DEFAULT_WALLET_FILE: &str = "./wallet.dat";

const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const WALLET_FILE_KEY: &str = "LEDGER_WALLET_FILE";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";

/// Process settings read from the environment, with defaults
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        for key in [DATA_DIR_KEY, WALLET_FILE_KEY, DIFFICULTY_KEY] {
            if let Ok(value) = env::var(key) {
                map.insert(String::from(key), value);
            }
        }
        Config {
            inner: RwLock::new(map),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        // A poisoned lock still holds a usable map
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert(String::from(key), value);
    }

    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(self.get(DATA_DIR_KEY).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()))
    }

    pub fn set_data_dir(&self, dir: String) {
        self.set(DATA_DIR_KEY, dir);
    }

    pub fn get_wallet_file(&self) -> PathBuf {
        PathBuf::from(
            self.get(WALLET_FILE_KEY)
                .unwrap_or_else(|| DEFAULT_WALLET_FILE.to_string()),
        )
    }

    pub fn set_wallet_file(&self, path: String) {
        self.set(WALLET_FILE_KEY, path);
    }

    /// Configured difficulty; unparsable or out-of-range values fall back to
    /// `TARGET_BITS`
    pub fn get_difficulty(&self) -> u32 {
        match self.get(DIFFICULTY_KEY) {
            None => TARGET_BITS,
            Some(raw) => match raw.parse::<u32>() {
                Ok(bits) if bits <= MAX_DIFFICULTY => bits,
                _ => {
                    warn!("Ignoring {DIFFICULTY_KEY}={raw}, using {TARGET_BITS}");
                    TARGET_BITS
                }
            },
        }
    }

    pub fn set_difficulty(&self, difficulty: u32) {
        self.set(DIFFICULTY_KEY, difficulty.to_string());
    }

    pub fn get_mining_config(&self) -> MiningConfig {
        MiningConfig::with_difficulty(self.get_difficulty())
    }
}
