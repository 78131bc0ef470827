//! Storage roots.

use std::env;
use std::path::PathBuf;

/// Filesystem layout of the block store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the by-minute block files.
    pub blockchain_dir: PathBuf,
    /// Directory holding the `index-NNN` shards.
    pub index_dir: PathBuf,
    /// Path of the head file.
    pub head_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            blockchain_dir: PathBuf::from("data/blockchain"),
            index_dir: PathBuf::from("data/blockchain/index"),
            head_path: PathBuf::from("data/blockchain/head"),
        }
    }
}

impl StorageConfig {
    /// Defaults overridden by `OPAL_BLOCKCHAIN_DIR`, `OPAL_INDEX_DIR`,
    /// and `OPAL_HEAD_FILE`.
    pub fn from_env() -> Self {
        let mut config = StorageConfig::default();
        if let Ok(dir) = env::var("OPAL_BLOCKCHAIN_DIR") {
            config.blockchain_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("OPAL_INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("OPAL_HEAD_FILE") {
            config.head_path = PathBuf::from(path);
        }
        config
    }
}
