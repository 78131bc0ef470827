//! Storage failure modes.

use oc_core::CodecError;
use thiserror::Error;

/// Errors surfaced by the block repository.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The offered block does not extend the current head.
    #[error("block does not extend the head: expected previous hash {expected}, got {got}")]
    StalePreviousHash {
        /// Hash the head records.
        expected: String,
        /// Hash the block carries.
        got: String,
    },

    /// The offered block is older than the head.
    #[error("block timestamp {got} is older than head timestamp {head}")]
    TimestampRegression {
        /// Head timestamp.
        head: u64,
        /// Block timestamp.
        got: u64,
    },

    /// The offered block was mined against a stale difficulty.
    #[error("block difficulty {got} does not match the current difficulty {expected}")]
    DifficultyMismatch {
        /// Difficulty the ledger currently requires.
        expected: String,
        /// Difficulty the block carries.
        got: String,
    },

    /// The block hash does not satisfy its own difficulty target.
    #[error("block hash fails its recorded difficulty")]
    HashNotValid,

    /// The head file exists but is not a 72-byte head record.
    #[error("head file {path} is corrupt: {reason}")]
    CorruptHead {
        /// Path of the offending file.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An index shard holds an entry that cannot be decoded.
    #[error("index file {path} is corrupt: {reason}")]
    CorruptIndex {
        /// Path of the offending shard.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A stored block failed to decode.
    #[error("stored block rejected: {0}")]
    Codec(#[from] CodecError),

    /// Filesystem failure.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True for the validation failures that reject a block without
    /// implying anything is wrong with the store itself.
    pub fn is_invalid_block(&self) -> bool {
        matches!(
            self,
            StorageError::StalePreviousHash { .. }
                | StorageError::TimestampRegression { .. }
                | StorageError::DifficultyMismatch { .. }
                | StorageError::HashNotValid
        )
    }
}
