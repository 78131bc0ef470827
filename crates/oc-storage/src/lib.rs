//! # Block Storage
//!
//! The ledger host's storage engine. Three kinds of append-only files
//! live under the configured roots:
//!
//! - `blockchain-YYYY-M-D-H-M` - framed blocks, one file per UTC
//!   minute, append order equals admission order;
//! - `index-NNN` - hash index shards, one per first hash byte, each
//!   entry pointing at a block's file and offset;
//! - the head file - a 72-byte record of the chain tip hash, the
//!   current difficulty, and the tip timestamp.
//!
//! Admission writes the block body first, then the index entry, then
//! the head. A reader may therefore observe a block through the minute
//! store before the hash index knows it; that window closes with the
//! head update and is accepted behavior, not a defect.
//!
//! Concurrency control is a process-wide map of per-path mutexes. No
//! two tasks touch the same file at once; holding one path's lock
//! never blocks work on another path.

pub mod config;
pub mod error;
pub mod head;
pub mod locks;
pub mod paths;
pub mod repository;

pub use config::StorageConfig;
pub use error::StorageError;
pub use head::Head;
pub use locks::PathLocks;
pub use repository::BlockRepository;
