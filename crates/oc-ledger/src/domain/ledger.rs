//! Single-writer admission over the block repository.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use oc_core::{Big256, Block};
use oc_storage::{BlockRepository, Head, StorageError};

use super::difficulty::{retarget, Retarget};

/// Mutable state of the difficulty controller, guarded by the write
/// gate so only the admitting task touches it.
#[derive(Debug)]
struct WriteState {
    mined_count: u64,
    last_write: Instant,
}

/// The ledger: one store, one writer, many readers.
///
/// All admissions pass through [`Ledger::write_block`], which holds
/// the write gate for the whole validate-append-retarget sequence.
/// Reads go straight to the repository and only take per-file locks.
#[derive(Debug)]
pub struct Ledger {
    repository: Arc<BlockRepository>,
    write_gate: Mutex<WriteState>,
}

impl Ledger {
    /// Wraps an opened repository. The difficulty window clock starts
    /// at process boot, matching a restart after downtime.
    pub fn new(repository: Arc<BlockRepository>) -> Self {
        Ledger {
            repository,
            write_gate: Mutex::new(WriteState {
                mined_count: 0,
                last_write: Instant::now(),
            }),
        }
    }

    /// Admits a mined block.
    ///
    /// On success the head has moved to this block and the difficulty
    /// controller has been fed. Validation failures reject the block
    /// and leave every piece of state untouched.
    pub fn write_block(&self, block: &Block) -> Result<(), StorageError> {
        let mut state = self.write_gate.lock();

        let now = Instant::now();
        let count_after = state.mined_count + 1;
        let delta_seconds = now.duration_since(state.last_write).as_secs();
        let current = self.repository.head_difficulty();

        self.repository.save(block, || {
            match retarget(&current, count_after, delta_seconds) {
                Retarget::Unchanged => current,
                Retarget::Adjusted(next) => {
                    info!(
                        mined_count = count_after,
                        delta_seconds,
                        old = %current,
                        new = %next,
                        "difficulty retargeted"
                    );
                    next
                }
                Retarget::Overflowed => {
                    warn!(
                        mined_count = count_after,
                        delta_seconds,
                        current = %current,
                        "difficulty update overflowed, keeping current value"
                    );
                    current
                }
            }
        })?;

        state.mined_count = count_after;
        state.last_write = now;
        Ok(())
    }

    /// The chain tip as the next miner must see it.
    pub fn head(&self) -> Head {
        self.repository.head()
    }

    /// Number of blocks admitted since boot.
    pub fn mined_count(&self) -> u64 {
        self.write_gate.lock().mined_count
    }

    /// Hash lookup, absence is `None`.
    pub fn get_by_hash(&self, hash: &Big256) -> Result<Option<Block>, StorageError> {
        self.repository.get_by_hash(hash)
    }

    /// Minute enumeration, absence is an empty list.
    pub fn get_in_minute(&self, timestamp: u64) -> Result<Vec<Block>, StorageError> {
        self.repository.get_in_minute(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::Chunk;
    use oc_storage::StorageConfig;
    use tempfile::TempDir;

    fn test_ledger() -> (TempDir, Ledger) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            blockchain_dir: dir.path().join("blocks"),
            index_dir: dir.path().join("index"),
            head_path: dir.path().join("head"),
        };
        let repo = Arc::new(BlockRepository::open(config).unwrap());
        (dir, Ledger::new(repo))
    }

    fn mined_block(ledger: &Ledger, data: &str) -> Block {
        let head = ledger.head();
        let chunk = Chunk::new(data.as_bytes().to_vec()).unwrap();
        let mut block = Block::build(&head.previous_hash, &head.difficulty, &[chunk]).unwrap();
        assert!(block.attempt_hash());
        block
    }

    #[test]
    fn first_admission_keeps_difficulty() {
        let (_dir, ledger) = test_ledger();
        let block = mined_block(&ledger, "Chunk 1");
        let hash = block.hash();

        ledger.write_block(&block).unwrap();

        let head = ledger.head();
        assert_eq!(head.previous_hash, hash);
        assert!(head.difficulty.is_one(), "one admission is inside the window");
        assert_eq!(ledger.mined_count(), 1);
    }

    #[test]
    fn rejection_leaves_count_untouched() {
        let (_dir, ledger) = test_ledger();
        let block = mined_block(&ledger, "ok");
        ledger.write_block(&block).unwrap();

        // Replay of the same block no longer extends the head.
        let err = ledger.write_block(&block).unwrap_err();
        assert!(err.is_invalid_block());
        assert_eq!(ledger.mined_count(), 1);
    }

    #[test]
    fn chain_of_admissions() {
        let (_dir, ledger) = test_ledger();
        for i in 0..5 {
            let block = mined_block(&ledger, &format!("chunk {i}"));
            ledger.write_block(&block).unwrap();
        }
        assert_eq!(ledger.mined_count(), 5);

        let head = ledger.head();
        let tip = ledger.get_by_hash(&head.previous_hash).unwrap().unwrap();
        assert_eq!(tip.hash(), head.previous_hash);
    }
}
