//! The block repository.
//!
//! Append path (one writer at a time, enforced by the caller):
//!
//! 1. validate the block against the in-memory head;
//! 2. append the framed block to its minute file, noting the offset;
//! 3. append an entry to the hash-index shard;
//! 4. obtain the next difficulty from the caller, persist the new
//!    head record, then swap the in-memory head.
//!
//! Reads take only per-file locks and never the writer's, so lookups
//! keep working while a block is being appended elsewhere.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use oc_core::{Big256, Block};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::head::{Head, HEAD_RECORD_LEN};
use crate::locks::PathLocks;
use crate::paths::{index_filename, minute_filename, MinuteBucket};

/// Fixed part of an index entry: hash plus file offset.
const INDEX_ENTRY_FIXED: usize = 32 + 8;

/// File-backed block store with an in-memory view of the head.
#[derive(Debug)]
pub struct BlockRepository {
    config: StorageConfig,
    locks: PathLocks,
    head: RwLock<Head>,
}

impl BlockRepository {
    /// Opens the store, creating directories as needed and loading the
    /// head record when one exists.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.blockchain_dir)?;
        std::fs::create_dir_all(&config.index_dir)?;
        if let Some(parent) = config.head_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let head = match Self::load_head(&config.head_path)? {
            Some(head) => {
                info!(
                    previous_hash = %head.previous_hash,
                    difficulty = %head.difficulty,
                    "loaded ledger head"
                );
                head
            }
            None => {
                info!("head file missing, starting from an empty ledger");
                Head::genesis()
            }
        };

        Ok(BlockRepository {
            config,
            locks: PathLocks::new(),
            head: RwLock::new(head),
        })
    }

    fn load_head(path: &Path) -> Result<Option<Head>, StorageError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut bytes = [0u8; HEAD_RECORD_LEN];
        file.read_exact(&mut bytes)
            .map_err(|err| StorageError::CorruptHead {
                path: path.display().to_string(),
                reason: format!("short read: {err}"),
            })?;
        Ok(Some(Head::decode(&bytes)))
    }

    /// A snapshot of the chain tip.
    pub fn head(&self) -> Head {
        *self.head.read()
    }

    /// Hash of the last admitted block.
    pub fn head_hash(&self) -> Big256 {
        self.head.read().previous_hash
    }

    /// Difficulty the next block must carry.
    pub fn head_difficulty(&self) -> Big256 {
        self.head.read().difficulty
    }

    /// Admits a block.
    ///
    /// `compute_difficulty` runs after the body and index writes and
    /// supplies the difficulty the head will require next; it is only
    /// invoked when the block is actually being admitted.
    ///
    /// Callers serialize admissions; concurrent saves would race on
    /// the head validation.
    pub fn save(
        &self,
        block: &Block,
        compute_difficulty: impl FnOnce() -> Big256,
    ) -> Result<(), StorageError> {
        let head = self.head();
        self.validate(block, &head)?;

        let hash = block.hash();
        let filename = minute_filename(block.timestamp());
        let offset = self.append_block(block, &filename)?;
        self.append_index_entry(&hash, offset, &filename)?;

        let new_head = Head {
            previous_hash: hash,
            difficulty: compute_difficulty(),
            timestamp: block.timestamp(),
        };
        self.persist_head(&new_head)?;
        *self.head.write() = new_head;

        info!(
            hash = %hash,
            file = %filename,
            offset,
            difficulty = %new_head.difficulty,
            "block admitted"
        );
        Ok(())
    }

    fn validate(&self, block: &Block, head: &Head) -> Result<(), StorageError> {
        if block.previous_hash() != head.previous_hash {
            return Err(StorageError::StalePreviousHash {
                expected: head.previous_hash.to_hex(),
                got: block.previous_hash().to_hex(),
            });
        }
        if block.timestamp() < head.timestamp {
            return Err(StorageError::TimestampRegression {
                head: head.timestamp,
                got: block.timestamp(),
            });
        }
        if block.difficulty() != head.difficulty {
            return Err(StorageError::DifficultyMismatch {
                expected: head.difficulty.to_hex(),
                got: block.difficulty().to_hex(),
            });
        }
        if !block.is_valid_at_difficulty() {
            return Err(StorageError::HashNotValid);
        }
        Ok(())
    }

    /// Appends the framed block to its minute file and returns the
    /// offset it starts at.
    fn append_block(&self, block: &Block, filename: &str) -> Result<u64, StorageError> {
        let path = self.config.blockchain_dir.join(filename);
        let lock = self.locks.acquire(&path);
        let _guard = lock.lock();

        let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
        let offset = file.metadata()?.len();
        block.write_framed(&mut file)?;
        file.sync_all()?;

        debug!(file = %filename, offset, "block body appended");
        Ok(offset)
    }

    /// Index entry layout: `{ entry_len: u8 }{ hash: 32 }{ offset:
    /// u64 LE }{ filename bytes }`, entry_len covering everything
    /// after the length byte.
    fn append_index_entry(
        &self,
        hash: &Big256,
        offset: u64,
        filename: &str,
    ) -> Result<(), StorageError> {
        let path = self.config.index_dir.join(index_filename(hash));
        let lock = self.locks.acquire(&path);
        let _guard = lock.lock();

        let entry_len = INDEX_ENTRY_FIXED + filename.len();
        let mut entry = Vec::with_capacity(1 + entry_len);
        entry.push(entry_len as u8);
        entry.extend_from_slice(hash.as_bytes());
        entry.extend_from_slice(&offset.to_le_bytes());
        entry.extend_from_slice(filename.as_bytes());

        let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
        file.write_all(&entry)?;
        file.sync_all()?;
        Ok(())
    }

    fn persist_head(&self, head: &Head) -> Result<(), StorageError> {
        let path = &self.config.head_path;
        let lock = self.locks.acquire(path);
        let _guard = lock.lock();

        let mut file = File::create(path)?;
        file.write_all(&head.encode())?;
        file.sync_all()?;
        Ok(())
    }

    /// Looks a block up through the hash index.
    ///
    /// A missing index shard or minute file means the block is simply
    /// not stored; both yield `None`.
    pub fn get_by_hash(&self, hash: &Big256) -> Result<Option<Block>, StorageError> {
        let index_path = self.config.index_dir.join(index_filename(hash));
        let location = {
            let lock = self.locks.acquire(&index_path);
            let _guard = lock.lock();
            match File::open(&index_path) {
                Ok(file) => Self::scan_index(&index_path, file, hash)?,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            }
        };

        let Some((filename, offset)) = location else {
            return Ok(None);
        };

        let block_path = self.config.blockchain_dir.join(&filename);
        let lock = self.locks.acquire(&block_path);
        let _guard = lock.lock();
        let mut file = match File::open(&block_path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        file.seek(SeekFrom::Start(offset))?;
        let block = Block::read_framed(&mut BufReader::new(file))?;
        Ok(Some(block))
    }

    /// Scans an index shard for an exact hash match. First-byte
    /// collisions share a shard, so every entry is compared in full.
    fn scan_index(
        path: &Path,
        file: File,
        wanted: &Big256,
    ) -> Result<Option<(String, u64)>, StorageError> {
        let corrupt = |reason: String| StorageError::CorruptIndex {
            path: path.display().to_string(),
            reason,
        };

        let mut reader = BufReader::new(file);
        loop {
            let mut len_byte = [0u8; 1];
            if reader.read(&mut len_byte)? == 0 {
                return Ok(None);
            }
            let entry_len = len_byte[0] as usize;
            if entry_len < INDEX_ENTRY_FIXED {
                return Err(corrupt(format!("entry of {entry_len} bytes is too short")));
            }

            let mut hash = [0u8; 32];
            reader.read_exact(&mut hash)?;
            let mut offset_bytes = [0u8; 8];
            reader.read_exact(&mut offset_bytes)?;
            let mut filename = vec![0u8; entry_len - INDEX_ENTRY_FIXED];
            reader.read_exact(&mut filename)?;

            if Big256::from_bytes(hash) == *wanted {
                let filename = String::from_utf8(filename)
                    .map_err(|_| corrupt("filename is not UTF-8".to_string()))?;
                return Ok(Some((filename, u64::from_le_bytes(offset_bytes))));
            }
        }
    }

    /// All blocks whose timestamp falls in the same UTC minute as
    /// `timestamp`, in file (admission) order. A missing minute file
    /// yields an empty list.
    pub fn get_in_minute(&self, timestamp: u64) -> Result<Vec<Block>, StorageError> {
        let bucket = MinuteBucket::from_unix(timestamp);
        let path = self.config.blockchain_dir.join(bucket.filename());

        let lock = self.locks.acquire(&path);
        let _guard = lock.lock();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "no minute file, empty result");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut reader = BufReader::new(file);
        let mut blocks = Vec::new();
        while let Some(block) = Block::try_read_framed(&mut reader)? {
            if MinuteBucket::from_unix(block.timestamp()) == bucket {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    /// The configured roots, mostly for logging.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_core::Chunk;
    use tempfile::TempDir;

    fn test_repo() -> (TempDir, BlockRepository) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            blockchain_dir: dir.path().join("blocks"),
            index_dir: dir.path().join("index"),
            head_path: dir.path().join("head"),
        };
        let repo = BlockRepository::open(config).unwrap();
        (dir, repo)
    }

    fn chunk(data: &str) -> Chunk {
        Chunk::new(data.as_bytes().to_vec()).unwrap()
    }

    fn mined_block(repo: &BlockRepository, data: &str) -> Block {
        let head = repo.head();
        let mut block = Block::build(&head.previous_hash, &head.difficulty, &[chunk(data)]).unwrap();
        assert!(block.attempt_hash(), "difficulty one accepts any hash");
        block
    }

    #[test]
    fn empty_store_boots_to_genesis_head() {
        let (_dir, repo) = test_repo();
        let head = repo.head();
        assert!(head.previous_hash.is_zero());
        assert!(head.difficulty.is_one());
        assert_eq!(head.timestamp, 0);
    }

    #[test]
    fn save_then_get_by_hash() {
        let (_dir, repo) = test_repo();
        let block = mined_block(&repo, "Chunk 1");
        let hash = block.hash();

        repo.save(&block, || Big256::ONE).unwrap();

        assert_eq!(repo.head_hash(), hash);
        let found = repo.get_by_hash(&hash).unwrap().expect("stored block");
        assert_eq!(found, block);
        assert_eq!(found.hash(), hash);
    }

    #[test]
    fn get_by_hash_absent_is_none() {
        let (_dir, repo) = test_repo();
        let missing = Big256::from_bytes([0x5a; 32]);
        assert!(repo.get_by_hash(&missing).unwrap().is_none());
    }

    #[test]
    fn chained_saves_update_the_head() {
        let (_dir, repo) = test_repo();

        let first = mined_block(&repo, "one");
        repo.save(&first, || Big256::ONE).unwrap();

        let second = mined_block(&repo, "two");
        assert_eq!(second.previous_hash(), first.hash());
        repo.save(&second, || Big256::ONE).unwrap();

        assert_eq!(repo.head_hash(), second.hash());
        assert!(repo.get_by_hash(&first.hash()).unwrap().is_some());
        assert!(repo.get_by_hash(&second.hash()).unwrap().is_some());
    }

    #[test]
    fn stale_previous_hash_is_rejected() {
        let (_dir, repo) = test_repo();
        let block = mined_block(&repo, "one");
        repo.save(&block, || Big256::ONE).unwrap();

        // Built against the old head, so it no longer extends the tip.
        let mut stale = Block::build(&Big256::ZERO, &Big256::ONE, &[chunk("late")]).unwrap();
        stale.attempt_hash();
        let err = repo.save(&stale, || Big256::ONE).unwrap_err();
        assert!(matches!(err, StorageError::StalePreviousHash { .. }));
        assert!(err.is_invalid_block());
    }

    #[test]
    fn timestamp_regression_is_rejected() {
        let (_dir, repo) = test_repo();
        let mut first = mined_block(&repo, "one");
        first.set_creation_time(first.timestamp() + 3_600);
        repo.save(&first, || Big256::ONE).unwrap();

        let mut older = Block::build(&first.hash(), &Big256::ONE, &[chunk("two")]).unwrap();
        older.set_creation_time(first.timestamp() - 60);
        let err = repo.save(&older, || Big256::ONE).unwrap_err();
        assert!(matches!(err, StorageError::TimestampRegression { .. }));
    }

    #[test]
    fn difficulty_mismatch_is_rejected() {
        let (_dir, repo) = test_repo();
        let mut two = [0u8; 32];
        two[31] = 2;
        let wrong = Big256::from_bytes(two);
        let mut block = Block::build(&Big256::ZERO, &wrong, &[chunk("x")]).unwrap();
        block.attempt_hash();

        let err = repo.save(&block, || Big256::ONE).unwrap_err();
        assert!(matches!(err, StorageError::DifficultyMismatch { .. }));
    }

    #[test]
    fn invalid_proof_of_work_is_rejected() {
        let (_dir, repo) = test_repo();

        // Raise the required difficulty to the maximum, then offer a
        // block that carries it without a conforming hash.
        let hardest = Big256::from_bytes([0xff; 32]);
        let first = mined_block(&repo, "one");
        repo.save(&first, || hardest).unwrap();

        let block = Block::build(&first.hash(), &hardest, &[chunk("two")]).unwrap();
        let err = repo.save(&block, || hardest).unwrap_err();
        assert!(matches!(err, StorageError::HashNotValid));
    }

    #[test]
    fn minute_query_filters_and_preserves_order() {
        let (_dir, repo) = test_repo();

        // Two blocks inside one minute, a third in the next.
        let base = 1_709_802_300; // 2024-03-07 09:05:00 UTC
        let mut first = Block::build(&Big256::ZERO, &Big256::ONE, &[chunk("a")]).unwrap();
        first.set_creation_time(base + 5);
        repo.save(&first, || Big256::ONE).unwrap();

        let mut second = Block::build(&first.hash(), &Big256::ONE, &[chunk("b")]).unwrap();
        second.set_creation_time(base + 40);
        repo.save(&second, || Big256::ONE).unwrap();

        let mut third = Block::build(&second.hash(), &Big256::ONE, &[chunk("c")]).unwrap();
        third.set_creation_time(base + 75);
        repo.save(&third, || Big256::ONE).unwrap();

        let minute = repo.get_in_minute(base + 59).unwrap();
        assert_eq!(minute.len(), 2);
        assert_eq!(minute[0], first);
        assert_eq!(minute[1], second);

        assert!(repo.get_in_minute(base + 120).unwrap().is_empty());
    }

    #[test]
    fn head_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            blockchain_dir: dir.path().join("blocks"),
            index_dir: dir.path().join("index"),
            head_path: dir.path().join("head"),
        };

        let saved_head = {
            let repo = BlockRepository::open(config.clone()).unwrap();
            let block = mined_block(&repo, "persist me");
            repo.save(&block, || Big256::ONE).unwrap();
            repo.head()
        };

        let reopened = BlockRepository::open(config).unwrap();
        assert_eq!(reopened.head(), saved_head);
        assert!(reopened
            .get_by_hash(&saved_head.previous_hash)
            .unwrap()
            .is_some());
    }

    #[test]
    fn corrupt_head_is_reported() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            blockchain_dir: dir.path().join("blocks"),
            index_dir: dir.path().join("index"),
            head_path: dir.path().join("head"),
        };
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(&config.head_path, b"not a head record").unwrap();

        let err = BlockRepository::open(config).unwrap_err();
        assert!(matches!(err, StorageError::CorruptHead { .. }));
    }

    #[test]
    fn first_byte_collisions_resolve_by_full_compare() {
        let (_dir, repo) = test_repo();

        // Chain a handful of blocks; any that happen to share a first
        // byte land in the same shard and must still resolve exactly.
        let mut hashes = Vec::new();
        for i in 0..8 {
            let block = mined_block(&repo, &format!("chunk {i}"));
            hashes.push(block.hash());
            repo.save(&block, || Big256::ONE).unwrap();
        }

        for (i, hash) in hashes.iter().enumerate() {
            let block = repo.get_by_hash(hash).unwrap().expect("stored block");
            assert_eq!(block.hash(), *hash, "lookup {i} returned the wrong block");
        }
    }
}
