//! Per-path locking.
//!
//! A map of one mutex per filesystem path, created on demand, instead
//! of OS file locks. The map itself sits behind a readers-writer lock
//! so the common case, looking up an existing mutex, never contends
//! with other paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Process-wide registry of per-path mutexes.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: RwLock<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `path`, creating it on first use.
    ///
    /// The caller locks the returned handle for the duration of its
    /// file access; handles for different paths are independent.
    pub fn acquire(&self, path: &Path) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(path) {
            return Arc::clone(lock);
        }

        let mut locks = self.locks.write();
        // Another task may have created it between the two lookups.
        Arc::clone(
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Number of paths seen so far.
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    /// True when no path has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.locks.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_same_mutex() {
        let locks = PathLocks::new();
        let a = locks.acquire(Path::new("/tmp/x"));
        let b = locks.acquire(Path::new("/tmp/x"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn different_paths_do_not_block_each_other() {
        let locks = PathLocks::new();
        let a = locks.acquire(Path::new("/tmp/a"));
        let b = locks.acquire(Path::new("/tmp/b"));

        let _held = a.lock();
        // The other path's mutex must still be free.
        assert!(b.try_lock().is_some());
    }

    #[test]
    fn contended_path_excludes() {
        let locks = PathLocks::new();
        let a = locks.acquire(Path::new("/tmp/a"));
        let also_a = locks.acquire(Path::new("/tmp/a"));

        let _held = a.lock();
        assert!(also_a.try_lock().is_none());
    }
}
