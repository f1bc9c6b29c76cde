//! Per-path locking
//!
//! Serializes the compare/backup/rename tail of uploads that target the same
//! file. Locks are created on first use and dropped from the table as soon as
//! nobody holds or waits for them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

/// Table of mutexes keyed by canonical absolute path.
#[derive(Debug, Default)]
pub struct PathLock {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `path`.
    ///
    /// Only callers using the same key contend.
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(self.locks.entry(path.to_path_buf()).or_default().value());

        let result = {
            // A panic inside a previous holder leaves nothing to repair: the
            // critical section only touches the filesystem.
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(lock);
        // The shard lock taken by remove_if excludes concurrent `entry` calls,
        // so a count of one means the table holds the only reference.
        self.locks
            .remove_if(path, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Number of paths currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_path_is_serialized() {
        let table = Arc::new(PathLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    table.with_lock(Path::new("/depot/a/b/file.txt"), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn different_paths_do_not_contend() {
        let table = PathLock::new();
        let value = table.with_lock(Path::new("/one"), || {
            // Re-entering with another key must not deadlock.
            table.with_lock(Path::new("/two"), || table.len())
        });
        assert_eq!(value, 2);
        assert!(table.is_empty());
    }
}
