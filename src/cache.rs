//! File-backed cache entries.
//!
//! Data sources and the model registry keep whatever they read from disk for
//! the lifetime of the process. Each entry remembers the modification time of
//! the files it was built from, so callers that opt into revalidation can
//! detect that a file changed underneath a warm cache.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

/// Modification stamp of one backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl FileStamp {
    pub fn capture(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            modified: modified_time(path),
        }
    }

    /// True when the file still has the recorded modification time.
    pub fn is_current(&self) -> bool {
        modified_time(&self.path) == self.modified
    }
}

/// A cached value together with the stamps of the files it came from.
#[derive(Debug)]
pub struct Cached<T> {
    value: Arc<T>,
    stamps: Vec<FileStamp>,
}

impl<T> Cached<T> {
    pub fn new(value: T, stamps: Vec<FileStamp>) -> Self {
        Self {
            value: Arc::new(value),
            stamps,
        }
    }

    pub fn value(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    pub fn is_fresh(&self) -> bool {
        self.stamps.iter().all(FileStamp::is_current)
    }

    /// Return the value unless revalidation is on and a backing file changed.
    pub fn get(&self, revalidate: bool) -> Option<Arc<T>> {
        if revalidate && !self.is_fresh() {
            None
        } else {
            Some(self.value())
        }
    }
}

impl<T> Clone for Cached<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            stamps: self.stamps.clone(),
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read-lock ignoring poisoning: cached values are immutable once inserted.
pub fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_detects_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "x").unwrap();
        let stamp = FileStamp::capture(&path);
        assert!(stamp.is_current());

        std::fs::remove_file(&path).unwrap();
        assert!(!stamp.is_current());
    }

    #[test]
    fn cached_serves_stale_value_without_revalidation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "x").unwrap();
        let cached = Cached::new(5u32, vec![FileStamp::capture(&path)]);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cached.get(false).as_deref(), Some(&5));
        assert!(cached.get(true).is_none());
    }
}
