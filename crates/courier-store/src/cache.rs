//! Filesystem-backed key → blob store.
//!
//! Each key maps to one file directly under the store root. A write streams
//! into `.<key>.tmp.<pid>.<n>`, flushes it with `sync_all` and renames it over
//! `<key>`. Temporary names start with a dot, which valid keys never do, so
//! they cannot collide with committed entries and are skipped by listings.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::lock_table::KeyLockTable;

/// Longest accepted key.
pub const MAX_KEY_LEN: usize = 200;

const TMP_MARKER: &str = ".tmp.";

/// Check that `key` is usable as a file name: 1..=200 chars from
/// `[A-Za-z0-9._-]`, not starting with a dot.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    locks: KeyLockTable,
    tmp_counter: AtomicU64,
}

impl CacheStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Temporary files left behind by interrupted writes are removed; the
    /// committed value for their key, if any, is untouched.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Dir {
            path: root.clone(),
            source,
        })?;

        let entries = fs::read_dir(&root).map_err(|source| StoreError::Dir {
            path: root.clone(),
            source,
        })?;
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') && name.contains(TMP_MARKER) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        event = "cache.tmp_cleanup_failed",
                        file = name,
                        error = %e,
                        "could not remove leftover temporary file"
                    ),
                }
            }
        }
        if removed > 0 {
            tracing::info!(
                event = "cache.tmp_cleaned",
                count = removed,
                root = %root.display(),
                "removed leftover temporary files"
            );
        }

        Ok(Self {
            root,
            locks: KeyLockTable::new(),
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Convenience for callers that share the store across threads.
    pub fn open_shared(root: impl Into<PathBuf>) -> StoreResult<Arc<Self>> {
        Self::open(root).map(Arc::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace the value for `key` with `bytes`.
    pub fn write(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        self.write_with(key, |out| out.write_all(bytes))
    }

    /// Replace the value for `key` with whatever `produce` writes.
    ///
    /// The key's write lock is held for the whole call, so `produce` can
    /// stream a large value without readers observing a partial one. If
    /// `produce` or any I/O step fails, the previous value stays in place.
    pub fn write_with<F>(&self, key: &str, produce: F) -> StoreResult<()>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        validate_key(key)?;
        let lock = self.locks.lock_for(key)?;
        let _guard = lock
            .write()
            .map_err(|_| StoreError::LockPoisoned(key.to_string()))?;

        let tmp_path = self.tmp_path(key);
        let final_path = self.root.join(key);
        let result = write_and_promote(&tmp_path, &final_path, produce);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result.map_err(|source| StoreError::Io {
            key: key.to_string(),
            source,
        })?;

        tracing::trace!(event = "cache.write", key, "committed cache entry");
        Ok(())
    }

    /// Current value for `key`, or `None` if absent.
    ///
    /// Blocks while a write to the same key is in flight and then returns the
    /// value that write committed.
    pub fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let lock = self.locks.lock_for(key)?;
        let _guard = lock
            .read()
            .map_err(|_| StoreError::LockPoisoned(key.to_string()))?;

        match fs::read(self.root.join(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Remove `key`. Returns whether a value existed.
    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let lock = self.locks.lock_for(key)?;
        let _guard = lock
            .write()
            .map_err(|_| StoreError::LockPoisoned(key.to_string()))?;

        match fs::remove_file(self.root.join(key)) {
            Ok(()) => {
                tracing::trace!(event = "cache.delete", key, "deleted cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.root.join(key).is_file()
    }

    /// Committed keys starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::Dir {
            path: self.root.clone(),
            source,
        })?;
        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(prefix) && validate_key(name).is_ok())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{}{}{}.{}", key, TMP_MARKER, std::process::id(), n))
    }
}

fn write_and_promote<F>(tmp_path: &Path, final_path: &Path, produce: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    {
        let file = File::create(tmp_path)?;
        let mut out = io::BufWriter::new(file);
        produce(&mut out)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, final_path)?;
    // Persist the rename itself. Not every platform lets a directory be
    // opened for syncing.
    if let Some(parent) = final_path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
