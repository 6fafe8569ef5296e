//! On-demand per-key reader/writer locks.
//!
//! The table only holds weak references. A key's lock lives as long as some
//! operation holds it. Dead entries are swept when the map reaches the sweep
//! mark, which then moves to twice the surviving size so a table full of live
//! locks is not rescanned on every insert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::error::{StoreError, StoreResult};

/// Lowest sweep mark.
const SWEEP_THRESHOLD: usize = 256;

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Weak<RwLock<()>>>,
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: SWEEP_THRESHOLD,
        }
    }
}

impl Entries {
    fn sweep(&mut self) {
        self.map.retain(|_, weak| weak.strong_count() > 0);
        self.sweep_at = (self.map.len() * 2).max(SWEEP_THRESHOLD);
    }
}

#[derive(Debug, Default)]
pub struct KeyLockTable {
    locks: Mutex<Entries>,
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared lock for `key`, creating it if no live one exists.
    ///
    /// The table mutex is held only for the lookup, never while the returned
    /// lock is acquired.
    pub fn lock_for(&self, key: &str) -> StoreResult<Arc<RwLock<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("lock table: {}", e)))?;

        if let Some(existing) = locks.map.get(key).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        if locks.map.len() >= locks.sweep_at {
            locks.sweep();
        }

        let lock = Arc::new(RwLock::new(()));
        locks.map.insert(key.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }

    /// Number of keys with a live lock.
    pub fn live_count(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.map.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}
