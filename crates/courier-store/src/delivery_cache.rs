//! Delivery key scheme over [`CacheStore`].
//!
//! | Key                 | Contents                                  |
//! |---------------------|-------------------------------------------|
//! | `payload_<uuid>`    | serialized body of a pending call          |
//! | `session_<id>`      | cached session snapshot                    |
//! | `crash`             | crash payload awaiting confirmed delivery  |
//! | `pending_calls`     | ledger index (JSON)                        |

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::error::{StoreError, StoreResult};

pub const PAYLOAD_PREFIX: &str = "payload_";
pub const SESSION_PREFIX: &str = "session_";
pub const CRASH_KEY: &str = "crash";
pub const PENDING_INDEX_KEY: &str = "pending_calls";

#[derive(Debug, Clone)]
pub struct DeliveryCache {
    store: Arc<CacheStore>,
}

impl DeliveryCache {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        CacheStore::open_shared(root).map(Self::new)
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    // Payload blobs

    /// Commit a payload under a fresh name and return the name.
    pub fn save_payload(&self, bytes: &[u8]) -> StoreResult<String> {
        let name = format!("{}{}", PAYLOAD_PREFIX, uuid::Uuid::new_v4().simple());
        self.store.write(&name, bytes)?;
        Ok(name)
    }

    pub fn load_payload(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.read(name)
    }

    pub fn delete_payload(&self, name: &str) -> StoreResult<bool> {
        self.store.delete(name)
    }

    /// Names of every committed payload blob.
    pub fn payload_names(&self) -> StoreResult<Vec<String>> {
        self.store.keys_with_prefix(PAYLOAD_PREFIX)
    }

    // Cached sessions

    pub fn save_session(&self, session_id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.store.write(&session_key(session_id), bytes)
    }

    pub fn load_session(&self, session_id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.read(&session_key(session_id))
    }

    pub fn delete_session(&self, session_id: &str) -> StoreResult<bool> {
        self.store.delete(&session_key(session_id))
    }

    /// Ids of all cached sessions, sorted.
    pub fn cached_session_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .store
            .keys_with_prefix(SESSION_PREFIX)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(SESSION_PREFIX).map(str::to_string))
            .filter(|id| !id.is_empty())
            .collect())
    }

    // Crash slot

    pub fn save_crash(&self, bytes: &[u8]) -> StoreResult<()> {
        self.store.write(CRASH_KEY, bytes)
    }

    pub fn load_crash(&self) -> StoreResult<Option<Vec<u8>>> {
        self.store.read(CRASH_KEY)
    }

    pub fn delete_crash(&self) -> StoreResult<bool> {
        self.store.delete(CRASH_KEY)
    }

    pub fn has_crash(&self) -> bool {
        self.store.contains(CRASH_KEY)
    }

    // JSON records

    /// Serialize `value` straight into the entry for `key`.
    pub fn save_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.store
            .write_with(key, |out| serde_json::to_writer(out, value).map_err(Into::into))
    }

    pub fn load_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.read(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Json {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn save_pending_index<T: Serialize>(&self, index: &T) -> StoreResult<()> {
        self.save_json(PENDING_INDEX_KEY, index)
    }

    pub fn load_pending_index<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        self.load_json(PENDING_INDEX_KEY)
    }
}

fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn cache() -> (tempfile::TempDir, DeliveryCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = DeliveryCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_payload_lifecycle() {
        let (_dir, cache) = cache();
        let name = cache.save_payload(b"body").unwrap();
        assert!(name.starts_with(PAYLOAD_PREFIX));
        assert_eq!(cache.payload_names().unwrap(), vec![name.clone()]);
        assert_eq!(cache.load_payload(&name).unwrap().as_deref(), Some(&b"body"[..]));
        assert!(cache.delete_payload(&name).unwrap());
        assert!(cache.payload_names().unwrap().is_empty());
    }

    #[test]
    fn test_cached_session_ids() {
        let (_dir, cache) = cache();
        cache.save_session("s2", b"two").unwrap();
        cache.save_session("s1", b"one").unwrap();
        cache.save_payload(b"not a session").unwrap();
        assert_eq!(cache.cached_session_ids().unwrap(), vec!["s1", "s2"]);
        assert!(cache.delete_session("s1").unwrap());
        assert_eq!(cache.cached_session_ids().unwrap(), vec!["s2"]);
    }

    #[test]
    fn test_session_id_must_be_key_safe() {
        let (_dir, cache) = cache();
        assert!(matches!(
            cache.save_session("../x", b""),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_crash_slot() {
        let (_dir, cache) = cache();
        assert!(!cache.has_crash());
        cache.save_crash(b"boom").unwrap();
        assert!(cache.has_crash());
        assert_eq!(cache.load_crash().unwrap().as_deref(), Some(&b"boom"[..]));
        assert!(cache.delete_crash().unwrap());
        assert_eq!(cache.load_crash().unwrap(), None);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Index {
        generation: u64,
        keys: Vec<String>,
    }

    #[test]
    fn test_pending_index_json() {
        let (_dir, cache) = cache();
        assert_eq!(cache.load_pending_index::<Index>().unwrap(), None);
        let index = Index {
            generation: 3,
            keys: vec!["payload_a".into()],
        };
        cache.save_pending_index(&index).unwrap();
        assert_eq!(cache.load_pending_index::<Index>().unwrap(), Some(index));
    }

    #[test]
    fn test_corrupt_json_is_error_not_absent() {
        let (_dir, cache) = cache();
        cache.store().write(PENDING_INDEX_KEY, b"{ truncated").unwrap();
        assert!(matches!(
            cache.load_pending_index::<Index>(),
            Err(StoreError::Json { .. })
        ));
    }
}
