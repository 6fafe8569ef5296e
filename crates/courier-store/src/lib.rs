//! Durable storage for courier delivery.
//!
//! [`CacheStore`] is a flat key → blob store on the local filesystem:
//! - operations on different keys never block one another
//! - operations on the same key go through a per-key reader/writer lock
//! - writes go to a temporary file and are renamed into place once flushed,
//!   so readers see either the previous value or the new one
//!
//! [`DeliveryCache`] layers the delivery key scheme on top (payload blobs,
//! cached sessions, the crash slot and the pending-call index).

pub mod cache;
pub mod delivery_cache;
pub mod error;
pub mod lock_table;

pub use cache::{validate_key, CacheStore, MAX_KEY_LEN};
pub use delivery_cache::DeliveryCache;
pub use error::{StoreError, StoreResult};
pub use lock_table::KeyLockTable;
