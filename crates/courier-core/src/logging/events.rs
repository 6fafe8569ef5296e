//! Structured event names.
//!
//! Every `tracing` call in the engine carries an `event` field drawn from
//! [`event_names`] so JSON log consumers can key on stable names.

/// Standard event names used in logging.
pub mod event_names {
    // Service lifecycle
    pub const SERVICE_STARTED: &str = "service.started";
    pub const SERVICE_SHUTDOWN: &str = "service.shutdown";
    pub const NETWORK_STATUS_CHANGED: &str = "network.status_changed";

    // Immediate delivery
    pub const DELIVERY_SENT: &str = "delivery.sent";
    pub const DELIVERY_QUEUED: &str = "delivery.queued";
    pub const DELIVERY_DROPPED: &str = "delivery.dropped";
    pub const DELIVERY_TIMED_OUT: &str = "delivery.timed_out";
    pub const PAYLOAD_SERIALIZE_FAILED: &str = "delivery.serialize_failed";

    // Ledger
    pub const LEDGER_LOADED: &str = "ledger.loaded";
    pub const LEDGER_INDEX_CORRUPT: &str = "ledger.index_corrupt";
    pub const LEDGER_MISSING_PAYLOAD: &str = "ledger.missing_payload";
    pub const LEDGER_ORPHAN_REMOVED: &str = "ledger.orphan_removed";
    pub const LEDGER_EVICTED: &str = "ledger.evicted";
    pub const LEDGER_PURGED: &str = "ledger.purged";

    // Retry
    pub const RETRY_SCHEDULED: &str = "retry.scheduled";
    pub const RETRY_DRAIN_STARTED: &str = "retry.drain_started";
    pub const RETRY_DRAIN_FINISHED: &str = "retry.drain_finished";
    pub const RETRY_DELIVERED: &str = "retry.delivered";
    pub const RETRY_DEFERRED: &str = "retry.deferred";
    pub const RETRY_BACKOFF: &str = "retry.backoff";

    // Sessions and crashes
    pub const SESSION_CACHED: &str = "session.cached";
    pub const SESSION_CACHED_SENT: &str = "session.cached_sent";
    pub const SNAPSHOT_FAILED: &str = "snapshot.failed";
    pub const CRASH_SAVED: &str = "crash.saved";
    pub const CRASH_DELIVERED: &str = "crash.delivered";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";

    // Error events
    pub const STORAGE_ERROR: &str = "storage.error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
