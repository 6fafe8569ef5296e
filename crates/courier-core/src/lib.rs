//! Courier delivery engine.
//!
//! Accepts serialized telemetry envelopes, sends them immediately when the
//! network allows, and otherwise persists them in a bounded, prioritized
//! pending-call ledger that a retry worker re-drives later.
//!
//! ```text
//! gate → dispatcher → (transport | ledger) ← retry coordinator
//!                              ↓
//!                         cache store
//! ```

pub mod dispatch;
pub mod exit_codes;
pub mod ledger;
pub mod logging;
pub mod retry;
pub mod service;
pub mod snapshot;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use dispatch::{Completion, DeliveryDispatcher, DeliveryOutcome, DropReason, QueueReason};
pub use ledger::{LedgerIndex, PendingCall, PendingCallLedger, PendingCalls};
pub use retry::{DrainReport, RetryCoordinator, RetryHandler, RetryScheduler};
pub use service::{ConnectivityListener, DeliveryService, PendingSummary};
pub use snapshot::{PeriodicCacher, SnapshotProvider};
pub use transport::{ApiResponse, Transport, TransportError};
pub use worker::{BackgroundWorker, TaskHandle, WorkerError, WorkerName};
