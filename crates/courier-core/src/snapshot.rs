//! Periodic session snapshots.
//!
//! While a session is active the host supplies a snapshot provider; every
//! interval its output is written to the session cache so a killed process
//! still leaves a recent copy to send on the next start.

use courier_store::DeliveryCache;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::logging::event_names;
use crate::worker::{WorkerError, WorkerName};

/// Returns `(session_id, serialized session)` or `None` when there is
/// nothing to cache.
pub type SnapshotProvider = Arc<dyn Fn() -> Option<(String, Vec<u8>)> + Send + Sync>;

#[derive(Debug)]
pub struct PeriodicCacher {
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicCacher {
    pub fn start(
        cache: DeliveryCache,
        interval: Duration,
        provider: SnapshotProvider,
    ) -> Result<Self, WorkerError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(WorkerName::PeriodicCache.as_str().to_string())
            .spawn(move || {
                while let Err(mpsc::RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                    cache_snapshot(&cache, provider.as_ref());
                }
            })
            .map_err(|source| WorkerError::SpawnFailed {
                name: WorkerName::PeriodicCache,
                source,
            })?;

        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop snapshotting and join the thread. Idempotent.
    pub fn stop(&self) {
        if let Ok(mut tx) = self.stop_tx.lock() {
            tx.take();
        }
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(event = event_names::INTERNAL_ERROR, "snapshot thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().map(|h| h.is_some()).unwrap_or(false)
    }
}

impl Drop for PeriodicCacher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn cache_snapshot(cache: &DeliveryCache, provider: &(dyn Fn() -> Option<(String, Vec<u8>)> + Send + Sync)) {
    let Some((session_id, bytes)) = provider() else {
        return;
    };
    match cache.save_session(&session_id, &bytes) {
        Ok(()) => tracing::trace!(
            event = event_names::SESSION_CACHED,
            session_id = %session_id,
            bytes = bytes.len(),
            "session snapshot cached"
        ),
        Err(e) => tracing::warn!(
            event = event_names::SNAPSHOT_FAILED,
            session_id = %session_id,
            error = %e,
            "failed to cache session snapshot"
        ),
    }
}
