//! Delivery service facade.
//!
//! [`DeliveryService`] owns one instance of every moving part: the cache,
//! the reloaded ledger, the retry coordinator and its scheduler thread, the
//! dispatcher, the session-cache worker and the network status writer. Hosts
//! talk to it through the `submit_*` methods and feed it connectivity
//! changes through [`ConnectivityListener`].

use courier_common::{
    network_status_channel, DeliveryError, Destination, EndpointKind, Envelope, NetworkStatus,
    NetworkStatusWriter, RequestId, Result,
};
use courier_config::{validate_delivery_config, DeliveryConfig};
use courier_gate::{EventMessage, GatingConfigSource, SanitizationGate, SessionMessage};
use courier_store::DeliveryCache;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::dispatch::{Completion, DeliveryDispatcher, DeliveryOutcome};
use crate::ledger::PendingCallLedger;
use crate::logging::event_names;
use crate::retry::{DrainReport, RetryCoordinator, RetryHandler, RetryScheduler};
use crate::snapshot::{PeriodicCacher, SnapshotProvider};
use crate::transport::Transport;
use crate::worker::{BackgroundWorker, WorkerName};

/// Receives reachability changes from the platform.
pub trait ConnectivityListener: Send + Sync {
    fn on_network_status_changed(&self, status: NetworkStatus);
}

/// Snapshot of undelivered state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    pub counts: BTreeMap<EndpointKind, usize>,
    pub total: usize,
    pub cached_sessions: Vec<String>,
    pub crash_pending: bool,
}

impl PendingSummary {
    pub fn collect(ledger: &PendingCallLedger) -> Result<Self> {
        let counts = ledger.counts()?;
        Ok(Self {
            total: counts.values().sum(),
            counts,
            cached_sessions: ledger.cache().cached_session_ids()?,
            crash_pending: ledger.cache().has_crash(),
        })
    }
}

pub struct DeliveryService {
    config: DeliveryConfig,
    cache: DeliveryCache,
    coordinator: Arc<RetryCoordinator>,
    dispatcher: DeliveryDispatcher,
    scheduler: RetryScheduler,
    cache_worker: BackgroundWorker,
    network: NetworkStatusWriter,
    gate: SanitizationGate,
    snapshots: Mutex<Option<PeriodicCacher>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for DeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryService")
            .field("network", &self.network.get())
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DeliveryService {
    /// Validate `config`, open the store under `storage_dir`, reload the
    /// ledger and start the worker threads. Network status starts as
    /// `Unknown`.
    pub fn start(
        config: DeliveryConfig,
        storage_dir: &Path,
        transport: Arc<dyn Transport>,
        gating: Arc<dyn GatingConfigSource>,
    ) -> Result<Self> {
        validate_delivery_config(&config).map_err(|e| {
            tracing::error!(event = event_names::CONFIG_ERROR, error = %e, "invalid delivery config");
            DeliveryError::Config(e.to_string())
        })?;
        let cache = DeliveryCache::open(storage_dir)?;
        let ledger = Arc::new(PendingCallLedger::open(
            cache.clone(),
            config.queue_limits,
        )?);

        let (network, reader) = network_status_channel(NetworkStatus::Unknown);
        let coordinator = Arc::new(RetryCoordinator::new(Arc::clone(&ledger), reader.clone()));
        let retry_transport = Arc::clone(&transport);
        let handler: RetryHandler = Arc::new(move |destination: &Destination, payload: &[u8]| {
            retry_transport.execute_send(destination, payload)
        });
        coordinator.set_retry_handler(handler);

        let dispatcher = DeliveryDispatcher::new(transport, Arc::clone(&coordinator), reader)?;
        let scheduler = RetryScheduler::start(Arc::clone(&coordinator), config.retry)?;
        let cache_worker = BackgroundWorker::spawn(WorkerName::DeliveryCache)?;

        tracing::info!(
            event = event_names::SERVICE_STARTED,
            storage_dir = %storage_dir.display(),
            pending = ledger.len()?,
            crash_pending = cache.has_crash(),
            "delivery service started"
        );

        Ok(Self {
            config,
            cache,
            coordinator,
            dispatcher,
            scheduler,
            cache_worker,
            network,
            gate: SanitizationGate::new(gating),
            snapshots: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn cache(&self) -> &DeliveryCache {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<PendingCallLedger> {
        self.coordinator.ledger()
    }

    /// Queue `bytes` for immediate delivery to `destination`.
    pub fn submit_envelope(
        &self,
        kind: EndpointKind,
        bytes: Vec<u8>,
        destination: Destination,
    ) -> RequestId {
        self.dispatcher.send(Envelope::new(kind, destination, bytes))
    }

    /// Send and wait up to the configured await timeout.
    pub fn submit_and_await(&self, kind: EndpointKind, bytes: Vec<u8>) -> DeliveryOutcome {
        let envelope = Envelope::new(kind, self.config.destination_for(kind), bytes);
        self.dispatcher
            .send_and_await(envelope, self.config.timeouts.await_timeout())
    }

    /// Bounded-wait send that is never queued for retry.
    pub fn submit_critical(
        &self,
        bytes: Vec<u8>,
        destination: Destination,
        timeout: Duration,
    ) -> DeliveryOutcome {
        let envelope = Envelope::new(EndpointKind::Events, destination, bytes);
        self.dispatcher
            .send_critical(envelope, timeout, Completion::None)
    }

    pub fn submit_session(&self, message: &SessionMessage) -> Option<RequestId> {
        let gated = self.gate.gate_session(message);
        self.submit_serialized(EndpointKind::Sessions, &gated)
    }

    pub fn submit_event(&self, message: &EventMessage) -> Option<RequestId> {
        let gated = self.gate.gate_event(message);
        self.submit_serialized(EndpointKind::Events, &gated)
    }

    pub fn submit_log(&self, message: &EventMessage) -> Option<RequestId> {
        let gated = self.gate.gate_event(message);
        self.submit_serialized(EndpointKind::Logging, &gated)
    }

    fn submit_serialized<T: Serialize>(&self, kind: EndpointKind, payload: &T) -> Option<RequestId> {
        match serde_json::to_vec(payload) {
            Ok(bytes) => Some(self.submit_envelope(kind, bytes, self.config.destination_for(kind))),
            Err(e) => {
                tracing::error!(
                    event = event_names::PAYLOAD_SERIALIZE_FAILED,
                    kind = %kind,
                    error = %e,
                    "failed to serialize payload; dropping submission"
                );
                None
            }
        }
    }

    /// Persist a crash payload to the crash slot, then send it with a
    /// bounded wait. The slot is cleared only after confirmed delivery.
    pub fn submit_crash(&self, bytes: Vec<u8>) -> DeliveryOutcome {
        match self.cache.save_crash(&bytes) {
            Ok(()) => tracing::info!(
                event = event_names::CRASH_SAVED,
                bytes = bytes.len(),
                "crash payload saved"
            ),
            Err(e) => tracing::error!(
                event = event_names::STORAGE_ERROR,
                error = %e,
                "failed to save crash payload"
            ),
        }
        self.send_crash(bytes)
    }

    /// Re-send a crash payload left over from an earlier process.
    pub fn resend_cached_crash(&self) -> Option<DeliveryOutcome> {
        match self.cache.load_crash() {
            Ok(Some(bytes)) => Some(self.send_crash(bytes)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(
                    event = event_names::STORAGE_ERROR,
                    error = %e,
                    "failed to read cached crash"
                );
                None
            }
        }
    }

    fn send_crash(&self, bytes: Vec<u8>) -> DeliveryOutcome {
        let envelope = Envelope::new(
            EndpointKind::Events,
            self.config.destination_for(EndpointKind::Events),
            bytes,
        );
        let cache = self.cache.clone();
        let cleanup = Completion::on_success(move || match cache.delete_crash() {
            Ok(_) => tracing::info!(event = event_names::CRASH_DELIVERED, "crash delivered"),
            Err(e) => tracing::error!(
                event = event_names::STORAGE_ERROR,
                error = %e,
                "failed to clear crash slot"
            ),
        });
        self.dispatcher
            .send_critical(envelope, self.config.timeouts.critical_timeout(), cleanup)
    }

    /// Write a session snapshot on the `delivery-cache` worker.
    pub fn cache_session_async(&self, session_id: impl Into<String>, bytes: Vec<u8>) {
        let session_id = session_id.into();
        let cache = self.cache.clone();
        let job_id = session_id.clone();
        let queued = self.cache_worker.execute(move || {
            if let Err(e) = cache.save_session(&job_id, &bytes) {
                tracing::warn!(
                    event = event_names::SNAPSHOT_FAILED,
                    session_id = %job_id,
                    error = %e,
                    "failed to cache session"
                );
            }
        });
        if let Err(e) = queued {
            tracing::warn!(session_id = %session_id, error = %e, "session cache worker unavailable");
        }
    }

    /// Send every cached session except `current`. Each cached copy is
    /// deleted once its send finishes, whatever the outcome; a failed send
    /// has already been moved to the ledger by then.
    pub fn send_cached_sessions(&self, current: Option<&str>) -> Result<usize> {
        let mut sent = 0;
        for session_id in self.cache.cached_session_ids()? {
            if Some(session_id.as_str()) == current {
                continue;
            }
            let Some(bytes) = self.cache.load_session(&session_id)? else {
                continue;
            };
            let cache = self.cache.clone();
            let id = session_id.clone();
            let cleanup = Completion::always(move || {
                if let Err(e) = cache.delete_session(&id) {
                    tracing::error!(
                        event = event_names::STORAGE_ERROR,
                        session_id = %id,
                        error = %e,
                        "failed to delete cached session"
                    );
                }
            });
            let envelope = Envelope::new(
                EndpointKind::Sessions,
                self.config.destination_for(EndpointKind::Sessions),
                bytes,
            );
            self.dispatcher.send_with_completion(envelope, cleanup);
            tracing::debug!(
                event = event_names::SESSION_CACHED_SENT,
                session_id = %session_id,
                "sending cached session"
            );
            sent += 1;
        }
        Ok(sent)
    }

    /// Start (or restart) periodic session snapshots.
    pub fn start_periodic_caching(&self, provider: SnapshotProvider) -> Result<()> {
        let cacher = PeriodicCacher::start(
            self.cache.clone(),
            self.config.snapshot_interval(),
            provider,
        )?;
        let previous = self.lock_snapshots()?.replace(cacher);
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(())
    }

    pub fn stop_periodic_caching(&self) -> Result<()> {
        let current = self.lock_snapshots()?.take();
        if let Some(current) = current {
            current.stop();
        }
        Ok(())
    }

    fn lock_snapshots(&self) -> Result<std::sync::MutexGuard<'_, Option<PeriodicCacher>>> {
        self.snapshots
            .lock()
            .map_err(|e| DeliveryError::LockPoisoned(format!("snapshots: {}", e)))
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network.get()
    }

    /// Run a drain on the calling thread.
    pub fn drain_now(&self) -> Result<DrainReport> {
        self.coordinator.drain_ready()
    }

    pub fn pending_summary(&self) -> Result<PendingSummary> {
        PendingSummary::collect(self.ledger())
    }

    /// Stop every worker. Sends already queued on the dispatcher finish
    /// first; a drain in progress stops after its current attempt.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.stop_periodic_caching() {
            tracing::warn!(error = %e, "failed to stop snapshots");
        }
        if let Err(e) = self.dispatcher.shutdown() {
            tracing::warn!(error = %e, "dispatcher did not stop cleanly");
        }
        if let Err(e) = self.cache_worker.close() {
            tracing::warn!(error = %e, "session cache worker did not stop cleanly");
        }
        self.scheduler.shutdown();

        let pending = self.ledger().len().unwrap_or_default();
        tracing::info!(
            event = event_names::SERVICE_SHUTDOWN,
            pending,
            "delivery service stopped"
        );
    }
}

impl ConnectivityListener for DeliveryService {
    fn on_network_status_changed(&self, status: NetworkStatus) {
        let previous = self.network.set(status);
        if previous == status {
            return;
        }
        tracing::info!(
            event = event_names::NETWORK_STATUS_CHANGED,
            from = %previous,
            to = %status,
            "network status changed"
        );
        if status == NetworkStatus::Reachable {
            self.scheduler.trigger();
        }
    }
}

impl Drop for DeliveryService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
