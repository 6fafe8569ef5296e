//! Retry coordination.
//!
//! [`RetryCoordinator`] turns a failed send into a durable pending call and
//! later re-drives the ledger through a registered [`RetryHandler`].
//! [`RetryScheduler`] owns the `retry` thread that decides when a drain runs.
//!
//! A call leaves the ledger only after its retry succeeded, its payload
//! vanished, or newer calls of its kind evicted it. An interrupted drain
//! leaves everything it had not confirmed in place for the next cycle or the
//! next process start.

use courier_common::{Destination, Envelope, NetworkStatusReader, Result};
use courier_config::RetryConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, RwLock, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::ledger::{PendingCall, PendingCallLedger};
use crate::logging::event_names;
use crate::transport::ApiResponse;
use crate::worker::{WorkerError, WorkerName};

/// Performs the network attempt for a queued call.
pub type RetryHandler = Arc<dyn Fn(&Destination, &[u8]) -> ApiResponse + Send + Sync>;

/// Summary of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Failed attempts; the calls stay in the ledger.
    pub failed: usize,
    /// Calls removed because their payload was missing.
    pub dropped: usize,
    /// Another drain was already running.
    pub skipped: bool,
    pub remaining: usize,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct RetryCoordinator {
    ledger: Arc<PendingCallLedger>,
    network: NetworkStatusReader,
    handler: RwLock<Option<RetryHandler>>,
    drain_guard: Mutex<()>,
    shutdown: AtomicBool,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("network", &self.network.get())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl RetryCoordinator {
    pub fn new(ledger: Arc<PendingCallLedger>, network: NetworkStatusReader) -> Self {
        Self {
            ledger,
            network,
            handler: RwLock::new(None),
            drain_guard: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn ledger(&self) -> &Arc<PendingCallLedger> {
        &self.ledger
    }

    pub fn set_retry_handler(&self, handler: RetryHandler) {
        match self.handler.write() {
            Ok(mut slot) => *slot = Some(handler),
            Err(poisoned) => *poisoned.into_inner() = Some(handler),
        }
    }

    /// Persist `envelope` and queue it for a later attempt.
    ///
    /// Returns `false` when a call with the same request id is already
    /// queued. The payload is committed before the ledger references it; if
    /// the ledger update fails the payload is removed again.
    pub fn schedule_for_retry(&self, envelope: &Envelope) -> Result<bool> {
        if self.ledger.contains(envelope.request_id())? {
            tracing::debug!(
                event = event_names::RETRY_SCHEDULED,
                request_id = %envelope.request_id(),
                "already pending"
            );
            return Ok(false);
        }

        let payload_key = self.ledger.cache().save_payload(envelope.payload())?;
        let call = PendingCall::for_envelope(envelope, payload_key.clone());
        if let Err(e) = self.ledger.add(call) {
            if let Err(cleanup) = self.ledger.cache().delete_payload(&payload_key) {
                tracing::error!(
                    event = event_names::STORAGE_ERROR,
                    payload_key = %payload_key,
                    error = %cleanup,
                    "failed to remove payload of unqueued call"
                );
            }
            return Err(e);
        }

        tracing::info!(
            event = event_names::RETRY_SCHEDULED,
            request_id = %envelope.request_id(),
            kind = %envelope.kind(),
            bytes = envelope.len(),
            "scheduled for retry"
        );
        Ok(true)
    }

    /// Re-attempt queued calls in retrieval order while the network allows.
    ///
    /// Each call is attempted at most once per drain. The next call is picked
    /// from the live ledger before every attempt, so calls queued during the
    /// drain still go out in priority order.
    pub fn drain_ready(&self) -> Result<DrainReport> {
        let _guard = match self.drain_guard.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(DrainReport::skipped()),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let handler = match self.handler.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let mut report = DrainReport::default();
        let Some(handler) = handler else {
            tracing::debug!("no retry handler registered; skipping drain");
            report.remaining = self.ledger.len()?;
            return Ok(report);
        };

        tracing::debug!(
            event = event_names::RETRY_DRAIN_STARTED,
            pending = self.ledger.len()?,
            network = %self.network.get(),
            "retry drain started"
        );

        let mut tried = HashSet::new();
        while let Some(call) = self.ledger.peek_next(&tried)? {
            if self.is_shutdown() {
                break;
            }
            if !self.network.get().may_attempt() {
                tracing::debug!("network not reachable; stopping drain");
                break;
            }
            tried.insert(call.request_id.clone());

            let payload = match self.ledger.load_payload(&call) {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    tracing::warn!(
                        event = event_names::LEDGER_MISSING_PAYLOAD,
                        request_id = %call.request_id,
                        "payload vanished; dropping pending call"
                    );
                    self.ledger.remove(&call.request_id)?;
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        event = event_names::STORAGE_ERROR,
                        request_id = %call.request_id,
                        error = %e,
                        "failed to read pending payload"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            report.attempted += 1;
            let response = handler(&call.destination, &payload);
            if response.is_success() {
                self.ledger.remove(&call.request_id)?;
                report.delivered += 1;
                tracing::debug!(
                    event = event_names::RETRY_DELIVERED,
                    request_id = %call.request_id,
                    kind = %call.kind,
                    "queued call delivered"
                );
            } else {
                report.failed += 1;
                tracing::debug!(
                    event = event_names::RETRY_DEFERRED,
                    request_id = %call.request_id,
                    response = %response,
                    "retry failed; keeping call"
                );
                if response.is_transport_failure() {
                    // The rest would fail the same way.
                    break;
                }
            }
        }

        report.remaining = self.ledger.len()?;
        tracing::info!(
            event = event_names::RETRY_DRAIN_FINISHED,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            dropped = report.dropped,
            remaining = report.remaining,
            "retry drain finished"
        );
        Ok(report)
    }

    /// Stop any running drain after its current attempt.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

enum RetrySignal {
    Trigger,
    Shutdown,
}

/// Drives [`RetryCoordinator::drain_ready`] from the `retry` thread.
///
/// The thread sleeps for the current backoff delay, or until triggered. A
/// drain with failures doubles the delay up to the configured maximum; a
/// clean drain resets it.
#[derive(Debug)]
pub struct RetryScheduler {
    coordinator: Arc<RetryCoordinator>,
    tx: Mutex<Option<mpsc::Sender<RetrySignal>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetryScheduler {
    pub fn start(coordinator: Arc<RetryCoordinator>, config: RetryConfig) -> std::result::Result<Self, WorkerError> {
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(&coordinator);
        let handle = thread::Builder::new()
            .name(WorkerName::Retry.as_str().to_string())
            .spawn(move || run_retry_loop(&worker, &config, &rx))
            .map_err(|source| WorkerError::SpawnFailed {
                name: WorkerName::Retry,
                source,
            })?;

        Ok(Self {
            coordinator,
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Run a drain as soon as the thread is free.
    pub fn trigger(&self) {
        self.send(RetrySignal::Trigger);
    }

    /// Stop the thread. A drain in progress stops after its current attempt.
    pub fn shutdown(&self) {
        self.coordinator.request_shutdown();
        self.send(RetrySignal::Shutdown);
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }

        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!(event = event_names::INTERNAL_ERROR, "retry thread panicked");
            }
        }
    }

    fn send(&self, signal: RetrySignal) {
        if let Ok(tx) = self.tx.lock() {
            if let Some(tx) = tx.as_ref() {
                let _ = tx.send(signal);
            }
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_retry_loop(
    coordinator: &RetryCoordinator,
    config: &RetryConfig,
    rx: &mpsc::Receiver<RetrySignal>,
) {
    let mut delay = config.initial_delay();
    loop {
        match rx.recv_timeout(delay) {
            Ok(RetrySignal::Trigger) | Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(RetrySignal::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        // Coalesce triggers that piled up while we slept.
        loop {
            match rx.try_recv() {
                Ok(RetrySignal::Trigger) => continue,
                Ok(RetrySignal::Shutdown) | Err(mpsc::TryRecvError::Disconnected) => return,
                Err(mpsc::TryRecvError::Empty) => break,
            }
        }
        if coordinator.is_shutdown() {
            break;
        }

        delay = match coordinator.drain_ready() {
            Ok(report) if report.skipped => delay,
            Ok(report) if report.failed > 0 => backoff(config, delay),
            Ok(_) => config.initial_delay(),
            Err(e) => {
                tracing::error!(
                    event = event_names::INTERNAL_ERROR,
                    error = %e,
                    "retry drain failed"
                );
                backoff(config, delay)
            }
        };
    }
    tracing::debug!("retry thread stopped");
}

fn backoff(config: &RetryConfig, current: Duration) -> Duration {
    let next = config.next_delay(current);
    tracing::debug!(
        event = event_names::RETRY_BACKOFF,
        delay_secs = next.as_secs(),
        "backing off"
    );
    next
}
