//! Immediate delivery.
//!
//! [`DeliveryDispatcher`] runs every send on the `network-request` worker.
//! The network status is checked first: a definite `NotReachable` skips the
//! attempt and goes straight to the retry ledger. Otherwise the envelope is
//! sent once, and any failure is persisted through
//! [`RetryCoordinator::schedule_for_retry`] before the job finishes.

use courier_common::{Envelope, NetworkStatusReader, RequestId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::logging::event_names;
use crate::retry::RetryCoordinator;
use crate::transport::{ApiResponse, Transport};
use crate::worker::{BackgroundWorker, WorkerError, WorkerName};

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Work to run once a send has finished.
#[derive(Default)]
pub enum Completion {
    #[default]
    None,
    /// Runs whatever the outcome.
    Always(Callback),
    /// Runs only after a confirmed delivery.
    OnSuccess(Callback),
}

impl Completion {
    pub fn always(f: impl FnOnce() + Send + 'static) -> Self {
        Completion::Always(Box::new(f))
    }

    pub fn on_success(f: impl FnOnce() + Send + 'static) -> Self {
        Completion::OnSuccess(Box::new(f))
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::None => write!(f, "None"),
            Completion::Always(_) => write!(f, "Always(..)"),
            Completion::OnSuccess(_) => write!(f, "OnSuccess(..)"),
        }
    }
}

/// Fires the completion when dropped, including on unwind.
struct CompletionGuard {
    completion: Completion,
    delivered: bool,
}

impl CompletionGuard {
    fn new(completion: Completion) -> Self {
        Self {
            completion,
            delivered: false,
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        match std::mem::take(&mut self.completion) {
            Completion::Always(f) => f(),
            Completion::OnSuccess(f) if self.delivered => f(),
            Completion::OnSuccess(_) | Completion::None => {}
        }
    }
}

/// Why an envelope went to the retry ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueReason {
    NetworkUnavailable,
    /// The attempt failed: a non-2xx status or no response at all.
    SendFailed { status: Option<u16>, detail: String },
    WorkerClosed,
}

/// Why an envelope was neither delivered nor queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    /// The send failed and the caller asked for no retry.
    NotRetried { detail: String },
    /// Persisting for retry failed.
    Storage { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { status: u16 },
    Queued { reason: QueueReason },
    Dropped { reason: DropReason },
    /// A blocking caller stopped waiting; the send continues in the background.
    TimedOut,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, DeliveryOutcome::Queued { .. })
    }
}

struct DispatchCore {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RetryCoordinator>,
    network: NetworkStatusReader,
}

impl DispatchCore {
    fn deliver(&self, envelope: &Envelope, retry_on_failure: bool) -> DeliveryOutcome {
        let network = self.network.get();
        if !network.may_attempt() {
            if !retry_on_failure {
                return not_retried(envelope, "network not reachable".to_string());
            }
            return self.queue(envelope, QueueReason::NetworkUnavailable);
        }

        let response = self
            .transport
            .execute_send(envelope.destination(), envelope.payload());
        match &response {
            ApiResponse::Success { status } => {
                tracing::info!(
                    event = event_names::DELIVERY_SENT,
                    request_id = %envelope.request_id(),
                    kind = %envelope.kind(),
                    status,
                    bytes = envelope.len(),
                    "delivered"
                );
                DeliveryOutcome::Delivered { status: *status }
            }
            _ => {
                tracing::warn!(
                    event = event_names::DELIVERY_QUEUED,
                    request_id = %envelope.request_id(),
                    kind = %envelope.kind(),
                    response = %response,
                    "send failed"
                );
                if retry_on_failure {
                    self.queue(
                        envelope,
                        QueueReason::SendFailed {
                            status: response.status(),
                            detail: response.to_string(),
                        },
                    )
                } else {
                    not_retried(envelope, response.to_string())
                }
            }
        }
    }

    fn queue(&self, envelope: &Envelope, reason: QueueReason) -> DeliveryOutcome {
        match self.coordinator.schedule_for_retry(envelope) {
            Ok(_) => DeliveryOutcome::Queued { reason },
            Err(e) => {
                tracing::error!(
                    event = event_names::STORAGE_ERROR,
                    request_id = %envelope.request_id(),
                    error = %e,
                    "failed to persist envelope for retry"
                );
                DeliveryOutcome::Dropped {
                    reason: DropReason::Storage {
                        message: e.to_string(),
                    },
                }
            }
        }
    }
}

fn not_retried(envelope: &Envelope, detail: String) -> DeliveryOutcome {
    tracing::warn!(
        event = event_names::DELIVERY_DROPPED,
        request_id = %envelope.request_id(),
        kind = %envelope.kind(),
        detail = %detail,
        "send failed; not retried"
    );
    DeliveryOutcome::Dropped {
        reason: DropReason::NotRetried { detail },
    }
}

pub struct DeliveryDispatcher {
    core: Arc<DispatchCore>,
    worker: BackgroundWorker,
}

impl fmt::Debug for DeliveryDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryDispatcher")
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl DeliveryDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        coordinator: Arc<RetryCoordinator>,
        network: NetworkStatusReader,
    ) -> Result<Self, WorkerError> {
        Ok(Self {
            core: Arc::new(DispatchCore {
                transport,
                coordinator,
                network,
            }),
            worker: BackgroundWorker::spawn(WorkerName::NetworkRequest)?,
        })
    }

    /// Fire-and-forget send. Failures are queued for retry and logged.
    pub fn send(&self, envelope: Envelope) -> RequestId {
        self.send_with_completion(envelope, Completion::None)
    }

    pub fn send_with_completion(&self, envelope: Envelope, completion: Completion) -> RequestId {
        let request_id = envelope.request_id().clone();
        let core = Arc::clone(&self.core);
        let job_envelope = envelope.clone();
        let mut guard = CompletionGuard::new(completion);
        let queued = self.worker.execute(move || {
            guard.delivered = core.deliver(&job_envelope, true).is_delivered();
            drop(guard);
        });
        if let Err(e) = queued {
            tracing::warn!(error = %e, request_id = %request_id, "dispatch worker unavailable");
            self.core.queue(&envelope, QueueReason::WorkerClosed);
        }
        request_id
    }

    /// Send and block up to `timeout` for the outcome. On timeout the send
    /// keeps running and its failure path still queues the envelope.
    pub fn send_and_await(&self, envelope: Envelope, timeout: Duration) -> DeliveryOutcome {
        let core = Arc::clone(&self.core);
        let job_envelope = envelope.clone();
        let handle = match self
            .worker
            .submit(move || core.deliver(&job_envelope, true))
        {
            Ok(handle) => handle,
            Err(_) => return self.core.queue(&envelope, QueueReason::WorkerClosed),
        };
        match handle.wait(timeout) {
            Ok(outcome) => outcome,
            Err(WorkerError::Timeout { millis, .. }) => {
                tracing::warn!(
                    event = event_names::DELIVERY_TIMED_OUT,
                    request_id = %envelope.request_id(),
                    millis,
                    "gave up waiting for delivery"
                );
                DeliveryOutcome::TimedOut
            }
            Err(e) => {
                tracing::error!(
                    event = event_names::INTERNAL_ERROR,
                    request_id = %envelope.request_id(),
                    error = %e,
                    "delivery task ended without an outcome"
                );
                self.core.queue(&envelope, QueueReason::WorkerClosed)
            }
        }
    }

    /// Bounded-wait send for payloads that already have their own durable
    /// copy (the crash slot). Failures are not queued for retry; the copy is
    /// re-sent on the next start instead. `on_success` runs only after a
    /// confirmed delivery, even if that happens after the wait timed out.
    pub fn send_critical(
        &self,
        envelope: Envelope,
        timeout: Duration,
        on_success: Completion,
    ) -> DeliveryOutcome {
        let core = Arc::clone(&self.core);
        let job_envelope = envelope.clone();
        let mut guard = CompletionGuard::new(on_success);
        let handle = match self.worker.submit(move || {
            let outcome = core.deliver(&job_envelope, false);
            guard.delivered = outcome.is_delivered();
            drop(guard);
            outcome
        }) {
            Ok(handle) => handle,
            Err(e) => return not_retried(&envelope, e.to_string()),
        };
        match handle.wait(timeout) {
            Ok(outcome) => outcome,
            Err(WorkerError::Timeout { millis, .. }) => {
                tracing::warn!(
                    event = event_names::DELIVERY_TIMED_OUT,
                    request_id = %envelope.request_id(),
                    millis,
                    "critical send timed out"
                );
                DeliveryOutcome::TimedOut
            }
            Err(e) => not_retried(&envelope, e.to_string()),
        }
    }

    /// Finish queued sends and stop the worker.
    pub fn shutdown(&self) -> Result<(), WorkerError> {
        self.worker.close()
    }
}
