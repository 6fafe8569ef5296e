//! Named single-threaded background workers.
//!
//! Each worker is one OS thread draining a FIFO job channel. Jobs queued
//! before [`BackgroundWorker::close`] still run; `close` then joins the
//! thread. A panicking job is logged and does not take the worker down.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker thread names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    /// Immediate delivery attempts.
    NetworkRequest,
    /// Asynchronous session caching.
    DeliveryCache,
    /// Retry drive loop.
    Retry,
    /// Periodic session snapshots.
    PeriodicCache,
}

impl WorkerName {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerName::NetworkRequest => "network-request",
            WorkerName::DeliveryCache => "delivery-cache",
            WorkerName::Retry => "retry",
            WorkerName::PeriodicCache => "periodic-cache",
        }
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to spawn worker {name}: {source}")]
    SpawnFailed {
        name: WorkerName,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {0} is closed")]
    Closed(WorkerName),

    #[error("timed out after {millis}ms waiting on worker {name}")]
    Timeout { name: WorkerName, millis: u64 },

    #[error("task on worker {0} ended without a result")]
    Disconnected(WorkerName),

    #[error("worker {0} state lock poisoned")]
    LockPoisoned(WorkerName),
}

impl From<WorkerError> for courier_common::DeliveryError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Timeout { millis, .. } => courier_common::DeliveryError::Timeout { millis },
            WorkerError::Closed(name) => courier_common::DeliveryError::WorkerClosed(name.to_string()),
            other => courier_common::DeliveryError::WorkerClosed(other.to_string()),
        }
    }
}

pub struct BackgroundWorker {
    name: WorkerName,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BackgroundWorker {
    pub fn spawn(name: WorkerName) -> Result<Self, WorkerError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.as_str().to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!(
                            event = "worker.job_panicked",
                            worker = name.as_str(),
                            "background job panicked"
                        );
                    }
                }
                tracing::debug!(event = "worker.stopped", worker = name.as_str(), "worker stopped");
            })
            .map_err(|source| WorkerError::SpawnFailed { name, source })?;

        Ok(Self {
            name,
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> WorkerName {
        self.name
    }

    /// Queue a fire-and-forget job.
    pub fn execute<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .map_err(|_| WorkerError::LockPoisoned(self.name))?;
        match sender.as_ref() {
            Some(tx) => tx
                .send(Box::new(job))
                .map_err(|_| WorkerError::Closed(self.name)),
            None => Err(WorkerError::Closed(self.name)),
        }
    }

    /// Queue a job whose result can be waited on.
    pub fn submit<F, T>(&self, job: F) -> Result<TaskHandle<T>, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.execute(move || {
            let _ = tx.send(job());
        })?;
        Ok(TaskHandle {
            worker: self.name,
            rx,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().map(|s| s.is_none()).unwrap_or(true)
    }

    /// Stop accepting jobs, run the ones already queued and join the thread.
    /// Calling it again is a no-op.
    pub fn close(&self) -> Result<(), WorkerError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| WorkerError::LockPoisoned(self.name))?
            .take();
        drop(sender);

        let handle = self
            .handle
            .lock()
            .map_err(|_| WorkerError::LockPoisoned(self.name))?
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Closing from one of our own jobs; the thread exits once the
                // queue drains.
                return Ok(());
            }
            if handle.join().is_err() {
                return Err(WorkerError::Disconnected(self.name));
            }
        }
        Ok(())
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Result handle for a job queued with [`BackgroundWorker::submit`].
#[derive(Debug)]
pub struct TaskHandle<T> {
    worker: WorkerName,
    rx: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block up to `timeout` for the result. The job keeps running on the
    /// worker if this times out.
    pub fn wait(self, timeout: Duration) -> Result<T, WorkerError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => WorkerError::Timeout {
                name: self.worker,
                millis: timeout.as_millis() as u64,
            },
            mpsc::RecvTimeoutError::Disconnected => WorkerError::Disconnected(self.worker),
        })
    }

    /// Block until the job finishes.
    pub fn join(self) -> Result<T, WorkerError> {
        self.rx
            .recv()
            .map_err(|_| WorkerError::Disconnected(self.worker))
    }
}
