//! Pending-call ledger.
//!
//! [`PendingCalls`] is the in-memory structure: one bounded FIFO per
//! endpoint kind, retrieved in [`EndpointKind::PRIORITY`] order.
//! [`PendingCallLedger`] wraps it with locking and keeps it in step with the
//! cache store: every call references a committed payload blob, and the
//! ordered index is rewritten after each mutation.
//!
//! A mutation is applied to a copy of the queues and installed only after
//! the copy's index is on disk, so a failed index write leaves memory and
//! disk as they were.
//!
//! Crash consistency relies on write order. Blobs are committed before the
//! index references them and the index drops a call before its blob is
//! deleted, so after a crash the only possible drift is an unreferenced
//! blob or a call whose blob is gone. [`PendingCallLedger::open`] repairs
//! both.

use chrono::{DateTime, Utc};
use courier_common::{DeliveryError, Destination, EndpointKind, Envelope, RequestId, Result};
use courier_config::QueueLimits;
use courier_store::DeliveryCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Mutex;

use crate::logging::event_names;

/// Schema version of the persisted ledger index.
pub const LEDGER_SCHEMA_VERSION: &str = "1.0.0";

/// A queued request whose body lives in the cache under `payload_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCall {
    pub request_id: RequestId,
    pub kind: EndpointKind,
    pub destination: Destination,
    pub payload_key: String,
    pub queued_at: DateTime<Utc>,
}

impl PendingCall {
    pub fn for_envelope(envelope: &Envelope, payload_key: impl Into<String>) -> Self {
        Self {
            request_id: envelope.request_id().clone(),
            kind: envelope.kind(),
            destination: envelope.destination().clone(),
            payload_key: payload_key.into(),
            queued_at: Utc::now(),
        }
    }
}

/// Persisted form of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerIndex {
    pub schema_version: String,
    pub generation: u64,
    pub written_at: DateTime<Utc>,
    /// Calls per kind, oldest first.
    pub queues: BTreeMap<EndpointKind, Vec<PendingCall>>,
}

/// Bounded per-kind queues.
#[derive(Debug, Clone)]
pub struct PendingCalls {
    queues: BTreeMap<EndpointKind, VecDeque<PendingCall>>,
    limits: QueueLimits,
}

impl PendingCalls {
    pub fn new(limits: QueueLimits) -> Self {
        let queues = EndpointKind::PRIORITY
            .into_iter()
            .map(|kind| (kind, VecDeque::new()))
            .collect();
        Self { queues, limits }
    }

    pub fn limits(&self) -> &QueueLimits {
        &self.limits
    }

    /// Append `call` to its kind's queue. If the queue is full the oldest
    /// entries are evicted first and returned.
    pub fn add(&mut self, call: PendingCall) -> Vec<PendingCall> {
        let limit = self.limits.limit_for(call.kind).max(1);
        let queue = self.queues.entry(call.kind).or_default();
        let mut evicted = Vec::new();
        while queue.len() >= limit {
            if let Some(oldest) = queue.pop_front() {
                evicted.push(oldest);
            }
        }
        queue.push_back(call);
        evicted
    }

    /// Remove and return the next call in retrieval order.
    pub fn poll_next(&mut self) -> Option<PendingCall> {
        EndpointKind::PRIORITY
            .iter()
            .find_map(|kind| self.queues.get_mut(kind).and_then(VecDeque::pop_front))
    }

    /// First call in retrieval order whose id is not in `skip`.
    pub fn peek_next(&self, skip: &HashSet<RequestId>) -> Option<&PendingCall> {
        EndpointKind::PRIORITY
            .iter()
            .filter_map(|kind| self.queues.get(kind))
            .flat_map(|q| q.iter())
            .find(|c| !skip.contains(&c.request_id))
    }

    pub fn has_any(&self) -> bool {
        self.queues.values().any(|q| !q.is_empty())
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_any()
    }

    pub fn len_for(&self, kind: EndpointKind) -> usize {
        self.queues.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.queues
            .values()
            .any(|q| q.iter().any(|c| &c.request_id == request_id))
    }

    pub fn remove(&mut self, request_id: &RequestId) -> Option<PendingCall> {
        for queue in self.queues.values_mut() {
            if let Some(pos) = queue.iter().position(|c| &c.request_id == request_id) {
                return queue.remove(pos);
            }
        }
        None
    }

    /// Drain one kind's queue.
    pub fn take_kind(&mut self, kind: EndpointKind) -> Vec<PendingCall> {
        self.queues
            .get_mut(&kind)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Every call, in retrieval order.
    pub fn ordered(&self) -> Vec<PendingCall> {
        EndpointKind::PRIORITY
            .iter()
            .filter_map(|kind| self.queues.get(kind))
            .flat_map(|q| q.iter().cloned())
            .collect()
    }

    pub fn counts(&self) -> BTreeMap<EndpointKind, usize> {
        EndpointKind::PRIORITY
            .into_iter()
            .map(|kind| (kind, self.len_for(kind)))
            .collect()
    }

    pub fn to_index(&self, generation: u64) -> LedgerIndex {
        LedgerIndex {
            schema_version: LEDGER_SCHEMA_VERSION.to_string(),
            generation,
            written_at: Utc::now(),
            queues: self
                .queues
                .iter()
                .filter(|(_, q)| !q.is_empty())
                .map(|(kind, q)| (*kind, q.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Rebuild from an index, preserving order. Calls beyond the current
    /// limits are evicted oldest-first and returned.
    pub fn from_index(index: LedgerIndex, limits: QueueLimits) -> (Self, Vec<PendingCall>) {
        let mut calls = Self::new(limits);
        let mut evicted = Vec::new();
        for kind in EndpointKind::PRIORITY {
            for call in index.queues.get(&kind).into_iter().flatten() {
                if call.kind != kind {
                    continue;
                }
                evicted.extend(calls.add(call.clone()));
            }
        }
        (calls, evicted)
    }
}

#[derive(Debug)]
struct LedgerState {
    calls: PendingCalls,
    generation: u64,
}

/// Thread-safe ledger backed by a [`DeliveryCache`].
#[derive(Debug)]
pub struct PendingCallLedger {
    cache: DeliveryCache,
    state: Mutex<LedgerState>,
}

impl PendingCallLedger {
    /// Load the persisted index and reconcile it with the stored blobs.
    pub fn open(cache: DeliveryCache, limits: QueueLimits) -> Result<Self> {
        let mut dirty = false;
        let index = match cache.load_pending_index::<LedgerIndex>() {
            Ok(index) => index,
            Err(courier_store::StoreError::Json { key, source }) => {
                tracing::error!(
                    event = event_names::LEDGER_INDEX_CORRUPT,
                    key = %key,
                    error = %source,
                    "ledger index unreadable; starting empty"
                );
                dirty = true;
                None
            }
            Err(e) => return Err(e.into()),
        };

        let generation = index.as_ref().map_or(0, |i| i.generation);
        let (mut calls, evicted) = match index {
            Some(index) => PendingCalls::from_index(index, limits),
            None => (PendingCalls::new(limits), Vec::new()),
        };

        dirty |= !evicted.is_empty();
        for call in &evicted {
            log_eviction(call);
            delete_blob(&cache, &call.payload_key);
        }

        for call in calls.ordered() {
            if !cache.store().contains(&call.payload_key) {
                tracing::warn!(
                    event = event_names::LEDGER_MISSING_PAYLOAD,
                    request_id = %call.request_id,
                    kind = %call.kind,
                    payload_key = %call.payload_key,
                    "dropping pending call with missing payload"
                );
                calls.remove(&call.request_id);
                dirty = true;
            }
        }

        let referenced: BTreeSet<String> =
            calls.ordered().into_iter().map(|c| c.payload_key).collect();
        for name in cache.payload_names()? {
            if !referenced.contains(&name) {
                tracing::info!(
                    event = event_names::LEDGER_ORPHAN_REMOVED,
                    payload_key = %name,
                    "removing unreferenced payload"
                );
                delete_blob(&cache, &name);
            }
        }

        tracing::info!(
            event = event_names::LEDGER_LOADED,
            pending = calls.len(),
            generation,
            "pending-call ledger loaded"
        );

        let generation = if dirty {
            write_index(&cache, &calls.to_index(generation + 1))?;
            generation + 1
        } else {
            generation
        };
        Ok(Self {
            cache,
            state: Mutex::new(LedgerState { calls, generation }),
        })
    }

    pub fn cache(&self) -> &DeliveryCache {
        &self.cache
    }

    /// Add a call whose payload is already committed. Evicted calls have
    /// their payloads deleted.
    pub fn add(&self, call: PendingCall) -> Result<()> {
        let evicted = self.commit(|calls| calls.add(call), |_| true)?;
        for old in &evicted {
            log_eviction(old);
            delete_blob(&self.cache, &old.payload_key);
        }
        Ok(())
    }

    /// Remove and return the next call in retrieval order. Its payload stays
    /// in the cache; the caller takes ownership of it.
    pub fn poll_next(&self) -> Result<Option<PendingCall>> {
        self.commit(PendingCalls::poll_next, Option::is_some)
    }

    /// Remove a call and delete its payload.
    pub fn remove(&self, request_id: &RequestId) -> Result<Option<PendingCall>> {
        let call = self.commit(|calls| calls.remove(request_id), Option::is_some)?;
        if let Some(call) = &call {
            delete_blob(&self.cache, &call.payload_key);
        }
        Ok(call)
    }

    /// Remove every call of `kind` (or all kinds) and their payloads.
    pub fn purge(&self, kind: Option<EndpointKind>) -> Result<usize> {
        let removed = self.commit(
            |calls| match kind {
                Some(kind) => calls.take_kind(kind),
                None => EndpointKind::PRIORITY
                    .into_iter()
                    .flat_map(|k| calls.take_kind(k))
                    .collect::<Vec<_>>(),
            },
            |removed| !removed.is_empty(),
        )?;
        for call in &removed {
            delete_blob(&self.cache, &call.payload_key);
        }
        Ok(removed.len())
    }

    pub fn load_payload(&self, call: &PendingCall) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.load_payload(&call.payload_key)?)
    }

    /// Next call in retrieval order not in `skip`, left in place.
    pub fn peek_next(&self, skip: &HashSet<RequestId>) -> Result<Option<PendingCall>> {
        self.read(|calls| calls.peek_next(skip).cloned())
    }

    pub fn has_any(&self) -> Result<bool> {
        self.read(PendingCalls::has_any)
    }

    pub fn len(&self) -> Result<usize> {
        self.read(PendingCalls::len)
    }

    pub fn contains(&self, request_id: &RequestId) -> Result<bool> {
        self.read(|calls| calls.contains(request_id))
    }

    /// Calls in retrieval order.
    pub fn snapshot(&self) -> Result<Vec<PendingCall>> {
        self.read(PendingCalls::ordered)
    }

    pub fn counts(&self) -> Result<BTreeMap<EndpointKind, usize>> {
        self.read(PendingCalls::counts)
    }

    fn read<T>(&self, f: impl FnOnce(&PendingCalls) -> T) -> Result<T> {
        let state = self
            .state
            .lock()
            .map_err(|e| DeliveryError::LockPoisoned(format!("ledger: {}", e)))?;
        Ok(f(&state.calls))
    }

    /// Apply `f` to a copy of the calls. When `changed` holds for its result
    /// the copy's index is written, and the copy replaces the live calls only
    /// if that write succeeded.
    fn commit<T>(
        &self,
        f: impl FnOnce(&mut PendingCalls) -> T,
        changed: impl FnOnce(&T) -> bool,
    ) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| DeliveryError::LockPoisoned(format!("ledger: {}", e)))?;
        let mut next = state.calls.clone();
        let out = f(&mut next);
        if !changed(&out) {
            return Ok(out);
        }
        let generation = state.generation + 1;
        write_index(&self.cache, &next.to_index(generation))?;
        state.calls = next;
        state.generation = generation;
        Ok(out)
    }
}

fn write_index(cache: &DeliveryCache, index: &LedgerIndex) -> Result<()> {
    cache.save_pending_index(index).map_err(|e| {
        tracing::error!(
            event = event_names::STORAGE_ERROR,
            generation = index.generation,
            error = %e,
            "failed to write ledger index"
        );
        DeliveryError::from(e)
    })
}

fn log_eviction(call: &PendingCall) {
    tracing::debug!(
        event = event_names::LEDGER_EVICTED,
        request_id = %call.request_id,
        kind = %call.kind,
        "ledger at capacity; evicted oldest pending call"
    );
}

fn delete_blob(cache: &DeliveryCache, key: &str) {
    if let Err(e) = cache.delete_payload(key) {
        tracing::error!(
            event = event_names::STORAGE_ERROR,
            payload_key = key,
            error = %e,
            "failed to delete payload"
        );
    }
}
