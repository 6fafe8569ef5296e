//! Test utilities for courier-core unit tests.

use courier_common::{Destination, EndpointKind, Envelope};
use courier_config::QueueLimits;
use courier_store::DeliveryCache;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::ledger::PendingCallLedger;
use crate::transport::{ApiResponse, Transport};

/// Scripted transport: pops queued responses, then falls back to a default.
/// Every call is recorded.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    script: Mutex<VecDeque<ApiResponse>>,
    fallback: ApiResponse,
    calls: Mutex<Vec<(Destination, Vec<u8>)>>,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub(crate) fn always(response: ApiResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: response,
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub(crate) fn scripted(
        responses: impl IntoIterator<Item = ApiResponse>,
        fallback: ApiResponse,
    ) -> Self {
        let transport = Self::always(fallback);
        transport.script.lock().unwrap().extend(responses);
        transport
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<(Destination, Vec<u8>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn execute_send(&self, destination: &Destination, payload: &[u8]) -> ApiResponse {
        self.calls
            .lock()
            .unwrap()
            .push((destination.clone(), payload.to_vec()));
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub(crate) fn envelope(kind: EndpointKind, body: &[u8]) -> Envelope {
    Envelope::new(
        kind,
        Destination::post(format!("http://collector.test/v1/log/{}", kind.path())),
        body.to_vec(),
    )
}

pub(crate) fn open_ledger(dir: &Path, limits: QueueLimits) -> Arc<PendingCallLedger> {
    let cache = DeliveryCache::open(dir).unwrap();
    Arc::new(PendingCallLedger::open(cache, limits).unwrap())
}
