//! Shared helpers for courier-core integration tests.

#![allow(dead_code)]
// Each test binary uses a different subset of these helpers.

use courier_common::Destination;
use courier_config::{DeliveryConfig, QueueLimits};
use courier_core::{ApiResponse, DeliveryService, Transport};
use courier_gate::{GatingPolicy, StaticGatingConfig};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Scripted transport that records every call.
#[derive(Debug)]
pub struct FakeTransport {
    script: Mutex<VecDeque<ApiResponse>>,
    fallback: Mutex<ApiResponse>,
    calls: Mutex<Vec<(Destination, Vec<u8>)>>,
}

impl FakeTransport {
    pub fn always(response: ApiResponse) -> Arc<Self> {
        Self::scripted([], response)
    }

    pub fn scripted(
        responses: impl IntoIterator<Item = ApiResponse>,
        fallback: ApiResponse,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into_iter().collect()),
            fallback: Mutex::new(fallback),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Change the response used once the script runs out.
    pub fn respond_with(&self, response: ApiResponse) {
        *self.fallback.lock().unwrap() = response;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(dest, _)| dest.url.clone())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn execute_send(&self, destination: &Destination, payload: &[u8]) -> ApiResponse {
        self.calls
            .lock()
            .unwrap()
            .push((destination.clone(), payload.to_vec()));
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

pub fn config(limits: QueueLimits) -> DeliveryConfig {
    DeliveryConfig {
        base_url: "http://collector.test".to_string(),
        queue_limits: limits,
        ..DeliveryConfig::default()
    }
}

pub fn start_service(
    dir: &Path,
    config: DeliveryConfig,
    transport: &Arc<FakeTransport>,
    policy: GatingPolicy,
) -> DeliveryService {
    let transport: Arc<dyn Transport> = transport.clone();
    DeliveryService::start(
        config,
        dir,
        transport,
        Arc::new(StaticGatingConfig::new(policy)),
    )
    .expect("service starts")
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
