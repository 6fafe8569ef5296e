//! End-to-end delivery tests: a real service over a temp storage dir with a
//! scripted transport.

mod support;

use courier_common::{DeliveryError, EndpointKind, NetworkStatus};
use courier_config::QueueLimits;
use courier_core::{
    ApiResponse, ConnectivityListener, DeliveryOutcome, DeliveryService, QueueReason, Transport,
};
use courier_gate::{GatingPolicy, Session, SessionMessage, StaticGatingConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use support::{config, start_service, wait_until, FakeTransport};

const WAIT: Duration = Duration::from_secs(10);

fn ok() -> ApiResponse {
    ApiResponse::Success { status: 200 }
}

#[test]
fn test_offline_submission_is_persisted_without_sending() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.on_network_status_changed(NetworkStatus::NotReachable);

    let dest = service.config().destination_for(EndpointKind::Sessions);
    let id = service.submit_envelope(EndpointKind::Sessions, b"{\"session\":1}".to_vec(), dest);

    assert!(wait_until(WAIT, || service.ledger().contains(&id).unwrap()));
    assert_eq!(transport.call_count(), 0);
    assert_eq!(service.cache().payload_names().unwrap().len(), 1);

    let summary = service.pending_summary().unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.counts.get(&EndpointKind::Sessions), Some(&1));
}

#[test]
fn test_overflow_evicts_oldest_and_its_payload() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.on_network_status_changed(NetworkStatus::NotReachable);

    let dest = service.config().destination_for(EndpointKind::Events);
    let ids: Vec<_> = (0..101)
        .map(|i| {
            service.submit_envelope(EndpointKind::Events, format!("{{\"n\":{}}}", i).into_bytes(), dest.clone())
        })
        .collect();

    let last = ids.last().unwrap();
    assert!(wait_until(WAIT, || service.ledger().contains(last).unwrap()));
    assert_eq!(service.ledger().len().unwrap(), 100);
    assert!(!service.ledger().contains(&ids[0]).unwrap());
    assert!(service.ledger().contains(&ids[1]).unwrap());
    assert_eq!(service.cache().payload_names().unwrap().len(), 100);
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_online_send_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.on_network_status_changed(NetworkStatus::Reachable);

    let outcome = service.submit_and_await(EndpointKind::Logging, b"{\"log\":true}".to_vec());

    assert_eq!(outcome, DeliveryOutcome::Delivered { status: 200 });
    assert!(!service.ledger().has_any().unwrap());
    assert!(service.cache().payload_names().unwrap().is_empty());
    assert_eq!(transport.urls(), vec!["http://collector.test/v1/log/logging".to_string()]);
}

#[test]
fn test_retryable_failure_is_drained_when_network_returns() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::scripted([ApiResponse::Failure { status: 503 }], ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());

    let outcome = service.submit_and_await(EndpointKind::Events, b"{\"e\":1}".to_vec());
    assert!(matches!(
        outcome,
        DeliveryOutcome::Queued {
            reason: QueueReason::SendFailed { status: Some(503), .. }
        }
    ));
    assert_eq!(service.ledger().len().unwrap(), 1);

    service.on_network_status_changed(NetworkStatus::Reachable);

    assert!(wait_until(WAIT, || !service.ledger().has_any().unwrap()));
    assert_eq!(transport.call_count(), 2);
    assert!(service.cache().payload_names().unwrap().is_empty());
    let bodies = transport.bodies();
    assert_eq!(bodies[0], bodies[1]);
}

#[test]
fn test_sessions_are_retrieved_first() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.on_network_status_changed(NetworkStatus::NotReachable);

    let cfg = service.config().clone();
    service.submit_envelope(EndpointKind::Logging, b"l".to_vec(), cfg.destination_for(EndpointKind::Logging));
    service.submit_envelope(EndpointKind::Events, b"e".to_vec(), cfg.destination_for(EndpointKind::Events));
    let session = service.submit_envelope(
        EndpointKind::Sessions,
        b"s".to_vec(),
        cfg.destination_for(EndpointKind::Sessions),
    );

    assert!(wait_until(WAIT, || service.ledger().len().unwrap() == 3));
    let first = service.ledger().poll_next().unwrap().unwrap();
    assert_eq!(first.kind, EndpointKind::Sessions);
    assert_eq!(first.request_id, session);
    let second = service.ledger().poll_next().unwrap().unwrap();
    assert_eq!(second.kind, EndpointKind::Events);
}

#[test]
fn test_pending_calls_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let ids = {
        let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
        service.on_network_status_changed(NetworkStatus::NotReachable);
        let cfg = service.config().clone();
        let ids = vec![
            service.submit_envelope(EndpointKind::Events, b"e1".to_vec(), cfg.destination_for(EndpointKind::Events)),
            service.submit_envelope(EndpointKind::Blobs, b"b1".to_vec(), cfg.destination_for(EndpointKind::Blobs)),
        ];
        assert!(wait_until(WAIT, || service.ledger().len().unwrap() == 2));
        ids
    };

    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    assert_eq!(service.pending_summary().unwrap().total, 2);
    for id in &ids {
        assert!(service.ledger().contains(id).unwrap());
    }

    let report = service.drain_now().unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.remaining, 0);
    assert!(service.cache().payload_names().unwrap().is_empty());
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_crash_slot_kept_until_delivery_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::scripted([ApiResponse::Failure { status: 503 }], ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.on_network_status_changed(NetworkStatus::Reachable);

    let outcome = service.submit_crash(b"{\"crash\":true}".to_vec());
    assert!(matches!(outcome, DeliveryOutcome::Dropped { .. }));
    assert!(service.cache().has_crash());
    assert!(!service.ledger().has_any().unwrap());

    let resent = service.resend_cached_crash().unwrap();
    assert_eq!(resent, DeliveryOutcome::Delivered { status: 200 });
    assert!(wait_until(WAIT, || !service.cache().has_crash()));
    assert!(service.resend_cached_crash().is_none());
}

#[test]
fn test_cached_sessions_sent_except_current() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.on_network_status_changed(NetworkStatus::Reachable);

    for id in ["old-1", "old-2", "current"] {
        service.cache_session_async(id, format!("{{\"id\":\"{}\"}}", id).into_bytes());
    }
    assert!(wait_until(WAIT, || service.cache().cached_session_ids().unwrap().len() == 3));

    let sent = service.send_cached_sessions(Some("current")).unwrap();
    assert_eq!(sent, 2);
    assert!(wait_until(WAIT, || {
        service.cache().cached_session_ids().unwrap() == vec!["current".to_string()]
    }));
    assert!(wait_until(WAIT, || transport.call_count() == 2));
    assert!(!service.ledger().has_any().unwrap());
}

#[test]
fn test_gated_session_omits_stripped_components() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(
        dir.path(),
        config(QueueLimits::default()),
        &transport,
        GatingPolicy::whitelist(Vec::<String>::new()),
    );
    service.on_network_status_changed(NetworkStatus::Reachable);

    let mut session = Session::new("s-1", 1_700_000_000_000);
    session.properties = Some(BTreeMap::from([("plan".to_string(), "pro".to_string())]));
    assert!(service.submit_session(&SessionMessage::new(session)).is_some());

    assert!(wait_until(WAIT, || transport.call_count() == 1));
    let body: serde_json::Value = serde_json::from_slice(&transport.bodies()[0]).unwrap();
    assert!(body["session"].get("properties").is_none());
    assert_eq!(body["session"]["session_id"], "s-1");
}

#[test]
fn test_invalid_config_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let transport: Arc<dyn Transport> = FakeTransport::always(ok());
    let mut cfg = config(QueueLimits::default());
    cfg.snapshot_interval_ms = 0;

    let result = DeliveryService::start(
        cfg,
        dir.path(),
        transport,
        Arc::new(StaticGatingConfig::new(GatingPolicy::disabled())),
    );
    match result {
        Err(DeliveryError::Config(message)) => assert!(message.contains("snapshot_interval_ms")),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::always(ok());
    let service = start_service(dir.path(), config(QueueLimits::default()), &transport, GatingPolicy::disabled());
    service.shutdown();
    service.shutdown();
    assert_eq!(service.pending_summary().unwrap().total, 0);
}
