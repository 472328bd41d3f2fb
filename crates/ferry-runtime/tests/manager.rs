//! End-to-end behavior of the transport manager.

mod common;

use std::sync::Arc;

use common::{APP_1, APP_2, Call, RecordingAdapter, assert_quiet, manager, next_event, next_names};
use ferry_adapter_loopback::{LoopbackAdapter, LoopbackConfig};
use ferry_codec::{Integer, JsonPayloadValidator};
use ferry_core::{
    AdapterId, CloseReason, DeviceHandle, DeviceInfo, DeviceState, DeviceUid, LocalCause,
    SearchDeviceError, SessionState, TransportEvent,
};
use ferry_runtime::{FerryConfig, RuntimeError, TransportManager};
use figment::Figment;
use figment::providers::{Format, Toml};
use parking_lot::Mutex;

fn loopback() -> Arc<LoopbackAdapter> {
    LoopbackAdapter::builder()
        .device("watch-1", "Watch")
        .echo(false)
        .build()
}

fn watch() -> DeviceHandle {
    DeviceHandle::new("loopback", "watch-1")
}

/// Registers a loopback adapter, discovers its device and opens `apps`.
async fn connected_loopback(
    manager: &TransportManager,
    apps: &[ferry_core::ApplicationHandle],
) -> (Arc<LoopbackAdapter>, ferry_runtime::EventStream) {
    let adapter = loopback();
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    manager.search().await.unwrap();
    assert_eq!(next_names(&mut events, 2).await, ["device-discovered", "search-completed"]);

    for app in apps {
        manager.connect(&watch(), *app).await.unwrap();
        assert_eq!(next_event(&mut events).await.name(), "session-established");
    }
    (adapter, events)
}

// ============================================================================
// Local validation
// ============================================================================

#[tokio::test]
async fn test_unknown_device_fails_locally_without_adapter_call() {
    let manager = manager();
    let adapter = RecordingAdapter::new("bt");
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    let ghost = adapter.handle("ghost");
    manager.connect(&ghost, APP_1).await.unwrap();
    manager.disconnect(&ghost, APP_1).await.unwrap();
    manager.disconnect_device(&ghost).await.unwrap();
    let message = manager.send(&ghost, APP_1, vec![1u8]).await.unwrap();

    match next_event(&mut events).await {
        TransportEvent::ConnectFailed { device, app, error } => {
            assert_eq!(device, ghost);
            assert_eq!(app, APP_1);
            assert_eq!(error.local_cause(), Some(LocalCause::UnknownDevice));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let next = next_event(&mut events).await;
    assert_eq!(next.name(), "disconnect-failed");
    assert_eq!(next.error().unwrap().local_cause(), Some(LocalCause::UnknownDevice));
    let next = next_event(&mut events).await;
    assert_eq!(next.name(), "disconnect-device-failed");
    assert_eq!(next.error().unwrap().local_cause(), Some(LocalCause::UnknownDevice));
    match next_event(&mut events).await {
        TransportEvent::SendFailed { message: failed, error, .. } => {
            assert!(failed.ptr_eq(&message));
            assert_eq!(error.local_cause(), Some(LocalCause::UnknownDevice));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(adapter.calls().is_empty());
    assert!(manager.devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unregistered_adapter_fails_locally() {
    let manager = manager();
    let mut events = manager.subscribe().await.unwrap();

    let device = DeviceHandle::new("usb", "phone");
    manager.connect(&device, APP_1).await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.name(), "connect-failed");
    assert!(event.error().unwrap().local_cause().is_some());
}

#[tokio::test]
async fn test_send_before_discovery_changes_nothing() {
    let manager = manager();
    let adapter = RecordingAdapter::new("bt");
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    manager.send(&adapter.handle("D1"), APP_1, vec![0x01, 0x02]).await.unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.name(), "send-failed");
    assert_eq!(event.error().unwrap().local_cause(), Some(LocalCause::UnknownDevice));
    assert!(adapter.sent().is_empty());
    assert_eq!(manager.stats().await.unwrap().devices, 0);
}

#[tokio::test]
async fn test_connect_twice_reports_existing_session() {
    let manager = manager();
    let (_adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    manager.connect(&watch(), APP_1).await.unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.name(), "connect-failed");
    assert_eq!(event.error().unwrap().local_cause(), Some(LocalCause::SessionExists));
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_scenario_send_after_connect_done() {
    let manager = manager();
    let adapter = RecordingAdapter::new("bt");
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();
    let d1 = adapter.handle("D1");

    adapter.discover(&["D1"]).await;
    match next_event(&mut events).await {
        TransportEvent::DeviceDiscovered { device, name } => {
            assert_eq!(device, d1);
            assert_eq!(name, "Device D1");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    manager.connect(&d1, APP_1).await.unwrap();
    assert_eq!(manager.session_state(&d1, APP_1).await.unwrap(), Some(SessionState::Pending));
    assert_eq!(adapter.calls(), [Call::Connect(DeviceUid::new("D1"), APP_1)]);

    adapter.connected("D1", APP_1).await;
    assert_eq!(next_event(&mut events).await.name(), "session-established");
    assert_eq!(manager.device_state(&d1).await.unwrap(), Some(DeviceState::Connected));

    let message = manager.send(&d1, APP_1, vec![0x01, 0x02]).await.unwrap();
    assert_eq!(manager.stats().await.unwrap().in_flight_sends, 1);
    let sent = adapter.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].ptr_eq(&message));

    adapter
        .listener()
        .on_data_send_done(&AdapterId::new("bt"), &DeviceUid::new("D1"), APP_1, sent[0].clone())
        .await;
    match next_event(&mut events).await {
        TransportEvent::DataSent { device, app, message: done } => {
            assert_eq!(device, d1);
            assert_eq!(app, APP_1);
            assert!(done.ptr_eq(&message));
            assert_eq!(done.data(), &[0x01, 0x02]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(manager.stats().await.unwrap().in_flight_sends, 0);
}

#[tokio::test]
async fn test_send_after_disconnect_fails_locally() {
    let manager = manager();
    let (_adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    manager.send(&watch(), APP_1, vec![7u8]).await.unwrap();
    assert_eq!(next_event(&mut events).await.name(), "data-sent");

    manager.disconnect(&watch(), APP_1).await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::SessionClosed { reason, .. } => assert_eq!(reason, CloseReason::Requested),
        other => panic!("unexpected event: {other:?}"),
    }

    manager.send(&watch(), APP_1, vec![8u8]).await.unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event.name(), "send-failed");
    assert_eq!(event.error().unwrap().local_cause(), Some(LocalCause::UnknownSession));
    assert_eq!(manager.session_state(&watch(), APP_1).await.unwrap(), None);
}

#[tokio::test]
async fn test_adapter_connect_failure_is_reported() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[]).await;
    adapter.fail_next(ferry_adapter_loopback::Operation::Connect, "pairing rejected");

    manager.connect(&watch(), APP_1).await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::ConnectFailed { error, .. } => {
            assert!(!error.is_local());
            assert_eq!(error.description(), "pairing rejected");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(manager.session_state(&watch(), APP_1).await.unwrap(), None);
}

#[tokio::test]
async fn test_unexpected_disconnect_reported_once() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    adapter.drop_session("watch-1", APP_1, "link lost");
    adapter.drop_session("watch-1", APP_1, "link lost");

    assert_eq!(next_event(&mut events).await.name(), "communication-error");
    match next_event(&mut events).await {
        TransportEvent::SessionClosed { reason: CloseReason::Unexpected(error), .. } => {
            assert_eq!(error.description(), "link lost");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn test_remote_connection_request() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[]).await;

    adapter.request_connection("watch-1", APP_2);
    match next_event(&mut events).await {
        TransportEvent::ConnectRequested { device, app } => {
            assert_eq!(device, watch());
            assert_eq!(app, APP_2);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(next_event(&mut events).await.name(), "session-established");
    assert_eq!(
        manager.session_state(&watch(), APP_2).await.unwrap(),
        Some(SessionState::Established)
    );
}

// ============================================================================
// Devices
// ============================================================================

#[tokio::test]
async fn test_device_removal_closes_sessions_first() {
    let manager = manager();
    let (_adapter, mut events) = connected_loopback(&manager, &[APP_1, APP_2]).await;

    manager.disconnect_device(&watch()).await.unwrap();

    let mut closed = Vec::new();
    for _ in 0..2 {
        match next_event(&mut events).await {
            TransportEvent::SessionClosed { app, reason, .. } => {
                assert_eq!(reason, CloseReason::DeviceRemoved);
                closed.push(app);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(closed, [APP_1, APP_2]);
    assert_eq!(next_event(&mut events).await.name(), "device-lost");

    assert!(manager.devices().await.unwrap().is_empty());
    assert!(manager.sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vanished_device_is_lost() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    adapter.vanish("watch-1");
    assert_eq!(next_names(&mut events, 2).await, ["session-closed", "device-lost"]);
    assert_eq!(manager.device_state(&watch()).await.unwrap(), None);
}

// ============================================================================
// Data
// ============================================================================

#[tokio::test]
async fn test_receive_order_is_preserved_for_every_observer() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager
        .add_observer(move |event: &TransportEvent| {
            if let TransportEvent::DataReceived { message, .. } = event {
                sink.lock().push(message.data()[0]);
            }
        })
        .await
        .unwrap();

    for byte in 1..=5u8 {
        adapter.inject("watch-1", APP_1, vec![byte]);
    }

    let mut streamed = Vec::new();
    for _ in 0..5 {
        match next_event(&mut events).await {
            TransportEvent::DataReceived { message, .. } => streamed.push(message.data()[0]),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    manager.stats().await.unwrap();

    assert_eq!(streamed, [1, 2, 3, 4, 5]);
    assert_eq!(*seen.lock(), [1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_receive_on_unknown_session_is_rejected() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[]).await;

    adapter.inject("watch-1", APP_1, vec![1u8]);
    match next_event(&mut events).await {
        TransportEvent::ReceiveFailed { error, raw, .. } => {
            assert_eq!(error.local_cause(), Some(LocalCause::UnknownSession));
            assert_eq!(raw.unwrap().data(), &[1]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_payload_validator_rejects_with_raw_bytes() {
    let manager = TransportManager::builder()
        .without_env()
        .payload_validator(JsonPayloadValidator::<Integer<u8, 0, 10>>::new())
        .build()
        .unwrap();
    let (adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    adapter.inject("watch-1", APP_1, b"7".to_vec());
    adapter.inject("watch-1", APP_1, b"11".to_vec());
    adapter.inject("watch-1", APP_1, b"{".to_vec());

    assert_eq!(next_event(&mut events).await.name(), "data-received");
    for raw_bytes in [&b"11"[..], &b"{"[..]] {
        match next_event(&mut events).await {
            TransportEvent::ReceiveFailed { error, raw, .. } => {
                assert!(!error.is_local());
                assert_eq!(raw.unwrap().data(), raw_bytes);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_adapter_receive_failure_has_no_bytes() {
    let manager = manager();
    let (adapter, mut events) = connected_loopback(&manager, &[APP_1]).await;

    adapter.inject_failure("watch-1", APP_1, "crc mismatch");
    match next_event(&mut events).await {
        TransportEvent::ReceiveFailed { error, raw, .. } => {
            assert_eq!(error.description(), "crc mismatch");
            assert!(raw.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_echo_round_trip() {
    let manager = manager();
    let adapter = LoopbackAdapter::builder().device("watch-1", "Watch").build();
    manager.register_adapter(adapter).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    manager.search().await.unwrap();
    manager.connect(&watch(), APP_1).await.unwrap();
    manager.send(&watch(), APP_1, b"ping".to_vec()).await.unwrap();

    assert_eq!(
        next_names(&mut events, 5).await,
        [
            "device-discovered",
            "search-completed",
            "session-established",
            "data-sent",
            "data-received",
        ]
    );
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_completes_after_every_adapter_reports() {
    let manager = manager();
    let a = RecordingAdapter::new("a");
    let b = RecordingAdapter::new("b");
    manager.register_adapter(a.clone()).await.unwrap();
    manager.register_adapter(b.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    manager.search().await.unwrap();
    manager.search().await.unwrap();
    manager.stats().await.unwrap();
    assert_eq!(a.calls(), [Call::Search]);
    assert_eq!(b.calls(), [Call::Search]);

    a.discover(&["d1"]).await;
    assert_eq!(next_event(&mut events).await.name(), "device-discovered");
    assert_quiet(&mut events).await;

    let error = SearchDeviceError::new("scan timed out");
    b.listener().on_search_failed(&AdapterId::new("b"), error.clone()).await;
    match next_event(&mut events).await {
        TransportEvent::SearchCompleted(summary) => {
            assert_eq!(summary.succeeded, [AdapterId::new("a")]);
            assert_eq!(summary.failed, [(AdapterId::new("b"), error)]);
            assert!(!summary.is_complete_success());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    manager.search().await.unwrap();
    manager.stats().await.unwrap();
    assert_eq!(a.calls(), [Call::Search, Call::Search]);
}

#[tokio::test]
async fn test_search_without_adapters_completes_immediately() {
    let manager = manager();
    let mut events = manager.subscribe().await.unwrap();

    manager.search().await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::SearchCompleted(summary) => {
            assert!(summary.succeeded.is_empty());
            assert!(summary.is_complete_success());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_search_drops_vanished_idle_devices() {
    let manager = manager();
    let adapter = RecordingAdapter::new("bt");
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    adapter.discover(&["d1", "d2"]).await;
    assert_eq!(next_names(&mut events, 2).await, ["device-discovered", "device-discovered"]);

    adapter.discover(&["d2"]).await;
    match next_event(&mut events).await {
        TransportEvent::DeviceLost { device } => assert_eq!(device, adapter.handle("d1")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(manager.stats().await.unwrap().devices, 1);
}

#[tokio::test]
async fn test_events_from_unregistered_adapter_are_dropped() {
    let manager = manager();
    let adapter = RecordingAdapter::new("bt");
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    adapter
        .listener()
        .on_search_done(&AdapterId::new("ghost"), vec![DeviceInfo::new("d1", "Phantom")])
        .await;

    assert_quiet(&mut events).await;
    assert!(manager.devices().await.unwrap().is_empty());
}

// ============================================================================
// Registration and lifecycle
// ============================================================================

#[tokio::test]
async fn test_duplicate_adapter_is_rejected() {
    let manager = manager();
    manager.register_adapter(RecordingAdapter::new("bt")).await.unwrap();

    let err = manager.register_adapter(RecordingAdapter::new("bt")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::AdapterExists(id) if id.as_str() == "bt"));
    assert_eq!(manager.stats().await.unwrap().adapters, 1);
}

#[tokio::test]
async fn test_start_failure_deregisters_adapter() {
    let manager = manager();

    let err = manager.register_adapter(RecordingAdapter::failing("bt")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Adapter(_)));
    assert_eq!(manager.stats().await.unwrap().adapters, 0);

    manager.register_adapter(RecordingAdapter::new("bt")).await.unwrap();
}

#[tokio::test]
async fn test_register_configured_reads_adapter_section() {
    let config: FerryConfig = Figment::new()
        .merge(Toml::string(
            r#"
            [adapters.loopback]
            id = "sim"
            echo = false

            [[adapters.loopback.devices]]
            uid = "watch-9"
            name = "Bench Watch"
            "#,
        ))
        .extract()
        .unwrap();
    let manager = TransportManager::from_config(&config);
    manager.register_configured::<LoopbackAdapter>().await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    manager.search().await.unwrap();
    match next_event(&mut events).await {
        TransportEvent::DeviceDiscovered { device, name } => {
            assert_eq!(device, DeviceHandle::new("sim", "watch-9"));
            assert_eq!(name, "Bench Watch");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_register_configured_rejects_bad_section() {
    let mut config = FerryConfig::default();
    config.adapters.insert(
        "loopback".to_string(),
        figment::value::Value::serialize(LoopbackConfig {
            id: String::new(),
            ..LoopbackConfig::default()
        })
        .unwrap(),
    );
    let manager = TransportManager::from_config(&config);

    let err = manager.register_configured::<LoopbackAdapter>().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Adapter(_)));
}

#[tokio::test]
async fn test_shutdown_stops_adapters_and_rejects_requests() {
    let manager = manager();
    let adapter = RecordingAdapter::new("bt");
    manager.register_adapter(adapter.clone()).await.unwrap();
    let mut events = manager.subscribe().await.unwrap();

    manager.shutdown().await.unwrap();
    manager.shutdown().await.unwrap();

    assert_eq!(adapter.shutdowns(), 1);
    assert!(manager.is_shut_down());
    assert!(events.recv().await.is_none());
    assert!(matches!(
        manager.connect(&adapter.handle("d1"), APP_1).await,
        Err(RuntimeError::ShutDown)
    ));
    assert!(matches!(manager.stats().await, Err(RuntimeError::ShutDown)));
}

#[tokio::test]
async fn test_run_until_shuts_down() {
    let manager = manager();
    manager.run_until(async {}).await.unwrap();
    assert!(manager.is_shut_down());
}
