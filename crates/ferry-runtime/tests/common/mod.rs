//! Shared fixtures for manager integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{
    AdapterError, AdapterId, AdapterResult, ApplicationHandle, BoxedListener, DeviceAdapter,
    DeviceHandle, DeviceInfo, DeviceUid, RawMessage, TransportEvent,
};
use ferry_runtime::{EventStream, FerryConfig, TransportManager};
use parking_lot::Mutex;
use tokio::time::timeout;

pub const APP_1: ApplicationHandle = ApplicationHandle::new(1);
pub const APP_2: ApplicationHandle = ApplicationHandle::new(2);

/// A request the manager forwarded to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search,
    Connect(DeviceUid, ApplicationHandle),
    Disconnect(DeviceUid, ApplicationHandle),
    DisconnectDevice(DeviceUid),
    Send(DeviceUid, ApplicationHandle),
}

/// An adapter that records every request and reports nothing on its own.
/// Tests drive outcomes through [`RecordingAdapter::listener`].
pub struct RecordingAdapter {
    id: AdapterId,
    calls: Mutex<Vec<Call>>,
    sent: Mutex<Vec<RawMessage>>,
    listener: Mutex<Option<BoxedListener>>,
    shutdowns: AtomicUsize,
    fail_start: bool,
}

impl RecordingAdapter {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self::with_start(id, false))
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self::with_start(id, true))
    }

    fn with_start(id: &str, fail_start: bool) -> Self {
        Self {
            id: AdapterId::new(id),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            shutdowns: AtomicUsize::new(0),
            fail_start,
        }
    }

    pub fn handle(&self, uid: &str) -> DeviceHandle {
        DeviceHandle::new(self.id.clone(), uid)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn sent(&self) -> Vec<RawMessage> {
        self.sent.lock().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn listener(&self) -> BoxedListener {
        self.listener
            .lock()
            .clone()
            .expect("adapter has not been started")
    }

    /// Reports `uids` as the result of a search.
    pub async fn discover(&self, uids: &[&str]) {
        let devices = uids
            .iter()
            .map(|uid| DeviceInfo::new(*uid, format!("Device {uid}")))
            .collect();
        self.listener().on_search_done(&self.id, devices).await;
    }

    pub async fn connected(&self, uid: &str, app: ApplicationHandle) {
        self.listener()
            .on_connect_done(&self.id, &DeviceUid::new(uid), app)
            .await;
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl DeviceAdapter for RecordingAdapter {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn transport(&self) -> &'static str {
        "recording"
    }

    async fn start(&self, listener: BoxedListener) -> AdapterResult<()> {
        if self.fail_start {
            return Err(AdapterError::start_failed(self.id.as_str(), "no radio"));
        }
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    async fn shutdown(&self) -> AdapterResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn search_devices(&self) {
        self.record(Call::Search);
    }

    fn connect(&self, device: &DeviceUid, app: ApplicationHandle) {
        self.record(Call::Connect(device.clone(), app));
    }

    fn disconnect(&self, device: &DeviceUid, app: ApplicationHandle) {
        self.record(Call::Disconnect(device.clone(), app));
    }

    fn disconnect_device(&self, device: &DeviceUid) {
        self.record(Call::DisconnectDevice(device.clone()));
    }

    fn send(&self, message: RawMessage) {
        self.record(Call::Send(message.device().clone(), message.app()));
        self.sent.lock().push(message);
    }
}

/// A manager with default configuration and no configuration files.
pub fn manager() -> TransportManager {
    TransportManager::from_config(&FerryConfig::default())
}

/// Waits for the next event, failing the test if none arrives.
pub async fn next_event(events: &mut EventStream) -> TransportEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// Collects the names of the next `n` events.
pub async fn next_names(events: &mut EventStream, n: usize) -> Vec<&'static str> {
    let mut names = Vec::with_capacity(n);
    for _ in 0..n {
        names.push(next_event(events).await.name());
    }
    names
}

/// Asserts that no event arrives within a short window.
pub async fn assert_quiet(events: &mut EventStream) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(100), events.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}
