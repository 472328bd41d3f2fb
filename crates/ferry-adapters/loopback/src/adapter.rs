//! The loopback adapter.
//!
//! Requests are queued and resolved in order by one worker task spawned in
//! [`DeviceAdapter::start`]. Scripting hooks go through the same queue, so an
//! injected message lands after every request issued before it.
//!
//! # Configuration-Based Usage
//!
//! ```rust,ignore
//! let manager = TransportManager::new();
//! manager.register_configured::<LoopbackAdapter>().await?;
//! ```
//!
//! # Programmatic Usage
//!
//! ```rust,ignore
//! let adapter = LoopbackAdapter::builder()
//!     .id("bench")
//!     .device("watch-1", "Wrist Watch")
//!     .echo(false)
//!     .build();
//! manager.register_adapter(adapter.clone()).await?;
//!
//! adapter.inject("watch-1", ApplicationHandle::new(1), b"ping".to_vec());
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{
    AdapterError, AdapterId, AdapterResult, ApplicationHandle, BoxedListener, CommunicationError,
    ConfigurableAdapter, ConnectError, DataReceiveError, DataSendError, DeviceAdapter, DeviceUid,
    DisconnectDeviceError, DisconnectError, RawMessage, SearchDeviceError,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::{DeviceConfig, LoopbackConfig};
use crate::world::{Operation, World};

/// Work for the adapter's worker task.
#[derive(Debug)]
enum Op {
    Search,
    Connect(DeviceUid, ApplicationHandle),
    Disconnect(DeviceUid, ApplicationHandle),
    DisconnectDevice(DeviceUid),
    Send(RawMessage),
    Inject(RawMessage),
    InjectFailure(DeviceUid, ApplicationHandle, String),
    DropSession(DeviceUid, ApplicationHandle, String),
    RequestConnection(DeviceUid, ApplicationHandle),
    Vanish(DeviceUid),
    Fault(DeviceUid, ApplicationHandle),
}

/// An in-process device adapter with scripted devices.
pub struct LoopbackAdapter {
    id: AdapterId,
    echo: bool,
    world: Arc<Mutex<World>>,
    ops: mpsc::UnboundedSender<Op>,
    /// Taken by the worker on start.
    pending: Mutex<Option<mpsc::UnboundedReceiver<Op>>>,
    shutdown: CancellationToken,
}

impl LoopbackAdapter {
    pub fn new(config: LoopbackConfig) -> Self {
        let (ops, rx) = mpsc::unbounded_channel();
        Self {
            id: AdapterId::new(&config.id),
            echo: config.echo,
            world: Arc::new(Mutex::new(World::new(&config.devices))),
            ops,
            pending: Mutex::new(Some(rx)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn builder() -> LoopbackAdapterBuilder {
        LoopbackAdapterBuilder::default()
    }

    fn queue(&self, op: Op) {
        if self.ops.send(op).is_err() {
            debug!(adapter = %self.id, "Loopback worker gone, dropping request");
        }
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Makes the next `op` fail with `description`. Repeated calls queue
    /// further failures.
    pub fn fail_next(&self, op: Operation, description: impl Into<String>) {
        self.world.lock().fail_next(op, description.into());
    }

    /// Delivers inbound data as if the device had sent it.
    pub fn inject(
        &self,
        device: impl Into<DeviceUid>,
        app: ApplicationHandle,
        data: impl Into<Arc<[u8]>>,
    ) {
        self.queue(Op::Inject(RawMessage::new(device, app, data)));
    }

    /// Reports an inbound read failure.
    pub fn inject_failure(
        &self,
        device: impl Into<DeviceUid>,
        app: ApplicationHandle,
        description: impl Into<String>,
    ) {
        self.queue(Op::InjectFailure(device.into(), app, description.into()));
    }

    /// Drops a session as if the link broke.
    pub fn drop_session(
        &self,
        device: impl Into<DeviceUid>,
        app: ApplicationHandle,
        description: impl Into<String>,
    ) {
        self.queue(Op::DropSession(device.into(), app, description.into()));
    }

    /// Has the device ask for a session, which the adapter then opens.
    pub fn request_connection(&self, device: impl Into<DeviceUid>, app: ApplicationHandle) {
        self.queue(Op::RequestConnection(device.into(), app));
    }

    /// Takes the device out of range, closing its sessions.
    pub fn vanish(&self, device: impl Into<DeviceUid>) {
        self.queue(Op::Vanish(device.into()));
    }

    /// Reports a communication fault that does not end the session.
    pub fn report_fault(&self, device: impl Into<DeviceUid>, app: ApplicationHandle) {
        self.queue(Op::Fault(device.into(), app));
    }

    /// Adds a device, or brings a vanished one back in range. It shows up
    /// on the next search.
    pub fn add_device(&self, uid: impl Into<String>, name: impl Into<String>) {
        self.world.lock().add_device(&DeviceConfig::new(uid, name));
    }

    /// Applications with an open session on the device, as the adapter sees it.
    pub fn connected_apps(&self, device: impl Into<DeviceUid>) -> Vec<ApplicationHandle> {
        self.world.lock().sessions(&device.into())
    }
}

#[async_trait]
impl DeviceAdapter for LoopbackAdapter {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn transport(&self) -> &'static str {
        "loopback"
    }

    async fn start(&self, listener: BoxedListener) -> AdapterResult<()> {
        let Some(rx) = self.pending.lock().take() else {
            return Err(AdapterError::start_failed(self.id.as_str(), "already started"));
        };

        let worker = Worker {
            id: self.id.clone(),
            echo: self.echo,
            world: Arc::clone(&self.world),
            listener,
        };
        tokio::spawn(worker.run(rx, self.shutdown.clone()));
        info!(adapter = %self.id, echo = self.echo, "Loopback adapter started");
        Ok(())
    }

    async fn shutdown(&self) -> AdapterResult<()> {
        self.shutdown.cancel();
        Ok(())
    }

    fn search_devices(&self) {
        self.queue(Op::Search);
    }

    fn connect(&self, device: &DeviceUid, app: ApplicationHandle) {
        self.queue(Op::Connect(device.clone(), app));
    }

    fn disconnect(&self, device: &DeviceUid, app: ApplicationHandle) {
        self.queue(Op::Disconnect(device.clone(), app));
    }

    fn disconnect_device(&self, device: &DeviceUid) {
        self.queue(Op::DisconnectDevice(device.clone()));
    }

    fn send(&self, message: RawMessage) {
        self.queue(Op::Send(message));
    }
}

impl ConfigurableAdapter for LoopbackAdapter {
    type Config = LoopbackConfig;

    fn name() -> &'static str {
        "loopback"
    }

    fn from_config(config: Self::Config) -> AdapterResult<Self> {
        if config.id.trim().is_empty() {
            return Err(AdapterError::InvalidConfig("loopback id must not be empty".into()));
        }
        Ok(Self::new(config))
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    id: AdapterId,
    echo: bool,
    world: Arc<Mutex<World>>,
    listener: BoxedListener,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Op>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                op = rx.recv() => match op {
                    Some(op) => self.apply(op).await,
                    None => break,
                },
            }
        }
        debug!(adapter = %self.id, "Loopback worker stopped");
    }

    async fn apply(&self, op: Op) {
        let (id, listener) = (&self.id, &self.listener);
        match op {
            Op::Search => {
                let result = self.world.lock().search();
                match result {
                    Ok(devices) => listener.on_search_done(id, devices).await,
                    Err(e) => listener.on_search_failed(id, SearchDeviceError::new(e)).await,
                }
            }
            Op::Connect(uid, app) => {
                let result = self.world.lock().connect(&uid, app);
                match result {
                    Ok(()) => listener.on_connect_done(id, &uid, app).await,
                    Err(e) => listener.on_connect_failed(id, &uid, app, ConnectError::new(e)).await,
                }
            }
            Op::Disconnect(uid, app) => {
                let result = self.world.lock().disconnect(&uid, app);
                match result {
                    Ok(()) => listener.on_disconnect_done(id, &uid, app).await,
                    Err(e) => {
                        listener
                            .on_disconnect_failed(id, &uid, app, DisconnectError::new(e))
                            .await
                    }
                }
            }
            Op::DisconnectDevice(uid) => {
                let result = self.world.lock().disconnect_device(&uid);
                match result {
                    Ok(()) => listener.on_disconnect_device_done(id, &uid).await,
                    Err(e) => {
                        listener
                            .on_disconnect_device_failed(id, &uid, DisconnectDeviceError::new(e))
                            .await
                    }
                }
            }
            Op::Send(message) => {
                let (uid, app) = (message.device().clone(), message.app());
                let result = self.world.lock().send(&uid, app);
                match result {
                    Ok(()) => {
                        trace!(
                            adapter = %id,
                            device = %uid,
                            app = %app,
                            len = message.len(),
                            "Loopback frame"
                        );
                        let echo = self
                            .echo
                            .then(|| RawMessage::new(uid.clone(), app, message.data().to_vec()));
                        listener.on_data_send_done(id, &uid, app, message).await;
                        if let Some(echo) = echo {
                            listener.on_data_receive_done(id, &uid, app, echo).await;
                        }
                    }
                    Err(e) => {
                        listener
                            .on_data_send_failed(id, &uid, app, message, DataSendError::new(e))
                            .await
                    }
                }
            }
            Op::Inject(message) => {
                let uid = message.device().clone();
                listener
                    .on_data_receive_done(id, &uid, message.app(), message)
                    .await;
            }
            Op::InjectFailure(uid, app, description) => {
                listener
                    .on_data_receive_failed(id, &uid, app, DataReceiveError::new(description))
                    .await;
            }
            Op::DropSession(uid, app, description) => {
                self.world.lock().close(&uid, app);
                listener
                    .on_unexpected_disconnect(id, &uid, app, CommunicationError::new(description))
                    .await;
            }
            Op::RequestConnection(uid, app) => {
                listener.on_connect_requested(id, &uid, app).await;
                let result = self.world.lock().open(&uid, app);
                match result {
                    Ok(()) => listener.on_connect_done(id, &uid, app).await,
                    Err(e) => listener.on_connect_failed(id, &uid, app, ConnectError::new(e)).await,
                }
            }
            Op::Vanish(uid) => {
                let vanished = self.world.lock().vanish(&uid);
                if vanished {
                    info!(adapter = %id, device = %uid, "Loopback device vanished");
                    listener.on_disconnect_device_done(id, &uid).await;
                }
            }
            Op::Fault(uid, app) => listener.on_communication_error(id, &uid, app).await,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`LoopbackAdapter`].
#[derive(Default)]
pub struct LoopbackAdapterBuilder {
    config: LoopbackConfig,
}

impl LoopbackAdapterBuilder {
    /// Sets the adapter id (default `"loopback"`).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Adds a device that answers searches.
    pub fn device(mut self, uid: impl Into<String>, name: impl Into<String>) -> Self {
        self.config.devices.push(DeviceConfig::new(uid, name));
        self
    }

    /// Enables or disables echoing sent payloads back (default on).
    pub fn echo(mut self, enabled: bool) -> Self {
        self.config.echo = enabled;
        self
    }

    pub fn build(self) -> Arc<LoopbackAdapter> {
        Arc::new(LoopbackAdapter::new(self.config))
    }
}
