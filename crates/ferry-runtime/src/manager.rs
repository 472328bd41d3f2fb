//! The transport manager handle.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ferry_runtime::TransportManager;
//! use ferry_adapter_loopback::LoopbackAdapter;
//!
//! let manager = TransportManager::builder()
//!     .config_file("ferry.toml")
//!     .build()?;
//!
//! manager.register_configured::<LoopbackAdapter>().await?;
//! let mut events = manager.subscribe().await?;
//! manager.search().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.name());
//! }
//! ```
//!
//! Request methods only queue work. Their outcome, success or failure,
//! arrives later as a [`TransportEvent`](ferry_core::TransportEvent). A
//! returned error means the manager itself is gone.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use ferry_core::{
    ApplicationHandle, BoxedAdapter, BoxedValidator, ChannelListener, ConfigurableAdapter,
    DeviceHandle, DeviceSnapshot, DeviceState, PayloadValidator, RawMessage, SessionSnapshot,
    SessionState,
};
use tokio::signal;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ConfigLoader, FerryConfig};
use crate::dispatch::{Command, Dispatcher, Query};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::observer::{EventStream, TransportObserver};
use crate::registry::RegistryStats;

/// Routes requests to device adapters and their outcomes to observers.
///
/// Cloning yields another handle to the same manager. Must be created inside
/// a Tokio runtime.
#[derive(Clone)]
pub struct TransportManager {
    commands: mpsc::Sender<Command>,
    config: Arc<FerryConfig>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TransportManager {
    /// Creates a manager with configuration loaded from the default
    /// locations, falling back to defaults when loading fails.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            FerryConfig::default()
        });
        Self::from_config(&config)
    }

    pub fn builder() -> TransportManagerBuilder {
        TransportManagerBuilder::new()
    }

    /// Creates a manager from configuration, initializing logging from it.
    pub fn from_config(config: &FerryConfig) -> Self {
        Self::start(config, None)
    }

    fn start(config: &FerryConfig, validator: Option<BoxedValidator>) -> Self {
        logging::init_from_config(&config.logging);

        let (commands, rx) = mpsc::channel(config.manager.command_queue_capacity);
        let task = tokio::spawn(
            Dispatcher::new(validator)
                .run(rx)
                .instrument(info_span!("transport_manager")),
        );

        info!(
            log_level = %config.logging.level,
            command_queue = config.manager.command_queue_capacity,
            adapter_queue = config.manager.adapter_queue_capacity,
            "Transport manager initialized from configuration"
        );

        Self {
            commands,
            config: Arc::new(config.clone()),
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    pub fn config(&self) -> &FerryConfig {
        &self.config
    }

    /// Returns true once the dispatch task has stopped accepting requests.
    pub fn is_shut_down(&self) -> bool {
        self.commands.is_closed()
    }

    // ========================================================================
    // Adapters
    // ========================================================================

    /// Registers an adapter and starts it.
    ///
    /// If `start` fails the adapter is removed again and the error returned.
    pub async fn register_adapter(&self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        let id = adapter.id().clone();
        let (listener, events) =
            ChannelListener::channel(self.config.manager.adapter_queue_capacity);

        let (reply, rx) = oneshot::channel();
        self.request(Command::Register {
            adapter: Arc::clone(&adapter),
            events,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RuntimeError::ShutDown)??;

        if let Err(e) = adapter.start(Arc::new(listener)).await {
            error!(adapter = %id, error = %e, "Failed to start adapter");
            let _ = self.commands.send(Command::Deregister { id }).await;
            return Err(e.into());
        }

        info!(adapter = %id, "Adapter started");
        Ok(())
    }

    /// Builds an adapter from the `adapters.<name>` configuration section
    /// and registers it. A missing section yields the default configuration.
    pub async fn register_configured<A>(&self) -> RuntimeResult<()>
    where
        A: ConfigurableAdapter + 'static,
    {
        let name = A::name();
        let config: A::Config = match self.config.adapters.get(name) {
            Some(value) => value.deserialize().map_err(|e| {
                RuntimeError::AdapterConfigDeserialize(format!(
                    "Failed to deserialize config for adapter '{name}': {e}"
                ))
            })?,
            None => {
                warn!(adapter = name, "No configuration found for adapter, using default");
                A::Config::default()
            }
        };

        let adapter = A::from_config(config)?;
        self.register_adapter(Arc::new(adapter)).await
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Asks every adapter to search. Joins a round already in progress.
    pub async fn search(&self) -> RuntimeResult<()> {
        self.request(Command::Search).await
    }

    pub async fn connect(
        &self,
        device: &DeviceHandle,
        app: ApplicationHandle) -> RuntimeResult<()> {
        self.request(Command::Connect {
            device: device.clone(),
            app,
        })
        .await
    }

    pub async fn disconnect(
        &self,
        device: &DeviceHandle,
        app: ApplicationHandle) -> RuntimeResult<()> {
        self.request(Command::Disconnect {
            device: device.clone(),
            app,
        })
        .await
    }

    /// Disconnects every session of a device and forgets the device.
    pub async fn disconnect_device(&self, device: &DeviceHandle) -> RuntimeResult<()> {
        self.request(Command::DisconnectDevice {
            device: device.clone(),
        })
        .await
    }

    /// Queues `data` for delivery and returns the message that the
    /// resulting `DataSent` or `SendFailed` event will carry.
    pub async fn send(
        &self,
        device: &DeviceHandle,
        app: ApplicationHandle,
        data: impl Into<Arc<[u8]>>,
    ) -> RuntimeResult<RawMessage> {
        let message = RawMessage::new(device.uid.clone(), app, data);
        self.request(Command::Send {
            device: device.clone(),
            message: message.clone(),
        })
        .await?;
        Ok(message)
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Receives every event emitted after this call, in order.
    pub async fn subscribe(&self) -> RuntimeResult<EventStream> {
        let (tx, stream) = EventStream::channel();
        self.request(Command::Subscribe(tx)).await?;
        Ok(stream)
    }

    /// Adds an observer called synchronously on the dispatch task.
    pub async fn add_observer(
        &self,
        observer: impl TransportObserver + 'static) -> RuntimeResult<()> {
        self.request(Command::Observe(Arc::new(observer))).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn devices(&self) -> RuntimeResult<Vec<DeviceSnapshot>> {
        self.query(Query::Devices).await
    }

    pub async fn sessions(&self) -> RuntimeResult<Vec<SessionSnapshot>> {
        self.query(Query::Sessions).await
    }

    pub async fn device_state(&self, device: &DeviceHandle) -> RuntimeResult<Option<DeviceState>> {
        let device = device.clone();
        self.query(|tx| Query::DeviceState(device, tx)).await
    }

    pub async fn session_state(
        &self,
        device: &DeviceHandle,
        app: ApplicationHandle,
    ) -> RuntimeResult<Option<SessionState>> {
        let device = device.clone();
        self.query(|tx| Query::SessionState(device, app, tx)).await
    }

    pub async fn stats(&self) -> RuntimeResult<RegistryStats> {
        self.query(Query::Stats).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shuts down every adapter and stops the dispatch task.
    ///
    /// Event streams end once the remaining events are drained. Calling this
    /// again is a no-op.
    pub async fn shutdown(&self) -> RuntimeResult<()> {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return Ok(());
        };

        info!("Shutting down transport manager");
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = handle.await {
            error!(error = %e, "Dispatch task terminated abnormally");
        }
        Ok(())
    }

    /// Waits for `until`, then shuts down.
    pub async fn run_until<F>(&self, until: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        until.await;
        self.shutdown().await
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run_until_signal(&self) -> RuntimeResult<()> {
        info!("Transport manager is running. Press Ctrl+C to stop.");
        wait_for_signal().await?;
        self.shutdown().await
    }

    async fn request(&self, command: Command) -> RuntimeResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::ShutDown)
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Query) -> RuntimeResult<T> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Query(make(tx))).await?;
        rx.await.map_err(|_| RuntimeError::ShutDown)
    }
}

impl Default for TransportManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_signal() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`TransportManager`] with custom configuration.
///
/// ```rust,ignore
/// let manager = TransportManager::builder()
///     .config_file("config/ferry.toml")
///     .profile("production")
///     .payload_validator(JsonPayloadValidator::<ShowWindow>::new())
///     .build()?;
/// ```
pub struct TransportManagerBuilder {
    loader: ConfigLoader,
    validator: Option<BoxedValidator>,
}

impl TransportManagerBuilder {
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            validator: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.loader = self.loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges configuration programmatically, overriding files and env.
    pub fn merge(mut self, config: FerryConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Validates inbound payloads before they reach observers.
    pub fn payload_validator(mut self, validator: impl PayloadValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Loads configuration and spawns the dispatch task.
    pub fn build(self) -> RuntimeResult<TransportManager> {
        let config = self.loader.load()?;
        debug!(validator = self.validator.is_some(), "Building transport manager");
        Ok(TransportManager::start(&config, self.validator))
    }
}

impl Default for TransportManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
