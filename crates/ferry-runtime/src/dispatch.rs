//! The serialized dispatch context.
//!
//! One task owns the [`Registry`], the adapter table and the observer set.
//! It multiplexes the caller command queue with one bounded event queue per
//! adapter:
//!
//! ```text
//! callers ──Command──▶ ┌──────────────┐ ──request──▶ adapters
//!                      │  Dispatcher  │
//! adapter queues ────▶ └──────────────┘ ──TransportEvent──▶ observers
//! ```
//!
//! Each adapter queue preserves its adapter's reporting order, so events for
//! one (device, app) pair reach observers in the order they were reported.

use std::collections::{BTreeMap, HashSet};

use ferry_core::{
    AdapterEnvelope, AdapterEvent, AdapterId, ApplicationHandle, BoxedAdapter, BoxedValidator,
    ConnectError, DataSendError, DeviceHandle, DeviceSnapshot, DeviceState,
    DisconnectDeviceError, DisconnectError, LocalCause, RawMessage, SearchDeviceError,
    SearchSummary, SessionSnapshot, SessionState, TransportEvent,
};
use futures::stream::{BoxStream, SelectAll};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::observer::{BoxedObserver, ObserverSet};
use crate::registry::{Outbox, Registry, RegistryStats};

// ============================================================================
// Commands
// ============================================================================

/// A caller request queued for the dispatch task.
pub(crate) enum Command {
    Register {
        adapter: BoxedAdapter,
        events: mpsc::Receiver<AdapterEnvelope>,
        reply: oneshot::Sender<RuntimeResult<()>>,
    },
    /// Removes an adapter whose start failed.
    Deregister { id: AdapterId },
    Search,
    Connect {
        device: DeviceHandle,
        app: ApplicationHandle,
    },
    Disconnect {
        device: DeviceHandle,
        app: ApplicationHandle,
    },
    DisconnectDevice { device: DeviceHandle },
    Send {
        device: DeviceHandle,
        message: RawMessage,
    },
    Observe(BoxedObserver),
    Subscribe(mpsc::UnboundedSender<TransportEvent>),
    Query(Query),
    Shutdown { reply: oneshot::Sender<()> },
}

/// A read of dispatch-owned state.
pub(crate) enum Query {
    Devices(oneshot::Sender<Vec<DeviceSnapshot>>),
    Sessions(oneshot::Sender<Vec<SessionSnapshot>>),
    DeviceState(DeviceHandle, oneshot::Sender<Option<DeviceState>>),
    SessionState(
        DeviceHandle,
        ApplicationHandle,
        oneshot::Sender<Option<SessionState>>,
    ),
    Stats(oneshot::Sender<RegistryStats>),
}

/// A search round waiting for adapters to report.
struct SearchRound {
    waiting: HashSet<AdapterId>,
    summary: SearchSummary,
}

// ============================================================================
// Dispatcher
// ============================================================================

pub(crate) struct Dispatcher {
    registry: Registry,
    adapters: BTreeMap<AdapterId, BoxedAdapter>,
    observers: ObserverSet,
    validator: Option<BoxedValidator>,
    search: Option<SearchRound>,
}

impl Dispatcher {
    pub fn new(validator: Option<BoxedValidator>) -> Self {
        Self {
            registry: Registry::new(),
            adapters: BTreeMap::new(),
            observers: ObserverSet::default(),
            validator,
            search: None,
        }
    }

    /// Runs until shutdown is requested or every manager handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut events: SelectAll<BoxStream<'static, AdapterEnvelope>> = SelectAll::new();
        info!("Transport manager started");

        let shutdown_reply = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Register { adapter, events: rx, reply }) => {
                        let result = self.register(adapter);
                        if result.is_ok() {
                            events.push(receiver_stream(rx));
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => self.handle_command(command),
                    None => break None,
                },
                Some(envelope) = events.next(), if !events.is_empty() => {
                    self.handle_adapter_event(envelope);
                }
            }
        };

        self.shutdown_adapters().await;
        info!(
            adapters = self.adapters.len(),
            observers = self.observers.len(),
            "Transport manager stopped"
        );
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    fn register(&mut self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        let id = adapter.id().clone();
        if self.adapters.contains_key(&id) {
            return Err(RuntimeError::AdapterExists(id));
        }
        info!(adapter = %id, transport = adapter.transport(), "Registered adapter");
        self.adapters.insert(id, adapter);
        Ok(())
    }

    async fn shutdown_adapters(&mut self) {
        for (id, adapter) in &self.adapters {
            match adapter.shutdown().await {
                Ok(()) => debug!(adapter = %id, "Adapter shut down"),
                Err(e) => error!(adapter = %id, error = %e, "Error during adapter shutdown"),
            }
        }
    }

    fn flush(&mut self, out: Outbox) {
        for event in out {
            self.observers.emit(event);
        }
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        let mut out = Outbox::new();
        match command {
            Command::Register { .. } | Command::Shutdown { .. } => {}
            Command::Deregister { id } => self.deregister(&id, &mut out),
            Command::Search => self.start_search(&mut out),
            Command::Connect { device, app } => {
                let routed = self
                    .route(&device)
                    .map_err(ConnectError::local)
                    .and_then(|adapter| {
                        self.registry.begin_connect(&device, app).map(|()| adapter)
                    });
                match routed {
                    Ok(adapter) => {
                        debug!(device = %device, app = %app, "Routing connect");
                        adapter.connect(&device.uid, app);
                    }
                    Err(error) => out.push(TransportEvent::ConnectFailed { device, app, error }),
                }
            }
            Command::Disconnect { device, app } => {
                let routed = self
                    .route(&device)
                    .map_err(DisconnectError::local)
                    .and_then(|adapter| {
                        self.registry.begin_disconnect(&device, app).map(|()| adapter)
                    });
                match routed {
                    Ok(adapter) => {
                        debug!(device = %device, app = %app, "Routing disconnect");
                        adapter.disconnect(&device.uid, app);
                    }
                    Err(error) => out.push(TransportEvent::DisconnectFailed { device, app, error }),
                }
            }
            Command::DisconnectDevice { device } => {
                let routed = self
                    .route(&device)
                    .map_err(DisconnectDeviceError::local)
                    .and_then(|adapter| {
                        self.registry.begin_disconnect_device(&device).map(|()| adapter)
                    });
                match routed {
                    Ok(adapter) => {
                        debug!(device = %device, "Routing device disconnect");
                        adapter.disconnect_device(&device.uid);
                    }
                    Err(error) => {
                        out.push(TransportEvent::DisconnectDeviceFailed { device, error })
                    }
                }
            }
            Command::Send { device, message } => {
                let app = message.app();
                let routed = self
                    .route(&device)
                    .map_err(DataSendError::local)
                    .and_then(|adapter| self.registry.begin_send(&device, app).map(|()| adapter));
                match routed {
                    Ok(adapter) => adapter.send(message),
                    Err(error) => out.push(TransportEvent::SendFailed {
                        device,
                        app,
                        message,
                        error,
                    }),
                }
            }
            Command::Observe(observer) => self.observers.add_observer(observer),
            Command::Subscribe(tx) => self.observers.add_subscriber(tx),
            Command::Query(query) => self.answer(query),
        }
        self.flush(out);
    }

    /// Finds the adapter owning a registered device.
    fn route(&self, device: &DeviceHandle) -> Result<BoxedAdapter, LocalCause> {
        if !self.registry.contains(device) {
            return Err(LocalCause::UnknownDevice);
        }
        self.adapters
            .get(&device.adapter)
            .cloned()
            .ok_or(LocalCause::UnknownAdapter)
    }

    fn answer(&self, query: Query) {
        let _ = match query {
            Query::Devices(tx) => tx.send(self.registry.devices()).map_err(drop),
            Query::Sessions(tx) => tx.send(self.registry.sessions()).map_err(drop),
            Query::DeviceState(device, tx) => {
                tx.send(self.registry.device_state(&device)).map_err(drop)
            }
            Query::SessionState(device, app, tx) => {
                tx.send(self.registry.session_state(&device, app)).map_err(drop)
            }
            Query::Stats(tx) => tx.send(self.registry.stats(self.adapters.len())).map_err(drop),
        };
    }

    fn deregister(&mut self, id: &AdapterId, out: &mut Outbox) {
        if self.adapters.remove(id).is_none() {
            return;
        }
        warn!(adapter = %id, "Adapter deregistered");
        self.registry.remove_adapter(id, out);
        self.search_reported(
            id,
            Some(SearchDeviceError::new("adapter stopped before reporting")),
            out,
        );
    }

    // ------------------------------------------------------------------------
    // Search rounds
    // ------------------------------------------------------------------------

    fn start_search(&mut self, out: &mut Outbox) {
        if self.search.is_some() {
            debug!("Search already running, joining current round");
            return;
        }
        if self.adapters.is_empty() {
            info!("No adapters registered, search completed");
            out.push(TransportEvent::SearchCompleted(SearchSummary::default()));
            return;
        }

        self.search = Some(SearchRound {
            waiting: self.adapters.keys().cloned().collect(),
            summary: SearchSummary::default(),
        });
        debug!(adapters = self.adapters.len(), "Starting device search");
        for adapter in self.adapters.values() {
            adapter.search_devices();
        }
    }

    fn search_reported(
        &mut self,
        adapter: &AdapterId,
        failure: Option<SearchDeviceError>,
        out: &mut Outbox,
    ) {
        let Some(round) = self.search.as_mut().filter(|r| r.waiting.contains(adapter)) else {
            if failure.is_some() {
                warn!(adapter = %adapter, "Ignoring search failure outside a search round");
            }
            return;
        };

        round.waiting.remove(adapter);
        match failure {
            None => round.summary.succeeded.push(adapter.clone()),
            Some(error) => {
                warn!(adapter = %adapter, error = %error, "Device search failed");
                round.summary.failed.push((adapter.clone(), error));
            }
        }

        if round.waiting.is_empty()
            && let Some(round) = self.search.take()
        {
            info!(
                succeeded = round.summary.succeeded.len(),
                failed = round.summary.failed.len(),
                "Device search completed"
            );
            out.push(TransportEvent::SearchCompleted(round.summary));
        }
    }

    // ------------------------------------------------------------------------
    // Adapter events
    // ------------------------------------------------------------------------

    fn handle_adapter_event(&mut self, envelope: AdapterEnvelope) {
        let AdapterEnvelope { adapter, event } = envelope;
        if !self.adapters.contains_key(&adapter) {
            warn!(
                adapter = %adapter,
                event = event.name(),
                "Dropping callback from unregistered adapter"
            );
            return;
        }

        let handle = |uid| DeviceHandle::new(adapter.clone(), uid);
        let registry = &mut self.registry;
        let mut out = Outbox::new();

        match event {
            AdapterEvent::SearchDone { devices } => {
                registry.search_done(&adapter, devices, &mut out);
                self.search_reported(&adapter, None, &mut out);
            }
            AdapterEvent::SearchFailed { error } => {
                self.search_reported(&adapter, Some(error), &mut out);
            }
            AdapterEvent::ConnectDone { device, app } => {
                registry.connect_done(&handle(device), app, &mut out);
            }
            AdapterEvent::ConnectFailed { device, app, error } => {
                registry.connect_failed(&handle(device), app, error, &mut out);
            }
            AdapterEvent::ConnectRequested { device, app } => {
                registry.connect_requested(&handle(device), app, &mut out);
            }
            AdapterEvent::UnexpectedDisconnect { device, app, error } => {
                registry.unexpected_disconnect(&handle(device), app, error, &mut out);
            }
            AdapterEvent::DisconnectDone { device, app } => {
                registry.disconnect_done(&handle(device), app, &mut out);
            }
            AdapterEvent::DisconnectFailed { device, app, error } => {
                registry.disconnect_failed(&handle(device), app, error, &mut out);
            }
            AdapterEvent::DisconnectDeviceDone { device } => {
                registry.disconnect_device_done(&handle(device), &mut out);
            }
            AdapterEvent::DisconnectDeviceFailed { device, error } => {
                registry.disconnect_device_failed(&handle(device), error, &mut out);
            }
            AdapterEvent::SendDone {
                device,
                app,
                message,
            } => registry.send_done(&handle(device), app, message, &mut out),
            AdapterEvent::SendFailed {
                device,
                app,
                message,
                error,
            } => registry.send_failed(&handle(device), app, message, error, &mut out),
            AdapterEvent::ReceiveDone {
                device,
                app,
                message,
            } => registry.receive_done(
                &handle(device),
                app,
                message,
                self.validator.as_deref(),
                &mut out,
            ),
            AdapterEvent::ReceiveFailed { device, app, error } => {
                registry.receive_failed(&handle(device), app, error, &mut out);
            }
            AdapterEvent::CommunicationError { device, app } => {
                registry.communication_error(&handle(device), app, &mut out);
            }
        }

        self.flush(out);
    }
}

/// Adapts an adapter's event queue into a stream for [`SelectAll`].
fn receiver_stream(rx: mpsc::Receiver<AdapterEnvelope>) -> BoxStream<'static, AdapterEnvelope> {
    futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) }).boxed()
}
