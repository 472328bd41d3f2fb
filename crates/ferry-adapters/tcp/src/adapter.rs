//! The TCP adapter.
//!
//! Every request is resolved on a spawned task. Sends are queued on the
//! session's writer synchronously, so they hit the socket in request order.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{
    AdapterError, AdapterId, AdapterResult, ApplicationHandle, BoxedListener, ConfigurableAdapter,
    ConnectError, DataSendError, DeviceAdapter, DeviceInfo, DeviceUid, DisconnectDeviceError,
    DisconnectError, RawMessage,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PeerConfig, TcpConfig};
use crate::session::{self, Link, Session, SessionKey, Sessions};

/// Device adapter speaking length-delimited frames over TCP.
pub struct TcpAdapter {
    id: AdapterId,
    config: Arc<TcpConfig>,
    listener: watch::Sender<Option<BoxedListener>>,
    sessions: Sessions,
    connecting: Connecting,
    shutdown: CancellationToken,
}

type Connecting = Arc<Mutex<HashSet<SessionKey>>>;

/// Holds a session key while its socket is being opened.
struct Reservation {
    key: SessionKey,
    connecting: Connecting,
}

impl Reservation {
    /// Claims `key` unless it has a session or a connect in progress.
    fn claim(sessions: &Sessions, connecting: &Connecting, key: SessionKey) -> Option<Self> {
        let open = sessions.lock();
        if open.contains_key(&key) || !connecting.lock().insert(key.clone()) {
            return None;
        }
        Some(Self {
            key,
            connecting: Arc::clone(connecting),
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.connecting.lock().remove(&self.key);
    }
}

impl TcpAdapter {
    pub fn new(config: TcpConfig) -> Self {
        let (listener, _) = watch::channel(None);
        Self {
            id: AdapterId::new(&config.id),
            config: Arc::new(config),
            listener,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            connecting: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn builder() -> TcpAdapterBuilder {
        TcpAdapterBuilder::default()
    }

    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Number of open sockets.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Runs `f` on a new task once the listener is bound.
    fn spawn_reporting<F, Fut>(&self, f: F)
    where
        F: FnOnce(BoxedListener) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut bound = self.listener.subscribe();
        tokio::spawn(async move {
            let listener = match bound.wait_for(Option::is_some).await {
                Ok(listener) => listener.clone(),
                Err(_) => return,
            };
            if let Some(listener) = listener {
                f(listener).await;
            }
        });
    }

    fn peer(&self, device: &DeviceUid) -> Option<PeerConfig> {
        self.config.peer(device.as_str()).cloned()
    }
}

#[async_trait]
impl DeviceAdapter for TcpAdapter {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn transport(&self) -> &'static str {
        "tcp"
    }

    async fn start(&self, listener: BoxedListener) -> AdapterResult<()> {
        if self.listener.borrow().is_some() {
            return Err(AdapterError::start_failed(self.id.as_str(), "already started"));
        }
        self.listener.send_replace(Some(listener));
        info!(adapter = %self.id, peers = self.config.peers.len(), "TCP adapter started");
        Ok(())
    }

    async fn shutdown(&self) -> AdapterResult<()> {
        self.shutdown.cancel();
        let closed = {
            let mut sessions = self.sessions.lock();
            let count = sessions.len();
            sessions.clear();
            count
        };
        info!(adapter = %self.id, sessions = closed, "TCP adapter shut down");
        Ok(())
    }

    fn search_devices(&self) {
        let id = self.id.clone();
        let devices: Vec<DeviceInfo> = self
            .config
            .peers
            .iter()
            .map(|p| DeviceInfo::new(p.name.as_str(), p.name.as_str()))
            .collect();
        self.spawn_reporting(move |listener| async move {
            listener.on_search_done(&id, devices).await;
        });
    }

    fn connect(&self, device: &DeviceUid, app: ApplicationHandle) {
        let id = self.id.clone();
        let device = device.clone();
        let peer = self.peer(&device);
        let config = Arc::clone(&self.config);
        let sessions = Arc::clone(&self.sessions);
        let connecting = Arc::clone(&self.connecting);
        let shutdown = self.shutdown.clone();

        self.spawn_reporting(move |listener| async move {
            let Some(peer) = peer else {
                let error = ConnectError::new(format!("unknown peer {device}"));
                listener.on_connect_failed(&id, &device, app, error).await;
                return;
            };
            let Some(reservation) =
                Reservation::claim(&sessions, &connecting, (device.clone(), app))
            else {
                let error = ConnectError::new(format!("application {app} is already connected"));
                listener.on_connect_failed(&id, &device, app, error).await;
                return;
            };

            debug!(
                adapter = %id,
                device = %device,
                app = %app,
                address = %peer.address,
                "Connecting"
            );
            match session::open(&peer.address, app, &config).await {
                Ok(framed) => {
                    let link = Link {
                        adapter: id.clone(),
                        device: device.clone(),
                        app,
                        listener: Arc::clone(&listener),
                    };
                    let reader = session::establish(framed, link, &sessions, &shutdown);
                    drop(reservation);
                    info!(adapter = %id, device = %device, app = %app, "Socket connected");
                    listener.on_connect_done(&id, &device, app).await;
                    reader.spawn();
                }
                Err(e) => {
                    drop(reservation);
                    warn!(
                        adapter = %id,
                        device = %device,
                        app = %app,
                        error = %e,
                        "Connect failed"
                    );
                    listener
                        .on_connect_failed(&id, &device, app, ConnectError::new(e.to_string()))
                        .await;
                }
            }
        });
    }

    fn disconnect(&self, device: &DeviceUid, app: ApplicationHandle) {
        let id = self.id.clone();
        let device = device.clone();
        let sessions = Arc::clone(&self.sessions);

        self.spawn_reporting(move |listener| async move {
            let removed = sessions.lock().remove(&(device.clone(), app));
            match removed {
                Some(session) => {
                    session.close().await;
                    debug!(adapter = %id, device = %device, app = %app, "Socket closed");
                    listener.on_disconnect_done(&id, &device, app).await;
                }
                None => {
                    let error = DisconnectError::new(format!("application {app} is not connected"));
                    listener.on_disconnect_failed(&id, &device, app, error).await;
                }
            }
        });
    }

    fn disconnect_device(&self, device: &DeviceUid) {
        let id = self.id.clone();
        let device = device.clone();
        let known = self.peer(&device).is_some();
        let sessions = Arc::clone(&self.sessions);

        self.spawn_reporting(move |listener| async move {
            if !known {
                let error = DisconnectDeviceError::new(format!("unknown peer {device}"));
                listener.on_disconnect_device_failed(&id, &device, error).await;
                return;
            }

            let closing: Vec<Session> = {
                let mut sessions = sessions.lock();
                let keys: Vec<_> = sessions.keys().filter(|(d, _)| *d == device).cloned().collect();
                keys.iter().filter_map(|k| sessions.remove(k)).collect()
            };
            debug!(adapter = %id, device = %device, sessions = closing.len(), "Closing device");
            for session in closing {
                session.close().await;
            }
            listener.on_disconnect_device_done(&id, &device).await;
        });
    }

    fn send(&self, message: RawMessage) {
        let key = (message.device().clone(), message.app());
        let rejected = match self.sessions.lock().get(&key) {
            Some(session) => session.send(message).err(),
            None => Some(message),
        };

        if let Some(message) = rejected {
            let id = self.id.clone();
            self.spawn_reporting(move |listener| async move {
                let (device, app) = (message.device().clone(), message.app());
                let error = DataSendError::new(format!("application {app} is not connected"));
                listener.on_data_send_failed(&id, &device, app, message, error).await;
            });
        }
    }
}

impl ConfigurableAdapter for TcpAdapter {
    type Config = TcpConfig;

    fn name() -> &'static str {
        "tcp"
    }

    fn from_config(config: Self::Config) -> AdapterResult<Self> {
        if config.id.trim().is_empty() {
            return Err(AdapterError::InvalidConfig("tcp id must not be empty".into()));
        }
        if config.max_frame_length == 0 {
            return Err(AdapterError::InvalidConfig("max_frame_length must be positive".into()));
        }
        let mut names: Vec<&str> = config.peers.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(AdapterError::InvalidConfig(format!("duplicate peer name '{}'", pair[0])));
        }
        Ok(Self::new(config))
    }
}

/// Builder for [`TcpAdapter`].
#[derive(Default)]
pub struct TcpAdapterBuilder {
    config: TcpConfig,
}

impl TcpAdapterBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Adds a peer reachable at `address` (`host:port`).
    pub fn peer(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.config.peers.push(PeerConfig::new(name, address));
        self
    }

    pub fn connect_timeout_ms(mut self, millis: u64) -> Self {
        self.config.connect_timeout_ms = millis;
        self
    }

    pub fn build(self) -> Arc<TcpAdapter> {
        Arc::new(TcpAdapter::new(self.config))
    }
}
