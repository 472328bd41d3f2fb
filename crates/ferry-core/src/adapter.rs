//! Device adapter trait.
//!
//! A device adapter drives one transport (Bluetooth, USB, TCP, ...): device
//! discovery, session setup and teardown, and data transfer. Adapters are
//! independent concurrency domains. Request methods never block; they hand
//! the work to the adapter's own tasks or threads and return, and the outcome
//! arrives later through the [`DeviceAdapterListener`] passed to
//! [`DeviceAdapter::start`].
//!
//! # Architecture
//!
//! ```text
//! TransportManager ──request──▶ DeviceAdapter (transport-specific)
//!        ▲                             │
//!        └──── DeviceAdapterListener ◀─┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! #[async_trait]
//! impl DeviceAdapter for UsbAdapter {
//!     fn id(&self) -> &AdapterId {
//!         &self.id
//!     }
//!
//!     async fn start(&self, listener: BoxedListener) -> AdapterResult<()> {
//!         *self.listener.lock() = Some(listener);
//!         Ok(())
//!     }
//!
//!     fn search_devices(&self) {
//!         let (id, listener) = (self.id.clone(), self.listener());
//!         tokio::spawn(async move {
//!             let devices = enumerate_usb().await;
//!             listener.on_search_done(&id, devices).await;
//!         });
//!     }
//!     // ...
//! }
//! ```
//!
//! [`DeviceAdapterListener`]: crate::listener::DeviceAdapterListener

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::id::{AdapterId, ApplicationHandle, DeviceUid};
use crate::listener::BoxedListener;
use crate::message::RawMessage;

/// The device adapter trait.
///
/// Every request accepted by an adapter must resolve with exactly one
/// terminal listener callback (the matching done or failed), identifying the
/// same device and application it was issued for.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Returns the adapter's stable identity.
    fn id(&self) -> &AdapterId;

    /// Returns the transport kind, for logging (e.g. `"tcp"`).
    fn transport(&self) -> &'static str {
        "unknown"
    }

    /// Binds the listener and starts the adapter's background work.
    async fn start(&self, listener: BoxedListener) -> AdapterResult<()>;

    /// Stops background work and releases transport resources.
    async fn shutdown(&self) -> AdapterResult<()> {
        Ok(())
    }

    /// Starts a device search. Resolves with search done or search failed.
    fn search_devices(&self);

    /// Opens a session for `app` on `device`.
    fn connect(&self, device: &DeviceUid, app: ApplicationHandle);

    /// Closes the session for `app` on `device`.
    fn disconnect(&self, device: &DeviceUid, app: ApplicationHandle);

    /// Disconnects the whole device, closing every session on it.
    fn disconnect_device(&self, device: &DeviceUid);

    /// Sends a message to the device and application it is tagged with.
    fn send(&self, message: RawMessage);
}

/// A shared adapter trait object.
pub type BoxedAdapter = Arc<dyn DeviceAdapter>;

/// Trait for adapters that can be created from configuration.
///
/// Separates compile-time concerns (`Config` type, `from_config()`)
/// from the object-safe [`DeviceAdapter`] trait.
pub trait ConfigurableAdapter: DeviceAdapter {
    /// The configuration type, deserialized from `adapters.<name>`.
    type Config: serde::de::DeserializeOwned + Default;

    /// Returns the adapter name used as the config key.
    fn name() -> &'static str
    where
        Self: Sized;

    /// Creates an adapter instance from its deserialized configuration.
    fn from_config(config: Self::Config) -> AdapterResult<Self>
    where
        Self: Sized;
}
