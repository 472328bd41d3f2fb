//! # Ferry
//!
//! A transport manager that multiplexes logical application sessions over
//! physical devices reached through pluggable device adapters.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ connect/send ┌──────────────────┐ request  ┌────────────────┐
//! │ upper layer  │─────────────▶│ TransportManager │─────────▶│ DeviceAdapter  │ tcp, loopback…
//! │  (sessions)  │◀─────────────│  (one dispatch   │◀─────────│ (own tasks)    │
//! └──────────────┘ EventStream  │   task)          │ listener └────────────────┘
//!                               └──────────────────┘
//! ```
//!
//! - **Adapters** discover devices and move bytes; they report every outcome
//!   through a listener.
//! - **The manager** owns the device and session registry, turns adapter
//!   reports into [`TransportEvent`](ferry_core::TransportEvent)s, and rejects
//!   requests that cannot succeed without bothering an adapter.
//! - **Observers** see every event in order.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferry::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TransportManager::new();
//!     manager.register_configured::<LoopbackAdapter>().await?;
//!
//!     let mut events = manager.subscribe().await?;
//!     manager.search().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let TransportEvent::DeviceDiscovered { device, .. } = &event {
//!             manager.connect(device, ApplicationHandle::new(1)).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `loopback` (default): in-process scripted adapter
//! - `tcp`: TCP adapter
//! - `codec` (default): validated payload types and `#[derive(Validated)]`
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output

pub use ferry_core as core;
pub use ferry_runtime as runtime;

#[cfg(feature = "codec")]
pub use ferry_codec as codec;

#[cfg(feature = "loopback")]
pub use ferry_adapter_loopback as loopback;

#[cfg(feature = "tcp")]
pub use ferry_adapter_tcp as tcp;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ferry::prelude::*;
/// ```
pub mod prelude {
    // Manager - main entry point
    pub use ferry_runtime::{
        EventStream, RuntimeError, RuntimeResult, TransportManager, TransportObserver,
    };

    // Identifiers and data
    pub use ferry_core::{AdapterId, ApplicationHandle, DeviceHandle, DeviceUid, RawMessage};

    // Events and state
    pub use ferry_core::{CloseReason, DeviceState, SessionState, TransportEvent};

    // Adapter contract, for custom adapters
    pub use ferry_core::{ConfigurableAdapter, DeviceAdapter, DeviceAdapterListener};

    #[cfg(feature = "codec")]
    pub use ferry_codec::{JsonPayloadValidator, Validated, validate_payload};

    #[cfg(feature = "loopback")]
    pub use ferry_adapter_loopback::LoopbackAdapter;

    #[cfg(feature = "tcp")]
    pub use ferry_adapter_tcp::TcpAdapter;
}
