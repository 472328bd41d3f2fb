//! # Ferry Core
//!
//! Building blocks shared by the transport manager and every device adapter.
//!
//! - **Identifiers**: [`AdapterId`], [`DeviceUid`], [`ApplicationHandle`], [`DeviceHandle`]
//! - **Data**: [`RawMessage`], an immutable reference-counted payload
//! - **Errors**: one type per operation ([`ConnectError`], [`DataSendError`], ...)
//!   unified in [`TransportError`]
//! - **Adapter contract**: [`DeviceAdapter`] and [`DeviceAdapterListener`]
//! - **Upper-layer events**: [`TransportEvent`]
//!
//! ## Event Flow
//!
//! ```text
//! ┌─────────────┐ request  ┌───────────────┐
//! │  Transport  │─────────▶│ DeviceAdapter │  (own tasks / threads)
//! │   Manager   │◀─────────│  (tcp, usb…)  │
//! └─────────────┘ listener └───────────────┘
//!        │
//!        ▼ TransportEvent
//!   observers
//! ```

pub mod adapter;
pub mod device;
pub mod error;
pub mod event;
pub mod id;
pub mod listener;
pub mod message;
pub mod validator;

pub use adapter::{BoxedAdapter, ConfigurableAdapter, DeviceAdapter};
pub use device::{DeviceInfo, DeviceSnapshot, DeviceState, SessionSnapshot, SessionState};
pub use error::{
    AdapterError, AdapterResult, CommunicationError, ConnectError, DataReceiveError,
    DataSendError, DisconnectDeviceError, DisconnectError, ErrorKind, LocalCause,
    SearchDeviceError, TransportError,
};
pub use event::{CloseReason, SearchSummary, TransportEvent};
pub use id::{AdapterId, ApplicationHandle, DeviceHandle, DeviceUid};
pub use listener::{
    AdapterEnvelope, AdapterEvent, BoxedListener, ChannelListener, DeviceAdapterListener,
};
pub use message::RawMessage;
pub use validator::{BoxedValidator, PayloadValidator};
