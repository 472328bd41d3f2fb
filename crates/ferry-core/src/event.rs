//! Upper-layer event model.
//!
//! The transport manager translates adapter callbacks (and its own local
//! validation failures) into [`TransportEvent`]s. The shape is the same for
//! every transport, so observers never see adapter-specific types.

use std::fmt;

use crate::error::{
    CommunicationError, ConnectError, DataReceiveError, DataSendError, DisconnectDeviceError,
    DisconnectError, SearchDeviceError, TransportError,
};
use crate::id::{AdapterId, ApplicationHandle, DeviceHandle};
use crate::message::RawMessage;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller asked for the disconnect.
    Requested,
    /// The adapter reported the session lost.
    Unexpected(CommunicationError),
    /// The owning device was disconnected or removed.
    DeviceRemoved,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Unexpected(e) => write!(f, "unexpected ({})", e.description()),
            Self::DeviceRemoved => f.write_str("device removed"),
        }
    }
}

/// Outcome of one search round across all registered adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Adapters that reported search done.
    pub succeeded: Vec<AdapterId>,
    /// Adapters that reported search failed.
    pub failed: Vec<(AdapterId, SearchDeviceError)>,
}

impl SearchSummary {
    /// Returns true if every adapter succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A transport-agnostic event delivered to upper-layer observers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A device became reachable.
    DeviceDiscovered { device: DeviceHandle, name: String },
    /// A device was removed from the registry.
    DeviceLost { device: DeviceHandle },
    /// Every adapter has reported for the current search round.
    SearchCompleted(SearchSummary),
    /// The remote side asked to open a session.
    ConnectRequested {
        device: DeviceHandle,
        app: ApplicationHandle,
    },
    /// A session is ready for data.
    SessionEstablished {
        device: DeviceHandle,
        app: ApplicationHandle,
    },
    /// A session could not be opened.
    ConnectFailed {
        device: DeviceHandle,
        app: ApplicationHandle,
        error: ConnectError,
    },
    /// A session ended.
    SessionClosed {
        device: DeviceHandle,
        app: ApplicationHandle,
        reason: CloseReason,
    },
    /// A session could not be closed.
    DisconnectFailed {
        device: DeviceHandle,
        app: ApplicationHandle,
        error: DisconnectError,
    },
    /// A device could not be disconnected.
    DisconnectDeviceFailed {
        device: DeviceHandle,
        error: DisconnectDeviceError,
    },
    /// Inbound data.
    DataReceived {
        device: DeviceHandle,
        app: ApplicationHandle,
        message: RawMessage,
    },
    /// Inbound data could not be read or validated. `raw` holds the bytes
    /// when any were received.
    ReceiveFailed {
        device: DeviceHandle,
        app: ApplicationHandle,
        error: DataReceiveError,
        raw: Option<RawMessage>,
    },
    /// A message was handed to the transport.
    DataSent {
        device: DeviceHandle,
        app: ApplicationHandle,
        message: RawMessage,
    },
    /// A message could not be sent.
    SendFailed {
        device: DeviceHandle,
        app: ApplicationHandle,
        message: RawMessage,
        error: DataSendError,
    },
    /// A session was lost or the adapter hit a runtime fault.
    CommunicationError {
        device: DeviceHandle,
        app: ApplicationHandle,
        error: CommunicationError,
    },
}

impl TransportEvent {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceDiscovered { .. } => "device-discovered",
            Self::DeviceLost { .. } => "device-lost",
            Self::SearchCompleted(_) => "search-completed",
            Self::ConnectRequested { .. } => "connect-requested",
            Self::SessionEstablished { .. } => "session-established",
            Self::ConnectFailed { .. } => "connect-failed",
            Self::SessionClosed { .. } => "session-closed",
            Self::DisconnectFailed { .. } => "disconnect-failed",
            Self::DisconnectDeviceFailed { .. } => "disconnect-device-failed",
            Self::DataReceived { .. } => "data-received",
            Self::ReceiveFailed { .. } => "receive-failed",
            Self::DataSent { .. } => "data-sent",
            Self::SendFailed { .. } => "send-failed",
            Self::CommunicationError { .. } => "communication-error",
        }
    }

    /// Returns the device the event refers to, if any.
    pub fn device(&self) -> Option<&DeviceHandle> {
        match self {
            Self::SearchCompleted(_) => None,
            Self::DeviceDiscovered { device, .. }
            | Self::DeviceLost { device }
            | Self::ConnectRequested { device, .. }
            | Self::SessionEstablished { device, .. }
            | Self::ConnectFailed { device, .. }
            | Self::SessionClosed { device, .. }
            | Self::DisconnectFailed { device, .. }
            | Self::DisconnectDeviceFailed { device, .. }
            | Self::DataReceived { device, .. }
            | Self::ReceiveFailed { device, .. }
            | Self::DataSent { device, .. }
            | Self::SendFailed { device, .. }
            | Self::CommunicationError { device, .. } => Some(device),
        }
    }

    /// Returns the application the event refers to, if any.
    pub fn app(&self) -> Option<ApplicationHandle> {
        match self {
            Self::ConnectRequested { app, .. }
            | Self::SessionEstablished { app, .. }
            | Self::ConnectFailed { app, .. }
            | Self::SessionClosed { app, .. }
            | Self::DisconnectFailed { app, .. }
            | Self::DataReceived { app, .. }
            | Self::ReceiveFailed { app, .. }
            | Self::DataSent { app, .. }
            | Self::SendFailed { app, .. }
            | Self::CommunicationError { app, .. } => Some(*app),
            _ => None,
        }
    }

    /// Returns the error carried by a failure event.
    ///
    /// Search failures are reported inside [`SearchSummary`] and are not
    /// returned here.
    pub fn error(&self) -> Option<TransportError> {
        match self {
            Self::ConnectFailed { error, .. } => Some(error.clone().into()),
            Self::DisconnectFailed { error, .. } => Some(error.clone().into()),
            Self::DisconnectDeviceFailed { error, .. } => Some(error.clone().into()),
            Self::ReceiveFailed { error, .. } => Some(error.clone().into()),
            Self::SendFailed { error, .. } => Some(error.clone().into()),
            Self::CommunicationError { error, .. } => Some(error.clone().into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, LocalCause};

    #[test]
    fn test_error_accessor() {
        let event = TransportEvent::SendFailed {
            device: DeviceHandle::new("a", "d1"),
            app: ApplicationHandle::new(1),
            message: RawMessage::new("d1", ApplicationHandle::new(1), vec![1]),
            error: DataSendError::local(LocalCause::UnknownSession),
        };
        let err = event.error().unwrap();
        assert_eq!(err.kind(), ErrorKind::DataSend);
        assert_eq!(err.local_cause(), Some(LocalCause::UnknownSession));
        assert_eq!(event.app(), Some(ApplicationHandle::new(1)));
    }

    #[test]
    fn test_non_error_event() {
        let event = TransportEvent::DeviceLost {
            device: DeviceHandle::new("a", "d1"),
        };
        assert!(event.error().is_none());
        assert!(event.app().is_none());
        assert_eq!(event.device().unwrap().to_string(), "a/d1");
    }
}
