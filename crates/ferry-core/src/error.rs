//! Unified error types for the Ferry core.
//!
//! Every fallible asynchronous operation has its own error type, so an
//! observer can decide on a retry policy from the type (or [`ErrorKind`])
//! alone without parsing the description:
//!
//! | Operation | Error |
//! |---|---|
//! | device search | [`SearchDeviceError`] |
//! | connect | [`ConnectError`] |
//! | disconnect | [`DisconnectError`] |
//! | device disconnect | [`DisconnectDeviceError`] |
//! | send | [`DataSendError`] |
//! | receive | [`DataReceiveError`] |
//! | unexpected disconnect / runtime fault | [`CommunicationError`] |
//!
//! Errors synthesized by the transport manager itself (unknown device,
//! missing session, ...) carry a [`LocalCause`]; errors reported by an
//! adapter do not.

use std::fmt;

use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// The operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Search,
    Connect,
    Disconnect,
    DisconnectDevice,
    DataSend,
    DataReceive,
    Communication,
}

impl ErrorKind {
    /// Returns the kind name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::DisconnectDevice => "disconnect-device",
            Self::DataSend => "data-send",
            Self::DataReceive => "data-receive",
            Self::Communication => "communication",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the transport manager rejected a request without contacting an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalCause {
    /// The adapter is not registered.
    UnknownAdapter,
    /// The device is not in the registry.
    UnknownDevice,
    /// No session exists for the (device, application) pair.
    UnknownSession,
    /// The device or session is in a state that does not permit the request.
    InvalidState,
    /// A session for the pair is already pending or established.
    SessionExists,
}

impl fmt::Display for LocalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::UnknownAdapter => "adapter unknown",
            Self::UnknownDevice => "device unknown",
            Self::UnknownSession => "session unknown",
            Self::InvalidState => "operation not permitted in current state",
            Self::SessionExists => "session already exists",
        };
        f.write_str(text)
    }
}

// =============================================================================
// Operation Errors
// =============================================================================

macro_rules! operation_error {
    ($(#[$meta:meta])* $name:ident, $kind:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Error)]
        #[error("{}: {}", $label, .description)]
        pub struct $name {
            description: String,
            cause: Option<LocalCause>,
        }

        impl $name {
            /// Creates an adapter-reported error with a diagnostic description.
            pub fn new(description: impl Into<String>) -> Self {
                Self {
                    description: description.into(),
                    cause: None,
                }
            }

            /// Creates an error synthesized by the transport manager.
            pub fn local(cause: LocalCause) -> Self {
                Self {
                    description: cause.to_string(),
                    cause: Some(cause),
                }
            }

            /// Returns the diagnostic description.
            pub fn description(&self) -> &str {
                &self.description
            }

            /// Returns the local cause, if the manager produced this error.
            pub fn local_cause(&self) -> Option<LocalCause> {
                self.cause
            }

            /// Returns true if no adapter was involved in this failure.
            pub fn is_local(&self) -> bool {
                self.cause.is_some()
            }

            /// Returns the operation kind.
            pub fn kind(&self) -> ErrorKind {
                ErrorKind::$kind
            }
        }
    };
}

operation_error!(
    /// Device discovery failed.
    SearchDeviceError,
    Search,
    "device search failed"
);

operation_error!(
    /// Opening an application session failed.
    ConnectError,
    Connect,
    "connect failed"
);

operation_error!(
    /// Closing an application session failed.
    DisconnectError,
    Disconnect,
    "disconnect failed"
);

operation_error!(
    /// Disconnecting an entire device failed.
    DisconnectDeviceError,
    DisconnectDevice,
    "device disconnect failed"
);

operation_error!(
    /// Sending a message failed.
    DataSendError,
    DataSend,
    "data send failed"
);

operation_error!(
    /// Receiving or validating inbound data failed.
    DataReceiveError,
    DataReceive,
    "data receive failed"
);

operation_error!(
    /// An established session was lost, or the adapter hit a runtime fault.
    CommunicationError,
    Communication,
    "communication error"
);

// =============================================================================
// Unified Transport Error
// =============================================================================

/// Any operation error, as seen by upper-layer observers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error(transparent)]
    Search(#[from] SearchDeviceError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Disconnect(#[from] DisconnectError),
    #[error(transparent)]
    DisconnectDevice(#[from] DisconnectDeviceError),
    #[error(transparent)]
    DataSend(#[from] DataSendError),
    #[error(transparent)]
    DataReceive(#[from] DataReceiveError),
    #[error(transparent)]
    Communication(#[from] CommunicationError),
}

impl TransportError {
    /// Returns the operation kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Search(e) => e.kind(),
            Self::Connect(e) => e.kind(),
            Self::Disconnect(e) => e.kind(),
            Self::DisconnectDevice(e) => e.kind(),
            Self::DataSend(e) => e.kind(),
            Self::DataReceive(e) => e.kind(),
            Self::Communication(e) => e.kind(),
        }
    }

    /// Returns the diagnostic description.
    pub fn description(&self) -> &str {
        match self {
            Self::Search(e) => e.description(),
            Self::Connect(e) => e.description(),
            Self::Disconnect(e) => e.description(),
            Self::DisconnectDevice(e) => e.description(),
            Self::DataSend(e) => e.description(),
            Self::DataReceive(e) => e.description(),
            Self::Communication(e) => e.description(),
        }
    }

    /// Returns the local cause, if the manager produced this error.
    pub fn local_cause(&self) -> Option<LocalCause> {
        match self {
            Self::Search(e) => e.local_cause(),
            Self::Connect(e) => e.local_cause(),
            Self::Disconnect(e) => e.local_cause(),
            Self::DisconnectDevice(e) => e.local_cause(),
            Self::DataSend(e) => e.local_cause(),
            Self::DataReceive(e) => e.local_cause(),
            Self::Communication(e) => e.local_cause(),
        }
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors that can occur in adapter lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The adapter could not be started.
    #[error("failed to start adapter '{adapter}': {reason}")]
    StartFailed {
        /// The adapter that failed.
        adapter: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid adapter configuration.
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),

    /// Internal adapter error.
    #[error("adapter error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl AdapterError {
    /// Creates an internal adapter error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates a start failure.
    pub fn start_failed(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartFailed {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for adapter lifecycle operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
