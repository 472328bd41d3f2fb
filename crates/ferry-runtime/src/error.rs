//! Runtime error types.

use ferry_core::AdapterId;
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while managing adapters.
///
/// Transport operation failures are never returned here; they are delivered
/// as events.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An adapter with the same id is already registered.
    #[error("Adapter already registered: {0}")]
    AdapterExists(AdapterId),

    /// The manager has been shut down.
    #[error("Transport manager is shut down")]
    ShutDown,

    /// Adapter configuration deserialization failed.
    #[error("Failed to deserialize adapter config: {0}")]
    AdapterConfigDeserialize(String),

    /// Adapter error.
    #[error("Adapter error: {0}")]
    Adapter(#[from] ferry_core::AdapterError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Installing a shutdown signal handler failed.
    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
