//! Ferry Runtime - the transport manager.
//!
//! This crate provides:
//! - The [`TransportManager`], routing requests to device adapters and
//!   adapter outcomes to observers
//! - The device and session registry behind it ([`RegistryStats`])
//! - Event delivery ([`TransportObserver`], [`EventStream`])
//! - Layered configuration ([`ConfigLoader`]) and logging setup
//!
//! # Threading
//!
//! All registry state lives on one dispatch task. Adapters report from their
//! own tasks or threads through a bounded queue per adapter; callers talk to
//! the dispatch task through a bounded command queue. Neither side blocks on
//! the other beyond queue back-pressure.
//!
//! ```ignore
//! use ferry_runtime::TransportManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TransportManager::new();
//!     manager.register_adapter(my_adapter).await?;
//!     manager.search().await?;
//!
//!     // Run until Ctrl+C
//!     manager.run_until_signal().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
mod dispatch;
pub mod error;
pub mod logging;
pub mod manager;
pub mod observer;
mod registry;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, FerryConfig, LoggingConfig, ManagerConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use manager::{TransportManager, TransportManagerBuilder};
pub use observer::{BoxedObserver, EventStream, TransportObserver};
pub use registry::RegistryStats;
