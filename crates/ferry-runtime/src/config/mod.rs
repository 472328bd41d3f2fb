//! Configuration module for the Ferry runtime.
//!
//! This module provides layered configuration loading (files, environment,
//! programmatic overrides) and validation for the transport manager, its
//! logging, and per-adapter settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    FerryConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ManagerConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
