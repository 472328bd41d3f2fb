//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// No enabled format feature handles this extension.
    #[error("No enabled format handles .{0} files")]
    UnsupportedFormat(String),

    /// The merged providers do not match [`FerryConfig`](super::FerryConfig).
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    /// A value required by another setting is absent.
    #[error("`{key}` is required when {because}")]
    Required { key: String, because: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn required(key: impl Into<String>, because: impl Into<String>) -> Self {
        Self::Required {
            key: key.into(),
            because: because.into(),
        }
    }

    /// The dotted key the error refers to, when there is one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Invalid { key, .. } | Self::Required { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
