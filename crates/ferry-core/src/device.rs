//! Device and session model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{ApplicationHandle, DeviceHandle, DeviceUid};

/// A device as reported by its adapter during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Adapter-assigned identifier.
    pub uid: DeviceUid,
    /// Human-readable name.
    pub name: String,
}

impl DeviceInfo {
    /// Creates device info.
    pub fn new(uid: impl Into<DeviceUid>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
        }
    }
}

/// Connection state of a registered device.
///
/// A device that is not registered is implicitly `Unknown`; a removed device
/// simply disappears from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceState {
    /// Reported by a search, no sessions.
    Discovered,
    /// At least one session pending, none established.
    Connecting,
    /// At least one session established.
    Connected,
    /// A device disconnect is in flight.
    Disconnecting,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// State of a (device, application) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Connect requested, not yet resolved.
    Pending,
    /// Data can flow.
    Established,
    /// Disconnect in flight, or waiting for in-flight sends to resolve.
    Closing,
    /// Terminal. Closed sessions are removed from the registry right after.
    Closed,
}

impl SessionState {
    /// Returns true if a send is permitted in this state.
    pub fn accepts_data(&self) -> bool {
        matches!(self, Self::Established)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Established => "established",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Snapshot of a registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub handle: DeviceHandle,
    pub name: String,
    pub state: DeviceState,
    /// Applications with a live session, in registration order.
    pub apps: Vec<ApplicationHandle>,
}

/// Snapshot of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub device: DeviceHandle,
    pub app: ApplicationHandle,
    pub state: SessionState,
    /// Sends handed to the adapter and not yet resolved.
    pub in_flight: usize,
}
