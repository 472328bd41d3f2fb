//! Identifier types.
//!
//! A [`DeviceUid`] is minted by an adapter and is only unique within that
//! adapter; the transport manager pairs it with the [`AdapterId`] to form a
//! [`DeviceHandle`], the global device key used by upper layers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Creates an identifier from any string.
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(Arc::from(id.as_ref()))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(Arc::from(id))
            }
        }
    };
}

string_id!(
    /// Stable identity of a registered device adapter (e.g. `"tcp"`, `"bt-0"`).
    AdapterId
);

string_id!(
    /// Adapter-assigned identifier of a physical device.
    DeviceUid
);

/// Identifier of a logical application session multiplexed over a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationHandle(u32);

impl ApplicationHandle {
    /// Creates an application handle.
    pub const fn new(handle: u32) -> Self {
        Self(handle)
    }

    /// Returns the raw handle value.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ApplicationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ApplicationHandle {
    fn from(handle: u32) -> Self {
        Self(handle)
    }
}

/// Globally unique device key: the owning adapter plus its device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// The adapter that owns the device.
    pub adapter: AdapterId,
    /// The adapter-assigned device identifier.
    pub uid: DeviceUid,
}

impl DeviceHandle {
    /// Creates a device handle.
    pub fn new(adapter: impl Into<AdapterId>, uid: impl Into<DeviceUid>) -> Self {
        Self {
            adapter: adapter.into(),
            uid: uid.into(),
        }
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.adapter, self.uid)
    }
}
