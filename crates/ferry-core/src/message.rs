//! The unit of data transfer.
//!
//! A [`RawMessage`] is an immutable byte payload tagged with its destination
//! (or, for inbound data, its origin) device and application. Cloning is a
//! reference-count increment: the requester, the transport manager and the
//! adapter can all hold the same message while it is in flight, and the
//! buffer is freed when the last holder drops it.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::id::{ApplicationHandle, DeviceUid};

/// Immutable, shared byte payload tagged with device and application.
#[derive(Clone, PartialEq, Eq)]
pub struct RawMessage {
    device: DeviceUid,
    app: ApplicationHandle,
    data: Arc<[u8]>,
}

impl RawMessage {
    /// Creates a message for the given device and application.
    pub fn new(
        device: impl Into<DeviceUid>,
        app: ApplicationHandle,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            device: device.into(),
            app,
            data: data.into(),
        }
    }

    /// Returns the device this message is addressed to or came from.
    pub fn device(&self) -> &DeviceUid {
        &self.device
    }

    /// Returns the application this message is addressed to or came from.
    pub fn app(&self) -> ApplicationHandle {
        self.app
    }

    /// Returns the payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if both messages share the same underlying buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Returns the number of live holders of the payload buffer.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

impl Deref for RawMessage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for RawMessage {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMessage")
            .field("device", &self.device)
            .field("app", &self.app)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_buffer() {
        let msg = RawMessage::new("d1", ApplicationHandle::new(1), vec![0x01, 0x02]);
        let copy = msg.clone();
        assert!(msg.ptr_eq(&copy));
        assert_eq!(msg.holders(), 2);
        drop(copy);
        assert_eq!(msg.holders(), 1);
        assert_eq!(&*msg, &[0x01, 0x02]);
    }

    #[test]
    fn test_equal_content_different_buffer() {
        let a = RawMessage::new("d1", ApplicationHandle::new(1), vec![7]);
        let b = RawMessage::new("d1", ApplicationHandle::new(1), vec![7]);
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
    }
}
