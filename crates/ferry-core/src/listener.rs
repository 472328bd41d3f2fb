//! The device adapter listener contract.
//!
//! Adapters report every asynchronous outcome through a
//! [`DeviceAdapterListener`]. The listener is pure notification: nothing it
//! returns influences the adapter. Every method names the originating
//! adapter first, so one listener can multiplex many adapters.
//!
//! Each request an adapter accepts resolves with exactly one terminal
//! callback:
//!
//! | Request | Success | Failure |
//! |---|---|---|
//! | `search_devices` | [`on_search_done`] | [`on_search_failed`] |
//! | `connect` | [`on_connect_done`] | [`on_connect_failed`] |
//! | `disconnect` | [`on_disconnect_done`] | [`on_disconnect_failed`] |
//! | `disconnect_device` | [`on_disconnect_device_done`] | [`on_disconnect_device_failed`] |
//! | `send` | [`on_data_send_done`] | [`on_data_send_failed`] |
//!
//! Adapter-initiated notifications have no matching request:
//! [`on_connect_requested`], [`on_data_receive_done`],
//! [`on_data_receive_failed`], [`on_unexpected_disconnect`] and
//! [`on_communication_error`].
//!
//! [`ChannelListener`] is the channel-backed implementation the transport
//! manager hands to adapters: every callback becomes an [`AdapterEnvelope`]
//! on a bounded queue. When the queue is full the callback waits, so
//! backpressure lands on the adapter, never on the consumer. Adapters that
//! run plain OS threads can drive callbacks with
//! `futures::executor::block_on`.
//!
//! [`on_search_done`]: DeviceAdapterListener::on_search_done
//! [`on_search_failed`]: DeviceAdapterListener::on_search_failed
//! [`on_connect_done`]: DeviceAdapterListener::on_connect_done
//! [`on_connect_failed`]: DeviceAdapterListener::on_connect_failed
//! [`on_connect_requested`]: DeviceAdapterListener::on_connect_requested
//! [`on_disconnect_done`]: DeviceAdapterListener::on_disconnect_done
//! [`on_disconnect_failed`]: DeviceAdapterListener::on_disconnect_failed
//! [`on_disconnect_device_done`]: DeviceAdapterListener::on_disconnect_device_done
//! [`on_disconnect_device_failed`]: DeviceAdapterListener::on_disconnect_device_failed
//! [`on_data_send_done`]: DeviceAdapterListener::on_data_send_done
//! [`on_data_send_failed`]: DeviceAdapterListener::on_data_send_failed
//! [`on_data_receive_done`]: DeviceAdapterListener::on_data_receive_done
//! [`on_data_receive_failed`]: DeviceAdapterListener::on_data_receive_failed
//! [`on_unexpected_disconnect`]: DeviceAdapterListener::on_unexpected_disconnect
//! [`on_communication_error`]: DeviceAdapterListener::on_communication_error

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::device::DeviceInfo;
use crate::error::{
    CommunicationError, ConnectError, DataReceiveError, DataSendError, DisconnectDeviceError,
    DisconnectError, SearchDeviceError,
};
use crate::id::{AdapterId, ApplicationHandle, DeviceUid};
use crate::message::RawMessage;

// =============================================================================
// Listener Trait
// =============================================================================

/// Callback contract adapters use to report asynchronous outcomes.
#[async_trait]
pub trait DeviceAdapterListener: Send + Sync {
    /// Device search finished; `devices` is the adapter's current device list.
    async fn on_search_done(&self, adapter: &AdapterId, devices: Vec<DeviceInfo>);

    /// Device search failed.
    async fn on_search_failed(&self, adapter: &AdapterId, error: SearchDeviceError);

    /// A session was opened.
    async fn on_connect_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    );

    /// A session could not be opened.
    async fn on_connect_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: ConnectError,
    );

    /// The remote side asked to open a session.
    async fn on_connect_requested(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    );

    /// An established session was lost without being asked to close.
    async fn on_unexpected_disconnect(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: CommunicationError,
    );

    /// A session was closed on request.
    async fn on_disconnect_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    );

    /// A session could not be closed.
    async fn on_disconnect_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: DisconnectError,
    );

    /// The whole device was disconnected.
    async fn on_disconnect_device_done(&self, adapter: &AdapterId, device: &DeviceUid);

    /// The device could not be disconnected.
    async fn on_disconnect_device_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        error: DisconnectDeviceError,
    );

    /// A message was written to the transport.
    async fn on_data_send_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
    );

    /// A message could not be written; the message is handed back.
    async fn on_data_send_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
        error: DataSendError,
    );

    /// Inbound data arrived.
    async fn on_data_receive_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
    );

    /// Inbound data could not be read.
    async fn on_data_receive_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: DataReceiveError,
    );

    /// A runtime fault not tied to a single operation.
    async fn on_communication_error(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    );
}

/// A shared listener trait object.
pub type BoxedListener = Arc<dyn DeviceAdapterListener>;

// =============================================================================
// Event Form
// =============================================================================

/// A listener callback in message form.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    SearchDone {
        devices: Vec<DeviceInfo>,
    },
    SearchFailed {
        error: SearchDeviceError,
    },
    ConnectDone {
        device: DeviceUid,
        app: ApplicationHandle,
    },
    ConnectFailed {
        device: DeviceUid,
        app: ApplicationHandle,
        error: ConnectError,
    },
    ConnectRequested {
        device: DeviceUid,
        app: ApplicationHandle,
    },
    UnexpectedDisconnect {
        device: DeviceUid,
        app: ApplicationHandle,
        error: CommunicationError,
    },
    DisconnectDone {
        device: DeviceUid,
        app: ApplicationHandle,
    },
    DisconnectFailed {
        device: DeviceUid,
        app: ApplicationHandle,
        error: DisconnectError,
    },
    DisconnectDeviceDone {
        device: DeviceUid,
    },
    DisconnectDeviceFailed {
        device: DeviceUid,
        error: DisconnectDeviceError,
    },
    SendDone {
        device: DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
    },
    SendFailed {
        device: DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
        error: DataSendError,
    },
    ReceiveDone {
        device: DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
    },
    ReceiveFailed {
        device: DeviceUid,
        app: ApplicationHandle,
        error: DataReceiveError,
    },
    CommunicationError {
        device: DeviceUid,
        app: ApplicationHandle,
    },
}

impl AdapterEvent {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchDone { .. } => "search-done",
            Self::SearchFailed { .. } => "search-failed",
            Self::ConnectDone { .. } => "connect-done",
            Self::ConnectFailed { .. } => "connect-failed",
            Self::ConnectRequested { .. } => "connect-requested",
            Self::UnexpectedDisconnect { .. } => "unexpected-disconnect",
            Self::DisconnectDone { .. } => "disconnect-done",
            Self::DisconnectFailed { .. } => "disconnect-failed",
            Self::DisconnectDeviceDone { .. } => "disconnect-device-done",
            Self::DisconnectDeviceFailed { .. } => "disconnect-device-failed",
            Self::SendDone { .. } => "send-done",
            Self::SendFailed { .. } => "send-failed",
            Self::ReceiveDone { .. } => "receive-done",
            Self::ReceiveFailed { .. } => "receive-failed",
            Self::CommunicationError { .. } => "communication-error",
        }
    }

    /// Returns the device the event refers to, if any.
    pub fn device(&self) -> Option<&DeviceUid> {
        match self {
            Self::SearchDone { .. } | Self::SearchFailed { .. } => None,
            Self::ConnectDone { device, .. }
            | Self::ConnectFailed { device, .. }
            | Self::ConnectRequested { device, .. }
            | Self::UnexpectedDisconnect { device, .. }
            | Self::DisconnectDone { device, .. }
            | Self::DisconnectFailed { device, .. }
            | Self::DisconnectDeviceDone { device }
            | Self::DisconnectDeviceFailed { device, .. }
            | Self::SendDone { device, .. }
            | Self::SendFailed { device, .. }
            | Self::ReceiveDone { device, .. }
            | Self::ReceiveFailed { device, .. }
            | Self::CommunicationError { device, .. } => Some(device),
        }
    }
}

/// An [`AdapterEvent`] tagged with the adapter that reported it.
#[derive(Debug, Clone)]
pub struct AdapterEnvelope {
    pub adapter: AdapterId,
    pub event: AdapterEvent,
}

// =============================================================================
// Channel Listener
// =============================================================================

/// Listener that forwards every callback into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::Sender<AdapterEnvelope>,
}

impl ChannelListener {
    /// Creates a listener over an existing sender.
    pub fn new(tx: mpsc::Sender<AdapterEnvelope>) -> Self {
        Self { tx }
    }

    /// Creates a listener and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AdapterEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Returns true once the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn forward(&self, adapter: &AdapterId, event: AdapterEvent) {
        let name = event.name();
        let envelope = AdapterEnvelope {
            adapter: adapter.clone(),
            event,
        };
        if self.tx.send(envelope).await.is_err() {
            trace!(adapter = %adapter, event = name, "Listener queue closed, dropping event");
        }
    }
}

#[async_trait]
impl DeviceAdapterListener for ChannelListener {
    async fn on_search_done(&self, adapter: &AdapterId, devices: Vec<DeviceInfo>) {
        self.forward(adapter, AdapterEvent::SearchDone { devices }).await;
    }

    async fn on_search_failed(&self, adapter: &AdapterId, error: SearchDeviceError) {
        self.forward(adapter, AdapterEvent::SearchFailed { error }).await;
    }

    async fn on_connect_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::ConnectDone { device, app }).await;
    }

    async fn on_connect_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: ConnectError,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::ConnectFailed { device, app, error })
            .await;
    }

    async fn on_connect_requested(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::ConnectRequested { device, app })
            .await;
    }

    async fn on_unexpected_disconnect(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: CommunicationError,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::UnexpectedDisconnect { device, app, error })
            .await;
    }

    async fn on_disconnect_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::DisconnectDone { device, app })
            .await;
    }

    async fn on_disconnect_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: DisconnectError,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::DisconnectFailed { device, app, error })
            .await;
    }

    async fn on_disconnect_device_done(&self, adapter: &AdapterId, device: &DeviceUid) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::DisconnectDeviceDone { device })
            .await;
    }

    async fn on_disconnect_device_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        error: DisconnectDeviceError,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::DisconnectDeviceFailed { device, error })
            .await;
    }

    async fn on_data_send_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::SendDone { device, app, message })
            .await;
    }

    async fn on_data_send_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
        error: DataSendError,
    ) {
        let device = device.clone();
        self.forward(
            adapter,
            AdapterEvent::SendFailed {
                device,
                app,
                message,
                error,
            },
        )
        .await;
    }

    async fn on_data_receive_done(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        message: RawMessage,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::ReceiveDone { device, app, message })
            .await;
    }

    async fn on_data_receive_failed(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
        error: DataReceiveError,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::ReceiveFailed { device, app, error })
            .await;
    }

    async fn on_communication_error(
        &self,
        adapter: &AdapterId,
        device: &DeviceUid,
        app: ApplicationHandle,
    ) {
        let device = device.clone();
        self.forward(adapter, AdapterEvent::CommunicationError { device, app })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_listener_preserves_order() {
        let (listener, mut rx) = ChannelListener::channel(8);
        let adapter = AdapterId::new("a");
        let device = DeviceUid::new("d1");
        let app = ApplicationHandle::new(1);

        for byte in [1u8, 2, 3] {
            let msg = RawMessage::new(device.clone(), app, vec![byte]);
            listener.on_data_receive_done(&adapter, &device, app, msg).await;
        }

        for expected in [1u8, 2, 3] {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.adapter, adapter);
            match envelope.event {
                AdapterEvent::ReceiveDone { message, .. } => {
                    assert_eq!(message.data(), &[expected])
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_channel_listener_closed_queue_is_silent() {
        let (listener, rx) = ChannelListener::channel(1);
        drop(rx);
        assert!(listener.is_closed());
        listener
            .on_search_failed(&AdapterId::new("a"), SearchDeviceError::new("no radio"))
            .await;
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (listener, mut rx) = ChannelListener::channel(1);
        let adapter = AdapterId::new("a");
        listener.on_search_done(&adapter, Vec::new()).await;

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            listener.on_search_done(&adapter, Vec::new()),
        )
        .await;
        assert!(blocked.is_err(), "second callback should wait for queue space");

        rx.recv().await.unwrap();
        listener.on_search_done(&adapter, Vec::new()).await;
    }
}
