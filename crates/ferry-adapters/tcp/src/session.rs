//! One TCP socket per session, driven by a reader and a writer task.
//!
//! The writer resolves every queued send in order, and fails whatever is
//! still queued when the session ends. The reader reports inbound frames
//! and, on EOF or an I/O error, removes the session and reports the loss.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use ferry_core::{
    AdapterId, ApplicationHandle, BoxedListener, CommunicationError, DataSendError, DeviceUid,
    RawMessage,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::TcpConfig;

pub(crate) type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;
type FrameSink = SplitSink<FramedStream, Bytes>;
type FrameSource = SplitStream<FramedStream>;

pub(crate) type SessionKey = (DeviceUid, ApplicationHandle);
pub(crate) type Sessions = Arc<Mutex<HashMap<SessionKey, Session>>>;

/// Encodes the first frame of a session: the application handle, big-endian.
pub fn hello_frame(app: ApplicationHandle) -> Bytes {
    Bytes::copy_from_slice(&app.get().to_be_bytes())
}

/// Decodes a hello frame.
pub fn parse_hello(frame: &[u8]) -> Option<ApplicationHandle> {
    let bytes = <[u8; 4]>::try_from(frame).ok()?;
    Some(ApplicationHandle::new(u32::from_be_bytes(bytes)))
}

/// Opens a socket to `address` and announces `app`.
pub(crate) async fn open(
    address: &str,
    app: ApplicationHandle,
    config: &TcpConfig,
) -> io::Result<FramedStream> {
    let stream = timeout(config.connect_timeout(), TcpStream::connect(address))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.set_nodelay(true)?;

    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(config.max_frame_length)
        .new_codec();
    let mut framed = Framed::new(stream, codec);
    framed.send(hello_frame(app)).await?;
    Ok(framed)
}

/// Addressing for listener callbacks of one session.
#[derive(Clone)]
pub(crate) struct Link {
    pub adapter: AdapterId,
    pub device: DeviceUid,
    pub app: ApplicationHandle,
    pub listener: BoxedListener,
}

impl Link {
    fn key(&self) -> SessionKey {
        (self.device.clone(), self.app)
    }
}

/// A live session as stored in the adapter's session table.
pub(crate) struct Session {
    outbound: mpsc::UnboundedSender<RawMessage>,
    reader_stop: CancellationToken,
    writer: JoinHandle<()>,
}

impl Session {
    /// Queues a message for the writer; hands it back if the writer is gone.
    pub fn send(&self, message: RawMessage) -> Result<(), RawMessage> {
        self.outbound.send(message).map_err(|e| e.0)
    }

    /// Flushes queued sends, closes the socket and stops the reader.
    pub async fn close(self) {
        drop(self.outbound);
        if let Err(e) = self.writer.await {
            warn!(error = %e, "Writer task failed");
        }
        self.reader_stop.cancel();
    }
}

/// A reader not yet running, so the connect outcome can be reported before
/// any inbound data.
pub(crate) struct PendingReader {
    source: FrameSource,
    link: Link,
    sessions: Sessions,
    stop: CancellationToken,
}

impl PendingReader {
    pub fn spawn(self) {
        tokio::spawn(read_loop(self.source, self.link, self.sessions, self.stop));
    }
}

/// Registers the session and starts its writer.
pub(crate) fn establish(
    framed: FramedStream,
    link: Link,
    sessions: &Sessions,
    shutdown: &CancellationToken,
) -> PendingReader {
    let (sink, source) = framed.split();
    let (outbound, rx) = mpsc::unbounded_channel();
    let stop = shutdown.child_token();

    let writer = tokio::spawn(write_loop(sink, rx, link.clone(), shutdown.clone()));
    sessions.lock().insert(
        link.key(),
        Session {
            outbound,
            reader_stop: stop.clone(),
            writer,
        },
    );

    PendingReader {
        source,
        link,
        sessions: Arc::clone(sessions),
        stop,
    }
}

async fn write_loop(
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<RawMessage>,
    link: Link,
    shutdown: CancellationToken,
) {
    let Link {
        adapter,
        device,
        app,
        listener,
    } = &link;

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        trace!(
            adapter = %adapter,
            device = %device,
            app = %app,
            len = message.len(),
            "Writing frame"
        );
        match sink.send(Bytes::copy_from_slice(message.data())).await {
            Ok(()) => listener.on_data_send_done(adapter, device, *app, message).await,
            Err(e) => {
                let error = DataSendError::new(e.to_string());
                listener.on_data_send_failed(adapter, device, *app, message, error).await;
            }
        }
    }

    outbound.close();
    while let Some(message) = outbound.recv().await {
        let error = DataSendError::new("session closed");
        listener.on_data_send_failed(adapter, device, *app, message, error).await;
    }
    if let Err(e) = sink.close().await {
        debug!(device = %device, app = %app, error = %e, "Error closing socket");
    }
}

async fn read_loop(
    mut source: FrameSource,
    link: Link,
    sessions: Sessions,
    stop: CancellationToken,
) {
    let Link {
        adapter,
        device,
        app,
        listener,
    } = &link;

    let reason = loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            frame = source.next() => match frame {
                Some(Ok(frame)) => {
                    trace!(
                        adapter = %adapter,
                        device = %device,
                        app = %app,
                        len = frame.len(),
                        "Read frame"
                    );
                    let message = RawMessage::new(device.clone(), *app, frame.to_vec());
                    listener.on_data_receive_done(adapter, device, *app, message).await;
                }
                Some(Err(e)) => break e.to_string(),
                None => break "connection closed by peer".to_string(),
            },
        }
    };

    let removed = sessions.lock().remove(&link.key());
    if let Some(session) = removed {
        warn!(adapter = %adapter, device = %device, app = %app, reason = %reason, "Session lost");
        session.close().await;
        listener
            .on_unexpected_disconnect(adapter, device, *app, CommunicationError::new(reason))
            .await;
    }
}
