//! # Ferry TCP Adapter
//!
//! A [`DeviceAdapter`](ferry_core::DeviceAdapter) for devices reachable over
//! TCP, such as head units on the same Wi-Fi network.
//!
//! ## Wire Format
//!
//! Each session owns one socket. Every frame is a 4-byte big-endian length
//! followed by the payload (`LengthDelimitedCodec`):
//!
//! ```text
//! client                               peer
//!   │── [len][app handle: u32 BE] ──────▶│   hello, once per socket
//!   │── [len][payload] ─────────────────▶│   one frame per RawMessage
//!   │◀───────────────── [len][payload] ──│   inbound data
//! ```
//!
//! Closing the socket from the peer side is reported as an unexpected
//! disconnect of that session.
//!
//! ## Configuration
//!
//! Peers are declared up front; a search reports exactly the configured
//! peers, using each peer's name as its device uid. See [`TcpConfig`].

pub mod adapter;
pub mod config;
mod session;

pub use adapter::{TcpAdapter, TcpAdapterBuilder};
pub use config::{PeerConfig, TcpConfig};
pub use session::{hello_frame, parse_hello};
