//! Configuration types for the TCP adapter.
//!
//! # Example Configuration
//!
//! ```toml
//! [adapters.tcp]
//! connect_timeout_ms = 2000
//!
//! [[adapters.tcp.peers]]
//! name = "head-unit"
//! address = "192.168.1.20:20001"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TCP adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Adapter id reported to the manager.
    pub id: String,

    /// Reachable peers; each one is a discoverable device.
    pub peers: Vec<PeerConfig>,

    /// Socket connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Largest accepted frame payload in bytes.
    pub max_frame_length: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            id: "tcp".to_string(),
            peers: Vec::new(),
            connect_timeout_ms: 3000,
            max_frame_length: 1024 * 1024,
        }
    }
}

impl TcpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Finds a peer by its device uid.
    pub fn peer(&self, name: &str) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.name == name)
    }
}

/// A remote endpoint. Its `name` doubles as the device uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    /// `host:port`.
    pub address: String,
}

impl PeerConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
connect_timeout_ms: 500
peers:
  - name: head-unit
    address: 127.0.0.1:20001
"#;
        let config: TcpConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.id, "tcp");
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_frame_length, 1024 * 1024);
        assert_eq!(config.peer("head-unit").unwrap().address, "127.0.0.1:20001");
        assert!(config.peer("other").is_none());
    }
}
