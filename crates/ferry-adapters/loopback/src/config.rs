//! Configuration types for the loopback adapter.
//!
//! Read from the `adapters.loopback` section of the Ferry configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [adapters.loopback]
//! id = "bench"
//! echo = true
//!
//! [[adapters.loopback.devices]]
//! uid = "watch-1"
//! name = "Wrist Watch"
//!
//! [[adapters.loopback.devices]]
//! uid = "hu-1"
//! name = "Head Unit"
//! present = false
//! ```

use serde::{Deserialize, Serialize};

/// Loopback adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Adapter id reported to the manager.
    pub id: String,

    /// Simulated devices.
    pub devices: Vec<DeviceConfig>,

    /// Whether sent payloads come back as inbound data on the same session.
    pub echo: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            id: "loopback".to_string(),
            devices: Vec::new(),
            echo: true,
        }
    }
}

/// A simulated device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub uid: String,

    /// Human-readable name; defaults to the uid.
    #[serde(default)]
    pub name: Option<String>,

    /// Whether the device answers searches from the start.
    #[serde(default = "default_present")]
    pub present: bool,
}

fn default_present() -> bool {
    true
}

impl DeviceConfig {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: Some(name.into()),
            present: true,
        }
    }

    /// Returns the display name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoopbackConfig::default();
        assert_eq!(config.id, "loopback");
        assert!(config.echo);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
id: bench
echo: false
devices:
  - uid: watch-1
    name: Wrist Watch
  - uid: hu-1
    present: false
"#;
        let config: LoopbackConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.id, "bench");
        assert!(!config.echo);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].display_name(), "Wrist Watch");
        assert!(config.devices[0].present);
        assert_eq!(config.devices[1].display_name(), "hu-1");
        assert!(!config.devices[1].present);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: LoopbackConfig = serde_yaml::from_str("devices: []").unwrap();
        assert_eq!(config.id, "loopback");
        assert!(config.echo);
    }
}
