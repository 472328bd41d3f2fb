//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: `ferry.toml`, `config.toml`
//! - `yaml-config`: `ferry.yaml`, `ferry.yml`, `config.yaml`, `config.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific file (`ferry.{profile}.toml`)
//! 3. Main file (`ferry.toml`)
//! 4. Environment variables (`FERRY_*`)
//! 5. Programmatic overrides ([`ConfigLoader::merge`])
//!
//! # Environment Variable Mapping
//!
//! `FERRY_` prefix, `__` as the nesting separator:
//!
//! - `FERRY_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `FERRY_MANAGER__ADAPTER_QUEUE_CAPACITY=16` → `manager.adapter_queue_capacity = 16`
//! - `FERRY_ADAPTERS__TCP__CONNECT_TIMEOUT_MS=500` → `adapters.tcp.connect_timeout_ms = 500`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("bench")
//!     .file("./ferry.toml")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::FerryConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "FERRY_";
const PROFILE_VAR: &str = "FERRY_PROFILE";

#[cfg(feature = "toml-config")]
const TOML_NAMES: &[&str] = &["ferry.toml", "config.toml"];
#[cfg(feature = "yaml-config")]
const YAML_NAMES: &[&str] = &["ferry.yaml", "ferry.yml", "config.yaml", "config.yml"];

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting `dev`/`prod` shorthands.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `FERRY_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory searched for configuration files. Without any, the
    /// current directory and `<config dir>/ferry` are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, overriding every other source.
    pub fn merge(mut self, config: FerryConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<FerryConfig> {
        let profile = self.profile.clone();
        let config: FerryConfig = self.build_figment()?.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            adapters = config.adapters.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(FerryConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, path)?;
        } else {
            figment = self.search_files(figment)?;
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["PROFILE"])
                    .split("__"),
            );
        }

        Ok(figment.merge(self.overrides))
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ferry"));
        }
        paths
    }

    /// Merges the first base file found (and its profile variant, below it).
    fn search_files(&self, mut figment: Figment) -> ConfigResult<Figment> {
        let mut names: Vec<&str> = Vec::new();
        #[cfg(feature = "toml-config")]
        names.extend_from_slice(TOML_NAMES);
        #[cfg(feature = "yaml-config")]
        names.extend_from_slice(YAML_NAMES);

        for dir in self.resolve_search_paths() {
            for name in &names {
                let base = dir.join(name);
                if !base.exists() {
                    continue;
                }
                if let Some(profiled) = profile_variant(&base, &self.profile)
                    && profiled.exists()
                {
                    debug!(path = %profiled.display(), "Loading profile-specific config");
                    figment = merge_file(figment, &profiled)?;
                }
                info!(path = %base.display(), "Loading configuration file");
                return merge_file(figment, &base);
            }
        }

        warn!("No configuration file found, using defaults");
        Ok(figment)
    }
}

/// `ferry.toml` → `ferry.{profile}.toml`
fn profile_variant(base: &Path, profile: &Profile) -> Option<PathBuf> {
    let stem = base.file_stem()?.to_str()?;
    let ext = base.extension()?.to_str()?;
    Some(base.with_file_name(format!("{stem}.{}.{ext}", profile.as_str())))
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<FerryConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from one file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<FerryConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
