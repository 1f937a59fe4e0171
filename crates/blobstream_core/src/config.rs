//! Container configuration and the per-connection registry.
//!
//! Configuration is TOML-based and layered:
//! - Bundled defaults (include_str! from blobstream.toml)
//! - User overrides (~/.config/blobstream/blobstream.toml, then ./blobstream.toml)
//!
//! Later sources take precedence.

use crate::{Decoding, NamingPolicy, DEFAULT_MAX_BYTES, DEFAULT_MAX_BYTES_PER_FILE};
use blobstream_error::{BlobError, BlobResult, ConfigError};
use config::{Config, File, FileFormat};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, instrument};

/// Defaults shared by every operation against one container connection.
///
/// # Example
///
/// ```toml
/// [containers.photos]
/// container = "/photos"
/// max_bytes_per_file = 5_000_000
/// naming_policy = "content_hash"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct ContainerConfig {
    /// Default destination container, if operations do not name one
    #[serde(default)]
    container: Option<String>,

    /// Aggregate byte limit per upload
    #[serde(default = "default_max_bytes")]
    max_bytes: u64,

    /// Byte limit per uploaded field
    #[serde(default = "default_max_bytes_per_file")]
    max_bytes_per_file: u64,

    /// How backends should name stored blobs
    #[serde(default)]
    naming_policy: NamingPolicy,

    /// Default decoding for reads and uploads
    #[serde(default)]
    decoding: Decoding,
}

fn default_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}

fn default_max_bytes_per_file() -> u64 {
    DEFAULT_MAX_BYTES_PER_FILE
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            container: None,
            max_bytes: default_max_bytes(),
            max_bytes_per_file: default_max_bytes_per_file(),
            naming_policy: NamingPolicy::default(),
            decoding: Decoding::default(),
        }
    }
}

impl ContainerConfig {
    /// Config whose default destination is `container`.
    pub fn for_container(container: impl Into<String>) -> Self {
        Self::default().with_container(Some(container.into()))
    }
}

/// Top-level blobstream configuration.
///
/// # Example
///
/// ```no_run
/// use blobstream_core::BlobstreamConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BlobstreamConfig::load()?;
/// let defaults = config.container("default").unwrap();
/// println!("per-file limit: {}", defaults.max_bytes_per_file());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlobstreamConfig {
    /// Map of connection name to container configuration
    #[serde(default)]
    pub containers: HashMap<String, ContainerConfig>,
}

impl BlobstreamConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> BlobResult<Self> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                BlobError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                BlobError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Load configuration with precedence: current dir > home dir > bundled defaults.
    ///
    /// User config files are optional and silently skipped if not found.
    #[instrument]
    pub fn load() -> BlobResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_CONFIG: &str = include_str!("../../../blobstream.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/blobstream/blobstream.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("blobstream").required(false));

        builder
            .build()
            .map_err(|e| {
                BlobError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                BlobError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })
    }

    /// Container configuration by connection name.
    pub fn container(&self, name: &str) -> Option<&ContainerConfig> {
        self.containers.get(name)
    }
}

/// Registry of container configurations keyed by connection name.
///
/// Lookups hand out clones, so one operation can never observe another's
/// changes to its options.
///
/// # Examples
///
/// ```
/// use blobstream_core::{ConfigRegistry, ContainerConfig};
///
/// let registry = ConfigRegistry::default();
/// registry.register("photos", ContainerConfig::for_container("/photos"));
///
/// let config = registry.get("photos").unwrap();
/// assert_eq!(config.container().as_deref(), Some("/photos"));
/// assert!(registry.get("videos").is_err());
/// ```
#[derive(Debug, Default)]
pub struct ConfigRegistry {
    configs: RwLock<HashMap<String, ContainerConfig>>,
}

impl ConfigRegistry {
    /// Build a registry from every container in a loaded configuration.
    pub fn from_config(config: BlobstreamConfig) -> Self {
        Self {
            configs: RwLock::new(config.containers),
        }
    }

    /// Register (or replace) the configuration for a connection.
    pub fn register(&self, name: impl Into<String>, config: ContainerConfig) {
        let name = name.into();
        debug!(connection = %name, "Registering container config");
        self.configs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, config);
    }

    /// Clone of the configuration registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> BlobResult<ContainerConfig> {
        self.configs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ConfigError::new(format!("No container config registered as '{}'", name)).into()
            })
    }

    /// Registered connection names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .configs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
