//! Upload options, their defaults, and resolution into a validated request.

use crate::{canonical_container, ContainerConfig};
use blobstream_error::{BlobResult, PipelineError, PipelineErrorKind};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Default aggregate limit for one upload (1 GB).
pub const DEFAULT_MAX_BYTES: u64 = 1_000_000_000;

/// Default limit for a single field (25 MB).
pub const DEFAULT_MAX_BYTES_PER_FILE: u64 = 25_000_000;

/// How a backend names the blobs it stores.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NamingPolicy {
    /// Keep the filename the producer supplied
    #[default]
    PreserveOriginal,
    /// Name the blob after the hex SHA-256 of its content
    ContentHash,
}

/// Text decoding a backend should apply, passed through untouched by the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Decoding {
    /// Bytes as stored
    Raw,
    /// UTF-8 text
    #[default]
    Utf8,
    /// 7-bit ASCII text
    Ascii,
    /// Base64 text
    Base64,
    /// Lowercase hex text
    Hex,
}

/// Caller-supplied upload options. Unset fields fall back to the
/// container configuration.
///
/// # Examples
///
/// ```
/// use blobstream_core::{NamingPolicy, UploadOptions};
///
/// let options = UploadOptions::default()
///     .container("/photos")
///     .max_bytes_per_file(1024u64)
///     .naming_policy(NamingPolicy::ContentHash);
/// assert_eq!(options.container.as_deref(), Some("/photos"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, derive_setters::Setters)]
#[setters(strip_option, into)]
pub struct UploadOptions {
    /// Destination container
    pub container: Option<String>,
    /// Aggregate byte limit
    pub max_bytes: Option<u64>,
    /// Per-field byte limit
    pub max_bytes_per_file: Option<u64>,
    /// Naming policy handed to the backend
    pub naming_policy: Option<NamingPolicy>,
    /// Decoding handed to the backend
    pub decoding: Option<Decoding>,
}

/// Fully resolved options for one upload operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct UploadRequest {
    /// Canonical destination container
    container: String,
    /// Aggregate byte limit
    max_bytes: u64,
    /// Per-field byte limit
    max_bytes_per_file: u64,
    /// Naming policy handed to the backend
    naming_policy: NamingPolicy,
    /// Decoding handed to the backend
    decoding: Decoding,
}

impl UploadRequest {
    /// Merge `options` over `config` and validate the result.
    ///
    /// # Errors
    ///
    /// - `InvalidContainer` when neither side names a container
    /// - `InvalidLimits` unless `0 < max_bytes_per_file <= max_bytes`
    ///
    /// # Examples
    ///
    /// ```
    /// use blobstream_core::{ContainerConfig, UploadOptions, UploadRequest, DEFAULT_MAX_BYTES};
    ///
    /// let config = ContainerConfig::default();
    /// let options = UploadOptions::default().container("photos/");
    /// let request = UploadRequest::resolve(&config, &options).unwrap();
    /// assert_eq!(request.container(), "/photos");
    /// assert_eq!(*request.max_bytes(), DEFAULT_MAX_BYTES);
    /// ```
    pub fn resolve(config: &ContainerConfig, options: &UploadOptions) -> BlobResult<Self> {
        let container = options
            .container
            .as_deref()
            .or(config.container().as_deref())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PipelineError::new(PipelineErrorKind::InvalidContainer))?;

        let max_bytes = options.max_bytes.unwrap_or(*config.max_bytes());
        let max_bytes_per_file = options
            .max_bytes_per_file
            .unwrap_or(*config.max_bytes_per_file());

        if max_bytes == 0 || max_bytes_per_file == 0 {
            return Err(PipelineError::new(PipelineErrorKind::InvalidLimits(
                "limits must be positive".to_string(),
            ))
            .into());
        }
        if max_bytes_per_file > max_bytes {
            return Err(PipelineError::new(PipelineErrorKind::InvalidLimits(format!(
                "max_bytes_per_file ({}) exceeds max_bytes ({})",
                max_bytes_per_file, max_bytes
            )))
            .into());
        }

        Ok(Self {
            container: canonical_container(container),
            max_bytes,
            max_bytes_per_file,
            naming_policy: options.naming_policy.unwrap_or(*config.naming_policy()),
            decoding: options.decoding.unwrap_or(*config.decoding()),
        })
    }
}
