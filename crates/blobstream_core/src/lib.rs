//! Core data types for the blobstream pipeline.
//!
//! This crate holds everything that does not touch bytes: upload options and
//! their defaults, container configuration, locator parsing and path
//! canonicalization, and the upload manifest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod manifest;
mod options;
mod path;
mod telemetry;

pub use config::{BlobstreamConfig, ConfigRegistry, ContainerConfig};
pub use manifest::ManifestEntry;
pub use options::{
    Decoding, NamingPolicy, UploadOptions, UploadRequest, DEFAULT_MAX_BYTES,
    DEFAULT_MAX_BYTES_PER_FILE,
};
pub use path::{
    canonical_container, normalize, normalize_with, split_path, Locator, ReadRequest, WILDCARD,
};
pub use telemetry::init_tracing;
