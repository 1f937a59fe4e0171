//! Blobstream - streaming blob storage behind one interface
//!
//! Blobstream lets callers upload several named byte streams into a
//! container and read stored blobs back as a single stream, without knowing
//! which storage backend does the work.
//!
//! # Features
//!
//! - **Dynamic uploads**: fields can be announced while the upload runs
//! - **Size limits**: per-field and aggregate limits enforced mid-stream
//! - **Addressing**: `container/filename` paths and structured locators
//!   normalize to one canonical form
//! - **Composable downloads**: consume a download as a stream or pipe it
//!   into any number of sinks
//! - **Configuration**: named container configs loaded from TOML
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use blobstream::{BlobAdapter, ContainerConfig, FileSystemBackend, UploadOptions, UploadSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     blobstream::init_tracing()?;
//!
//!     let adapter = BlobAdapter::new(FileSystemBackend::new("./blobs")?);
//!     let config = ContainerConfig::for_container("/photos");
//!
//!     let (source, sender) = UploadSource::new();
//!     let mut avatar = sender.file("avatar", "avatar.png")?;
//!     drop(sender);
//!     let bytes = std::fs::read("avatar.png")?;
//!     tokio::spawn(async move { avatar.send(bytes).await });
//!
//!     let manifest = adapter.upload(&config, Some(source), UploadOptions::default()).await?;
//!     println!("Stored: {:?}", manifest);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `blobstream_error` - Error types
//! - `blobstream_core` - Requests, locators, options and configuration
//! - `blobstream_storage` - The upload/download pipeline and backends
//!
//! This crate (`blobstream`) re-exports everything for convenience.

pub use blobstream_core::*;
pub use blobstream_error::*;
pub use blobstream_storage::*;

/// Adapter over `backend`, paired with a registry holding every container
/// from the loaded configuration files.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
#[tracing::instrument(skip(backend))]
pub fn from_config(backend: impl BlobBackend + 'static) -> BlobResult<(BlobAdapter, ConfigRegistry)> {
    let config = BlobstreamConfig::load()?;
    let registry = ConfigRegistry::from_config(config);
    tracing::info!(containers = ?registry.names(), "Loaded container configuration");
    Ok((BlobAdapter::new(backend), registry))
}
