//! Streaming multiplexed upload/download pipeline for blob storage.
//!
//! This crate sits between callers and a pluggable [`BlobBackend`]. It
//! accepts uploads whose fields may still be arriving, enforces byte limits
//! while data flows, normalizes addressing, and returns downloads as a single
//! composable conduit.
//!
//! # Features
//!
//! - **Dynamic uploads**: fields announced after the upload started are wired
//!   like the ones already present
//! - **Incremental limits**: per-field and aggregate limits are checked per
//!   chunk, never after buffering
//! - **Ordered wiring**: the source is resumed only after a backend is attached
//! - **Composable downloads**: a conduit is a `Stream` or can be piped into
//!   any number of sinks
//!
//! # Example
//!
//! ```rust
//! use blobstream_core::{ContainerConfig, UploadOptions};
//! use blobstream_storage::{BlobAdapter, FileSystemBackend, UploadSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = std::env::temp_dir().join("blobstream-doc");
//! let adapter = BlobAdapter::new(FileSystemBackend::new(&dir)?);
//! let config = ContainerConfig::default();
//!
//! let (source, sender) = UploadSource::new();
//! let mut notes = sender.file("notes", "notes.txt")?;
//! drop(sender);
//! let producer = tokio::spawn(async move { notes.send("hello").await });
//!
//! let manifest = adapter
//!     .upload(&config, Some(source), UploadOptions::default().container("/docs"))
//!     .await?;
//! producer.await??;
//! assert_eq!(manifest[0].stored_path, "/docs/notes.txt");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod backend;
mod download;
mod filesystem;
mod guard;
mod multiplexer;
mod source;

pub use adapter::BlobAdapter;
pub use backend::{BlobBackend, ByteStream};
pub use download::{CollectSink, DownloadSink, DownloadStream, OpenFuture, WriterSink};
pub use filesystem::FileSystemBackend;
pub use guard::{GuardedField, GuardedUpload, SizeGuard};
pub use multiplexer::{PreparedUpload, UploadMultiplexer};
pub use source::{FieldSender, FieldStream, UploadSender, UploadSource, DEFAULT_FIELD_BUFFER};
