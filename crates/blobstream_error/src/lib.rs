//! Error types for the blobstream pipeline.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use blobstream_error::{BlobResult, PipelineError, PipelineErrorKind};
//!
//! fn resolve() -> BlobResult<String> {
//!     Err(PipelineError::new(PipelineErrorKind::InvalidContainer))?
//! }
//!
//! let err = resolve().unwrap_err();
//! assert_eq!(err.pipeline_kind(), Some(&PipelineErrorKind::InvalidContainer));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod pipeline;
mod storage;

pub use backend::BackendError;
pub use config::ConfigError;
pub use error::{BlobError, BlobErrorKind, BlobResult};
pub use pipeline::{PipelineError, PipelineErrorKind};
pub use storage::{StorageError, StorageErrorKind};
