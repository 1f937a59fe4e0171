//! Top-level error wrapper types.

use crate::{BackendError, ConfigError, PipelineError, PipelineErrorKind, StorageError};

/// Every error the blobstream crates can produce.
///
/// # Examples
///
/// ```
/// use blobstream_error::{BlobError, BackendError};
///
/// let err: BlobError = BackendError::new("disk full").into();
/// assert!(format!("{}", err).contains("Backend Error"));
/// ```
#[derive(Debug, Clone, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum BlobErrorKind {
    /// Pipeline error (addressing, limits, wiring)
    #[from(PipelineError)]
    Pipeline(PipelineError),
    /// Storage error from a bundled backend
    #[from(StorageError)]
    Storage(StorageError),
    /// Opaque backend failure
    #[from(BackendError)]
    Backend(BackendError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Blobstream error with kind discrimination.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Blobstream Error: {}", _0)]
pub struct BlobError(Box<BlobErrorKind>);

impl BlobError {
    /// Create a new error from a kind.
    pub fn new(kind: BlobErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BlobErrorKind {
        &self.0
    }

    /// The pipeline error kind, if this is a pipeline error.
    pub fn pipeline_kind(&self) -> Option<&PipelineErrorKind> {
        match self.kind() {
            BlobErrorKind::Pipeline(e) => Some(e.kind()),
            _ => None,
        }
    }
}

// Generic From implementation for any type that converts to BlobErrorKind
impl<T> From<T> for BlobError
where
    T: Into<BlobErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for blobstream operations.
pub type BlobResult<T> = std::result::Result<T, BlobError>;
