//! Errors raised by the upload/download pipeline itself.

/// Kinds of pipeline errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PipelineErrorKind {
    /// No destination or source container could be resolved
    #[display("Invalid container")]
    InvalidContainer,
    /// A combined path could not be split into container and filename
    #[display("Malformed locator: {}", _0)]
    MalformedLocator(String),
    /// The upload source is present but unusable
    #[display("Invalid upload source: {}", _0)]
    InvalidUploadSource(String),
    /// A single field exceeded the per-file byte limit
    #[display("Field '{}' exceeded the per-file limit of {} bytes", field, limit)]
    FieldTooLarge {
        /// Name of the offending field
        field: String,
        /// Per-file limit in bytes
        limit: u64,
    },
    /// The upload as a whole exceeded the aggregate byte limit
    #[display("Upload exceeded the aggregate limit of {} bytes", limit)]
    UploadTooLarge {
        /// Aggregate limit in bytes
        limit: u64,
    },
    /// A field was wired into the pipeline more than once
    #[display("Field '{}' was wired twice", _0)]
    DuplicateFieldWiring(String),
    /// Size limits violate `0 < max_bytes_per_file <= max_bytes`
    #[display("Invalid limits: {}", _0)]
    InvalidLimits(String),
    /// The producer of a field reported a failure
    #[display("Upload source failed: {}", _0)]
    SourceFailure(String),
    /// The pipeline stopped accepting data for a field
    #[display("Field '{}' is closed", _0)]
    FieldClosed(String),
}

/// Pipeline error with location tracking.
///
/// # Examples
///
/// ```
/// use blobstream_error::{PipelineError, PipelineErrorKind};
///
/// let err = PipelineError::new(PipelineErrorKind::UploadTooLarge { limit: 10 });
/// assert!(format!("{}", err).contains("aggregate limit of 10"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Pipeline Error: {} at line {} in {}", kind, line, file)]
pub struct PipelineError {
    kind: PipelineErrorKind,
    line: u32,
    file: &'static str,
}

impl PipelineError {
    /// Create a new pipeline error with caller location tracking.
    #[track_caller]
    pub fn new(kind: PipelineErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &PipelineErrorKind {
        &self.kind
    }
}
