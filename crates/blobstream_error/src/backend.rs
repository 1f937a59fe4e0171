//! Failures raised by a blob backend or a download sink.
//!
//! These never describe a limit violation or a bad locator; those are
//! pipeline errors. A `BackendError` means the store itself misbehaved, or a
//! sink rejected a chunk while a download was being pumped.

/// A store or sink failure, passed through to the caller unchanged.
///
/// A backend's own failure loses to a size violation the guard already
/// recorded for the same upload.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Backend Error: {} at line {} in {}", message, line, file)]
pub struct BackendError {
    /// What the backend or sink reported
    pub message: String,
    /// Line that raised the failure
    pub line: u32,
    /// File that raised the failure
    pub file: &'static str,
}

impl BackendError {
    /// Record a backend failure at the caller's location.
    ///
    /// # Examples
    ///
    /// ```
    /// use blobstream_error::{BackendError, BlobError, BlobErrorKind};
    ///
    /// let err: BlobError = BackendError::new("sink write failed: broken pipe").into();
    /// match err.kind() {
    ///     BlobErrorKind::Backend(e) => assert!(e.message.starts_with("sink write")),
    ///     other => panic!("unexpected {}", other),
    /// }
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: caller.line(),
            file: caller.file(),
        }
    }
}
