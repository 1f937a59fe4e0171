//! Container configuration failures.
//!
//! Raised while layering `blobstream.toml` files into a
//! `BlobstreamConfig`, or when a caller asks the registry for a named
//! container connection that was never registered.

/// A container config that could not be read, or was never registered.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", message, line, file)]
pub struct ConfigError {
    /// Which config source or connection name failed, and how
    pub message: String,
    /// Line that raised the failure
    pub line: u32,
    /// File that raised the failure
    pub file: &'static str,
}

impl ConfigError {
    /// Record a configuration failure at the caller's location.
    ///
    /// # Examples
    ///
    /// ```
    /// use blobstream_error::ConfigError;
    ///
    /// let err = ConfigError::new("No container config registered as 'avatars'");
    /// assert!(err.to_string().starts_with("Configuration Error: No container config"));
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
