//! Upload result summary.

use serde::{Deserialize, Serialize};

/// One stored field, as reported by a backend after a successful upload.
///
/// # Examples
///
/// ```
/// use blobstream_core::ManifestEntry;
///
/// let entry = ManifestEntry {
///     field_name: "avatar".to_string(),
///     stored_filename: "avatar.png".to_string(),
///     bytes_written: 1024,
///     stored_path: "/photos/avatar.png".to_string(),
/// };
/// assert_eq!(entry.bytes_written, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Name of the field the bytes arrived on
    pub field_name: String,
    /// Filename the backend stored the blob under
    pub stored_filename: String,
    /// Number of bytes persisted
    pub bytes_written: u64,
    /// Final backend-specific location of the blob
    pub stored_path: String,
}
