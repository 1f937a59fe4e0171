//! Locator parsing and container canonicalization.
//!
//! A read can be addressed by a combined path (`"/photos/avatar.png"`), by a
//! structured container/filename pair, or not at all. All three shapes go
//! through [`normalize`], which is the only place addressing rules live.

use crate::Decoding;
use blobstream_error::{BlobResult, PipelineError, PipelineErrorKind};
use derive_getters::Getters;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Filename meaning "every blob under the container".
pub const WILDCARD: &str = "*";

// Last `/`-delimited segment is the filename, everything before it the container.
// An empty container is the root.
static PATH_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)/([^/]+)/?$").expect("Valid path regex"));

/// Where a read should come from.
///
/// # Examples
///
/// ```
/// use blobstream_core::Locator;
///
/// let by_path: Locator = "/photos/avatar.png".into();
/// let request = by_path.resolve().unwrap();
/// assert_eq!(request.container(), "/photos");
/// assert_eq!(request.filename(), "avatar.png");
///
/// let whole = Locator::container("/photos").resolve().unwrap();
/// assert!(whole.is_wildcard());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Locator {
    /// Combined `container/filename` path
    Path(String),
    /// Structured locator
    Spec {
        /// Container to read from
        container: Option<String>,
        /// Blob name; `None` selects every blob
        filename: Option<String>,
        /// Requested decoding; `None` means utf8
        decoding: Option<Decoding>,
    },
    /// Nothing supplied
    #[default]
    Absent,
}

impl Locator {
    /// Every blob under `container`.
    pub fn container(container: impl Into<String>) -> Self {
        Self::Spec {
            container: Some(container.into()),
            filename: None,
            decoding: None,
        }
    }

    /// A single blob.
    pub fn blob(container: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::Spec {
            container: Some(container.into()),
            filename: Some(filename.into()),
            decoding: None,
        }
    }

    /// Resolve into a canonical read request. See [`normalize`].
    pub fn resolve(&self) -> BlobResult<ReadRequest> {
        normalize(self)
    }

    /// Resolve, using `decoding` when the locator does not name one.
    pub fn resolve_with(&self, decoding: Decoding) -> BlobResult<ReadRequest> {
        normalize_with(self, decoding)
    }
}

impl From<&str> for Locator {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Locator {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

/// Canonical, validated read options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct ReadRequest {
    /// Canonical container path
    container: String,
    /// Blob name or [`WILDCARD`]
    filename: String,
    /// Decoding the backend should apply
    decoding: Decoding,
}

impl ReadRequest {
    /// Whether this request selects every blob in the container.
    pub fn is_wildcard(&self) -> bool {
        self.filename == WILDCARD
    }

    /// `container/filename`, without doubling the slash at the root.
    pub fn location(&self) -> String {
        if self.container == "/" {
            format!("/{}", self.filename)
        } else {
            format!("{}/{}", self.container, self.filename)
        }
    }
}

/// Split a combined path into raw `(container, filename)`.
///
/// A path like `/avatar.png` splits into an empty container, which
/// canonicalizes to the root `/`.
///
/// # Errors
///
/// `MalformedLocator` when the path has no `/` or no filename segment after one.
///
/// # Examples
///
/// ```
/// use blobstream_core::split_path;
///
/// assert_eq!(
///     split_path("photos/2024/cat.png/").unwrap(),
///     ("photos/2024".to_string(), "cat.png".to_string())
/// );
/// assert!(split_path("cat.png").is_err());
/// ```
pub fn split_path(path: &str) -> BlobResult<(String, String)> {
    let captures = PATH_SPLIT.captures(path).ok_or_else(|| {
        PipelineError::new(PipelineErrorKind::MalformedLocator(path.to_string()))
    })?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

/// Strip trailing slashes and force exactly one leading slash.
///
/// # Examples
///
/// ```
/// use blobstream_core::canonical_container;
///
/// assert_eq!(canonical_container("photos//"), "/photos");
/// assert_eq!(canonical_container("//photos/2024"), "/photos/2024");
/// assert_eq!(canonical_container("///"), "/");
/// ```
pub fn canonical_container(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/').trim_start_matches('/');
    format!("/{}", trimmed)
}

/// Resolve any locator shape into a [`ReadRequest`], decoding utf8 by default.
///
/// # Errors
///
/// - `MalformedLocator` for a combined path that cannot be split
/// - `InvalidContainer` for a missing or empty container
pub fn normalize(locator: &Locator) -> BlobResult<ReadRequest> {
    normalize_with(locator, Decoding::default())
}

/// [`normalize`] with a caller-chosen default decoding.
pub fn normalize_with(locator: &Locator, default_decoding: Decoding) -> BlobResult<ReadRequest> {
    let (container, filename, decoding) = match locator {
        Locator::Path(path) => {
            let (container, filename) = split_path(path)?;
            (container, Some(filename), None)
        }
        Locator::Spec {
            container,
            filename,
            decoding,
        } => {
            let container = container
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| PipelineError::new(PipelineErrorKind::InvalidContainer))?;
            (container.to_string(), filename.clone(), *decoding)
        }
        Locator::Absent => {
            return Err(PipelineError::new(PipelineErrorKind::InvalidContainer).into());
        }
    };

    Ok(ReadRequest {
        container: canonical_container(&container),
        filename: filename
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| WILDCARD.to_string()),
        decoding: decoding.unwrap_or(default_decoding),
    })
}
