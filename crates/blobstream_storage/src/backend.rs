//! The contract a storage backend implements to plug into the pipeline.

use crate::GuardedUpload;
use blobstream_core::{ManifestEntry, ReadRequest, UploadRequest};
use blobstream_error::BlobResult;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Byte stream produced by a backend read.
pub type ByteStream = Pin<Box<dyn Stream<Item = BlobResult<Bytes>> + Send>>;

/// Trait for pluggable blob storage backends.
///
/// The pipeline owns addressing, limits and wiring; implementations only
/// move bytes.
#[async_trait::async_trait]
pub trait BlobBackend: Send + Sync {
    /// Persist every field of `upload` under `request.container()`.
    ///
    /// The implementation should:
    /// - Consume fields concurrently, since producers may interleave them
    /// - Stop on the first field error and report it
    /// - Apply `request.naming_policy()` when choosing stored filenames
    ///
    /// # Returns
    ///
    /// One manifest entry per stored field, in announcement order.
    async fn write(
        &self,
        upload: GuardedUpload,
        request: &UploadRequest,
    ) -> BlobResult<Vec<ManifestEntry>>;

    /// Open a read of one blob, or every blob in the container for a
    /// wildcard request.
    async fn read(&self, request: &ReadRequest) -> BlobResult<ByteStream>;

    /// Backend name (e.g., "filesystem", "memory").
    fn backend_name(&self) -> &'static str;
}
