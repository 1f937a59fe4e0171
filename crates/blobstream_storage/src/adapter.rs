//! Caller-facing upload and download operations.

use crate::{BlobBackend, DownloadSink, DownloadStream, UploadMultiplexer, UploadSource};
use blobstream_core::{
    ConfigRegistry, ContainerConfig, Locator, ManifestEntry, UploadOptions, UploadRequest,
};
use blobstream_error::BlobResult;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Generic blob adapter: the pipeline in front of one backend.
///
/// # Example
///
/// ```rust,no_run
/// use blobstream_core::{ContainerConfig, UploadOptions};
/// use blobstream_storage::{BlobAdapter, FileSystemBackend, UploadSource};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let adapter = BlobAdapter::new(FileSystemBackend::new("/tmp/blobs")?);
/// let config = ContainerConfig::for_container("/photos");
///
/// let (source, sender) = UploadSource::new();
/// let mut avatar = sender.file("avatar", "avatar.png")?;
/// drop(sender);
/// tokio::spawn(async move {
///     avatar.send(vec![0u8; 1024]).await
/// });
///
/// let manifest = adapter
///     .upload(&config, Some(source), UploadOptions::default())
///     .await?;
/// assert_eq!(manifest[0].bytes_written, 1024);
///
/// let bytes = adapter.download(&config, "/photos/avatar.png", vec![]).finished().await?;
/// assert_eq!(bytes, 1024);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlobAdapter {
    backend: Arc<dyn BlobBackend>,
}

impl BlobAdapter {
    /// Adapter over `backend`.
    pub fn new(backend: impl BlobBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Adapter over a shared backend.
    pub fn from_arc(backend: Arc<dyn BlobBackend>) -> Self {
        Self { backend }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &Arc<dyn BlobBackend> {
        &self.backend
    }

    /// Upload every field of `source` into a container.
    ///
    /// An absent source is not an error: there is simply nothing to store.
    ///
    /// # Errors
    ///
    /// - `InvalidContainer` when neither `options` nor `config` names a
    ///   container; the backend is never called
    /// - `InvalidLimits`, `InvalidUploadSource`, `DuplicateFieldWiring`
    /// - `FieldTooLarge` / `UploadTooLarge` when a limit is crossed mid-stream
    /// - whatever the backend reports
    #[instrument(skip_all, fields(backend = self.backend.backend_name()))]
    pub async fn upload(
        &self,
        config: &ContainerConfig,
        source: Option<UploadSource>,
        options: UploadOptions,
    ) -> BlobResult<Vec<ManifestEntry>> {
        let Some(source) = source else {
            debug!("No upload source, nothing to store");
            return Ok(Vec::new());
        };

        let request = UploadRequest::resolve(config, &options).inspect_err(|e| {
            warn!(error = %e, "Rejecting upload");
        })?;

        UploadMultiplexer::prepare(source, request)?
            .commit(self.backend.as_ref())
            .await
    }

    /// Upload using the configuration registered under `connection`.
    pub async fn upload_with(
        &self,
        registry: &ConfigRegistry,
        connection: &str,
        source: Option<UploadSource>,
        options: UploadOptions,
    ) -> BlobResult<Vec<ManifestEntry>> {
        let config = registry.get(connection)?;
        self.upload(&config, source, options).await
    }

    /// Open a download, optionally piped into `sinks`.
    ///
    /// Never fails up front: a bad locator produces a conduit whose first
    /// poll yields the error. An absent locator falls back to every blob in
    /// the config's default container.
    #[instrument(skip_all, fields(backend = self.backend.backend_name()))]
    pub fn download(
        &self,
        config: &ContainerConfig,
        locator: impl Into<Locator>,
        sinks: Vec<Arc<dyn DownloadSink>>,
    ) -> DownloadStream {
        let locator = match locator.into() {
            Locator::Absent => config
                .container()
                .clone()
                .map(Locator::container)
                .unwrap_or(Locator::Absent),
            locator => locator,
        };

        let mut conduit = match locator.resolve_with(*config.decoding()) {
            Ok(request) => {
                debug!(location = %request.location(), "Opening download");
                let backend = Arc::clone(&self.backend);
                let read = request.clone();
                DownloadStream::opening(request, Box::pin(async move { backend.read(&read).await }))
            }
            Err(error) => {
                warn!(error = %error, "Rejecting download");
                DownloadStream::failed(error)
            }
        };

        for sink in sinks {
            conduit.pipe(sink);
        }
        conduit
    }

    /// Download using the configuration registered under `connection`.
    pub fn download_with(
        &self,
        registry: &ConfigRegistry,
        connection: &str,
        locator: impl Into<Locator>,
        sinks: Vec<Arc<dyn DownloadSink>>,
    ) -> DownloadStream {
        match registry.get(connection) {
            Ok(config) => self.download(&config, locator, sinks),
            Err(error) => DownloadStream::failed(error),
        }
    }
}

impl std::fmt::Debug for BlobAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobAdapter")
            .field("backend", &self.backend.backend_name())
            .finish()
    }
}
