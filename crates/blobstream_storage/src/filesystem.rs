//! Filesystem blob backend.
//!
//! Blobs live at `{root}{container}/{stored_filename}`. Each field streams
//! into a hidden temp file while its SHA-256 is computed. Once every field
//! of the upload is staged, each is renamed into place under its original
//! name or its hash.

use crate::{BlobBackend, ByteStream, GuardedField, GuardedUpload};
use blobstream_core::{ManifestEntry, NamingPolicy, ReadRequest, UploadRequest};
use blobstream_error::{BackendError, BlobError, BlobResult, StorageError, StorageErrorKind};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

const TEMP_PREFIX: &str = ".blobstream-";

/// Filesystem storage backend.
///
/// # Example Structure
///
/// ```text
/// /var/blobstream/
/// ├── photos/
/// │   ├── avatar.png                 (preserve_original)
/// │   └── 9f86d081884c7d65...        (content_hash)
/// └── documents/
///     └── 2024/
///         └── report.pdf
/// ```
///
/// # Features
///
/// - **Streaming writes**: fields are never buffered whole in memory
/// - **Staged writes**: every field lands in a temp file; nothing is renamed
///   into place until the whole upload has succeeded
/// - **Deduplication**: content-hash naming reuses an existing blob
/// - **Cleanup**: a failed upload leaves existing blobs untouched
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    root: PathBuf,
}

/// A field written to its temp file, waiting to be renamed into place.
struct StagedField {
    entry: ManifestEntry,
    temp_path: PathBuf,
    path: PathBuf,
}

impl FileSystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    ///
    /// Creates the root directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    #[tracing::instrument(skip(root))]
    pub fn new(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();

        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                root.display(),
                e
            )))
        })?;

        tracing::info!(path = %root.display(), "Created filesystem backend");
        Ok(Self { root })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing a canonical container path.
    fn container_dir(&self, container: &str) -> BlobResult<PathBuf> {
        let relative = Path::new(container.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::new(StorageErrorKind::InvalidPath(container.to_string())).into());
        }
        Ok(self.root.join(relative))
    }
}

/// A single path segment that cannot escape its container.
fn check_filename(filename: &str) -> BlobResult<()> {
    let valid = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\'])
        && !filename.starts_with(TEMP_PREFIX);
    if valid {
        Ok(())
    } else {
        Err(StorageError::new(StorageErrorKind::InvalidPath(filename.to_string())).into())
    }
}

fn location(container: &str, filename: &str) -> String {
    if container == "/" {
        format!("/{}", filename)
    } else {
        format!("{}/{}", container, filename)
    }
}

async fn copy_field(
    field: &mut GuardedField,
    file: &mut tokio::fs::File,
    hasher: &mut Sha256,
    temp_path: &Path,
) -> BlobResult<u64> {
    let mut bytes = 0u64;
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| {
        StorageError::new(StorageErrorKind::FileWrite(format!(
            "{}: {}",
            temp_path.display(),
            e
        )))
    })?;
    Ok(bytes)
}

async fn discard(temp_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp_path).await {
        tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
    }
}

#[tracing::instrument(skip(dir, container, field), fields(field_name = %field.field_name()))]
async fn stage_field(
    dir: PathBuf,
    container: String,
    mut field: GuardedField,
    naming_policy: NamingPolicy,
) -> BlobResult<StagedField> {
    let temp_path = dir.join(format!("{}{}.tmp", TEMP_PREFIX, Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&temp_path).await.map_err(|e| {
        StorageError::new(StorageErrorKind::FileWrite(format!(
            "{}: {}",
            temp_path.display(),
            e
        )))
    })?;

    let mut hasher = Sha256::new();
    let copied = copy_field(&mut field, &mut file, &mut hasher, &temp_path).await;
    drop(file);

    let bytes_written = match copied {
        Ok(bytes) => bytes,
        Err(error) => {
            discard(&temp_path).await;
            tracing::debug!(error = %error, "Discarded partial field");
            return Err(error);
        }
    };

    let hash = format!("{:x}", hasher.finalize());
    let stored_filename = match naming_policy {
        NamingPolicy::PreserveOriginal => field
            .filename()
            .unwrap_or_else(|| field.field_name())
            .to_string(),
        NamingPolicy::ContentHash => hash.clone(),
    };
    if let Err(error) = check_filename(&stored_filename) {
        discard(&temp_path).await;
        return Err(error);
    }

    tracing::debug!(hash = %hash, size = bytes_written, "Staged field");

    let path = dir.join(&stored_filename);
    Ok(StagedField {
        entry: ManifestEntry {
            field_name: field.field_name().to_string(),
            stored_path: location(&container, &stored_filename),
            stored_filename,
            bytes_written,
        },
        temp_path,
        path,
    })
}

/// Stored filenames must be unique within one upload unless they name the
/// same content.
fn check_unique(staged: &[StagedField], naming_policy: NamingPolicy) -> BlobResult<()> {
    if naming_policy == NamingPolicy::ContentHash {
        return Ok(());
    }
    let mut seen = HashSet::new();
    for field in staged {
        if !seen.insert(field.entry.stored_filename.as_str()) {
            return Err(StorageError::new(StorageErrorKind::InvalidPath(format!(
                "{} is stored by more than one field",
                field.entry.stored_filename
            )))
            .into());
        }
    }
    Ok(())
}

/// Move every staged field into place. On failure, blobs this upload
/// created are removed and remaining temp files discarded.
async fn publish(
    staged: Vec<StagedField>,
    naming_policy: NamingPolicy,
) -> BlobResult<Vec<ManifestEntry>> {
    let mut created: Vec<PathBuf> = Vec::new();
    let mut manifest = Vec::with_capacity(staged.len());
    let mut pending = staged.into_iter();

    while let Some(field) = pending.next() {
        let exists = tokio::fs::try_exists(&field.path).await.unwrap_or(false);

        // Same hash means same content, keep what is already there.
        if exists && naming_policy == NamingPolicy::ContentHash {
            discard(&field.temp_path).await;
            tracing::debug!(path = %field.path.display(), "Blob already exists");
            manifest.push(field.entry);
            continue;
        }

        if let Err(e) = tokio::fs::rename(&field.temp_path, &field.path).await {
            discard(&field.temp_path).await;
            for rest in pending {
                discard(&rest.temp_path).await;
            }
            for path in &created {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove blob of aborted upload");
                }
            }
            return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                field.temp_path.display(),
                field.path.display(),
                e
            )))
            .into());
        }

        tracing::info!(
            path = %field.path.display(),
            size = field.entry.bytes_written,
            "Stored blob"
        );
        if !exists {
            created.push(field.path);
        }
        manifest.push(field.entry);
    }

    Ok(manifest)
}

#[async_trait::async_trait]
impl BlobBackend for FileSystemBackend {
    #[tracing::instrument(skip(self, upload, request), fields(container = %request.container()))]
    async fn write(
        &self,
        mut upload: GuardedUpload,
        request: &UploadRequest,
    ) -> BlobResult<Vec<ManifestEntry>> {
        let dir = self.container_dir(request.container())?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                dir.display(),
                e
            )))
        })?;

        let mut failure: Option<BlobError> = None;
        let mut writers = Vec::new();
        while let Some(field) = upload.next().await {
            match field {
                Ok(field) => writers.push(tokio::spawn(stage_field(
                    dir.clone(),
                    request.container().clone(),
                    field,
                    *request.naming_policy(),
                ))),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        let mut staged = Vec::with_capacity(writers.len());
        for writer in writers {
            match writer.await {
                Ok(Ok(field)) => staged.push(field),
                Ok(Err(error)) => {
                    failure.get_or_insert(error);
                }
                Err(join_error) => {
                    failure.get_or_insert(
                        BackendError::new(format!("field writer stopped: {}", join_error)).into(),
                    );
                }
            }
        }

        let naming_policy = *request.naming_policy();
        if failure.is_none() {
            if let Err(error) = check_unique(&staged, naming_policy) {
                failure = Some(error);
            }
        }

        if let Some(error) = failure {
            for field in &staged {
                discard(&field.temp_path).await;
            }
            return Err(error);
        }

        publish(staged, naming_policy).await
    }

    #[tracing::instrument(skip(self, request), fields(location = %request.location()))]
    async fn read(&self, request: &ReadRequest) -> BlobResult<ByteStream> {
        let dir = self.container_dir(request.container())?;

        let paths = if request.is_wildcard() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::new(StorageErrorKind::NotFound(request.container().clone()))
                } else {
                    StorageError::new(StorageErrorKind::FileRead(format!(
                        "{}: {}",
                        dir.display(),
                        e
                    )))
                }
            })?;

            let mut paths = Vec::new();
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StorageError::new(StorageErrorKind::FileRead(format!("{}: {}", dir.display(), e)))
            })? {
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                let hidden = entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
                if is_file && !hidden {
                    paths.push(entry.path());
                }
            }
            paths.sort();
            paths
        } else {
            check_filename(request.filename())?;
            let path = dir.join(request.filename());
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(StorageError::new(StorageErrorKind::NotFound(request.location())).into());
            }
            vec![path]
        };

        tracing::debug!(blobs = paths.len(), "Opening blob read");

        let stream = async_stream::stream! {
            for path in paths {
                let file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(e) => {
                        yield Err(BlobError::from(StorageError::new(StorageErrorKind::FileRead(
                            format!("{}: {}", path.display(), e),
                        ))));
                        return;
                    }
                };
                let mut chunks = ReaderStream::new(file);
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => {
                            yield Err(BlobError::from(StorageError::new(StorageErrorKind::FileRead(
                                format!("{}: {}", path.display(), e),
                            ))));
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
