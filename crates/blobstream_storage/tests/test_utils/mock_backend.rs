//! In-memory backend that records what the pipeline hands it.

use async_trait::async_trait;
use blobstream_core::{ManifestEntry, ReadRequest, UploadRequest};
use blobstream_error::{BackendError, BlobError, BlobResult};
use blobstream_storage::{BlobBackend, ByteStream, GuardedUpload};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Behavior configuration for the mock backend.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Store everything, serve reads from memory
    #[default]
    Store,
    /// Sleep before pulling the first field
    DelayBeforeConsuming(Duration),
    /// Every read fails to open with the given message
    FailReads(String),
    /// Reads yield the first stored chunk, then fail with the given message
    FailMidStream(String),
}

#[derive(Debug, Default)]
struct Recorded {
    write_calls: usize,
    reads: Vec<ReadRequest>,
    received: BTreeMap<String, Vec<u8>>,
    blobs: BTreeMap<String, Vec<u8>>,
}

/// Mock backend for testing.
///
/// Consumes every field on its own task, like a real backend must, and
/// keeps a record of calls, received bytes and stored blobs.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    behavior: MockBehavior,
    recorded: Arc<Mutex<Recorded>>,
}

fn location(container: &str, filename: &str) -> String {
    if container == "/" {
        format!("/{}", filename)
    } else {
        format!("{}/{}", container, filename)
    }
}

impl MockBackend {
    /// Backend that stores everything.
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with custom behavior.
    #[allow(dead_code)]
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            recorded: Arc::default(),
        }
    }

    /// Seed a stored blob at `location`.
    #[allow(dead_code)]
    pub fn with_blob(self, location: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.recorded
            .lock()
            .unwrap()
            .blobs
            .insert(location.to_string(), bytes.into());
        self
    }

    /// Number of times write() was called.
    #[allow(dead_code)]
    pub fn write_calls(&self) -> usize {
        self.recorded.lock().unwrap().write_calls
    }

    /// Every read request received, in order.
    #[allow(dead_code)]
    pub fn reads(&self) -> Vec<ReadRequest> {
        self.recorded.lock().unwrap().reads.clone()
    }

    /// Bytes of `field` that reached the backend, including those of a failed field.
    #[allow(dead_code)]
    pub fn received(&self, field: &str) -> Vec<u8> {
        self.recorded
            .lock()
            .unwrap()
            .received
            .get(field)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored blob at `location`.
    #[allow(dead_code)]
    pub fn blob(&self, location: &str) -> Option<Vec<u8>> {
        self.recorded.lock().unwrap().blobs.get(location).cloned()
    }
}

#[async_trait]
impl BlobBackend for MockBackend {
    async fn write(
        &self,
        mut upload: GuardedUpload,
        request: &UploadRequest,
    ) -> BlobResult<Vec<ManifestEntry>> {
        self.recorded.lock().unwrap().write_calls += 1;
        if let MockBehavior::DelayBeforeConsuming(delay) = &self.behavior {
            tokio::time::sleep(*delay).await;
        }

        let container = request.container().clone();
        let mut failure: Option<BlobError> = None;
        let mut tasks = Vec::new();
        while let Some(field) = upload.next().await {
            let mut field = match field {
                Ok(field) => field,
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            };
            let recorded = Arc::clone(&self.recorded);
            let container = container.clone();
            tasks.push(tokio::spawn(async move {
                let field_name = field.field_name().to_string();
                let stored_filename = field.filename().unwrap_or(&field_name).to_string();
                let mut bytes_written = 0u64;
                while let Some(chunk) = field.next().await {
                    let chunk = chunk?;
                    bytes_written += chunk.len() as u64;
                    recorded
                        .lock()
                        .unwrap()
                        .received
                        .entry(field_name.clone())
                        .or_default()
                        .extend_from_slice(&chunk);
                }

                let stored_path = location(&container, &stored_filename);
                let mut recorded = recorded.lock().unwrap();
                let data = recorded.received.get(&field_name).cloned().unwrap_or_default();
                recorded.blobs.insert(stored_path.clone(), data);
                Ok::<_, BlobError>(ManifestEntry {
                    field_name,
                    stored_filename,
                    bytes_written,
                    stored_path,
                })
            }));
        }

        let mut manifest = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Ok(entry)) => manifest.push(entry),
                Ok(Err(error)) => {
                    failure.get_or_insert(error);
                }
                Err(join_error) => {
                    failure.get_or_insert(BackendError::new(join_error.to_string()).into());
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(manifest),
        }
    }

    async fn read(&self, request: &ReadRequest) -> BlobResult<ByteStream> {
        let chunks: Vec<Bytes> = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.reads.push(request.clone());

            if let MockBehavior::FailReads(message) = &self.behavior {
                return Err(BackendError::new(message.clone()).into());
            }

            if request.is_wildcard() {
                let prefix = location(request.container(), "");
                recorded
                    .blobs
                    .iter()
                    .filter(|(path, _)| {
                        path.strip_prefix(&prefix)
                            .is_some_and(|name| !name.is_empty() && !name.contains('/'))
                    })
                    .map(|(_, bytes)| Bytes::from(bytes.clone()))
                    .collect()
            } else {
                match recorded.blobs.get(&request.location()) {
                    Some(bytes) => vec![Bytes::from(bytes.clone())],
                    None => {
                        return Err(
                            BackendError::new(format!("no blob at {}", request.location())).into(),
                        )
                    }
                }
            }
        };

        let items: Vec<BlobResult<Bytes>> = match &self.behavior {
            MockBehavior::FailMidStream(message) => chunks
                .into_iter()
                .take(1)
                .map(Ok)
                .chain(std::iter::once(Err(BackendError::new(message.clone()).into())))
                .collect(),
            _ => chunks.into_iter().map(Ok).collect(),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
