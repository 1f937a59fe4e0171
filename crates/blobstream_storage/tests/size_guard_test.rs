//! Tests for incremental size enforcement.

mod test_utils;

use async_trait::async_trait;
use blobstream_core::{ContainerConfig, ManifestEntry, ReadRequest, UploadOptions, UploadRequest};
use blobstream_error::{BackendError, BlobError, BlobResult, PipelineError, PipelineErrorKind};
use blobstream_storage::{BlobAdapter, BlobBackend, ByteStream, GuardedUpload, SizeGuard, UploadSource};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::pipeline_kind;

type Outcome = Result<u64, PipelineErrorKind>;

/// Backend that drains every field, notes how each one ended and then
/// reports success no matter what.
#[derive(Debug, Clone, Default)]
struct OutcomeBackend {
    outcomes: Arc<Mutex<BTreeMap<String, Outcome>>>,
    total_seen: Arc<AtomicU64>,
}

impl OutcomeBackend {
    fn outcome(&self, field: &str) -> Outcome {
        self.outcomes.lock().unwrap().get(field).cloned().unwrap()
    }
}

#[async_trait]
impl BlobBackend for OutcomeBackend {
    async fn write(
        &self,
        mut upload: GuardedUpload,
        _request: &UploadRequest,
    ) -> BlobResult<Vec<ManifestEntry>> {
        let mut tasks = Vec::new();
        while let Some(Ok(mut field)) = upload.next().await {
            let outcomes = Arc::clone(&self.outcomes);
            tasks.push(tokio::spawn(async move {
                let name = field.field_name().to_string();
                let mut bytes = 0u64;
                let mut outcome = None;
                while let Some(chunk) = field.next().await {
                    match chunk {
                        Ok(chunk) => bytes += chunk.len() as u64,
                        Err(error) => {
                            outcome = Some(Err(error.pipeline_kind().cloned().unwrap()));
                        }
                    }
                }
                outcomes
                    .lock()
                    .unwrap()
                    .insert(name, outcome.unwrap_or(Ok(bytes)));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        self.total_seen
            .store(upload.guard().total_bytes_seen(), Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn read(&self, _request: &ReadRequest) -> BlobResult<ByteStream> {
        Err(BackendError::new("write-only backend").into())
    }

    fn backend_name(&self) -> &'static str {
        "outcome"
    }
}

fn options(max_bytes: u64, max_bytes_per_file: u64) -> UploadOptions {
    UploadOptions::default()
        .container("/guarded")
        .max_bytes(max_bytes)
        .max_bytes_per_file(max_bytes_per_file)
}

#[test]
fn test_guard_keeps_first_violation() {
    let guard = SizeGuard::new(100, 10);
    assert!(!guard.is_aborted());

    let first: BlobError = PipelineError::new(PipelineErrorKind::UploadTooLarge { limit: 100 }).into();
    let second: BlobError =
        PipelineError::new(PipelineErrorKind::DuplicateFieldWiring("x".to_string())).into();
    guard.abort(first);
    guard.abort(second);

    assert!(guard.is_aborted());
    assert_eq!(
        pipeline_kind(&guard.violation().unwrap()),
        PipelineErrorKind::UploadTooLarge { limit: 100 }
    );
}

#[test]
fn test_guards_share_nothing() {
    let one = SizeGuard::new(100, 10);
    let two = SizeGuard::new(100, 10);
    one.abort(PipelineError::new(PipelineErrorKind::UploadTooLarge { limit: 100 }).into());

    assert!(!two.is_aborted());
    assert!(two.violation().is_none());
}

#[tokio::test]
async fn test_violation_overrides_backend_success() {
    let backend = OutcomeBackend::default();
    let (source, sender) = UploadSource::new();
    let mut big = sender.field("big").unwrap();
    drop(sender);
    let producer = tokio::spawn(async move {
        let _ = big.send(vec![0u8; 11]).await;
    });

    let err = BlobAdapter::new(backend.clone())
        .upload(&ContainerConfig::default(), Some(source), options(100, 10))
        .await
        .unwrap_err();
    producer.await.unwrap();

    assert_eq!(
        pipeline_kind(&err),
        PipelineErrorKind::FieldTooLarge {
            field: "big".to_string(),
            limit: 10
        }
    );
    assert_eq!(
        backend.outcome("big"),
        Err(PipelineErrorKind::FieldTooLarge {
            field: "big".to_string(),
            limit: 10
        })
    );
}

#[tokio::test]
async fn test_per_file_overflow_spares_siblings() {
    let backend = OutcomeBackend::default();
    let (source, sender) = UploadSource::new();
    let mut big = sender.field("big").unwrap();
    let mut small = sender.field("small").unwrap();
    drop(sender);
    let producer = tokio::spawn(async move {
        let _ = big.send(vec![0u8; 20]).await;
        small.send(vec![0u8; 5]).await
    });

    let err = BlobAdapter::new(backend.clone())
        .upload(&ContainerConfig::default(), Some(source), options(100, 10))
        .await
        .unwrap_err();
    producer.await.unwrap().unwrap();

    assert!(matches!(
        pipeline_kind(&err),
        PipelineErrorKind::FieldTooLarge { .. }
    ));
    assert_eq!(backend.outcome("small"), Ok(5));
    assert_eq!(backend.total_seen.load(Ordering::SeqCst), 25);
}

#[tokio::test]
async fn test_aggregate_overflow_cancels_open_fields() {
    let backend = OutcomeBackend::default();
    let (source, sender) = UploadSource::new();
    let mut open = sender.field("open").unwrap();
    let mut crossing = sender.field("crossing").unwrap();
    drop(sender);

    let producer = tokio::spawn(async move {
        let _ = open.send(vec![0u8; 50]).await;
        let _ = crossing.send(vec![0u8; 60]).await;
        // Hold the open field until the abort closes it.
        for _ in 0..100 {
            if open.send(vec![0u8; 1]).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let err = BlobAdapter::new(backend.clone())
        .upload(&ContainerConfig::default(), Some(source), options(100, 80))
        .await
        .unwrap_err();
    producer.await.unwrap();

    let too_large = PipelineErrorKind::UploadTooLarge { limit: 100 };
    assert_eq!(pipeline_kind(&err), too_large);
    assert_eq!(backend.outcome("open"), Err(too_large.clone()));
    assert_eq!(backend.outcome("crossing"), Err(too_large));
}

#[tokio::test]
async fn test_concurrent_uploads_have_separate_budgets() {
    let adapter = BlobAdapter::new(OutcomeBackend::default());

    let mut runs = Vec::new();
    for _ in 0..2 {
        let adapter = adapter.clone();
        runs.push(tokio::spawn(async move {
            let (source, sender) = UploadSource::new();
            let mut field = sender.field("field").unwrap();
            drop(sender);
            let producer = tokio::spawn(async move { field.send(vec![0u8; 60]).await });
            let result = adapter
                .upload(&ContainerConfig::default(), Some(source), options(100, 80))
                .await;
            producer.await.unwrap().unwrap();
            result
        }));
    }

    for run in runs {
        assert!(run.await.unwrap().is_ok());
    }
}
