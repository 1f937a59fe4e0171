//! Per-field and aggregate byte limits enforced while data is flowing.

use crate::FieldStream;
use blobstream_error::{BlobError, BlobResult, PipelineError, PipelineErrorKind};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};

/// Byte-limit enforcement shared by every field of one upload.
///
/// Each wrapped field counts its own bytes and adds them to a running total.
/// A field over `max_bytes_per_file` fails alone with `FieldTooLarge`. A
/// total over `max_bytes` fails the field that crossed it with
/// `UploadTooLarge` and cancels every other open field. The chunk that
/// crosses a limit is never forwarded.
///
/// # Examples
///
/// ```
/// use blobstream_storage::SizeGuard;
///
/// let guard = SizeGuard::new(1_000, 100);
/// assert_eq!(guard.total_bytes_seen(), 0);
/// assert!(guard.violation().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct SizeGuard {
    state: Arc<GuardState>,
}

#[derive(Debug)]
struct GuardState {
    max_bytes: u64,
    max_bytes_per_file: u64,
    total_bytes_seen: AtomicU64,
    violation: Mutex<Option<BlobError>>,
    abort: CancellationToken,
}

impl SizeGuard {
    /// Guard with an aggregate and a per-field limit, in bytes.
    pub fn new(max_bytes: u64, max_bytes_per_file: u64) -> Self {
        Self {
            state: Arc::new(GuardState {
                max_bytes,
                max_bytes_per_file,
                total_bytes_seen: AtomicU64::new(0),
                violation: Mutex::new(None),
                abort: CancellationToken::new(),
            }),
        }
    }

    /// Bytes observed across all fields, including rejected chunks.
    pub fn total_bytes_seen(&self) -> u64 {
        self.state.total_bytes_seen.load(Ordering::SeqCst)
    }

    /// First violation recorded for this upload.
    pub fn violation(&self) -> Option<BlobError> {
        self.state
            .violation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether the whole upload has been aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.abort.is_cancelled()
    }

    /// Resolves once the whole upload has been aborted.
    pub fn aborted(&self) -> WaitForCancellationFutureOwned {
        self.state.abort.clone().cancelled_owned()
    }

    /// Record `error` and terminate every open field.
    pub fn abort(&self, error: BlobError) {
        self.record(error);
        self.state.abort.cancel();
    }

    fn record(&self, error: BlobError) {
        let mut violation = self
            .state
            .violation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if violation.is_none() {
            *violation = Some(error);
        }
    }

    fn upload_too_large(&self) -> BlobError {
        PipelineError::new(PipelineErrorKind::UploadTooLarge {
            limit: self.state.max_bytes,
        })
        .into()
    }

    /// Wrap a field so its chunks are counted against this guard.
    pub fn wrap(&self, field: FieldStream) -> GuardedField {
        let guard = self.clone();
        let field_name = field.field_name().to_string();
        let filename = field.filename().map(str::to_string);
        let name = field_name.clone();

        let chunks = async_stream::stream! {
            let mut field = field;
            let mut seen: u64 = 0;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = guard.state.abort.cancelled() => Step::Aborted,
                    next = field.next() => Step::Next(next),
                };

                let chunk = match next {
                    Step::Aborted => {
                        debug!(field = %name, "Field terminated by upload abort");
                        yield Err(guard.violation().unwrap_or_else(|| guard.upload_too_large()));
                        break;
                    }
                    Step::Next(None) => break,
                    Step::Next(Some(Err(error))) => {
                        guard.record(error.clone());
                        yield Err(error);
                        break;
                    }
                    Step::Next(Some(Ok(chunk))) => chunk,
                };

                let len = chunk.len() as u64;
                seen += len;
                let total = guard.state.total_bytes_seen.fetch_add(len, Ordering::SeqCst) + len;

                if seen > guard.state.max_bytes_per_file {
                    warn!(field = %name, seen, limit = guard.state.max_bytes_per_file, "Field exceeded per-file limit");
                    let error: BlobError = PipelineError::new(PipelineErrorKind::FieldTooLarge {
                        field: name.clone(),
                        limit: guard.state.max_bytes_per_file,
                    })
                    .into();
                    guard.record(error.clone());
                    yield Err(error);
                    break;
                }

                if total > guard.state.max_bytes {
                    warn!(field = %name, total, limit = guard.state.max_bytes, "Upload exceeded aggregate limit");
                    let error = guard.upload_too_large();
                    guard.abort(error.clone());
                    yield Err(error);
                    break;
                }

                yield Ok(chunk);
            }
        };

        GuardedField {
            field_name,
            filename,
            chunks: Box::pin(chunks),
        }
    }
}

enum Step {
    Aborted,
    Next(Option<BlobResult<Bytes>>),
}

/// A field stream whose chunks have passed the size guard.
///
/// Yields at most one error, after which it ends.
pub struct GuardedField {
    field_name: String,
    filename: Option<String>,
    chunks: Pin<Box<dyn Stream<Item = BlobResult<Bytes>> + Send>>,
}

impl GuardedField {
    /// Field name, unique within one upload.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Original filename supplied by the producer.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }
}

impl std::fmt::Debug for GuardedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedField")
            .field("field_name", &self.field_name)
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

impl Stream for GuardedField {
    type Item = BlobResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.as_mut().poll_next(cx)
    }
}

/// The guarded upload handed to a backend: every field already present,
/// followed by fields announced while the upload runs.
///
/// An error item means the upload itself is broken (e.g. a field was wired
/// twice); backends should stop accepting new fields when they see one.
pub struct GuardedUpload {
    fields: Pin<Box<dyn Stream<Item = BlobResult<GuardedField>> + Send>>,
    guard: SizeGuard,
}

impl GuardedUpload {
    pub(crate) fn new(
        fields: impl Stream<Item = BlobResult<GuardedField>> + Send + 'static,
        guard: SizeGuard,
    ) -> Self {
        Self {
            fields: Box::pin(fields),
            guard,
        }
    }

    /// The guard enforcing this upload's limits.
    pub fn guard(&self) -> &SizeGuard {
        &self.guard
    }
}

impl std::fmt::Debug for GuardedUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedUpload")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl Stream for GuardedUpload {
    type Item = BlobResult<GuardedField>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.fields.as_mut().poll_next(cx)
    }
}
