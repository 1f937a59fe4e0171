//! Wiring an upload source to a backend, in two explicit phases.
//!
//! [`UploadMultiplexer::prepare`] wraps every field of the source with the
//! size guard and registers a listener for fields announced later. Only
//! [`PreparedUpload::commit`] hands the wired upload to a backend and then
//! resumes the source. A source can therefore never start flowing before a
//! backend is attached to it.

use crate::{BlobBackend, FieldStream, GuardedField, GuardedUpload, SizeGuard, UploadSource};
use blobstream_core::{ManifestEntry, UploadRequest};
use blobstream_error::{BlobResult, PipelineError, PipelineErrorKind};
use futures::{stream, StreamExt};
use std::collections::HashSet;
use tokio::sync::watch;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, instrument};

/// Entry point of the upload pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadMultiplexer;

impl UploadMultiplexer {
    /// Wire `source` for `request` without letting any data flow.
    ///
    /// # Errors
    ///
    /// - `InvalidUploadSource` if the source was already resumed
    /// - `DuplicateFieldWiring` if two fields already present share a name
    #[instrument(skip(source, request), fields(container = %request.container()))]
    pub fn prepare(source: UploadSource, request: UploadRequest) -> BlobResult<PreparedUpload> {
        if source.is_resumed() {
            return Err(PipelineError::new(PipelineErrorKind::InvalidUploadSource(
                "source was resumed before it was wired".to_string(),
            ))
            .into());
        }

        let guard = SizeGuard::new(*request.max_bytes(), *request.max_bytes_per_file());
        let (mut announcements, gate) = source.into_parts();
        let mut wiring = Wiring {
            guard: guard.clone(),
            wired: HashSet::new(),
        };

        let mut present = Vec::new();
        while let Ok(field) = announcements.try_recv() {
            present.push(wiring.wire(field)?);
        }
        debug!(fields = present.len(), "Wired fields present at upload time");

        // Fields announced after this point go through the same wiring,
        // until the upload is aborted.
        let later = UnboundedReceiverStream::new(announcements)
            .take_until(guard.aborted())
            .map(move |field| wiring.wire(field));
        let present_fields = present.len();
        let fields = stream::iter(present.into_iter().map(Ok)).chain(later);

        Ok(PreparedUpload {
            upload: GuardedUpload::new(fields, guard.clone()),
            gate,
            guard,
            request,
            present_fields,
        })
    }
}

struct Wiring {
    guard: SizeGuard,
    wired: HashSet<String>,
}

impl Wiring {
    fn wire(&mut self, field: FieldStream) -> BlobResult<GuardedField> {
        if !self.wired.insert(field.field_name().to_string()) {
            error!(field = %field.field_name(), "Field wired twice");
            let error = PipelineError::new(PipelineErrorKind::DuplicateFieldWiring(
                field.field_name().to_string(),
            ));
            self.guard.abort(error.clone().into());
            return Err(error.into());
        }
        debug!(field = %field.field_name(), "Wiring field");
        Ok(self.guard.wrap(field))
    }
}

/// An upload whose fields are wired but whose source is still paused.
#[derive(Debug)]
pub struct PreparedUpload {
    upload: GuardedUpload,
    gate: watch::Sender<bool>,
    guard: SizeGuard,
    request: UploadRequest,
    present_fields: usize,
}

impl PreparedUpload {
    /// The resolved options the backend will receive.
    pub fn request(&self) -> &UploadRequest {
        &self.request
    }

    /// Number of fields that were already announced when the upload was prepared.
    pub fn present_fields(&self) -> usize {
        self.present_fields
    }

    /// Hand the upload to `backend`, resume the source, and wait for the result.
    ///
    /// A size or wiring violation recorded while the upload ran takes
    /// precedence over whatever the backend reports, so an aborted upload
    /// never yields a manifest.
    #[instrument(skip_all, fields(container = %self.request.container(), backend = backend.backend_name()))]
    pub async fn commit<B>(self, backend: &B) -> BlobResult<Vec<ManifestEntry>>
    where
        B: BlobBackend + ?Sized,
    {
        let PreparedUpload {
            upload,
            gate,
            guard,
            request,
            ..
        } = self;

        let delegated = backend.write(upload, &request);
        gate.send_replace(true);
        debug!("Upload source resumed");

        let result = delegated.await;
        drop(gate);

        match (result, guard.violation()) {
            (_, Some(violation)) => {
                error!(error = %violation, "Upload aborted");
                Err(violation)
            }
            (Err(error), None) => {
                error!(error = %error, "Backend write failed");
                Err(error)
            }
            (Ok(manifest), None) => {
                info!(
                    fields = manifest.len(),
                    bytes = guard.total_bytes_seen(),
                    "Upload stored"
                );
                Ok(manifest)
            }
        }
    }
}
