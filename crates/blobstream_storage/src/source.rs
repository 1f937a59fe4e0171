//! Upload sources: a paused, dynamic set of named field streams.
//!
//! An [`UploadSource`] is created together with an [`UploadSender`]. The
//! sender announces fields (possibly long after the upload has started) and
//! hands back a [`FieldSender`] per field. Every `FieldSender::send` waits
//! on the source's resume gate, so no chunk moves until the pipeline has
//! wired the source to a backend and resumed it.

use blobstream_error::{BlobResult, PipelineError, PipelineErrorKind};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};

/// Chunks buffered per field before the producer has to wait.
pub const DEFAULT_FIELD_BUFFER: usize = 16;

/// Consumer half of an upload: the fields announced so far and those still to come.
///
/// # Examples
///
/// ```
/// use blobstream_storage::UploadSource;
///
/// let (source, sender) = UploadSource::new();
/// let avatar = sender.file("avatar", "avatar.png").unwrap();
/// assert_eq!(avatar.field_name(), "avatar");
/// assert!(!source.is_resumed());
/// ```
#[derive(Debug)]
pub struct UploadSource {
    announcements: mpsc::UnboundedReceiver<FieldStream>,
    gate: watch::Sender<bool>,
}

impl UploadSource {
    /// Create a paused source and the sender used to feed it.
    pub fn new() -> (Self, UploadSender) {
        Self::with_buffer(DEFAULT_FIELD_BUFFER)
    }

    /// Like [`UploadSource::new`] with a custom per-field chunk buffer.
    pub fn with_buffer(buffer: usize) -> (Self, UploadSender) {
        let (announce, announcements) = mpsc::unbounded_channel();
        let (gate, gate_rx) = watch::channel(false);
        let source = Self {
            announcements,
            gate,
        };
        let sender = UploadSender {
            announce,
            gate: gate_rx,
            buffer: buffer.max(1),
        };
        (source, sender)
    }

    /// Whether data has been allowed to flow.
    pub fn is_resumed(&self) -> bool {
        *self.gate.borrow()
    }

    /// Open the gate so producers may send.
    ///
    /// The pipeline does this itself once a backend is attached. A source
    /// resumed by anyone else is rejected by the pipeline.
    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn into_parts(self) -> (mpsc::UnboundedReceiver<FieldStream>, watch::Sender<bool>) {
        (self.announcements, self.gate)
    }
}

/// Producer half of an upload. Dropping it (and every [`FieldSender`])
/// tells the pipeline that no more fields will arrive.
#[derive(Debug, Clone)]
pub struct UploadSender {
    announce: mpsc::UnboundedSender<FieldStream>,
    gate: watch::Receiver<bool>,
    buffer: usize,
}

impl UploadSender {
    /// Announce a field with no original filename.
    pub fn field(&self, field_name: impl Into<String>) -> BlobResult<FieldSender> {
        self.announce_field(field_name.into(), None)
    }

    /// Announce a field carrying an uploaded file's original name.
    pub fn file(
        &self,
        field_name: impl Into<String>,
        filename: impl Into<String>,
    ) -> BlobResult<FieldSender> {
        self.announce_field(field_name.into(), Some(filename.into()))
    }

    fn announce_field(&self, field_name: String, filename: Option<String>) -> BlobResult<FieldSender> {
        let (tx, chunks) = mpsc::channel(self.buffer);
        let stream = FieldStream {
            field_name: field_name.clone(),
            filename,
            chunks,
            bytes_written: 0,
        };
        self.announce.send(stream).map_err(|_| {
            PipelineError::new(PipelineErrorKind::FieldClosed(field_name.clone()))
        })?;
        tracing::trace!(field = %field_name, "Announced upload field");
        Ok(FieldSender {
            field_name,
            tx,
            gate: self.gate.clone(),
        })
    }
}

/// Writes chunks into one field of an upload.
#[derive(Debug)]
pub struct FieldSender {
    field_name: String,
    tx: mpsc::Sender<BlobResult<Bytes>>,
    gate: watch::Receiver<bool>,
}

impl FieldSender {
    /// Name of the field this sender feeds.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Send one chunk, waiting until the source is resumed and the field
    /// has buffer space.
    ///
    /// # Errors
    ///
    /// `FieldClosed` once the pipeline stops reading this field, e.g. after
    /// a size limit was hit or the upload was dropped.
    pub async fn send(&mut self, chunk: impl Into<Bytes>) -> BlobResult<()> {
        self.wait_resumed().await?;
        self.tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| self.closed())
    }

    /// Terminate the field with a producer-side failure.
    pub async fn fail(mut self, message: impl Into<String>) -> BlobResult<()> {
        self.wait_resumed().await?;
        let error = PipelineError::new(PipelineErrorKind::SourceFailure(message.into()));
        self.tx
            .send(Err(error.into()))
            .await
            .map_err(|_| self.closed())
    }

    async fn wait_resumed(&mut self) -> BlobResult<()> {
        self.gate
            .wait_for(|resumed| *resumed)
            .await
            .map(|_| ())
            .map_err(|_| self.closed())
    }

    fn closed(&self) -> blobstream_error::BlobError {
        PipelineError::new(PipelineErrorKind::FieldClosed(self.field_name.clone())).into()
    }
}

/// One named byte stream within an upload.
#[derive(Debug)]
pub struct FieldStream {
    field_name: String,
    filename: Option<String>,
    chunks: mpsc::Receiver<BlobResult<Bytes>>,
    bytes_written: u64,
}

impl FieldStream {
    /// Field name, unique within one upload.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Original filename supplied by the producer.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Bytes read out of this field so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Stream for FieldStream {
    type Item = BlobResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.chunks.poll_recv(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            self.bytes_written += chunk.len() as u64;
        }
        polled
    }
}
