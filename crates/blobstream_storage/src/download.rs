//! The download conduit and the sinks it can be piped into.

use crate::ByteStream;
use blobstream_core::ReadRequest;
use blobstream_error::{BackendError, BlobError, BlobResult};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Future resolving to a backend's byte stream.
pub type OpenFuture = Pin<Box<dyn Future<Output = BlobResult<ByteStream>> + Send>>;

/// Destination a download can be piped into.
#[async_trait::async_trait]
pub trait DownloadSink: Send + Sync {
    /// Accept one chunk.
    async fn write_chunk(&self, chunk: Bytes) -> BlobResult<()>;

    /// Called once after the last chunk of a successful download.
    async fn finish(&self) -> BlobResult<()> {
        Ok(())
    }
}

/// Sink that keeps everything in memory.
///
/// # Examples
///
/// ```
/// use blobstream_storage::{CollectSink, DownloadSink};
///
/// # tokio_test_block_on(async {
/// let sink = CollectSink::default();
/// sink.write_chunk("hello ".into()).await.unwrap();
/// sink.write_chunk("world".into()).await.unwrap();
/// assert_eq!(sink.contents(), b"hello world");
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CollectSink {
    buffer: Mutex<Vec<u8>>,
    finished: AtomicBool,
}

impl CollectSink {
    /// Bytes received so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Whether the download completed successfully.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DownloadSink for CollectSink {
    async fn write_chunk(&self, chunk: Bytes) -> BlobResult<()> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(&self) -> BlobResult<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink forwarding into any [`AsyncWrite`], flushing on finish.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> WriterSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }
}

#[async_trait::async_trait]
impl<W> DownloadSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&self, chunk: Bytes) -> BlobResult<()> {
        self.writer
            .lock()
            .await
            .write_all(&chunk)
            .await
            .map_err(|e| BackendError::new(format!("sink write failed: {}", e)).into())
    }

    async fn finish(&self) -> BlobResult<()> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| BackendError::new(format!("sink flush failed: {}", e)).into())
    }
}

enum Conduit {
    Opening(OpenFuture),
    Streaming(ByteStream),
    Piped(oneshot::Receiver<BlobResult<u64>>),
    Failed(BlobError),
    Done,
}

/// Output of a download.
///
/// Used directly it is a `Stream` of chunks. Once piped, a background task
/// delivers every chunk to each attached sink exactly once and the conduit
/// itself yields no data, only the pump's error if one occurs. Either way,
/// errors arrive as stream items on a later poll, never at construction.
///
/// The conduit holds only weak references to its sinks.
pub struct DownloadStream {
    request: Option<ReadRequest>,
    state: Conduit,
    destinations: Vec<Weak<dyn DownloadSink>>,
    joins: Option<mpsc::UnboundedSender<Arc<dyn DownloadSink>>>,
    delivered: u64,
}

impl DownloadStream {
    /// Conduit that opens `open` on first use.
    pub fn opening(request: ReadRequest, open: OpenFuture) -> Self {
        Self::with_state(Some(request), Conduit::Opening(open))
    }

    /// Conduit over an already open byte stream.
    pub fn from_stream(request: ReadRequest, stream: ByteStream) -> Self {
        Self::with_state(Some(request), Conduit::Streaming(stream))
    }

    /// Conduit that yields `error` on its first poll.
    pub fn failed(error: BlobError) -> Self {
        Self::with_state(None, Conduit::Failed(error))
    }

    fn with_state(request: Option<ReadRequest>, state: Conduit) -> Self {
        Self {
            request,
            state,
            destinations: Vec::new(),
            joins: None,
            delivered: 0,
        }
    }

    /// The resolved read, absent when the locator was rejected.
    pub fn request(&self) -> Option<&ReadRequest> {
        self.request.as_ref()
    }

    /// Sinks this conduit was piped into that are still alive.
    pub fn destinations(&self) -> Vec<Arc<dyn DownloadSink>> {
        self.destinations.iter().filter_map(Weak::upgrade).collect()
    }

    /// Whether the conduit has been piped.
    pub fn is_piped(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Bytes delivered so far, to the caller or to the sinks.
    pub fn bytes_delivered(&self) -> u64 {
        self.delivered
    }

    /// Pipe the rest of the download into `sink`.
    ///
    /// The first call spawns the pump onto the current tokio runtime; later
    /// calls join the running pump and receive chunks from that point on.
    /// Outside a runtime nothing is spawned and the conduit yields an error
    /// instead.
    pub fn pipe(&mut self, sink: Arc<dyn DownloadSink>) -> &mut Self {
        self.destinations.push(Arc::downgrade(&sink));

        if let Some(joins) = &self.joins {
            if joins.send(sink).is_err() {
                debug!("Download already finished, late sink receives nothing");
            }
            return self;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                if matches!(self.state, Conduit::Opening(_) | Conduit::Streaming(_)) {
                    warn!("Download piped outside a tokio runtime");
                    self.state = Conduit::Failed(
                        BackendError::new("download piped outside a tokio runtime").into(),
                    );
                }
                return self;
            }
        };

        let source = match std::mem::replace(&mut self.state, Conduit::Done) {
            Conduit::Opening(open) => PumpSource::Opening(open),
            Conduit::Streaming(stream) => PumpSource::Streaming(stream),
            other => {
                self.state = other;
                debug!("Nothing left to pipe");
                return self;
            }
        };

        let (join_tx, join_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let already = self.delivered;
        runtime.spawn(async move {
            let outcome = pump(source, vec![sink], join_rx).await.map(|n| n + already);
            if let Err(error) = &outcome {
                warn!(error = %error, "Piped download failed");
            }
            let _ = done_tx.send(outcome);
        });

        self.joins = Some(join_tx);
        self.state = Conduit::Piped(done_rx);
        self
    }

    /// Drive the download to completion.
    ///
    /// Unpiped chunks are discarded. Returns the total bytes delivered or
    /// the first error.
    pub async fn finished(mut self) -> BlobResult<u64> {
        while let Some(item) = self.next().await {
            item?;
        }
        Ok(self.delivered)
    }
}

impl std::fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("request", &self.request)
            .field("destinations", &self.destinations.len())
            .field("delivered", &self.delivered)
            .finish_non_exhaustive()
    }
}

impl Stream for DownloadStream {
    type Item = BlobResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                Conduit::Opening(open) => match open.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(stream)) => this.state = Conduit::Streaming(stream),
                    Poll::Ready(Err(error)) => {
                        this.state = Conduit::Done;
                        return Poll::Ready(Some(Err(error)));
                    }
                },
                Conduit::Streaming(stream) => {
                    return match stream.as_mut().poll_next(cx) {
                        Poll::Pending => Poll::Pending,
                        Poll::Ready(Some(Ok(chunk))) => {
                            this.delivered += chunk.len() as u64;
                            Poll::Ready(Some(Ok(chunk)))
                        }
                        Poll::Ready(Some(Err(error))) => {
                            this.state = Conduit::Done;
                            Poll::Ready(Some(Err(error)))
                        }
                        Poll::Ready(None) => {
                            this.state = Conduit::Done;
                            Poll::Ready(None)
                        }
                    };
                }
                Conduit::Piped(done) => {
                    return match Pin::new(done).poll(cx) {
                        Poll::Pending => Poll::Pending,
                        Poll::Ready(Ok(Ok(total))) => {
                            this.delivered = total;
                            this.state = Conduit::Done;
                            Poll::Ready(None)
                        }
                        Poll::Ready(Ok(Err(error))) => {
                            this.state = Conduit::Done;
                            Poll::Ready(Some(Err(error)))
                        }
                        Poll::Ready(Err(_)) => {
                            this.state = Conduit::Done;
                            Poll::Ready(Some(Err(BackendError::new(
                                "download pump stopped before finishing",
                            )
                            .into())))
                        }
                    };
                }
                Conduit::Failed(_) => {
                    return match std::mem::replace(&mut this.state, Conduit::Done) {
                        Conduit::Failed(error) => Poll::Ready(Some(Err(error))),
                        _ => Poll::Ready(None),
                    };
                }
                Conduit::Done => return Poll::Ready(None),
            }
        }
    }
}

enum PumpSource {
    Opening(OpenFuture),
    Streaming(ByteStream),
}

async fn pump(
    source: PumpSource,
    mut sinks: Vec<Arc<dyn DownloadSink>>,
    mut joins: mpsc::UnboundedReceiver<Arc<dyn DownloadSink>>,
) -> BlobResult<u64> {
    let mut stream = match source {
        PumpSource::Opening(open) => open.await?,
        PumpSource::Streaming(stream) => stream,
    };

    let mut total = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        while let Ok(sink) = joins.try_recv() {
            sinks.push(sink);
        }
        for sink in &sinks {
            sink.write_chunk(chunk.clone()).await?;
        }
        total += chunk.len() as u64;
    }

    while let Ok(sink) = joins.try_recv() {
        sinks.push(sink);
    }
    for sink in &sinks {
        sink.finish().await?;
    }
    debug!(bytes = total, sinks = sinks.len(), "Piped download complete");
    Ok(total)
}
