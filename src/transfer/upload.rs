//! Upload engine: buffered source, progress-observing POST body.
//!
//! Uploads never resume. The whole source is read into memory first so the
//! request can carry an exact `Content-Length`, then the buffer is streamed to
//! the transport in fixed increments that drive the listener's byte counter.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::error::TransferError;
use super::http::HttpTransport;
use super::listener::UploadListener;
use crate::config::TransferConfig;

/// Server reply to a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    status: u16,
    body: Bytes,
}

impl UploadReceipt {
    /// Creates a receipt.
    #[must_use]
    pub fn new(status: u16, body: Bytes) -> Self {
        Self { status, body }
    }

    /// HTTP status of the reply.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Raw reply body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parses the reply body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Callback receiving the length of each body increment.
pub type ProgressObserver = Arc<dyn Fn(u64) + Send + Sync>;

/// In-memory request body that reports each increment as it is sent.
pub struct ProgressBody {
    data: Bytes,
    chunk_size: usize,
    content_type: String,
    observer: Option<ProgressObserver>,
}

impl std::fmt::Debug for ProgressBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBody")
            .field("len", &self.data.len())
            .field("chunk_size", &self.chunk_size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl ProgressBody {
    /// Wraps `data`, to be sent in `chunk_size` increments.
    #[must_use]
    pub fn new(data: Bytes, chunk_size: usize, content_type: impl Into<String>) -> Self {
        Self {
            data,
            chunk_size: chunk_size.max(1),
            content_type: content_type.into(),
            observer: None,
        }
    }

    /// Sets the callback invoked once per increment.
    #[must_use]
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Exact body length in bytes.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.data.len() as u64
    }

    /// Media type of the body.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Converts the body into a stream of increments.
    ///
    /// The observer fires as each increment is handed to the consumer, so the
    /// reported lengths always sum to [`content_length`](Self::content_length)
    /// once the stream is drained. An empty body yields nothing.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let chunk_size = self.chunk_size;
        stream::unfold(
            (self.data, self.observer),
            move |(mut rest, observer)| async move {
                if rest.is_empty() {
                    return None;
                }
                let chunk = rest.split_to(chunk_size.min(rest.len()));
                if let Some(observer) = &observer {
                    observer(chunk.len() as u64);
                }
                Some((Ok(chunk), (rest, observer)))
            },
        )
    }
}

/// Sends a whole source to a URL in one POST.
#[derive(Clone)]
pub struct UploadEngine {
    transport: Arc<dyn HttpTransport>,
    config: TransferConfig,
}

impl std::fmt::Debug for UploadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UploadEngine {
    /// Creates an engine over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, config: TransferConfig) -> Self {
        Self { transport, config }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Uploads the bytes produced by `source` to `url`.
    ///
    /// Every outcome is delivered through `listener`. If `source` cannot be
    /// opened or read, `on_error` fires and no request is made.
    #[instrument(skip(self, source, listener, cancel))]
    pub async fn upload<F, R>(
        &self,
        url: &str,
        source: F,
        listener: &Arc<UploadListener>,
        cancel: &CancellationToken,
    ) where
        F: FnOnce() -> io::Result<R> + Send,
        R: AsyncRead + Unpin + Send,
    {
        let data = match read_source(source).await {
            Ok(data) => data,
            Err(error) => {
                listener.on_error(TransferError::source_unavailable(error));
                return;
            }
        };

        let len = data.len() as u64;
        listener.resume_from(0);
        listener.set_total(len);
        debug!(len, "upload source buffered");

        if cancel.is_cancelled() {
            listener.on_cancel();
            return;
        }

        let observer_listener = Arc::clone(listener);
        let body = ProgressBody::new(
            data,
            self.config.upload_chunk_size,
            self.config.upload_content_type.clone(),
        )
        .with_observer(Arc::new(move |sent| observer_listener.on_read_bytes(sent)));

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("upload cancelled while sending");
                listener.on_cancel();
            }
            result = self.transport.post(url, body) => match result {
                Ok(receipt) => listener.on_complete(receipt),
                Err(error) if error.is_cancellation() => listener.on_cancel(),
                Err(error) => listener.on_error(error),
            },
        }
    }
}

async fn read_source<F, R>(source: F) -> io::Result<Bytes>
where
    F: FnOnce() -> io::Result<R>,
    R: AsyncRead + Unpin + Send,
{
    let mut reader = source()?;
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}
