//! Resumable download engine.
//!
//! One call to [`DownloadEngine::download`] drives a single logical download:
//!
//! ```text
//! scan storage ──┬─ complete ──────────────────────────────► success (no request)
//!                ├─ partial (n bytes) ─► GET Range: bytes=n- ─┐
//!                └─ nothing ──────────► GET Range: bytes=0- ─┤
//!                                                            ▼
//!                          negotiate total = n + remaining, check resume record
//!                              │ mismatch: delete partial, clear record, restart
//!                              ▼
//!                          copy body in chunks → rename partial → success
//! ```
//!
//! A 416 for a non-empty partial means the range starts at the end of the
//! resource: the partial is finalized when the resume record says it holds
//! every byte, and discarded for a fresh request otherwise.
//!
//! Every outcome reaches the caller through the [`DownloadListener`]; nothing
//! is returned and nothing panics past this boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::TransferError;
use super::http::{ByteStream, HttpTransport, RangedResponse};
use super::identity::{TransferIdentity, file_name_from_url, partial_file_name, sanitize_file_name};
use super::listener::DownloadListener;
use super::locator::{LocalArtifact, locate};
use super::resume_store::ResumeStateStore;
use super::storage::{ArtifactHandle, ArtifactWriter, Storage};
use crate::config::TransferConfig;

/// Maps the URL's last path segment to the name stored on disk.
pub type RenameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// What to download and where to put it.
#[derive(Clone)]
pub struct DownloadRequest {
    directory: PathBuf,
    url: String,
    rename: Option<RenameFn>,
}

impl std::fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("directory", &self.directory)
            .field("url", &self.url)
            .field("rename", &self.rename.is_some())
            .finish()
    }
}

impl DownloadRequest {
    /// Downloads `url` into `directory` (relative to the storage root).
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            url: url.into(),
            rename: None,
        }
    }

    /// Stores the file under `rename(last path segment)` instead.
    #[must_use]
    pub fn with_rename(mut self, rename: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.rename = Some(Arc::new(rename));
        self
    }

    /// Destination directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Everything needed to (re)start one logical download.
///
/// The engine keeps this descriptor for the whole call so that a resource
/// change can restart from the first byte without asking the caller again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInvocation {
    identity: TransferIdentity,
    file_name: String,
    restarts_remaining: u32,
}

impl DownloadInvocation {
    /// Identity keying the resume record.
    #[must_use]
    pub fn identity(&self) -> &TransferIdentity {
        &self.identity
    }

    /// Final file name on disk.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Destination directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.identity.relative_path()
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.identity.url()
    }

    /// Clean restarts still allowed if the remote resource changes.
    #[must_use]
    pub fn restarts_remaining(&self) -> u32 {
        self.restarts_remaining
    }
}

/// Why an attempt stopped short of success.
#[derive(Debug)]
enum Halt {
    Cancelled,
    ResourceChanged {
        expected: u64,
        actual: u64,
        partial: Option<ArtifactHandle>,
    },
    Failed(TransferError),
}

impl From<TransferError> for Halt {
    fn from(error: TransferError) -> Self {
        if error.is_cancellation() {
            Self::Cancelled
        } else {
            Self::Failed(error)
        }
    }
}

/// Downloads files over a range-aware transport into [`Storage`].
#[derive(Clone)]
pub struct DownloadEngine {
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn ResumeStateStore>,
    storage: Arc<dyn Storage>,
    config: TransferConfig,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates an engine from its collaborators.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn ResumeStateStore>,
        storage: Arc<dyn Storage>,
        config: TransferConfig,
    ) -> Self {
        Self {
            transport,
            store,
            storage,
            config,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Resolves the file name and identity for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidUrl`] when the URL has no file name, or
    /// when `rename` maps it to an empty name. Any other name `rename` returns
    /// is passed through [`sanitize_file_name`].
    pub fn prepare(&self, request: &DownloadRequest) -> Result<DownloadInvocation, TransferError> {
        let segment = file_name_from_url(request.url())?;
        let file_name = match &request.rename {
            Some(rename) => {
                let renamed = rename(&segment);
                if renamed.is_empty() {
                    return Err(TransferError::invalid_url(request.url()));
                }
                sanitize_file_name(&renamed)
            }
            None => segment,
        };
        Ok(DownloadInvocation {
            identity: TransferIdentity::new(request.directory(), request.url()),
            file_name,
            restarts_remaining: self.config.max_resource_restarts,
        })
    }

    /// Downloads `request`, reporting every outcome to `listener`.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        listener: &DownloadListener,
        cancel: &CancellationToken,
    ) {
        match self.prepare(request) {
            Ok(invocation) => self.run(invocation, listener, cancel).await,
            Err(error) => listener.on_error(error),
        }
    }

    /// Runs a prepared invocation to a terminal listener event.
    #[instrument(skip_all, fields(url = %invocation.url(), file = %invocation.file_name()))]
    pub async fn run(
        &self,
        mut invocation: DownloadInvocation,
        listener: &DownloadListener,
        cancel: &CancellationToken,
    ) {
        loop {
            match self.attempt(&invocation, listener, cancel).await {
                Ok(handle) => {
                    self.forget(invocation.identity()).await;
                    listener.on_complete(handle);
                    return;
                }
                Err(Halt::Cancelled) => {
                    listener.on_cancel();
                    return;
                }
                Err(Halt::Failed(error)) if cancel.is_cancelled() => {
                    debug!(error = %error, "failure raced with cancellation");
                    listener.on_cancel();
                    return;
                }
                Err(Halt::Failed(error)) => {
                    listener.on_error(error);
                    return;
                }
                Err(Halt::ResourceChanged {
                    expected,
                    actual,
                    partial,
                }) => {
                    warn!(expected, actual, "remote resource changed, discarding local bytes");
                    if let Some(handle) = partial {
                        if let Err(error) = self.storage.delete(&handle).await {
                            listener.on_error(TransferError::storage(handle.path(), error));
                            return;
                        }
                    }
                    self.forget(invocation.identity()).await;

                    if cancel.is_cancelled() {
                        listener.on_cancel();
                        return;
                    }
                    if invocation.restarts_remaining == 0 {
                        listener.on_error(TransferError::resource_changed(
                            invocation.url(),
                            expected,
                            actual,
                        ));
                        return;
                    }
                    invocation.restarts_remaining -= 1;
                    listener.restart();
                }
            }
        }
    }

    async fn attempt(
        &self,
        invocation: &DownloadInvocation,
        listener: &DownloadListener,
        cancel: &CancellationToken,
    ) -> Result<ArtifactHandle, Halt> {
        let suffix = self.config.partial_suffix.as_str();
        let directory = invocation.directory();

        let local = locate(self.storage.as_ref(), invocation.file_name(), directory, suffix)
            .await
            .map_err(|e| TransferError::storage(directory, e))?;

        let mut offset = local.resume_offset();
        let mut partial = match local {
            LocalArtifact::Complete { handle, size } => {
                info!(size, "file already present, skipping request");
                listener.resume_from(size);
                listener.set_total(size);
                listener.report_progress();
                return Ok(handle);
            }
            LocalArtifact::Partial { handle, size } => {
                info!(offset = size, "resuming partial download");
                Some(handle)
            }
            LocalArtifact::None => None,
        };
        listener.resume_from(offset);

        let mut response = self.request(invocation.url(), offset, cancel).await?;

        if offset > 0 && response.is_range_not_satisfiable() {
            if let Some(handle) = partial.take() {
                if self.recorded_total(invocation.identity()).await == Some(offset) {
                    info!(offset, "partial already holds every byte, finalizing");
                    listener.set_total(offset);
                    listener.report_progress();
                    return self.finalize(&handle, invocation.file_name(), offset).await;
                }
                self.storage
                    .delete(&handle)
                    .await
                    .map_err(|e| TransferError::storage(handle.path(), e))?;
            }
            warn!(offset, "range not satisfiable for unrecorded partial, starting over");
            self.forget(invocation.identity()).await;
            offset = 0;
            listener.resume_from(0);
            response = self.request(invocation.url(), 0, cancel).await?;
        }

        if offset > 0 && !response.is_partial() {
            warn!(offset, status = response.status, "range ignored by server, starting over");
            if let Some(stale) = partial.take() {
                self.storage
                    .delete(&stale)
                    .await
                    .map_err(|e| TransferError::storage(stale.path(), e))?;
            }
            offset = 0;
            listener.resume_from(0);
        }

        let total = response
            .content_length
            .map(|remaining| offset.saturating_add(remaining));
        match total {
            Some(total) => {
                self.check_resume_record(invocation.identity(), total, partial.as_ref())
                    .await?;
                listener.set_total(total);
            }
            None => debug!("server did not report a length, total unknown"),
        }

        let handle = match partial {
            Some(handle) => handle,
            None => {
                let name = partial_file_name(invocation.file_name(), suffix);
                self.storage
                    .create(directory, &name)
                    .await
                    .map_err(|e| TransferError::storage(directory.join(&name), e))?
            }
        };

        let mut writer = self
            .storage
            .open_append(&handle)
            .await
            .map_err(|e| TransferError::storage(handle.path(), e))?;
        let copied = self
            .copy_body(response.body, &mut writer, &handle, listener, cancel)
            .await;
        let flushed = writer.flush().await;
        drop(writer);
        let written = copied?;
        flushed.map_err(|e| TransferError::storage(handle.path(), e))?;

        let received = offset.saturating_add(written);
        if let Some(total) = total
            && received < total
        {
            return Err(TransferError::integrity(handle.path(), total, received).into());
        }

        self.finalize(&handle, invocation.file_name(), received).await
    }

    /// Issues the ranged GET, giving up as soon as `cancel` fires.
    async fn request(
        &self,
        url: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<RangedResponse, Halt> {
        if cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Halt::Cancelled),
            response = self.transport.get_range(url, offset) => Ok(response?),
        }
    }

    /// Moves the partial file to its final name.
    async fn finalize(
        &self,
        handle: &ArtifactHandle,
        file_name: &str,
        bytes: u64,
    ) -> Result<ArtifactHandle, Halt> {
        let finished = self
            .storage
            .rename(handle, file_name)
            .await
            .map_err(|e| TransferError::storage(handle.path(), e))?;
        debug!(bytes, path = %finished.path().display(), "download finalized");
        Ok(finished)
    }

    /// Streams `body` into `writer`, one bounded slice at a time.
    async fn copy_body(
        &self,
        mut body: ByteStream,
        writer: &mut ArtifactWriter,
        handle: &ArtifactHandle,
        listener: &DownloadListener,
        cancel: &CancellationToken,
    ) -> Result<u64, Halt> {
        let chunk_size = self.config.download_chunk_size.max(1);
        let mut written: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Halt::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                return Ok(written);
            };
            let chunk = chunk?;

            for piece in chunk.chunks(chunk_size) {
                if cancel.is_cancelled() {
                    return Err(Halt::Cancelled);
                }
                writer
                    .write_all(piece)
                    .await
                    .map_err(|e| TransferError::storage(handle.path(), e))?;
                let len = piece.len() as u64;
                written += len;
                listener.on_read_bytes(len);
            }
        }
    }

    /// Expected total stored for `identity`, if one can be read.
    async fn recorded_total(&self, identity: &TransferIdentity) -> Option<u64> {
        match self.store.get(&identity.key()).await {
            Ok(recorded) => recorded.and_then(|total| u64::try_from(total).ok()),
            Err(error) => {
                warn!(error = %error, "could not read resume record, treating as absent");
                None
            }
        }
    }

    /// Compares a freshly negotiated total with the stored record.
    async fn check_resume_record(
        &self,
        identity: &TransferIdentity,
        total: u64,
        partial: Option<&ArtifactHandle>,
    ) -> Result<(), Halt> {
        match self.recorded_total(identity).await {
            None => {
                debug!(total, "recording expected total");
                let stored_total = i64::try_from(total).unwrap_or(i64::MAX);
                if let Err(error) = self.store.set(&identity.key(), stored_total).await {
                    warn!(error = %error, "could not store resume record");
                }
                Ok(())
            }
            Some(expected) if expected == total => {
                debug!(total, "resume record matches");
                Ok(())
            }
            Some(expected) => Err(Halt::ResourceChanged {
                expected,
                actual: total,
                partial: partial.cloned(),
            }),
        }
    }

    async fn forget(&self, identity: &TransferIdentity) {
        if let Err(error) = self.store.remove(&identity.key()).await {
            warn!(error = %error, "could not clear resume record");
        }
    }
}
