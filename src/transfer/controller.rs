//! Owner of one cancellable transfer and its observable state.
//!
//! A [`TransferController`] launches the unit of work on the runtime and
//! republishes its listener events as `tokio::sync::watch` channels. Events
//! travel over an unbounded channel to a single supervisor task, which is
//! the only writer of observable state, so observers never see two updates
//! race each other.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::download::{DownloadEngine, DownloadRequest};
use super::error::TransferError;
use super::listener::{TransferEventSink, TransferListener};
use super::progress::ProgressSnapshot;
use super::storage::ArtifactHandle;
use super::upload::{UploadEngine, UploadReceipt};

/// Coarse controller status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Nothing running.
    Ready,
    /// A unit of work is running.
    InProgress,
    /// The unit of work died without reporting (panicked).
    Unknown,
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    /// Completed successfully.
    Success,
    /// Failed with an error.
    Failure,
    /// Cancelled by the caller or the system.
    Cancelled,
}

/// Lifecycle of the controller's current transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Idle. Downloads return here after every outcome.
    Ready,
    /// Running.
    InProgress,
    /// Finished. Uploads stay here until the next start.
    Terminal(TerminalKind),
}

/// Direction of the transfers a controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Remote to storage.
    Download,
    /// Source to remote.
    Upload,
}

/// Terminal outcome published by a controller.
#[derive(Debug, Clone)]
pub enum TransferResult<T> {
    /// The transfer succeeded with this payload.
    Success(T),
    /// The transfer failed.
    Failure(Arc<TransferError>),
}

impl<T> TransferResult<T> {
    /// Returns true for [`TransferResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Identifies one `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransferTicket(u64);

impl TransferTicket {
    /// Numeric id.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Errors returned by controller operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    /// One controller runs one transfer at a time.
    #[error("transfer {0} is still running")]
    AlreadyRunning(u64),
}

enum Event<T> {
    Start,
    Progress(ProgressSnapshot),
    Complete(T),
    Error(TransferError),
    Cancel,
}

/// Listener sink that forwards events to the supervisor task.
struct ChannelSink<T> {
    tx: mpsc::UnboundedSender<Event<T>>,
}

impl<T: Send> ChannelSink<T> {
    fn send(&self, event: Event<T>) {
        // receiver gone means the controller already settled this transfer
        let _ = self.tx.send(event);
    }
}

impl<T: Send> TransferEventSink<T> for ChannelSink<T> {
    fn on_start(&self) {
        self.send(Event::Start);
    }

    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.send(Event::Progress(snapshot));
    }

    fn on_complete(&self, result: T) {
        self.send(Event::Complete(result));
    }

    fn on_error(&self, error: TransferError) {
        self.send(Event::Error(error));
    }

    fn on_cancel(&self) {
        self.send(Event::Cancel);
    }
}

struct Active {
    ticket: TransferTicket,
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

struct Shared<T> {
    direction: Direction,
    status: watch::Sender<Status>,
    state: watch::Sender<TransferState>,
    percent: watch::Sender<u8>,
    snapshot: watch::Sender<ProgressSnapshot>,
    result: watch::Sender<Option<TransferResult<T>>>,
}

impl<T> Shared<T> {
    fn settle(&self, kind: TerminalKind) {
        self.state.send_replace(TransferState::Terminal(kind));
        if self.direction == Direction::Download {
            self.state.send_replace(TransferState::Ready);
        }
        self.status.send_replace(Status::Ready);
    }

    fn apply(&self, event: Event<T>, cancel: &CancellationToken) {
        match event {
            Event::Start => debug!("unit of work launched"),
            Event::Progress(snapshot) => {
                self.snapshot.send_replace(snapshot);
                // an unknown total (after a restart) reads as 0%
                let pct = snapshot.percent().unwrap_or(0);
                self.percent.send_if_modified(|current| {
                    let changed = *current != pct;
                    *current = pct;
                    changed
                });
            }
            Event::Complete(payload) => {
                if cancel.is_cancelled() {
                    debug!("dropping completion that raced with cancel");
                    return;
                }
                self.result
                    .send_replace(Some(TransferResult::Success(payload)));
                self.settle(TerminalKind::Success);
            }
            Event::Error(error) => {
                if cancel.is_cancelled() {
                    debug!(error = %error, "dropping failure that raced with cancel");
                    return;
                }
                self.result
                    .send_replace(Some(TransferResult::Failure(Arc::new(error))));
                self.settle(TerminalKind::Failure);
            }
            Event::Cancel => self.settle(TerminalKind::Cancelled),
        }
    }

    fn finish(&self, outcome: Result<(), JoinError>, cancel: &CancellationToken) {
        match outcome {
            Err(error) => {
                warn!(error = %error, "unit of work did not finish cleanly");
                self.state
                    .send_replace(TransferState::Terminal(TerminalKind::Failure));
                self.status.send_replace(Status::Unknown);
            }
            Ok(()) if *self.state.borrow() == TransferState::InProgress => {
                if cancel.is_cancelled() {
                    self.settle(TerminalKind::Cancelled);
                } else {
                    warn!("unit of work ended without a terminal event");
                    self.state.send_replace(TransferState::Ready);
                    self.status.send_replace(Status::Ready);
                }
            }
            Ok(()) => {}
        }
    }
}

/// Runs one transfer at a time and publishes its state.
///
/// Methods that launch work must be called from within a Tokio runtime.
pub struct TransferController<T> {
    shared: Arc<Shared<T>>,
    active: Mutex<Option<Active>>,
    next_ticket: AtomicU64,
    current_ticket: AtomicU64,
}

impl<T> std::fmt::Debug for TransferController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferController")
            .field("direction", &self.shared.direction)
            .field("status", &*self.shared.status.borrow())
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<T> TransferController<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an idle controller.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            shared: Arc::new(Shared {
                direction,
                status: watch::Sender::new(Status::Ready),
                state: watch::Sender::new(TransferState::Ready),
                percent: watch::Sender::new(0),
                snapshot: watch::Sender::new(ProgressSnapshot::default()),
                result: watch::Sender::new(None),
            }),
            active: Mutex::new(None),
            next_ticket: AtomicU64::new(1),
            current_ticket: AtomicU64::new(0),
        }
    }

    /// Direction this controller was created for.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    /// Observes [`Status`].
    #[must_use]
    pub fn status(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    /// Observes [`TransferState`].
    #[must_use]
    pub fn state(&self) -> watch::Receiver<TransferState> {
        self.shared.state.subscribe()
    }

    /// Observes the integer progress percentage (0 while the total is unknown).
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.shared.percent.subscribe()
    }

    /// Observes raw byte counters.
    #[must_use]
    pub fn snapshot(&self) -> watch::Receiver<ProgressSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Observes the terminal result of the latest transfer.
    #[must_use]
    pub fn result(&self) -> watch::Receiver<Option<TransferResult<T>>> {
        self.shared.result.subscribe()
    }

    /// Current status.
    #[must_use]
    pub fn current_status(&self) -> Status {
        *self.shared.status.borrow()
    }

    /// Launches `work` with a fresh listener and cancellation token.
    ///
    /// Status becomes [`Status::InProgress`] before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyRunning`] while an earlier transfer
    /// has not finished.
    pub fn start<F, Fut>(&self, work: F) -> Result<TransferTicket, ControllerError>
    where
        F: FnOnce(Arc<TransferListener<T>>, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = active.as_ref() {
            if !running.supervisor.is_finished() {
                return Err(ControllerError::AlreadyRunning(running.ticket.0));
            }
        }

        let ticket = TransferTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        self.current_ticket.store(ticket.0, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        shared.result.send_replace(None);
        shared.percent.send_if_modified(|pct| std::mem::replace(pct, 0) != 0);
        shared.snapshot.send_replace(ProgressSnapshot::default());
        shared.state.send_replace(TransferState::InProgress);
        shared.status.send_replace(Status::InProgress);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(TransferListener::new(
            Arc::new(ChannelSink { tx }) as Arc<dyn TransferEventSink<T>>
        ));
        listener.on_start();

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let supervisor_cancel = cancel.clone();
        let supervisor = tokio::spawn(async move {
            let worker = tokio::spawn(work(listener, worker_cancel));
            // closes once the worker drops its listener
            while let Some(event) = rx.recv().await {
                shared.apply(event, &supervisor_cancel);
            }
            let outcome = worker.await;
            shared.finish(outcome, &supervisor_cancel);
        });

        info!(ticket = ticket.0, direction = ?self.shared.direction, "transfer started");
        *active = Some(Active {
            ticket,
            cancel,
            supervisor,
        });
        Ok(ticket)
    }

    /// Cancels the transfer identified by `ticket` and waits for it to settle.
    ///
    /// Returns false (and does nothing) when that transfer is not running,
    /// including on a second call for the same ticket.
    #[instrument(skip(self), fields(ticket = ticket.0))]
    pub async fn cancel(&self, ticket: TransferTicket) -> bool {
        let Some(active) = self.take_active(ticket) else {
            debug!("nothing to cancel");
            return false;
        };
        active.cancel.cancel();
        if let Err(error) = active.supervisor.await {
            warn!(error = %error, "supervisor task failed");
            self.shared.status.send_replace(Status::Unknown);
            return true;
        }
        if *self.shared.status.borrow() == Status::InProgress {
            self.shared.status.send_replace(Status::Ready);
        }
        info!("transfer cancelled and settled");
        true
    }

    /// Waits for the transfer identified by `ticket` and returns its result.
    ///
    /// Returns `None` for a cancelled transfer, or when `ticket` is not the
    /// latest one started.
    pub async fn wait(&self, ticket: TransferTicket) -> Option<TransferResult<T>> {
        if let Some(active) = self.take_active(ticket) {
            if let Err(error) = active.supervisor.await {
                warn!(error = %error, "supervisor task failed");
                self.shared.status.send_replace(Status::Unknown);
            }
        }
        if self.current_ticket.load(Ordering::SeqCst) != ticket.0 {
            return None;
        }
        self.shared.result.borrow().clone()
    }

    fn take_active(&self, ticket: TransferTicket) -> Option<Active> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|running| running.ticket == ticket) {
            active.take()
        } else {
            None
        }
    }
}

impl TransferController<ArtifactHandle> {
    /// Starts `request` on `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyRunning`] while an earlier transfer
    /// has not finished.
    pub fn start_download(
        &self,
        engine: DownloadEngine,
        request: DownloadRequest,
    ) -> Result<TransferTicket, ControllerError> {
        self.start(move |listener, cancel| async move {
            engine.download(&request, &listener, &cancel).await;
        })
    }
}

impl TransferController<UploadReceipt> {
    /// Starts uploading the bytes produced by `source` to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyRunning`] while an earlier transfer
    /// has not finished.
    pub fn start_upload<F, R>(
        &self,
        engine: UploadEngine,
        url: impl Into<String>,
        source: F,
    ) -> Result<TransferTicket, ControllerError>
    where
        F: FnOnce() -> io::Result<R> + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let url = url.into();
        self.start(move |listener, cancel| async move {
            engine.upload(&url, source, &listener, &cancel).await;
        })
    }
}
