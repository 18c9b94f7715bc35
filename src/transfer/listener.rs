//! Per-transfer callback object and the event sink it reports to.
//!
//! The engines never talk to observers directly. They drive a
//! [`TransferListener`], which owns the byte counters and the one-shot
//! terminal guard, and the listener forwards each accepted event to a
//! [`TransferEventSink`]. The controller's sink marshals events onto its own
//! task; tests plug in recording sinks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::error::TransferError;
use super::progress::{ProgressSnapshot, ProgressTracker};
use super::storage::ArtifactHandle;
use super::upload::UploadReceipt;

/// Consumer of transfer events.
///
/// `on_progress` fires once per chunk and must not block; the terminal
/// callbacks fire at most once per listener, and only one of them fires.
pub trait TransferEventSink<T>: Send + Sync {
    /// The unit of work was launched.
    fn on_start(&self) {}

    /// Bytes were transferred.
    fn on_progress(&self, snapshot: ProgressSnapshot);

    /// The transfer finished successfully.
    fn on_complete(&self, result: T);

    /// The transfer failed.
    fn on_error(&self, error: TransferError);

    /// The transfer was cancelled.
    fn on_cancel(&self);
}

/// Listener for downloads; succeeds with the final file handle.
pub type DownloadListener = TransferListener<ArtifactHandle>;

/// Listener for uploads; succeeds with the server's reply.
pub type UploadListener = TransferListener<UploadReceipt>;

/// Per-transfer state: byte counters plus completion and cancel flags.
pub struct TransferListener<T> {
    tracker: ProgressTracker,
    has_cancelled: AtomicBool,
    finished: AtomicBool,
    sink: Arc<dyn TransferEventSink<T>>,
}

impl<T> std::fmt::Debug for TransferListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferListener")
            .field("progress", &self.tracker.snapshot())
            .field("has_cancelled", &self.has_cancelled())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl<T> TransferListener<T> {
    /// Creates a listener reporting to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TransferEventSink<T>>) -> Self {
        Self {
            tracker: ProgressTracker::new(),
            has_cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            sink,
        }
    }

    /// Signals that the unit of work was launched.
    pub fn on_start(&self) {
        debug!("transfer started");
        self.sink.on_start();
    }

    /// Seeds the counters with bytes already on disk before the first request.
    pub fn resume_from(&self, transferred: u64) {
        debug!(transferred, "transfer lifecycle begins");
        self.tracker.reset(transferred);
    }

    /// Begins a fresh lifecycle at zero after the remote resource changed.
    pub fn restart(&self) {
        info!("restarting transfer from the first byte");
        self.tracker.reset(0);
        self.sink.on_progress(self.tracker.snapshot());
    }

    /// Records the negotiated total size.
    pub fn set_total(&self, total: u64) {
        self.tracker.set_total(total);
    }

    /// Reports the current counters without moving them.
    pub fn report_progress(&self) {
        self.sink.on_progress(self.tracker.snapshot());
    }

    /// Adds `len` bytes to the running count and reports progress.
    pub fn on_read_bytes(&self, len: u64) {
        let snapshot = self.tracker.advance(len);
        self.sink.on_progress(snapshot);
    }

    /// Current counters.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Delivers a successful result unless a terminal event already fired.
    pub fn on_complete(&self, result: T) {
        if self.finished.swap(true, Ordering::SeqCst) {
            debug!("ignoring completion after terminal event");
            return;
        }
        info!(transferred = self.tracker.snapshot().transferred, "transfer complete");
        self.sink.on_complete(result);
    }

    /// Delivers a failure unless a terminal event already fired.
    pub fn on_error(&self, error: TransferError) {
        if self.finished.swap(true, Ordering::SeqCst) {
            debug!(error = %error, "ignoring error after terminal event");
            return;
        }
        warn!(error = %error, "transfer failed");
        self.sink.on_error(error);
    }

    /// Delivers a cancellation. Repeat calls are no-ops.
    pub fn on_cancel(&self) {
        if self.has_cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(transferred = self.tracker.snapshot().transferred, "transfer cancelled");
        self.sink.on_cancel();
    }

    /// Whether `on_cancel` has been called.
    #[must_use]
    pub fn has_cancelled(&self) -> bool {
        self.has_cancelled.load(Ordering::SeqCst)
    }

    /// Whether a terminal event has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start,
        Progress(ProgressSnapshot),
        Complete(u32),
        Error(String),
        Cancel,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl TransferEventSink<u32> for Recorder {
        fn on_start(&self) {
            self.events.lock().unwrap().push(Event::Start);
        }
        fn on_progress(&self, snapshot: ProgressSnapshot) {
            self.events.lock().unwrap().push(Event::Progress(snapshot));
        }
        fn on_complete(&self, result: u32) {
            self.events.lock().unwrap().push(Event::Complete(result));
        }
        fn on_error(&self, error: TransferError) {
            self.events.lock().unwrap().push(Event::Error(error.to_string()));
        }
        fn on_cancel(&self) {
            self.events.lock().unwrap().push(Event::Cancel);
        }
    }

    fn listener() -> (Arc<Recorder>, TransferListener<u32>) {
        let recorder = Arc::new(Recorder::default());
        let listener = TransferListener::new(recorder.clone() as Arc<dyn TransferEventSink<u32>>);
        (recorder, listener)
    }

    #[test]
    fn test_on_read_bytes_accumulates_from_resume_offset() {
        let (recorder, listener) = listener();
        listener.resume_from(400);
        listener.set_total(900);
        listener.on_read_bytes(100);
        listener.on_read_bytes(400);

        assert_eq!(
            recorder.events(),
            vec![
                Event::Progress(ProgressSnapshot {
                    transferred: 500,
                    total: 900
                }),
                Event::Progress(ProgressSnapshot {
                    transferred: 900,
                    total: 900
                }),
            ]
        );
    }

    #[test]
    fn test_on_cancel_is_idempotent() {
        let (recorder, listener) = listener();
        listener.on_cancel();
        listener.on_cancel();

        assert!(listener.has_cancelled());
        assert_eq!(recorder.events(), vec![Event::Cancel]);
    }

    #[test]
    fn test_only_first_terminal_event_is_delivered() {
        let (recorder, listener) = listener();
        listener.on_start();
        listener.on_complete(7);
        listener.on_error(TransferError::timeout("https://example.com/a.zip"));
        listener.on_cancel();
        listener.on_complete(8);

        assert_eq!(recorder.events(), vec![Event::Start, Event::Complete(7)]);
        assert!(listener.is_finished());
    }

    #[test]
    fn test_restart_reports_zero_progress() {
        let (recorder, listener) = listener();
        listener.resume_from(400);
        listener.restart();

        assert_eq!(
            recorder.events(),
            vec![Event::Progress(ProgressSnapshot::default())]
        );
        assert_eq!(listener.progress().transferred, 0);
    }
}
