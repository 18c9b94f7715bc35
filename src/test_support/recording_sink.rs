use std::sync::{Arc, Mutex};

use crate::transfer::{ProgressSnapshot, TransferError, TransferEventSink, TransferListener};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent<T> {
    Start,
    Progress(ProgressSnapshot),
    Complete(T),
    Error(String),
    Cancel,
}

/// Sink that keeps every event it receives, in order.
pub(crate) struct RecordingSink<T> {
    events: Mutex<Vec<SinkEvent<T>>>,
}

impl<T: Clone> RecordingSink<T> {
    pub(crate) fn events(&self) -> Vec<SinkEvent<T>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn progress(&self) -> Vec<ProgressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Progress(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn terminal(&self) -> Option<SinkEvent<T>> {
        self.events().into_iter().rev().find(|event| {
            matches!(
                event,
                SinkEvent::Complete(_) | SinkEvent::Error(_) | SinkEvent::Cancel
            )
        })
    }

    fn push(&self, event: SinkEvent<T>) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

impl<T: Clone + Send + 'static> TransferEventSink<T> for RecordingSink<T> {
    fn on_start(&self) {
        self.push(SinkEvent::Start);
    }
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.push(SinkEvent::Progress(snapshot));
    }
    fn on_complete(&self, result: T) {
        self.push(SinkEvent::Complete(result));
    }
    fn on_error(&self, error: TransferError) {
        self.push(SinkEvent::Error(error.to_string()));
    }
    fn on_cancel(&self) {
        self.push(SinkEvent::Cancel);
    }
}

/// Listener wired to a fresh recording sink.
pub(crate) fn recording_listener<T: Clone + Send + 'static>()
-> (Arc<RecordingSink<T>>, Arc<TransferListener<T>>) {
    let sink = Arc::new(RecordingSink {
        events: Mutex::new(Vec::new()),
    });
    let listener = Arc::new(TransferListener::new(
        sink.clone() as Arc<dyn TransferEventSink<T>>
    ));
    (sink, listener)
}
