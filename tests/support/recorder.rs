//! Event sink that records what a listener forwards.

use std::sync::{Arc, Mutex, PoisonError};

use transfer_core::{ProgressSnapshot, TransferError, TransferEventSink, TransferListener};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    Start,
    Progress(ProgressSnapshot),
    Complete(T),
    Error(String),
    Cancel,
}

pub struct Recorder<T> {
    events: Mutex<Vec<Event<T>>>,
}

impl<T: Clone> Recorder<T> {
    pub fn events(&self) -> Vec<Event<T>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn progress(&self) -> Vec<ProgressSnapshot> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Progress(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    /// Number of terminal events delivered.
    pub fn terminal_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Complete(_) | Event::Error(_) | Event::Cancel))
            .count()
    }

    pub fn last(&self) -> Option<Event<T>> {
        self.events().pop()
    }

    fn push(&self, event: Event<T>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl<T: Clone + Send + 'static> TransferEventSink<T> for Recorder<T> {
    fn on_start(&self) {
        self.push(Event::Start);
    }
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.push(Event::Progress(snapshot));
    }
    fn on_complete(&self, result: T) {
        self.push(Event::Complete(result));
    }
    fn on_error(&self, error: TransferError) {
        self.push(Event::Error(error.to_string()));
    }
    fn on_cancel(&self) {
        self.push(Event::Cancel);
    }
}

/// Returns a listener and the recorder behind it.
pub fn recording_listener<T: Clone + Send + 'static>() -> (Arc<Recorder<T>>, Arc<TransferListener<T>>)
{
    let recorder = Arc::new(Recorder {
        events: Mutex::new(Vec::new()),
    });
    let listener = Arc::new(TransferListener::new(
        recorder.clone() as Arc<dyn TransferEventSink<T>>
    ));
    (recorder, listener)
}
