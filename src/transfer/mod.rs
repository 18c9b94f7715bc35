//! Resumable, cancellable, progress-tracked HTTP transfers.
//!
//! # Components
//!
//! - [`locate`]: scans storage for a complete or partial earlier download
//! - [`ResumeStateStore`]: expected-total records keyed by [`TransferIdentity`]
//! - [`DownloadEngine`] / [`UploadEngine`]: the streaming state machines
//! - [`TransferListener`]: byte counters and one-shot terminal events
//! - [`TransferController`]: owns a running transfer and publishes its state
//!
//! Collaborators sit behind traits ([`HttpTransport`], [`Storage`],
//! [`ResumeStateStore`]) so engines can run against fakes.

pub mod constants;
mod controller;
mod download;
mod error;
mod http;
mod identity;
mod listener;
mod locator;
mod progress;
mod resume_store;
mod storage;
mod upload;

pub use controller::{
    ControllerError, Direction, Status, TerminalKind, TransferController, TransferResult,
    TransferState, TransferTicket,
};
pub use download::{DownloadEngine, DownloadInvocation, DownloadRequest, RenameFn};
pub use error::TransferError;
pub use http::{
    ByteStream, HttpTransport, RangedResponse, ReqwestTransport, STATUS_PARTIAL_CONTENT,
    STATUS_RANGE_NOT_SATISFIABLE,
};
pub use identity::{TransferIdentity, file_name_from_url, partial_file_name, sanitize_file_name};
pub use listener::{DownloadListener, TransferEventSink, TransferListener, UploadListener};
pub use locator::{LocalArtifact, locate};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use resume_store::{MemoryResumeStore, ResumeStateStore, ResumeStoreError, SqliteResumeStore};
pub use storage::{ArtifactHandle, ArtifactWriter, LocalStorage, Storage, StoredEntry};
pub use upload::{ProgressBody, ProgressObserver, UploadEngine, UploadReceipt};
