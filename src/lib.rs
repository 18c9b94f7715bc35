//! Resumable Transfer Core Library
//!
//! Resumable, cancellable, progress-tracked HTTP downloads and uploads.
//! A download interrupted by cancellation, a crash, or a network failure
//! picks up from the bytes already on disk, unless the remote resource
//! changed in the meantime, in which case it starts over cleanly.
//!
//! # Architecture
//!
//! - [`transfer`] - Engines, listeners, the controller, and their collaborators
//! - [`config`] - Engine tunables and validation
//! - [`db`] - SQLite connection and migrations backing durable resume records
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use transfer_core::{
//!     Direction, DownloadEngine, DownloadRequest, LocalStorage, MemoryResumeStore,
//!     ReqwestTransport, TransferConfig, TransferController,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransferConfig::default();
//! let engine = DownloadEngine::new(
//!     Arc::new(ReqwestTransport::from_config(&config)?),
//!     Arc::new(MemoryResumeStore::new()),
//!     Arc::new(LocalStorage::new("./downloads")),
//!     config,
//! );
//! let controller = TransferController::new(Direction::Download);
//! let ticket = controller.start_download(
//!     engine,
//!     DownloadRequest::new("", "https://example.com/a.zip"),
//! )?;
//! let result = controller.wait(ticket).await;
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, TransferConfig};
pub use db::{Database, DbError};
pub use transfer::{
    ArtifactHandle, ControllerError, Direction, DownloadEngine, DownloadListener,
    DownloadRequest, HttpTransport, LocalArtifact, LocalStorage, MemoryResumeStore,
    ProgressSnapshot, ReqwestTransport, ResumeStateStore, SqliteResumeStore, Status, Storage,
    TerminalKind, TransferController, TransferError, TransferEventSink, TransferListener,
    TransferResult, TransferState, TransferTicket, UploadEngine, UploadListener, UploadReceipt,
};
