//! Error types for the transfer module.
//!
//! Every failure inside an engine is classified into a [`TransferError`]
//! before it reaches a listener. Cancellation is not an error: the
//! [`TransferError::Aborted`] variant exists only so that transports can
//! report a socket-level abort, which the engines then route to `on_cancel`.

use std::error::Error as _;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can end a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level error (DNS resolution, connection refused or reset, TLS errors, etc.)
    #[error("network error transferring {url}: {message}")]
    Network {
        /// The URL being transferred.
        url: String,
        /// Message of the underlying network error.
        message: String,
    },

    /// Request timed out before completion.
    #[error("timeout transferring {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The connection was aborted locally. Treated as a cancellation, never surfaced.
    #[error("connection aborted transferring {url}")]
    Aborted {
        /// The URL being transferred.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} transferring {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or has no file name segment.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// File system error (enumerate, create, write, rename, delete).
    #[error("storage error at {path}: {source}")]
    Storage {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The upload source could not be opened or read.
    #[error("upload source unavailable: {source}")]
    SourceUnavailable {
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The server-side resource no longer matches the recorded size.
    #[error("resource at {url} changed: recorded {expected} bytes, server now reports {actual}")]
    ResourceChanged {
        /// The URL whose content changed.
        url: String,
        /// Total recorded when the transfer first started.
        expected: u64,
        /// Total negotiated now.
        actual: u64,
    },

    /// The stream ended before the negotiated number of bytes arrived.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Partial file that was kept for a later resume.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },
}

impl TransferError {
    /// Creates a network error from a message.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an aborted-connection error.
    pub fn aborted(url: impl Into<String>) -> Self {
        Self::Aborted { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a storage error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Creates an upload-source error.
    pub fn source_unavailable(source: io::Error) -> Self {
        Self::SourceUnavailable { source }
    }

    /// Creates a resource-changed error.
    pub fn resource_changed(url: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::ResourceChanged {
            url: url.into(),
            expected,
            actual,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Classifies a reqwest error raised while sending or streaming.
    ///
    /// A local connection abort becomes [`TransferError::Aborted`]; resets and
    /// every other transport failure stay network errors.
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::timeout(url);
        }
        match io_error_kind(error) {
            Some(io::ErrorKind::ConnectionAborted) => Self::aborted(url),
            _ => Self::network(url, error.to_string()),
        }
    }

    /// Returns true when this error should be reported as a cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Walks the source chain looking for the IO error underneath a transport error.
fn io_error_kind(error: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = error.source();
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        source = current.source();
    }
    None
}

// No `From<reqwest::Error>` or `From<io::Error>` impls: every variant needs a
// url or path that the source error does not carry.
