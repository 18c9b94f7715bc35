//! Constants for the transfer module (timeouts, chunk sizes, naming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Bytes written per copy-loop iteration when downloading.
pub const DOWNLOAD_CHUNK_SIZE: usize = 4 * 1024;

/// Bytes handed to the transport per increment when uploading.
pub const UPLOAD_CHUNK_SIZE: usize = 2 * 1024;

/// Suffix appended to the final file name while a download is in progress.
pub const PARTIAL_SUFFIX: &str = ".download";

/// Content type sent with upload bodies unless configured otherwise.
pub const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// How many clean restarts a download may perform after the remote resource changed.
pub const DEFAULT_MAX_RESOURCE_RESTARTS: u32 = 1;
