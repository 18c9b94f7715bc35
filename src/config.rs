//! Tunables shared by the transfer engines.

use thiserror::Error;

use crate::transfer::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_RESOURCE_RESTARTS, DEFAULT_UPLOAD_CONTENT_TYPE,
    DOWNLOAD_CHUNK_SIZE, PARTIAL_SUFFIX, READ_TIMEOUT_SECS, UPLOAD_CHUNK_SIZE,
};

/// Largest chunk size accepted for either direction (1 MiB).
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A timeout of zero seconds.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },

    /// A chunk size outside `1..=1048576`.
    #[error("{field} must be between 1 and {MAX_CHUNK_SIZE} bytes (got {value})")]
    ChunkSize {
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: usize,
    },

    /// The partial suffix must be a non-empty name fragment.
    #[error("partial suffix {0:?} must be non-empty and must not contain path separators")]
    PartialSuffix(String),

    /// Upload content type left empty.
    #[error("upload content type must not be empty")]
    EmptyContentType,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Largest slice written to storage per copy-loop iteration.
    pub download_chunk_size: usize,
    /// Size of each upload body increment.
    pub upload_chunk_size: usize,
    /// Suffix marking an in-progress download on disk.
    pub partial_suffix: String,
    /// `Content-Type` sent with upload bodies.
    pub upload_content_type: String,
    /// Clean restarts allowed per download when the remote resource changes.
    pub max_resource_restarts: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            download_chunk_size: DOWNLOAD_CHUNK_SIZE,
            upload_chunk_size: UPLOAD_CHUNK_SIZE,
            partial_suffix: PARTIAL_SUFFIX.to_string(),
            upload_content_type: DEFAULT_UPLOAD_CONTENT_TYPE.to_string(),
            max_resource_restarts: DEFAULT_MAX_RESOURCE_RESTARTS,
        }
    }
}

impl TransferConfig {
    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "connect_timeout_secs",
            });
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "read_timeout_secs",
            });
        }
        check_chunk("download_chunk_size", self.download_chunk_size)?;
        check_chunk("upload_chunk_size", self.upload_chunk_size)?;
        if self.partial_suffix.is_empty()
            || self.partial_suffix.contains('/')
            || self.partial_suffix.contains('\\')
        {
            return Err(ConfigError::PartialSuffix(self.partial_suffix.clone()));
        }
        if self.upload_content_type.trim().is_empty() {
            return Err(ConfigError::EmptyContentType);
        }
        Ok(())
    }
}

fn check_chunk(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_CHUNK_SIZE {
        return Err(ConfigError::ChunkSize { field, value });
    }
    Ok(())
}
