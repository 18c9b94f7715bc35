//! Probing storage for an earlier download of the same file.
//!
//! Probing by name instead of keeping a database of files means a transfer
//! can pick up again after a restart as long as the file itself survived.

use std::io;
use std::path::Path;

use tracing::{debug, instrument};

use super::storage::{ArtifactHandle, Storage};

/// What storage already holds for a target file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalArtifact {
    /// Nothing usable was found.
    None,
    /// An interrupted download, carrying its temporary suffix.
    Partial {
        /// Handle to the partial file.
        handle: ArtifactHandle,
        /// Bytes already on disk.
        size: u64,
    },
    /// The finished file under its final name.
    Complete {
        /// Handle to the finished file.
        handle: ArtifactHandle,
        /// Size of the finished file.
        size: u64,
    },
}

impl LocalArtifact {
    /// Bytes a download can resume from (0 unless the artifact is partial).
    #[must_use]
    pub fn resume_offset(&self) -> u64 {
        match self {
            Self::Partial { size, .. } => *size,
            Self::None | Self::Complete { .. } => 0,
        }
    }
}

/// Classifies files in `directory` that start with `target_file_name`.
///
/// Candidates are checked in name order and the first one that qualifies
/// wins. A name ending in the target's extension (and not in the partial
/// suffix) is complete; a name containing the partial suffix is partial;
/// anything else is ignored. A directory that does not exist holds nothing.
///
/// # Errors
///
/// Returns the storage error when the directory exists but cannot be listed.
#[instrument(level = "debug", skip(storage), fields(directory = %directory.display()))]
pub async fn locate(
    storage: &dyn Storage,
    target_file_name: &str,
    directory: &Path,
    partial_suffix: &str,
) -> io::Result<LocalArtifact> {
    let mut entries = match storage.list(directory, target_file_name).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("directory does not exist yet");
            return Ok(LocalArtifact::None);
        }
        Err(error) => return Err(error),
    };
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let extension = target_extension(target_file_name);
    for entry in entries {
        if !entry.name.ends_with(partial_suffix) && entry.name.ends_with(extension) {
            debug!(name = %entry.name, size = entry.size, "found completed file");
            return Ok(LocalArtifact::Complete {
                handle: entry.handle,
                size: entry.size,
            });
        }
        if entry.name.contains(partial_suffix) {
            debug!(name = %entry.name, size = entry.size, "found partial file");
            return Ok(LocalArtifact::Partial {
                handle: entry.handle,
                size: entry.size,
            });
        }
    }

    Ok(LocalArtifact::None)
}

/// Text after the last `.`, or the whole name when there is none.
fn target_extension(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map_or(file_name, |(_, extension)| extension)
}
