//! Transfer identity and file-name derivation.
//!
//! A download is identified by where it lands and where it comes from. The
//! string form of that pair keys the resume record, so changing either the
//! destination or the URL abandons any earlier resume state.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use url::Url;

use super::error::TransferError;

/// Stable key for one logical resumable transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferIdentity {
    relative_path: PathBuf,
    url: String,
}

impl TransferIdentity {
    /// Creates an identity from a destination directory and a source URL.
    #[must_use]
    pub fn new(relative_path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            url: url.into(),
        }
    }

    /// Destination directory, relative to the storage root.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Key used for the persisted resume record.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TransferIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.relative_path.display(), self.url)
    }
}

/// Returns the percent-decoded last path segment of `url`, made safe by
/// [`sanitize_file_name`].
///
/// # Errors
///
/// Returns [`TransferError::InvalidUrl`] when the URL does not parse or its
/// path ends without a file name.
pub fn file_name_from_url(url: &str) -> Result<String, TransferError> {
    let parsed = Url::parse(url).map_err(|_| TransferError::invalid_url(url))?;
    let last = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| TransferError::invalid_url(url))?;
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    Ok(sanitize_file_name(&decoded))
}

/// Turns `name` into a single file name that stays inside its directory.
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`. A name that would still resolve to `.` or `..` has
/// its dots replaced as well, and an empty name becomes `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if replaced.is_empty() {
        return "_".to_string();
    }
    if is_plain_segment(&replaced) {
        replaced
    } else {
        replaced.replace('.', "_")
    }
}

fn is_plain_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Name used on disk while a download is still in progress.
#[must_use]
pub fn partial_file_name(file_name: &str, partial_suffix: &str) -> String {
    format!("{file_name}{partial_suffix}")
}
