//! Storage access for transfer artifacts.
//!
//! The engine only ever holds an [`ArtifactHandle`] plus the byte count it
//! observed; the [`Storage`] implementation owns the bytes. [`LocalStorage`]
//! maps logical directories onto a root directory on the local filesystem.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWrite;
use tracing::{debug, instrument};

/// Handle to a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    path: PathBuf,
}

impl ArtifactHandle {
    /// Wraps a storage path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage path behind this handle.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// One entry returned by [`Storage::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// File name inside the listed directory.
    pub name: String,
    /// Handle to the file.
    pub handle: ArtifactHandle,
    /// Size in bytes at listing time.
    pub size: u64,
}

/// Append-capable output stream.
pub type ArtifactWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Storage operations the transfer engines depend on.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Lists regular files in `directory` whose names start with `prefix`.
    ///
    /// A directory that does not exist yields [`io::ErrorKind::NotFound`].
    async fn list(&self, directory: &Path, prefix: &str) -> io::Result<Vec<StoredEntry>>;

    /// Creates (or truncates) `name` inside `directory`, creating the directory if needed.
    async fn create(&self, directory: &Path, name: &str) -> io::Result<ArtifactHandle>;

    /// Opens an output stream positioned at the end of the file.
    async fn open_append(&self, handle: &ArtifactHandle) -> io::Result<ArtifactWriter>;

    /// Renames the file within its directory and returns the new handle.
    async fn rename(&self, handle: &ArtifactHandle, new_name: &str) -> io::Result<ArtifactHandle>;

    /// Deletes the file.
    async fn delete(&self, handle: &ArtifactHandle) -> io::Result<()>;
}

/// [`Storage`] backed by a directory tree on the local filesystem.
///
/// Directories must be relative and stay beneath the root; file names must be
/// a single path component. Anything else fails with
/// [`io::ErrorKind::InvalidInput`].
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates storage rooted at `root`. Logical directories resolve beneath it.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, directory: &Path) -> io::Result<PathBuf> {
        let escapes = directory.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(invalid_input(format!(
                "directory '{}' leaves the storage root",
                directory.display()
            )));
        }
        Ok(self.root.join(directory))
    }
}

/// Accepts only names that are exactly one normal path component.
fn check_file_name(name: &str) -> io::Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(single)), None) if single == name => Ok(()),
        _ => Err(invalid_input(format!("'{name}' is not a plain file name"))),
    }
}

fn invalid_input(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

#[async_trait]
impl Storage for LocalStorage {
    #[instrument(level = "debug", skip(self), fields(directory = %directory.display()))]
    async fn list(&self, directory: &Path, prefix: &str) -> io::Result<Vec<StoredEntry>> {
        let dir = self.resolve(directory)?;
        let mut reader = fs::read_dir(&dir).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(prefix) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(StoredEntry {
                name,
                handle: ArtifactHandle::new(entry.path()),
                size: metadata.len(),
            });
        }
        debug!(matches = entries.len(), "listed directory");
        Ok(entries)
    }

    async fn create(&self, directory: &Path, name: &str) -> io::Result<ArtifactHandle> {
        check_file_name(name)?;
        let dir = self.resolve(directory)?;
        fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        fs::File::create(&path).await?;
        debug!(path = %path.display(), "created file");
        Ok(ArtifactHandle::new(path))
    }

    async fn open_append(&self, handle: &ArtifactHandle) -> io::Result<ArtifactWriter> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(handle.path())
            .await?;
        Ok(Box::new(file))
    }

    async fn rename(&self, handle: &ArtifactHandle, new_name: &str) -> io::Result<ArtifactHandle> {
        check_file_name(new_name)?;
        let parent = handle.path().parent().unwrap_or_else(|| Path::new(""));
        let target = parent.join(new_name);
        fs::rename(handle.path(), &target).await?;
        debug!(from = %handle.path().display(), to = %target.display(), "renamed file");
        Ok(ArtifactHandle::new(target))
    }

    async fn delete(&self, handle: &ArtifactHandle) -> io::Result<()> {
        match fs::remove_file(handle.path()).await {
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
