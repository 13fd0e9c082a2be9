use crate::error::{Error, Result};
use crate::filter::PathFilter;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Immutable full text of one file.
///
/// Equality and display are those of the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FileContent(String);

impl FileContent {
    /// Wraps text as file content.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there is no text at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.0.lines().count()
    }

    /// Consumes the value and returns the owned text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileContent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// A file's location paired with the content read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path the content was read from
    pub location: PathBuf,

    /// Content at the time of the read
    pub content: FileContent,
}

impl FileRecord {
    /// Creates a new record.
    #[must_use]
    pub fn new(location: impl Into<PathBuf>, content: impl Into<FileContent>) -> Self {
        Self {
            location: location.into(),
            content: content.into(),
        }
    }
}

/// Loads file content as UTF-8 text.
#[derive(Debug, Clone)]
pub struct ContentReader {
    filter: PathFilter,
}

impl ContentReader {
    /// Creates a reader that validates single-file paths against `filter`.
    #[must_use]
    pub const fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    /// Reads the whole file at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUtf8`] if the bytes are not valid UTF-8 and
    /// [`Error::Io`] for any other read failure. Content is never lossily
    /// decoded.
    pub async fn read(&self, location: &Path) -> Result<FileContent> {
        let text = tokio::fs::read_to_string(location)
            .await
            .map_err(|e| Error::read(location, e))?;

        trace!("Read {} bytes from {}", text.len(), location.display());
        Ok(FileContent(text))
    }

    /// Validates `location` against the filter, then reads it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] before any IO if the filter rejects
    /// the path, otherwise the errors of [`ContentReader::read`].
    pub async fn read_checked(&self, location: &Path) -> Result<FileContent> {
        if !self.filter.accepts(location) {
            return Err(Error::invalid_path(location));
        }
        self.read(location).await
    }

    /// Reads `location` into a [`FileRecord`].
    ///
    /// # Errors
    ///
    /// Same as [`ContentReader::read`].
    pub async fn read_record(&self, location: PathBuf) -> Result<FileRecord> {
        let content = self.read(&location).await?;
        Ok(FileRecord { location, content })
    }
}
