use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the llm-docgen library.
///
/// Errors are `Clone` because they are stored inside per-file outcomes
/// and batch reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A single-file entry point was given a path the filter rejects.
    #[error("Invalid source path '{path}': extension does not match the configured suffix")]
    InvalidPath {
        /// Rejected path
        path: PathBuf,
    },

    /// A directory entry point was given a root that is not a directory.
    #[error("Not a directory: '{path}'")]
    NotADirectory {
        /// Root that failed the check
        path: PathBuf,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// The transformer failed for one file.
    #[error("Transformation failed for '{path}': {message}")]
    Transformation {
        /// File being transformed
        path: PathBuf,
        /// Error message reported by the transformer
        message: String,
    },

    /// The transformer returned empty text and empty output is not allowed.
    #[error("Transformer returned empty output for '{path}'")]
    EmptyOutput {
        /// File being transformed
        path: PathBuf,
    },

    /// The run was cancelled before this item completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Maps a read error, separating decoding failures from other IO errors.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::InvalidData {
            Self::invalid_utf8(path)
        } else {
            Self::io(path, source)
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid path error.
    #[must_use]
    pub fn invalid_path(path: impl Into<PathBuf>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Creates a not-a-directory error.
    #[must_use]
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory { path: path.into() }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates a transformation error.
    #[must_use]
    pub fn transformation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Transformation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error happened at the filesystem boundary.
    ///
    /// Decoding failures count as IO errors.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::InvalidUtf8 { .. })
    }

    /// Returns true if the transformer produced this error.
    #[must_use]
    pub const fn is_transformation(&self) -> bool {
        matches!(self, Self::Transformation { .. } | Self::EmptyOutput { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the error makes a whole entry point call ill-defined
    /// rather than failing a single file.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath { .. } | Self::NotADirectory { .. } | Self::Config { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
