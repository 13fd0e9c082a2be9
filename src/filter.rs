//! Path selection.
//!
//! Decides which discovered paths are source files to rewrite, and which
//! directories the walker should never descend into.

use crate::config::Config;
use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::OsStr;
use std::path::Path;

/// Eligibility rule for discovered paths.
///
/// A file is accepted iff its trailing extension equals the configured
/// suffix exactly (case-sensitive). Nothing here touches the filesystem.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extension: String,
    exclude_directories: GlobSet,
}

impl PathFilter {
    /// Creates a filter that only accepts the given extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is empty.
    pub fn new(extension: impl Into<String>) -> Result<Self> {
        Self::with_excludes(extension, &[])
    }

    /// Creates a filter with directory exclusion globs.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is empty or a pattern is invalid.
    pub fn with_excludes(extension: impl Into<String>, exclude_directories: &[String]) -> Result<Self> {
        let extension = extension.into();
        if extension.is_empty() {
            return Err(Error::config("extension must not be empty"));
        }

        Ok(Self {
            extension,
            exclude_directories: Self::build_globset(exclude_directories)?,
        })
    }

    /// Builds the filter described by a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclude pattern is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_excludes(config.extension.clone(), &config.exclude_directories)
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::config(format!("Invalid glob pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Returns the extension this filter accepts.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns true if `path` is a source file this run should process.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension() == Some(OsStr::new(&self.extension))
    }

    /// Returns true if the walker must not descend into `dir`.
    #[must_use]
    pub fn excludes_dir(&self, dir: &Path) -> bool {
        self.exclude_directories.is_match(dir)
    }
}
