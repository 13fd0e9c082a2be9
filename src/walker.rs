use crate::{
    config::Config,
    error::{Error, Result},
    filter::PathFilter,
};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Recursively enumerates source files under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    filter: PathFilter,
    respect_gitignore: bool,
    follow_links: bool,
}

impl DirectoryWalker {
    /// Creates a walker that yields paths accepted by `filter`.
    #[must_use]
    pub const fn new(filter: PathFilter) -> Self {
        Self {
            filter,
            respect_gitignore: false,
            follow_links: false,
        }
    }

    /// Creates a walker from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured filter is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            filter: PathFilter::from_config(config)?,
            respect_gitignore: config.respect_gitignore,
            follow_links: config.follow_links,
        })
    }

    /// Returns the filter applied to discovered files.
    #[must_use]
    pub const fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Starts a lazy, single-pass traversal of `root`.
    ///
    /// Ordering of the yielded paths follows the filesystem and must not be
    /// relied upon.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotADirectory`] if `root` is not an existing
    /// directory. The check happens once, before traversal begins.
    pub fn walk(&self, root: &Path) -> Result<Walk> {
        if !root.is_dir() {
            return Err(Error::not_a_directory(root));
        }

        debug!("Starting walk of {}", root.display());
        Ok(self.build(root))
    }

    fn build(&self, root: &Path) -> Walk {
        let dir_filter = self.filter.clone();
        let root_buf = root.to_path_buf();

        let inner = WalkBuilder::new(root)
            .standard_filters(false)
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .parents(self.respect_gitignore)
            .require_git(false)
            .follow_links(self.follow_links)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                // The root itself is never excluded.
                !(is_dir && entry.path() != root_buf && dir_filter.excludes_dir(entry.path()))
            })
            .build();

        Walk {
            inner,
            filter: self.filter.clone(),
            errors: 0,
        }
    }

    /// Walks `root` on a blocking thread, streaming matching paths through a
    /// bounded channel so the file set is never materialized.
    ///
    /// The traversal stops early once the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotADirectory`] if `root` is not an existing directory.
    pub async fn stream(&self, root: &Path, capacity: usize) -> Result<mpsc::Receiver<PathBuf>> {
        let is_dir = tokio::fs::metadata(root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(Error::not_a_directory(root));
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let walker = self.clone();
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut walk = walker.build(&root);
            let mut sent = 0usize;
            for path in walk.by_ref() {
                if tx.blocking_send(path).is_err() {
                    debug!("Walk of {} abandoned by receiver", root.display());
                    return;
                }
                sent += 1;
            }
            debug!(
                "Walk of {} complete: {} matching files, {} errors",
                root.display(),
                sent,
                walk.errors()
            );
        });

        Ok(rx)
    }
}

/// Lazy iterator over matching files, produced by [`DirectoryWalker::walk`].
pub struct Walk {
    inner: ignore::Walk,
    filter: PathFilter,
    errors: usize,
}

impl Walk {
    /// Number of traversal errors skipped so far.
    #[must_use]
    pub const fn errors(&self) -> usize {
        self.errors
    }
}

impl Iterator for Walk {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                    if self.filter.accepts(entry.path()) {
                        trace!("Discovered {}", entry.path().display());
                        return Some(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Walk error: {}", e);
                    self.errors += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for Walk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walk")
            .field("filter", &self.filter)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}
