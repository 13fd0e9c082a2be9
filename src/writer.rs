use crate::{
    config::Config,
    content::FileContent,
    error::{Error, Result},
};
use std::{
    ffi::OsString,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};
use tracing::{debug, trace, warn};

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Result of committing transformed content to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The original now holds the new content.
    Committed,
    /// Nothing was replaced; the original is byte-for-byte unchanged.
    RolledBack(Error),
}

impl WriteOutcome {
    /// Returns true if the new content was committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Returns the rollback reason, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<&Error> {
        match self {
            Self::Committed => None,
            Self::RolledBack(reason) => Some(reason),
        }
    }
}

/// Temporary sibling file that is removed when dropped unless disarmed.
///
/// Dropping happens on every exit path of a write, so a temp file never
/// outlives the commit that created it.
#[derive(Debug)]
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn for_target(target: &Path) -> Result<Self> {
        let file_name = target.file_name().ok_or_else(|| {
            Error::io(
                target,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

        let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut name = OsString::from(file_name);
        name.push(format!(".{}-{seq}.tmp", std::process::id()));

        Ok(Self {
            path: target.with_file_name(name),
            armed: true,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Called once the temp file has been renamed into place.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temp file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

/// Replaces files atomically through a temporary sibling.
#[derive(Debug, Clone, Default)]
pub struct AtomicWriter {
    backup_existing: bool,
}

impl AtomicWriter {
    /// Creates a writer without backups.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            backup_existing: false,
        }
    }

    /// Creates a writer from configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            backup_existing: config.backup_existing,
        }
    }

    /// Writes `content` to `location` atomically.
    ///
    /// # Process
    ///
    /// 1. Resolves `location` through symlinks, so a link keeps pointing at
    ///    the file it names
    /// 2. Creates a backup if the file exists and backups are enabled
    /// 3. Writes content to a fresh temporary sibling
    /// 4. Syncs the temporary file to disk
    /// 5. Renames the temporary file over the resolved target
    ///
    /// The steps run as one unit on the blocking pool. Dropping the returned
    /// future does not interrupt them: a started write always commits or
    /// rolls back, and the temporary file never survives a rollback.
    /// Failures are returned as [`WriteOutcome::RolledBack`], never as an
    /// error.
    pub async fn commit(&self, location: &Path, content: &FileContent) -> WriteOutcome {
        let writer = self.clone();
        let target = location.to_path_buf();
        let text = content.clone();

        let result = match tokio::task::spawn_blocking(move || {
            writer.write_file_atomic(&target, &text)
        })
        .await
        {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::io(location, io::Error::other(e.to_string()))),
        };

        match result {
            Ok(()) => {
                debug!("Committed {} bytes to {}", content.len(), location.display());
                WriteOutcome::Committed
            }
            Err(e) => {
                warn!("Rolled back {}: {}", location.display(), e);
                WriteOutcome::RolledBack(e)
            }
        }
    }

    fn write_file_atomic(&self, location: &Path, content: &FileContent) -> Result<()> {
        let target = resolve_target(location)?;
        let mut temp = TempFile::for_target(&target)?;

        if self.backup_existing && target.exists() {
            Self::backup_file(&target)?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp.path())
            .map_err(|e| Error::io(temp.path(), e))?;

        file.write_all(content.as_str().as_bytes())
            .map_err(|e| Error::io(temp.path(), e))?;

        // Ensure data is flushed to disk
        file.sync_all().map_err(|e| Error::io(temp.path(), e))?;
        drop(file);

        // Keep the original's permissions.
        if let Ok(metadata) = fs::metadata(&target) {
            fs::set_permissions(temp.path(), metadata.permissions())
                .map_err(|e| Error::io(temp.path(), e))?;
        }

        trace!("Renaming {} over {}", temp.path().display(), target.display());
        fs::rename(temp.path(), &target).map_err(|e| Error::io(location, e))?;
        temp.disarm();

        Ok(())
    }

    /// Creates a timestamped copy of an existing file.
    fn backup_file(path: &Path) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .to_string_lossy();

        let backup_path = path.with_file_name(format!("{filename}.backup.{timestamp}"));

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(())
    }
}

/// Follows symlinks to the file that should be replaced. A missing target
/// is written where it was named.
fn resolve_target(location: &Path) -> Result<PathBuf> {
    match fs::symlink_metadata(location) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            fs::canonicalize(location).map_err(|e| Error::io(location, e))
        }
        _ => Ok(location.to_path_buf()),
    }
}
