use crate::{
    content::FileContent,
    error::{Error, Result},
    pipeline::TransformOutcome,
    writer::{AtomicWriter, WriteOutcome},
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// How a file's transform ended, without the transformed text.
///
/// Reports outlive the files they describe, so they keep only the size of
/// the new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformStatus {
    /// The transformer produced new content.
    Transformed {
        /// Size of the new content in bytes
        bytes: usize,
        /// Number of lines in the new content
        lines: usize,
    },
    /// Reading or transforming the file failed.
    Failed(Error),
}

impl TransformStatus {
    /// Returns true for [`TransformStatus::Transformed`].
    #[must_use]
    pub const fn is_transformed(&self) -> bool {
        matches!(self, Self::Transformed { .. })
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Transformed { .. } => None,
            Self::Failed(e) => Some(e),
        }
    }
}

impl From<&TransformOutcome> for TransformStatus {
    fn from(outcome: &TransformOutcome) -> Self {
        match outcome {
            TransformOutcome::Success(content) => Self::Transformed {
                bytes: content.len(),
                lines: content.line_count(),
            },
            TransformOutcome::Failure(e) => Self::Failed(e.clone()),
        }
    }
}

impl From<TransformOutcome> for TransformStatus {
    fn from(outcome: TransformOutcome) -> Self {
        Self::from(&outcome)
    }
}

/// Terminal record for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// File the outcomes belong to
    pub location: PathBuf,

    /// Result of reading and transforming the file
    pub transform: TransformStatus,

    /// Result of committing, present only when the transform succeeded and
    /// a write was attempted
    pub write: Option<WriteOutcome>,
}

impl FileReport {
    /// Creates a report entry.
    #[must_use]
    pub fn new(
        location: impl Into<PathBuf>,
        transform: impl Into<TransformStatus>,
        write: Option<WriteOutcome>,
    ) -> Self {
        Self {
            location: location.into(),
            transform: transform.into(),
            write,
        }
    }

    /// Returns true if the transformed content reached disk.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.write.as_ref().is_some_and(WriteOutcome::is_committed)
    }

    /// Returns the reason this file was not committed, if any.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match (&self.transform, &self.write) {
            (TransformStatus::Failed(e), _) => Some(e),
            (TransformStatus::Transformed { .. }, Some(write)) => write.reason(),
            (TransformStatus::Transformed { .. }, None) => None,
        }
    }

    /// The final write outcome as seen by callers: a failed transform is a
    /// rollback with the transform's reason.
    ///
    /// Returns `None` for a file that was transformed but never written.
    #[must_use]
    pub fn write_outcome(&self) -> Option<WriteOutcome> {
        match (&self.transform, &self.write) {
            (_, Some(write)) => Some(write.clone()),
            (TransformStatus::Failed(e), None) => Some(WriteOutcome::RolledBack(e.clone())),
            (TransformStatus::Transformed { .. }, None) => None,
        }
    }
}

/// Thread-safe, append-only sink for per-file outcomes.
///
/// Observing never fails and never affects pipeline control flow.
#[derive(Debug)]
pub struct OutcomeReporter {
    root: Option<PathBuf>,
    started: Instant,
    entries: Mutex<Vec<FileReport>>,
}

impl OutcomeReporter {
    /// Creates a reporter. `root` is used to show relative paths.
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Records and logs one file's outcome.
    pub fn observe(&self, report: FileReport) {
        let shown = display_path(self.root.as_deref(), &report.location);
        match (&report.transform, &report.write) {
            (TransformStatus::Transformed { .. }, Some(WriteOutcome::Committed)) => {
                info!("✓ {}", shown);
            }
            (TransformStatus::Transformed { .. }, Some(WriteOutcome::RolledBack(reason))) => {
                warn!("✗ {} rolled back: {}", shown, reason);
            }
            (TransformStatus::Transformed { bytes, .. }, None) => {
                info!("• {} transformed ({} bytes)", shown, bytes);
            }
            (TransformStatus::Failed(reason), _) => {
                warn!("✗ {} failed: {}", shown, reason);
            }
        }

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }

    /// Number of outcomes observed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the observed outcomes into a batch report.
    #[must_use]
    pub fn finish(&self, cancelled: bool) -> BatchReport {
        let entries = std::mem::take(
            &mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner),
        );

        BatchReport {
            root: self.root.clone(),
            entries,
            duration: self.started.elapsed(),
            cancelled,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn display_path(root: Option<&Path>, path: &Path) -> String {
    root.and_then(|root| pathdiff::diff_paths(path, root))
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

/// Terminal record of a directory run.
///
/// Entries are in completion order; callers must not rely on it.
#[derive(Debug, Clone)]
pub struct BatchReport {
    root: Option<PathBuf>,
    entries: Vec<FileReport>,
    duration: Duration,
    cancelled: bool,
    generated_at: String,
}

impl BatchReport {
    /// All per-file entries.
    #[must_use]
    pub fn entries(&self) -> &[FileReport] {
        &self.entries
    }

    /// Looks up the entry for `location`.
    #[must_use]
    pub fn get(&self, location: &Path) -> Option<&FileReport> {
        self.entries.iter().find(|entry| entry.location == location)
    }

    /// Number of files with an outcome.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no file was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Files whose new content was committed.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.entries.iter().filter(|e| e.is_committed()).count()
    }

    /// Files whose transform succeeded but whose write rolled back.
    #[must_use]
    pub fn rolled_back(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.write, Some(WriteOutcome::RolledBack(_))))
            .count()
    }

    /// Files that failed before reaching the writer.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.transform, TransformStatus::Failed(_)))
            .count()
    }

    /// Files that were transformed but not written.
    #[must_use]
    pub fn transformed_only(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.transform.is_transformed() && e.write.is_none())
            .count()
    }

    /// Returns true if the run was cancelled before completing.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns true if the run completed and no file failed or rolled back.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.entries.iter().all(|e| e.error().is_none())
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the throughput in files per second.
    #[must_use]
    pub fn throughput_files_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.len() as f64 / secs
        } else {
            0.0
        }
    }

    /// Renders the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.summary()).map_err(Error::from)
    }

    /// Writes the JSON report to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let json = FileContent::new(self.to_json()?);
        match AtomicWriter::new().commit(path, &json).await {
            WriteOutcome::Committed => {
                info!("Wrote report to {}", path.display());
                Ok(())
            }
            WriteOutcome::RolledBack(e) => Err(e),
        }
    }

    fn summary(&self) -> ReportSummary {
        ReportSummary {
            root: self.root.as_ref().map(|r| r.display().to_string()),
            total_files: self.len(),
            committed: self.committed(),
            rolled_back: self.rolled_back(),
            failed: self.failed(),
            transformed_only: self.transformed_only(),
            cancelled: self.cancelled,
            duration_secs: self.duration.as_secs_f64(),
            generated_at: self.generated_at.clone(),
            files: self
                .entries
                .iter()
                .map(|entry| FileSummary {
                    path: display_path(self.root.as_deref(), &entry.location),
                    status: match (&entry.transform, &entry.write) {
                        (TransformStatus::Failed(_), _) => "failed",
                        (_, Some(WriteOutcome::Committed)) => "committed",
                        (_, Some(WriteOutcome::RolledBack(_))) => "rolled_back",
                        (_, None) => "transformed",
                    },
                    bytes: match entry.transform {
                        TransformStatus::Transformed { bytes, .. } => Some(bytes),
                        TransformStatus::Failed(_) => None,
                    },
                    error: entry.error().map(ToString::to_string),
                })
                .collect(),
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              Documentation Run Summary                ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Files Processed:      {:>8}                        ║", self.len());
        println!("║   - Committed:        {:>8}                        ║", self.committed());
        println!("║   - Rolled back:      {:>8}                        ║", self.rolled_back());
        println!("║   - Failed:           {:>8}                        ║", self.failed());
        let transformed_only = self.transformed_only();
        if transformed_only > 0 {
            println!("║   - Not written:      {:>8}                        ║", transformed_only);
        }
        println!("║                                                       ║");
        println!(
            "║ Duration:             {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        if self.cancelled {
            println!("║ ⚠ Run was cancelled before completion                ║");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");

        for entry in &self.entries {
            if let Some(error) = entry.error() {
                println!(
                    "  ✗ {}: {}",
                    display_path(self.root.as_deref(), &entry.location),
                    error
                );
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ReportSummary {
    root: Option<String>,
    total_files: usize,
    committed: usize,
    rolled_back: usize,
    failed: usize,
    transformed_only: usize,
    cancelled: bool,
    duration_secs: f64,
    generated_at: String,
    files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
struct FileSummary {
    path: String,
    status: &'static str,
    bytes: Option<usize>,
    error: Option<String>,
}
