use crate::{
    config::Config,
    content::{ContentReader, FileContent, FileRecord},
    error::{Error, Result},
    pipeline::{BoundedPipeline, TransformOutcome},
    report::{BatchReport, FileReport, OutcomeReporter, TransformStatus},
    transform::Transformer,
    walker::DirectoryWalker,
    writer::{AtomicWriter, WriteOutcome},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Outcome of [`FileProcessor::summarize`].
#[derive(Debug, Clone)]
pub struct ProjectSummary {
    /// Number of fragments included in the combined text
    pub fragments: usize,

    /// Per-file transform outcomes, in submission order
    pub report: BatchReport,

    /// Result of writing the combined text
    pub write: WriteOutcome,
}

/// Entry points used by the command line: one file, a whole tree, or a
/// combined summary of a tree.
#[derive(Debug, Clone)]
pub struct FileProcessor {
    config: Config,
    walker: DirectoryWalker,
    reader: ContentReader,
    pipeline: BoundedPipeline,
}

impl FileProcessor {
    /// Creates a processor that rewrites files with `transformer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config, transformer: Arc<dyn Transformer>) -> Result<Self> {
        config.validate()?;

        let walker = DirectoryWalker::from_config(&config)?;
        let reader = ContentReader::new(walker.filter().clone());
        let pipeline = BoundedPipeline::from_config(&config, transformer);

        Ok(Self {
            config,
            walker,
            reader,
            pipeline,
        })
    }

    /// Uses `token` to cancel runs started by this processor.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.pipeline = self.pipeline.with_cancellation(token);
        self
    }

    /// The token that cancels this processor's runs.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        self.pipeline.cancellation_token()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Rewrites a single file.
    ///
    /// Per-file failures (read, transform, write) are returned as
    /// [`WriteOutcome::RolledBack`] with the original left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] without touching the filesystem if the
    /// path does not have the configured extension.
    #[instrument(skip(self), fields(path = %location.display()))]
    pub async fn process_one(&self, location: &Path) -> Result<WriteOutcome> {
        if !self.walker.filter().accepts(location) {
            return Err(Error::invalid_path(location));
        }

        let report = match self.reader.read(location).await {
            Ok(content) => {
                self.pipeline
                    .process(FileRecord::new(location, content))
                    .await
            }
            Err(e) => FileReport::new(location, TransformOutcome::Failure(e), None),
        };

        let outcome = report.write_outcome().unwrap_or_else(|| {
            WriteOutcome::RolledBack(Error::transformation(location, "no write was attempted"))
        });
        OutcomeReporter::new(None).observe(report);
        Ok(outcome)
    }

    /// Rewrites every matching file under `root`.
    ///
    /// Files are discovered, read, transformed and written as a stream with
    /// at most `max_concurrency` transforms in flight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotADirectory`] before any traversal if `root` is not
    /// a directory. Per-file failures only appear in the report.
    #[instrument(skip(self), fields(root = %root.display()))]
    pub async fn process_all(&self, root: &Path) -> Result<BatchReport> {
        let paths = self
            .walker
            .stream(root, self.config.channel_capacity)
            .await?;

        info!(
            "Processing *.{} files with up to {} concurrent transforms",
            self.config.extension, self.config.max_concurrency
        );

        let reporter = Arc::new(OutcomeReporter::new(Some(root.to_path_buf())));
        self.pipeline
            .run(paths, self.reader.clone(), Arc::clone(&reporter))
            .await;

        let report = reporter.finish(self.cancellation_token().is_cancelled());
        info!(
            "✓ {} committed, {} rolled back, {} failed in {:.2}s",
            report.committed(),
            report.rolled_back(),
            report.failed(),
            report.duration().as_secs_f64()
        );
        Ok(report)
    }

    /// Transforms every matching file under `root` and writes the fragments,
    /// concatenated in sorted path order, to `output`.
    ///
    /// Fragments are combined by submission index, never by completion
    /// order, so the output is deterministic for a given set of transforms.
    /// Source files are not modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotADirectory`] if `root` is not a directory.
    #[instrument(skip(self), fields(root = %root.display(), output = %output.display()))]
    pub async fn summarize(&self, root: &Path, output: &Path) -> Result<ProjectSummary> {
        let mut discovered = self
            .walker
            .stream(root, self.config.channel_capacity)
            .await?;

        let mut paths = Vec::new();
        while let Some(path) = discovered.recv().await {
            paths.push(path);
        }
        paths.sort();

        let outcomes = self.pipeline.transform_ordered(paths, &self.reader).await;

        let mut combined = String::new();
        let mut statuses = Vec::with_capacity(outcomes.len());
        for (location, outcome) in outcomes {
            if let TransformOutcome::Success(content) = &outcome {
                append_fragment(&mut combined, root, &location, content);
            }
            statuses.push((location, TransformStatus::from(outcome)));
        }
        let fragments = statuses.iter().filter(|(_, s)| s.is_transformed()).count();

        let cancelled = self.cancellation_token().is_cancelled();
        let write = if cancelled {
            WriteOutcome::RolledBack(Error::Cancelled)
        } else if fragments == 0 {
            warn!("No fragments to combine, leaving {} untouched", output.display());
            WriteOutcome::RolledBack(Error::EmptyOutput {
                path: output.to_path_buf(),
            })
        } else {
            AtomicWriter::new()
                .commit(output, &FileContent::new(combined))
                .await
        };

        if write.is_committed() {
            info!("✓ Wrote summary of {} files to {}", fragments, output.display());
        }

        // A fragment's terminal state is the write of the combined output.
        let reporter = OutcomeReporter::new(Some(root.to_path_buf()));
        for (location, status) in statuses {
            let fragment_write = status.is_transformed().then(|| write.clone());
            reporter.observe(FileReport::new(location, status, fragment_write));
        }

        Ok(ProjectSummary {
            fragments,
            report: reporter.finish(cancelled),
            write,
        })
    }
}

fn append_fragment(combined: &mut String, root: &Path, location: &Path, content: &FileContent) {
    let heading = pathdiff::diff_paths(location, root).unwrap_or_else(|| PathBuf::from(location));
    combined.push_str("## ");
    combined.push_str(&heading.to_string_lossy());
    combined.push_str("\n\n");
    combined.push_str(content.as_str().trim_end());
    combined.push_str("\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::FnTransformer;
    use assert_fs::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn documenting() -> Arc<dyn Transformer> {
        Arc::new(FnTransformer::new(|content: FileContent| async move {
            if content.as_str().contains("FAIL") {
                anyhow::bail!("service unavailable");
            }
            Ok(format!("/** Documented. */\n{content}"))
        }))
    }

    fn processor(transformer: Arc<dyn Transformer>) -> FileProcessor {
        FileProcessor::new(Config::default(), transformer).unwrap()
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_process_one_commits() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("X.scala");
        file.write_str("object X").unwrap();

        let outcome = processor(documenting())
            .process_one(file.path())
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Committed);
        file.assert("/** Documented. */\nobject X");
        assert_eq!(names(temp.path()), vec!["X.scala"]);
    }

    #[tokio::test]
    async fn test_process_one_invalid_extension() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("Y.txt");
        file.write_str("notes").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counting: Arc<dyn Transformer> = Arc::new(FnTransformer::new({
            let calls = Arc::clone(&calls);
            move |content: FileContent| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(content.to_string()) }
            }
        }));

        let err = processor(counting)
            .process_one(file.path())
            .await
            .unwrap_err();

        assert_eq!(err, Error::invalid_path(file.path()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        file.assert("notes");
    }

    #[tokio::test]
    async fn test_process_one_transform_failure_rolls_back() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("X.scala");
        file.write_str("object FAIL").unwrap();

        let outcome = processor(documenting())
            .process_one(file.path())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WriteOutcome::RolledBack(Error::Transformation { .. })
        ));
        file.assert("object FAIL");
        assert_eq!(names(temp.path()), vec!["X.scala"]);
    }

    #[tokio::test]
    async fn test_process_one_missing_file_rolls_back() {
        let temp = assert_fs::TempDir::new().unwrap();

        let outcome = processor(documenting())
            .process_one(temp.child("Gone.scala").path())
            .await
            .unwrap();

        assert!(outcome.reason().is_some_and(Error::is_io));
    }

    #[tokio::test]
    async fn test_process_all_only_matching_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("X.scala").write_str("object X").unwrap();
        temp.child("Y.txt").write_str("notes").unwrap();

        let root = temp.path().to_path_buf();
        let report = processor(documenting()).process_all(&root).await.unwrap();

        assert_eq!(report.len(), 1);
        assert!(report.get(&temp.child("X.scala").path().to_path_buf()).is_some());
        temp.child("Y.txt").assert("notes");
        temp.child("X.scala").assert("/** Documented. */\nobject X");
    }

    #[tokio::test]
    async fn test_process_all_non_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("X.scala");
        file.write_str("object X").unwrap();

        let err = processor(documenting())
            .process_all(file.path())
            .await
            .unwrap_err();

        assert_eq!(err, Error::not_a_directory(file.path()));
        file.assert("object X");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_process_all_nested_tree() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut expected = 0;
        for depth in 0..4 {
            let prefix: String = (0..depth).map(|d| format!("d{d}/")).collect();
            for i in 0..3 {
                let body = if i == 1 { "object FAIL" } else { "object F" };
                temp.child(format!("{prefix}F{i}.scala")).write_str(body).unwrap();
                expected += 1;
            }
            temp.child(format!("{prefix}README.md")).write_str("readme").unwrap();
        }

        let config = Config::builder().max_concurrency(2).build().unwrap();
        let report = FileProcessor::new(config, documenting())
            .unwrap()
            .process_all(temp.path())
            .await
            .unwrap();

        assert_eq!(report.len(), expected);
        assert_eq!(report.failed(), 4);
        assert_eq!(report.committed(), expected - 4);

        for entry in report.entries() {
            let text = std::fs::read_to_string(&entry.location).unwrap();
            if entry.is_committed() {
                assert!(text.starts_with("/** Documented. */"));
            } else {
                assert_eq!(text, "object FAIL");
            }
        }
    }

    #[tokio::test]
    async fn test_process_all_leaves_no_temp_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("A.scala").write_str("object A").unwrap();
        temp.child("B.scala").write_str("object FAIL").unwrap();

        processor(documenting())
            .process_all(temp.path())
            .await
            .unwrap();

        assert_eq!(names(temp.path()), vec!["A.scala", "B.scala"]);
    }

    #[tokio::test]
    async fn test_summarize_is_ordered() {
        let temp = assert_fs::TempDir::new().unwrap();
        let src = temp.child("src");
        // Later paths finish first.
        src.child("a/A.scala").write_str("30").unwrap();
        src.child("b/B.scala").write_str("20").unwrap();
        src.child("c/C.scala").write_str("10").unwrap();

        let delayed: Arc<dyn Transformer> =
            Arc::new(FnTransformer::new(|content: FileContent| async move {
                let delay: u64 = content.as_str().parse()?;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(format!("summary {delay}"))
            }));

        let output = temp.child("SUMMARY.md");
        let summary = processor(delayed)
            .summarize(src.path(), output.path())
            .await
            .unwrap();

        assert_eq!(summary.fragments, 3);
        assert!(summary.write.is_committed());
        assert_eq!(summary.report.committed(), 3);
        assert!(summary.report.is_success());
        let sep = std::path::MAIN_SEPARATOR;
        let written = std::fs::read_to_string(output.path()).unwrap();
        assert_eq!(
            written,
            format!(
                "## a{sep}A.scala\n\nsummary 30\n\n## b{sep}B.scala\n\nsummary 20\n\n## c{sep}C.scala\n\nsummary 10\n\n"
            )
        );
        src.child("a/A.scala").assert("30");
    }

    #[tokio::test]
    async fn test_summarize_without_fragments_leaves_output_untouched() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/A.scala").write_str("object FAIL").unwrap();
        let output = temp.child("SUMMARY.md");
        output.write_str("previous").unwrap();

        let summary = processor(documenting())
            .summarize(temp.child("src").path(), output.path())
            .await
            .unwrap();

        assert_eq!(summary.fragments, 0);
        assert!(!summary.write.is_committed());
        assert_eq!(summary.report.failed(), 1);
        output.assert("previous");
    }

    #[tokio::test]
    async fn test_summary_report_counts_fragments() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/A.scala").write_str("object A").unwrap();
        temp.child("src/B.scala").write_str("object FAIL").unwrap();
        let output = temp.child("SUMMARY.md");

        let summary = processor(documenting())
            .summarize(temp.child("src").path(), output.path())
            .await
            .unwrap();

        let report = &summary.report;
        assert_eq!(report.len(), 2);
        assert_eq!(report.committed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.rolled_back(), 0);
        assert!(!report.is_success());

        let fragment = report.get(temp.child("src/A.scala").path()).unwrap();
        assert_eq!(fragment.write_outcome(), Some(WriteOutcome::Committed));

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let statuses: Vec<_> = value["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, vec!["committed", "failed"]);
    }

    #[tokio::test]
    async fn test_process_all_report_holds_no_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        for name in ["A.scala", "B.scala", "C.scala"] {
            temp.child(name).write_str("object X").unwrap();
        }

        let large: Arc<dyn Transformer> = Arc::new(FnTransformer::new(
            |_content: FileContent| async move { Ok("x".repeat(1024 * 1024)) },
        ));
        let report = processor(large).process_all(temp.path()).await.unwrap();

        assert_eq!(report.committed(), 3);
        for entry in report.entries() {
            assert_eq!(
                entry.transform,
                TransformStatus::Transformed {
                    bytes: 1024 * 1024,
                    lines: 1,
                }
            );
        }
    }

    #[tokio::test]
    async fn test_cancelled_processor_reports_cancellation() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("A.scala").write_str("object A").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let report = processor(documenting())
            .with_cancellation(token)
            .process_all(temp.path())
            .await
            .unwrap();

        assert!(report.is_cancelled());
        assert!(!report.is_success());
        temp.child("A.scala").assert("object A");
    }
}
