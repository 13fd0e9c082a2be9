use crate::{
    config::Config,
    content::{ContentReader, FileContent, FileRecord},
    error::Error,
    report::{FileReport, OutcomeReporter, TransformStatus},
    transform::Transformer,
    writer::AtomicWriter,
};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, mpsc},
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Result of transforming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The transformer produced replacement content.
    Success(FileContent),
    /// The file could not be read or transformed.
    Failure(Error),
}

impl TransformOutcome {
    /// Returns true for [`TransformOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the transformed content, if any.
    #[must_use]
    pub const fn content(&self) -> Option<&FileContent> {
        match self {
            Self::Success(content) => Some(content),
            Self::Failure(_) => None,
        }
    }
}

/// Applies a transformer to many files with a fixed concurrency ceiling.
///
/// A permit from the admission gate covers one file's read, transform and
/// write, so at most `limit` transformer calls are ever outstanding and at
/// most `limit` file contents are held in memory. Reports keep only a
/// [`TransformStatus`], never the transformed text. Per-file failures become
/// that file's outcome and never affect siblings.
#[derive(Clone)]
pub struct BoundedPipeline {
    transformer: Arc<dyn Transformer>,
    writer: AtomicWriter,
    permits: Arc<Semaphore>,
    limit: usize,
    allow_empty_output: bool,
    cancel: CancellationToken,
}

impl BoundedPipeline {
    /// Creates a pipeline admitting at most `limit` concurrent transforms.
    ///
    /// A limit of zero is treated as one.
    #[must_use]
    pub fn new(transformer: Arc<dyn Transformer>, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            transformer,
            writer: AtomicWriter::new(),
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            allow_empty_output: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a pipeline from configuration.
    #[must_use]
    pub fn from_config(config: &Config, transformer: Arc<dyn Transformer>) -> Self {
        Self::new(transformer, config.max_concurrency)
            .with_writer(AtomicWriter::from_config(config))
            .allow_empty_output(config.allow_empty_output)
    }

    /// Replaces the writer used for successful transforms.
    #[must_use]
    pub fn with_writer(mut self, writer: AtomicWriter) -> Self {
        self.writer = writer;
        self
    }

    /// Uses `token` to cancel runs of this pipeline.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Accepts or rejects empty transformer output.
    #[must_use]
    pub const fn allow_empty_output(mut self, enabled: bool) -> Self {
        self.allow_empty_output = enabled;
        self
    }

    /// The concurrency ceiling.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free in the admission gate.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// The token that cancels this pipeline.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Waits for a free slot. Returns `None` once the run is cancelled.
    async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    /// Transforms one record under the admission gate.
    pub async fn transform(&self, record: &FileRecord) -> TransformOutcome {
        let Some(_permit) = self.admit().await else {
            return TransformOutcome::Failure(Error::Cancelled);
        };
        self.transform_admitted(record).await
    }

    /// Caller must hold a permit.
    async fn transform_admitted(&self, record: &FileRecord) -> TransformOutcome {
        // In-flight calls are abandoned on cancellation.
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return TransformOutcome::Failure(Error::Cancelled),
            result = self.transformer.transform(&record.content) => result,
        };

        match result {
            Ok(content) if content.is_empty() && !self.allow_empty_output => {
                TransformOutcome::Failure(Error::EmptyOutput {
                    path: record.location.clone(),
                })
            }
            Ok(content) => TransformOutcome::Success(content),
            Err(e) => TransformOutcome::Failure(Error::transformation(
                &record.location,
                format!("{e:#}"),
            )),
        }
    }

    /// Transforms one record and commits the result on success.
    ///
    /// The returned report always carries a write outcome when the transform
    /// succeeded.
    pub async fn process(&self, record: FileRecord) -> FileReport {
        let Some(_permit) = self.admit().await else {
            return FileReport::new(
                record.location,
                TransformOutcome::Failure(Error::Cancelled),
                None,
            );
        };
        self.process_admitted(record).await
    }

    /// Caller must hold a permit. A write that has started always runs to
    /// completion or rolls back; it is never interrupted by cancellation.
    async fn process_admitted(&self, record: FileRecord) -> FileReport {
        let transform = self.transform_admitted(&record).await;
        let write = match &transform {
            TransformOutcome::Success(content) => {
                Some(self.writer.commit(&record.location, content).await)
            }
            TransformOutcome::Failure(_) => None,
        };

        FileReport {
            location: record.location,
            transform: TransformStatus::from(transform),
            write,
        }
    }

    async fn read_and_process(&self, reader: &ContentReader, location: PathBuf) -> FileReport {
        match reader.read(&location).await {
            Ok(content) => self.process_admitted(FileRecord { location, content }).await,
            Err(e) => FileReport::new(location, TransformOutcome::Failure(e), None),
        }
    }

    /// Streams paths through read, transform and write.
    ///
    /// Paths are pulled from `paths` only when a slot is free, so the
    /// producer is back-pressured and the file set is never materialized.
    /// Every admitted path yields exactly one outcome on `reporter`. Once
    /// cancelled, no further paths are admitted and the channel is closed.
    #[instrument(skip_all, fields(limit = self.limit))]
    pub async fn run(
        &self,
        mut paths: mpsc::Receiver<PathBuf>,
        reader: ContentReader,
        reporter: Arc<OutcomeReporter>,
    ) {
        let mut tasks = JoinSet::new();
        let mut admitted = 0usize;

        loop {
            let Some(permit) = self.admit().await else {
                break;
            };

            let location = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                next = paths.recv() => match next {
                    Some(location) => location,
                    None => break,
                },
            };

            admitted += 1;
            let pipeline = self.clone();
            let reader = reader.clone();
            let reporter = Arc::clone(&reporter);
            tasks.spawn(async move {
                let _permit = permit;
                let report = pipeline.read_and_process(&reader, location).await;
                reporter.observe(report);
            });

            while let Some(joined) = tasks.try_join_next() {
                propagate_panic(joined);
            }
        }

        drop(paths);
        debug!("Admitted {} files, waiting for in-flight work", admitted);

        while let Some(joined) = tasks.join_next().await {
            propagate_panic(joined);
        }

        if self.cancel.is_cancelled() {
            info!("Run cancelled after admitting {} files", admitted);
        }
    }

    /// Transforms every path and returns the outcomes in submission order,
    /// regardless of the order in which transforms complete.
    pub async fn transform_ordered(
        &self,
        paths: Vec<PathBuf>,
        reader: &ContentReader,
    ) -> Vec<(PathBuf, TransformOutcome)> {
        let mut tasks = JoinSet::new();
        let count = paths.len();

        for (index, location) in paths.into_iter().enumerate() {
            let pipeline = self.clone();
            let reader = reader.clone();
            tasks.spawn(async move {
                let outcome = match pipeline.admit().await {
                    None => TransformOutcome::Failure(Error::Cancelled),
                    Some(_permit) => match reader.read(&location).await {
                        Ok(content) => {
                            let record = FileRecord {
                                location: location.clone(),
                                content,
                            };
                            pipeline.transform_admitted(&record).await
                        }
                        Err(e) => TransformOutcome::Failure(e),
                    },
                };
                (index, location, outcome)
            });
        }

        let mut slots: Vec<Option<(PathBuf, TransformOutcome)>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, location, outcome)) => slots[index] = Some((location, outcome)),
                Err(e) => propagate_panic(Err(e)),
            }
        }

        slots.into_iter().flatten().collect()
    }
}

impl std::fmt::Debug for BoundedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPipeline")
            .field("limit", &self.limit)
            .field("available_permits", &self.permits.available_permits())
            .field("allow_empty_output", &self.allow_empty_output)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A panicking task is a bug; re-raise it on the caller.
fn propagate_panic(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            std::panic::resume_unwind(e.into_panic());
        }
        debug!("Task ended without completing: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{filter::PathFilter, transform::FnTransformer, writer::WriteOutcome};
    use assert_fs::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn reader() -> ContentReader {
        ContentReader::new(PathFilter::new("scala").unwrap())
    }

    fn upper() -> Arc<dyn Transformer> {
        Arc::new(FnTransformer::new(|content: FileContent| async move {
            Ok(content.as_str().to_uppercase())
        }))
    }

    /// Transformer that records the peak number of concurrent calls.
    fn gauged(current: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<dyn Transformer> {
        Arc::new(FnTransformer::new(move |content: FileContent| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(content.to_string())
            }
        }))
    }

    async fn feed(paths: Vec<PathBuf>) -> mpsc::Receiver<PathBuf> {
        let (tx, rx) = mpsc::channel(paths.len().max(1));
        for path in paths {
            tx.send(path).await.unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_transform_success() {
        let pipeline = BoundedPipeline::new(upper(), 2);
        let outcome = pipeline
            .transform(&FileRecord::new("A.scala", "object a"))
            .await;

        assert_eq!(outcome, TransformOutcome::Success(FileContent::new("OBJECT A")));
        assert_eq!(pipeline.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_transform_failure_releases_permit() {
        let failing: Arc<dyn Transformer> = Arc::new(FnTransformer::new(
            |_content: FileContent| async move { Err::<String, _>(anyhow::anyhow!("503")) },
        ));
        let pipeline = BoundedPipeline::new(failing, 1);

        for _ in 0..3 {
            let outcome = pipeline
                .transform(&FileRecord::new("A.scala", "object A"))
                .await;
            assert!(matches!(
                outcome,
                TransformOutcome::Failure(Error::Transformation { .. })
            ));
        }
        assert_eq!(pipeline.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_empty_output_rejected_by_default() {
        let empty: Arc<dyn Transformer> = Arc::new(FnTransformer::new(
            |_content: FileContent| async move { Ok(String::new()) },
        ));
        let record = FileRecord::new("A.scala", "object A");

        let strict = BoundedPipeline::new(Arc::clone(&empty), 1);
        assert!(matches!(
            strict.transform(&record).await,
            TransformOutcome::Failure(Error::EmptyOutput { .. })
        ));

        let lenient = BoundedPipeline::new(empty, 1).allow_empty_output(true);
        assert!(lenient.transform(&record).await.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_never_exceeds_limit() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..20 {
            let file = temp.child(format!("F{i}.scala"));
            file.write_str("object F").unwrap();
            paths.push(file.path().to_path_buf());
        }

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pipeline = BoundedPipeline::new(gauged(Arc::clone(&current), Arc::clone(&peak)), 3);
        let reporter = Arc::new(OutcomeReporter::new(None));

        pipeline
            .run(feed(paths).await, reader(), Arc::clone(&reporter))
            .await;

        assert_eq!(reporter.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
        assert_eq!(pipeline.available_permits(), 3);
    }

    #[tokio::test]
    async fn test_run_isolates_failures() {
        let temp = assert_fs::TempDir::new().unwrap();
        let names = ["A.scala", "B.scala", "C.scala"];
        for name in names {
            temp.child(name).write_str("object X").unwrap();
        }

        let failing_a: Arc<dyn Transformer> =
            Arc::new(FnTransformer::new(|content: FileContent| async move {
                if content.as_str().contains("FAIL") {
                    anyhow::bail!("injected failure");
                }
                Ok(format!("/** doc */\n{content}"))
            }));
        temp.child("A.scala").write_str("object FAIL").unwrap();

        let pipeline = BoundedPipeline::new(failing_a, 2);
        let reporter = Arc::new(OutcomeReporter::new(None));
        let paths = names.iter().map(|n| temp.child(n).path().to_path_buf()).collect();
        pipeline.run(feed(paths).await, reader(), Arc::clone(&reporter)).await;

        let report = reporter.finish(false);
        assert_eq!(report.len(), 3);
        assert_eq!(report.committed(), 2);
        assert_eq!(report.failed(), 1);

        temp.child("A.scala").assert("object FAIL");
        temp.child("B.scala").assert("/** doc */\nobject X");
        temp.child("C.scala").assert("/** doc */\nobject X");
    }

    #[tokio::test]
    #[should_panic(expected = "transformer bug")]
    async fn test_run_raises_panics_while_paths_are_pending() {
        let temp = assert_fs::TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel(8);
        for (name, body) in [("A.scala", "PANIC"), ("B.scala", "object B"), ("C.scala", "object C")] {
            let file = temp.child(name);
            file.write_str(body).unwrap();
            tx.send(file.path().to_path_buf()).await.unwrap();
        }

        let panicking: Arc<dyn Transformer> =
            Arc::new(FnTransformer::new(|content: FileContent| async move {
                if content.as_str() == "PANIC" {
                    panic!("transformer bug");
                }
                Ok(content.to_string())
            }));

        // The sender stays open, so the run only ends by raising the panic.
        let _tx = tx;
        BoundedPipeline::new(panicking, 1)
            .run(rx, reader(), Arc::new(OutcomeReporter::new(None)))
            .await;
    }

    #[tokio::test]
    async fn test_run_reports_read_failures() {
        let temp = assert_fs::TempDir::new().unwrap();
        let bad = temp.child("Bad.scala");
        bad.write_binary(&[0xff, 0xfe]).unwrap();

        let pipeline = BoundedPipeline::new(upper(), 2);
        let reporter = Arc::new(OutcomeReporter::new(None));
        pipeline
            .run(
                feed(vec![bad.path().to_path_buf()]).await,
                reader(),
                Arc::clone(&reporter),
            )
            .await;

        let report = reporter.finish(false);
        let entry = report.get(bad.path()).unwrap();
        assert!(entry.error().is_some_and(Error::is_io));
        assert!(entry.write.is_none());
    }

    #[tokio::test]
    async fn test_transform_ordered_keeps_submission_order() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut paths = Vec::new();
        // Earlier files sleep longer, so completion order is reversed.
        for i in 0..5u64 {
            let file = temp.child(format!("F{i}.scala"));
            file.write_str(&(5 - i).to_string()).unwrap();
            paths.push(file.path().to_path_buf());
        }

        let slow: Arc<dyn Transformer> =
            Arc::new(FnTransformer::new(|content: FileContent| async move {
                let delay: u64 = content.as_str().parse()?;
                tokio::time::sleep(Duration::from_millis(delay * 10)).await;
                Ok(format!("[{content}]"))
            }));

        let pipeline = BoundedPipeline::new(slow, 5);
        let outcomes = pipeline.transform_ordered(paths.clone(), &reader()).await;

        let locations: Vec<_> = outcomes.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(locations, paths);
        let texts: Vec<_> = outcomes
            .iter()
            .map(|(_, o)| o.content().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["[5]", "[4]", "[3]", "[2]", "[1]"]);
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_admits_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("A.scala");
        file.write_str("object a").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let pipeline = BoundedPipeline::new(upper(), 2).with_cancellation(token);
        let reporter = Arc::new(OutcomeReporter::new(None));

        pipeline
            .run(
                feed(vec![file.path().to_path_buf()]).await,
                reader(),
                Arc::clone(&reporter),
            )
            .await;

        assert!(reporter.is_empty());
        file.assert("object a");
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_transform() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("A.scala");
        file.write_str("object A").unwrap();

        let stuck: Arc<dyn Transformer> = Arc::new(FnTransformer::new(
            |_content: FileContent| async move {
                std::future::pending::<()>().await;
                Ok(String::new())
            },
        ));
        let pipeline = BoundedPipeline::new(stuck, 1);
        let token = pipeline.cancellation_token().clone();

        let handle = tokio::spawn({
            let pipeline = pipeline.clone();
            let location = file.path().to_path_buf();
            async move {
                pipeline
                    .process(FileRecord::new(location, "object A"))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.transform, TransformStatus::Failed(Error::Cancelled));
        assert_eq!(
            report.write_outcome(),
            Some(WriteOutcome::RolledBack(Error::Cancelled))
        );
        file.assert("object A");
        assert_eq!(pipeline.available_permits(), 1);
    }
}
