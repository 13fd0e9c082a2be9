//! # llm-docgen
//!
//! Rewrites source trees in place through an external text transformer,
//! typically an LLM that adds documentation comments.
//!
//! ## Features
//!
//! - Streaming directory walk with extension filtering and optional `.gitignore` support
//! - Bounded concurrency: at most `K` transformer calls in flight
//! - Failure isolation: one file's failure never affects another
//! - Atomic in-place replacement: originals are never left half-written
//! - Deterministic project summaries combined in submission order
//!
//! ## Quick Start
//!
//! ```no_run
//! use llm_docgen::{CommandTransformer, Config, FileProcessor};
//! use std::{path::Path, sync::Arc};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .extension("scala")
//!     .max_concurrency(5)
//!     .build()?;
//!
//! let transformer = Arc::new(
//!     CommandTransformer::new("llm", vec!["-m".into(), "gpt-4o".into()])
//!         .prompt("Add ScalaDoc comments to the following file. Output only the file."),
//! );
//!
//! let report = FileProcessor::new(config, transformer)?
//!     .process_all(Path::new("./src"))
//!     .await?;
//! report.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Walker**: discovers matching files under a root, lazily
//! 2. **Reader**: loads each file as UTF-8 text
//! 3. **Pipeline**: transforms files behind a counting admission gate
//! 4. **Writer**: commits results through a temporary sibling and a rename
//! 5. **Reporter**: records one outcome per file

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod content;
mod error;
mod filter;
mod pipeline;
mod processor;
mod report;
mod transform;
mod walker;
mod writer;

pub use config::{Config, ConfigBuilder};
pub use content::{ContentReader, FileContent, FileRecord};
pub use error::{Error, Result};
pub use filter::PathFilter;
pub use pipeline::{BoundedPipeline, TransformOutcome};
pub use processor::{FileProcessor, ProjectSummary};
pub use report::{BatchReport, FileReport, OutcomeReporter, TransformStatus};
pub use transform::{CommandTransformer, FnTransformer, Transformer};
pub use walker::{DirectoryWalker, Walk};
pub use writer::{AtomicWriter, WriteOutcome};

/// Rewrites every matching file under `root` with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - `root` is not a directory
///
/// Per-file failures are reported in the returned [`BatchReport`].
///
/// # Examples
///
/// ```no_run
/// use llm_docgen::{Config, FnTransformer, run};
/// use std::{path::Path, sync::Arc};
///
/// # async fn example() -> anyhow::Result<()> {
/// let transformer = Arc::new(FnTransformer::new(|content| async move {
///     Ok(format!("// reviewed\n{content}"))
/// }));
///
/// let report = run(Config::default(), transformer, Path::new(".")).await?;
/// assert!(report.is_success());
/// # Ok(())
/// # }
/// ```
pub async fn run(
    config: Config,
    transformer: std::sync::Arc<dyn Transformer>,
    root: &std::path::Path,
) -> Result<BatchReport> {
    FileProcessor::new(config, transformer)?.process_all(root).await
}
