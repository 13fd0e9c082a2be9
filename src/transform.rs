//! The text transformation capability.
//!
//! The pipeline treats a transformer as an opaque, fallible, possibly slow
//! `text -> text` function. Retries, credentials and request shapes belong to
//! the implementation, never to the pipeline.

use crate::content::FileContent;
use anyhow::{Context, bail};
use async_trait::async_trait;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Turns one file's content into its replacement.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transforms `content`.
    ///
    /// # Errors
    ///
    /// Any error is reported as a failed outcome for this file only.
    async fn transform(&self, content: &FileContent) -> anyhow::Result<FileContent>;
}

/// Adapts an async closure into a [`Transformer`].
///
/// # Examples
///
/// ```
/// use llm_docgen::FnTransformer;
///
/// let upper = FnTransformer::new(|content| async move {
///     Ok(content.as_str().to_uppercase())
/// });
/// # let _ = upper;
/// ```
#[derive(Clone)]
pub struct FnTransformer<F> {
    f: F,
}

impl<F> FnTransformer<F> {
    /// Wraps `f`.
    pub const fn new<Fut>(f: F) -> Self
    where
        F: Fn(FileContent) -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<String>> + Send,
    {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnTransformer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTransformer").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Transformer for FnTransformer<F>
where
    F: Fn(FileContent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn transform(&self, content: &FileContent) -> anyhow::Result<FileContent> {
        (self.f)(content.clone()).await.map(FileContent::from)
    }
}

/// Pipes each file through an external program.
///
/// The (optionally prompt-prefixed) content is written to the program's
/// stdin; its stdout becomes the replacement text. A non-zero exit status,
/// non-UTF-8 output or an elapsed timeout fails the file. The child is killed
/// if the call is dropped.
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
    prompt: Option<String>,
    timeout: Option<Duration>,
}

impl CommandTransformer {
    /// Creates a transformer that runs `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            prompt: None,
            timeout: None,
        }
    }

    /// Prepends an instruction to every input.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Bounds how long a single call may take.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn render_input(&self, content: &FileContent) -> String {
        match &self.prompt {
            Some(prompt) => format!("{prompt}\n\n{content}"),
            None => content.to_string(),
        }
    }

    async fn run(&self, input: String) -> anyhow::Result<FileContent> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.program))?;

        let mut stdin = child.stdin.take().context("child stdin unavailable")?;
        let feed = async move {
            let result = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            result
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.with_context(|| format!("failed to wait for '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        // A program may exit successfully without consuming all of stdin.
        if let Err(e) = fed {
            debug!("'{}' closed stdin early: {}", self.program, e);
        }

        let text = String::from_utf8(output.stdout)
            .with_context(|| format!("'{}' produced non-UTF-8 output", self.program))?;
        Ok(FileContent::from(text))
    }
}

#[async_trait]
impl Transformer for CommandTransformer {
    async fn transform(&self, content: &FileContent) -> anyhow::Result<FileContent> {
        let input = self.render_input(content);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(input))
                .await
                .with_context(|| format!("'{}' timed out after {limit:?}", self.program))?,
            None => self.run(input).await,
        }
    }
}
