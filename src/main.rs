use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use llm_docgen::{CommandTransformer, Config, FileProcessor, WriteOutcome};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_PROMPT: &str = "Add concise documentation comments to every public definition \
in the following source file. Do not change any code. Output only the complete file.";

#[derive(Parser, Debug)]
#[command(
    name = "llm-docgen",
    version,
    author,
    about = "Document source files in place with an external LLM command",
    long_about = "Walks a source tree, pipes every matching file through an external \
    transformer command and atomically replaces the file with the command's output.\n\n\
    A file is only replaced when the command succeeds; failures leave the original \
    untouched and never stop the other files.\n\n\
    USAGE EXAMPLES:\n  \
      # Document one file\n  \
      llm-docgen one src/main/scala/App.scala -- llm -m gpt-4o\n\n  \
      # Document a whole project, 8 requests at a time\n  \
      llm-docgen -j 8 all ./src -- llm -m gpt-4o\n\n  \
      # Write a combined project summary\n  \
      llm-docgen summarize ./src --out SUMMARY.md -- llm -m gpt-4o"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Source-file extension to process
    #[arg(long, global = true, default_value = "scala", value_name = "EXT")]
    ext: String,

    /// Maximum concurrent transformer calls
    #[arg(short = 'j', long, global = true, default_value_t = 5)]
    concurrency: usize,

    /// Directory glob to skip (can be used multiple times)
    #[arg(long = "exclude-dir", global = true, value_name = "GLOB")]
    exclude_dirs: Vec<String>,

    /// Honour .gitignore files while walking
    #[arg(long, global = true)]
    gitignore: bool,

    /// Accept empty transformer output
    #[arg(long, global = true)]
    allow_empty: bool,

    /// Keep a timestamped copy of every replaced file
    #[arg(long, global = true)]
    backup: bool,

    /// Instruction prepended to every file sent to the transformer
    #[arg(long, global = true, env = "LLM_DOCGEN_PROMPT")]
    prompt: Option<String>,

    /// Per-file transformer timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Document a single file
    One {
        /// File to rewrite
        file: PathBuf,

        /// Transformer command and its arguments
        #[arg(last = true, required = true)]
        transformer: Vec<String>,
    },

    /// Document every matching file under a directory
    All {
        /// Root directory
        dir: PathBuf,

        /// Write a JSON report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Transformer command and its arguments
        #[arg(last = true, required = true)]
        transformer: Vec<String>,
    },

    /// Combine transformed fragments of every file into one document
    Summarize {
        /// Root directory
        dir: PathBuf,

        /// Output file for the combined summary
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,

        /// Transformer command and its arguments
        #[arg(last = true, required = true)]
        transformer: Vec<String>,
    },
}

impl Command {
    fn transformer_args(&self) -> &[String] {
        match self {
            Self::One { transformer, .. }
            | Self::All { transformer, .. }
            | Self::Summarize { transformer, .. } => transformer,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let config = Config::builder()
        .extension(cli.ext.clone())
        .max_concurrency(cli.concurrency)
        .exclude_directories(cli.exclude_dirs.clone())
        .respect_gitignore(cli.gitignore)
        .allow_empty_output(cli.allow_empty)
        .backup_existing(cli.backup)
        .build()
        .context("Failed to build configuration")?;

    let transformer = build_transformer(&cli)?;

    let token = CancellationToken::new();
    spawn_ctrl_c_handler(token.clone());

    let processor = FileProcessor::new(config, Arc::new(transformer))
        .context("Failed to create processor")?
        .with_cancellation(token);

    match cli.command {
        Command::One { file, .. } => {
            let outcome = processor
                .process_one(&file)
                .await
                .with_context(|| format!("Cannot process {}", file.display()))?;
            if let WriteOutcome::RolledBack(reason) = outcome {
                bail!("{} left unchanged: {}", file.display(), reason);
            }
            println!("✓ {}", file.display());
        }
        Command::All { dir, report, .. } => {
            let batch = processor
                .process_all(&dir)
                .await
                .with_context(|| format!("Cannot process {}", dir.display()))?;
            batch.print_summary();
            if let Some(path) = report {
                batch
                    .write_json(&path)
                    .await
                    .context("Failed to write report")?;
            }
            if !batch.is_success() {
                bail!(
                    "{} of {} files were not updated",
                    batch.len() - batch.committed(),
                    batch.len()
                );
            }
        }
        Command::Summarize { dir, out, .. } => {
            let summary = processor
                .summarize(&dir, &out)
                .await
                .with_context(|| format!("Cannot summarize {}", dir.display()))?;
            summary.report.print_summary();
            if let WriteOutcome::RolledBack(reason) = summary.write {
                bail!("{} not written: {}", out.display(), reason);
            }
            println!("✓ {} fragments written to {}", summary.fragments, out.display());
        }
    }

    Ok(())
}

fn build_transformer(cli: &Cli) -> anyhow::Result<CommandTransformer> {
    let Some((program, args)) = cli.command.transformer_args().split_first() else {
        bail!("A transformer command is required after `--`");
    };

    let mut transformer = CommandTransformer::new(program.clone(), args.to_vec())
        .prompt(cli.prompt.clone().unwrap_or_else(|| DEFAULT_PROMPT.to_string()));
    if let Some(secs) = cli.timeout {
        transformer = transformer.timeout(Duration::from_secs(secs));
    }
    Ok(transformer)
}

fn spawn_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight files");
            token.cancel();
        }
    });
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("llm_docgen=info"),
        1 => EnvFilter::new("llm_docgen=debug"),
        _ => EnvFilter::new("llm_docgen=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
