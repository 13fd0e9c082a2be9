use crate::error::{Error, Result};

const DEFAULT_EXTENSION: &str = "scala";
const DEFAULT_MAX_CONCURRENCY: usize = 5;
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the llm-docgen pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Source-file extension to process, without the leading dot
    pub extension: String,

    /// Maximum number of transformer calls in flight at once
    pub max_concurrency: usize,

    /// Glob patterns for directories that are never descended into
    pub exclude_directories: Vec<String>,

    /// Honour `.gitignore` rules while walking
    pub respect_gitignore: bool,

    /// Follow symbolic links while walking
    pub follow_links: bool,

    /// Accept empty transformer output as a valid replacement
    pub allow_empty_output: bool,

    /// Create a timestamped copy of each original before replacing it
    pub backup_existing: bool,

    /// Buffer size between the directory walker and the pipeline
    pub channel_capacity: usize,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_docgen::Config;
    ///
    /// let config = Config::builder()
    ///     .extension("scala")
    ///     .max_concurrency(8)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The extension is empty or contains a dot
    /// - Concurrency or channel capacity is zero
    /// - An exclude pattern is not a valid glob
    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() {
            return Err(Error::config("extension must not be empty"));
        }

        if self.extension.contains('.') {
            return Err(Error::config(format!(
                "extension must be a single segment without dots, got '{}'",
                self.extension
            )));
        }

        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be greater than 0"));
        }

        if self.channel_capacity == 0 {
            return Err(Error::config("channel_capacity must be greater than 0"));
        }

        for pattern in &self.exclude_directories {
            globset::Glob::new(pattern).map_err(|e| {
                Error::config(format!("Invalid glob pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            exclude_directories: Vec::new(),
            respect_gitignore: false,
            follow_links: false,
            allow_empty_output: false,
            backup_existing: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    extension: Option<String>,
    max_concurrency: Option<usize>,
    exclude_directories: Vec<String>,
    respect_gitignore: bool,
    follow_links: bool,
    allow_empty_output: bool,
    backup_existing: bool,
    channel_capacity: Option<usize>,
}

impl ConfigBuilder {
    /// Sets the source-file extension. A leading dot is stripped.
    #[must_use]
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        let ext = ext.strip_prefix('.').map(str::to_string).unwrap_or(ext);
        self.extension = Some(ext);
        self
    }

    /// Sets the maximum number of concurrent transformer calls.
    #[must_use]
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Sets glob patterns for directories to skip.
    #[must_use]
    pub fn exclude_directories(mut self, patterns: Vec<String>) -> Self {
        self.exclude_directories = patterns;
        self
    }

    /// Enables or disables `.gitignore` handling.
    #[must_use]
    pub fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.respect_gitignore = enabled;
        self
    }

    /// Enables or disables following symbolic links.
    #[must_use]
    pub fn follow_links(mut self, enabled: bool) -> Self {
        self.follow_links = enabled;
        self
    }

    /// Accepts empty transformer output instead of rejecting it.
    #[must_use]
    pub fn allow_empty_output(mut self, enabled: bool) -> Self {
        self.allow_empty_output = enabled;
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Sets the walker-to-pipeline buffer size.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            extension: self
                .extension
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            exclude_directories: self.exclude_directories,
            respect_gitignore: self.respect_gitignore,
            follow_links: self.follow_links,
            allow_empty_output: self.allow_empty_output,
            backup_existing: self.backup_existing,
            channel_capacity: self.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        };

        config.validate()?;
        Ok(config)
    }
}
