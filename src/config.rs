//! Configuration types for a conversion batch.
//!
//! All batch behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config is created once per run and
//! handed to the [`crate::batch::Scheduler`] and [`crate::dispatch::Dispatcher`]
//! at construction; nothing in the pipeline reads process-global state.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one conversion batch.
///
/// # Example
/// ```rust
/// use docfeed::{PipelineConfig, SpreadsheetFormat};
///
/// let config = PipelineConfig::builder("/data/inbox", "/data/converted")
///     .workers(4)
///     .spreadsheet_format(SpreadsheetFormat::Markdown)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root of the input tree. Every regular file below it is a candidate.
    pub input_root: PathBuf,

    /// Flat directory receiving every generated artifact.
    pub output_root: PathBuf,

    /// Width of the worker pool. Default: 10.
    ///
    /// Each in-flight file holds at least one open file handle and, for
    /// legacy Word documents, a child process.
    pub workers: usize,

    /// Output layout for spreadsheets. Default: [`SpreadsheetFormat::Csv`].
    pub spreadsheet_format: SpreadsheetFormat,

    /// How code and plain-text files are carried over. Default: [`PassthroughMode::Copy`].
    pub passthrough: PassthroughMode,

    /// Retry policy for deleting a converted source file.
    /// Default: 3 attempts, 200 ms apart.
    pub delete_retry: RetryPolicy,

    /// Upper bound on a single file's conversion. Default: 300 s.
    pub conversion_timeout: Duration,

    /// Submit paths to the pool in chunks of this size. Default: None (one stream).
    pub submit_chunk_size: Option<usize>,

    /// Remove directories left empty after the batch. Default: true.
    pub prune_empty_dirs: bool,

    /// Command used for legacy `.doc` files; must print text to stdout.
    /// Default: `antiword`.
    pub doc_command: String,

    /// Optional progress callback invoked as files complete.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_root", &self.input_root)
            .field("output_root", &self.output_root)
            .field("workers", &self.workers)
            .field("spreadsheet_format", &self.spreadsheet_format)
            .field("passthrough", &self.passthrough)
            .field("delete_retry", &self.delete_retry)
            .field("conversion_timeout", &self.conversion_timeout)
            .field("submit_chunk_size", &self.submit_chunk_size)
            .field("prune_empty_dirs", &self.prune_empty_dirs)
            .field("doc_command", &self.doc_command)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a builder with defaults for everything except the two roots.
    pub fn builder(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: PipelineConfig {
                input_root: input_root.into(),
                output_root: output_root.into(),
                workers: 10,
                spreadsheet_format: SpreadsheetFormat::default(),
                passthrough: PassthroughMode::default(),
                delete_retry: RetryPolicy::default(),
                conversion_timeout: Duration::from_secs(300),
                submit_chunk_size: None,
                prune_empty_dirs: true,
                doc_command: "antiword".to_string(),
                progress_callback: None,
            },
        }
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn spreadsheet_format(mut self, format: SpreadsheetFormat) -> Self {
        self.config.spreadsheet_format = format;
        self
    }

    pub fn passthrough(mut self, mode: PassthroughMode) -> Self {
        self.config.passthrough = mode;
        self
    }

    pub fn delete_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.delete_retry = policy;
        self
    }

    pub fn conversion_timeout(mut self, timeout: Duration) -> Self {
        self.config.conversion_timeout = timeout;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout = Duration::from_secs(secs);
        self
    }

    pub fn submit_chunk_size(mut self, size: Option<usize>) -> Self {
        self.config.submit_chunk_size = size;
        self
    }

    pub fn prune_empty_dirs(mut self, v: bool) -> Self {
        self.config.prune_empty_dirs = v;
        self
    }

    pub fn doc_command(mut self, cmd: impl Into<String>) -> Self {
        self.config.doc_command = cmd.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "Worker pool width must be ≥ 1".into(),
            ));
        }
        if c.delete_retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "Delete retry needs at least one attempt".into(),
            ));
        }
        if c.conversion_timeout.is_zero() {
            return Err(PipelineError::InvalidConfig(
                "Conversion timeout must be > 0".into(),
            ));
        }
        if c.submit_chunk_size == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "Submit chunk size must be ≥ 1".into(),
            ));
        }
        if c.doc_command.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Legacy DOC command must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output layout for spreadsheet conversions.
///
/// | Format | Artifacts per workbook |
/// |--------|------------------------|
/// | `Csv` | one `.csv` per non-empty sheet |
/// | `Markdown` | one `.md`, a titled section per sheet |
/// | `Json` | one `.json` object keyed by sheet name |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpreadsheetFormat {
    #[default]
    Csv,
    Markdown,
    Json,
}

/// How allow-listed code and text files reach the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PassthroughMode {
    /// Byte-for-byte copy. (default)
    #[default]
    Copy,
    /// Decode and re-write as UTF-8; invalid sequences become U+FFFD.
    Utf8,
}

/// Bounded retry with a fixed pause between attempts.
///
/// Used for source deletion (files may be briefly locked by a scanner) and
/// for polling the indexing service until it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always ≥ 1 after validation.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Connection settings for the downstream indexing service.
#[derive(Clone)]
pub struct IndexConfig {
    /// Base URL, e.g. `http://anythingllm:3001`.
    pub base_url: String,
    /// Workspace slug that receives uploads.
    pub workspace: String,
    /// Bearer token.
    pub api_key: String,
    /// Per-request timeout. Default: 60 s.
    pub request_timeout: Duration,
    /// Readiness polling. Default: 36 attempts, 5 s apart (three minutes).
    pub readiness: RetryPolicy,
}

impl IndexConfig {
    pub fn new(
        base_url: impl Into<String>,
        workspace: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let config = Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            workspace: workspace.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(60),
            readiness: RetryPolicy::new(36, Duration::from_secs(5)),
        };
        if config.workspace.is_empty() || config.api_key.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Index workspace and API key must both be set".into(),
            ));
        }
        Ok(config)
    }
}

impl fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfig")
            .field("base_url", &self.base_url)
            .field("workspace", &self.workspace)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("readiness", &self.readiness)
            .finish()
    }
}
