//! Error types for the docfeed library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the batch cannot run at all (input root
//!   missing, output directory not creatable, invalid configuration, the
//!   indexing service unreachable). Returned as `Err(PipelineError)` from
//!   [`crate::batch::Scheduler::run`] and the index client.
//!
//! * [`ConvertError`] — **Non-fatal**: a single file failed (corrupt
//!   container, external tool missing, conversion timed out) but every other
//!   file in the batch is unaffected. Stored inside
//!   [`crate::output::ConversionResult::Failed`] so the batch keeps going and
//!   reports an aggregate outcome at the end.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the docfeed library.
///
/// Per-file failures use [`ConvertError`] and are recorded in the
/// [`crate::output::BatchOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input root does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input root exists but is a file.
    #[error("Input path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Index errors ──────────────────────────────────────────────────────
    /// The indexing service could not be reached or answered with an error.
    #[error("Index request to '{url}' failed: {reason}")]
    IndexRequest { url: String, reason: String },

    /// The indexing service never became ready within the readiness policy.
    #[error("Indexing service at '{url}' is not available after {attempts} attempts")]
    IndexUnavailable { url: String, attempts: u32 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input file.
///
/// The source file is always retained when a conversion ends in one of
/// these; only its own entry in the batch outcome is affected.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ConvertError {
    /// Text could not be extracted (e.g. not a valid PDF container).
    #[error("'{path}': extraction failed: {detail}")]
    Extraction { path: PathBuf, detail: String },

    /// The container format is wrong (bad magic bytes, missing parts).
    #[error("'{path}': invalid container: {detail}")]
    Format { path: PathBuf, detail: String },

    /// Reading the source or writing an artifact failed.
    #[error("'{path}': I/O error: {detail}")]
    Io { path: PathBuf, detail: String },

    /// An external conversion command is missing or exited unsuccessfully.
    #[error("'{path}': external tool '{tool}' failed: {detail}")]
    ExternalTool {
        path: PathBuf,
        tool: String,
        detail: String,
    },

    /// The conversion exceeded the per-file timeout.
    #[error("'{path}': conversion timed out after {limit:?}")]
    Timeout { path: PathBuf, limit: Duration },

    /// The worker running this file panicked.
    #[error("'{path}': worker task panicked: {detail}")]
    TaskPanicked { path: PathBuf, detail: String },
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ConvertError::Io {
            path: path.into(),
            detail: err.to_string(),
        }
    }

    /// Path of the input file this error belongs to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            ConvertError::Extraction { path, .. }
            | ConvertError::Format { path, .. }
            | ConvertError::Io { path, .. }
            | ConvertError::ExternalTool { path, .. }
            | ConvertError::Timeout { path, .. }
            | ConvertError::TaskPanicked { path, .. } => path,
        }
    }
}
