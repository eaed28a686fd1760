//! # docfeed
//!
//! Turn a directory of mixed office documents into plain-text and tabular
//! artifacts ready for a document-indexing service.
//!
//! ## Why this crate?
//!
//! Ingestion folders collect everything: scanned PDFs next to Word memos,
//! multi-sheet workbooks, shell scripts, photos and voice notes. Embedding
//! services want clean text. This crate walks the folder, routes each file
//! to a format-specific converter, writes uniquely named artifacts into one
//! flat output directory, and deletes each source once it has been
//! converted. A damaged file fails alone; the batch always finishes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input tree
//!  │
//!  ├─ 1. Walk      enumerate every regular file
//!  ├─ 2. Dispatch  extension → converter (bounded worker pool)
//!  │     ├─ pdf          lopdf, page by page        → .txt
//!  │     ├─ docx / doc   quick-xml / antiword       → .txt
//!  │     ├─ xls / xlsx   calamine + cleaning        → .csv | .md | .json
//!  │     ├─ code / text  copy or UTF-8 re-encode    → same extension
//!  │     └─ images deleted, audio and unknown types left in place
//!  ├─ 3. Delete    converted sources removed (with retry)
//!  ├─ 4. Cleanup   prune directories left empty
//!  └─ 5. Upload    (optional) push new artifacts to the index
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docfeed::{PipelineConfig, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder("/data/inbox", "/data/converted")
//!         .workers(8)
//!         .build()?;
//!     let outcome = Scheduler::new(config).run_configured().await?;
//!     eprintln!(
//!         "{} converted, {} skipped, {} failed",
//!         outcome.stats.succeeded, outcome.stats.skipped, outcome.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docfeed` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docfeed = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod converters;
pub mod dispatch;
pub mod error;
pub mod index;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::Scheduler;
pub use config::{
    IndexConfig, PassthroughMode, PipelineConfig, PipelineConfigBuilder, RetryPolicy,
    SpreadsheetFormat,
};
pub use converters::{Converter, ConverterRegistry, FileCategory, OutputDir};
pub use dispatch::{delete_with_retry, Dispatcher};
pub use error::{ConvertError, PipelineError};
pub use index::{upload_new_artifacts, AnythingLlmIndex, DocumentIndex, UploadReport};
pub use output::{BatchOutcome, BatchStats, ConversionResult, InputFile, SkipReason};
pub use pipeline::cleanup::prune_empty_dirs;
pub use pipeline::naming::{unique_output_name, unique_output_name_with_suffix};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
