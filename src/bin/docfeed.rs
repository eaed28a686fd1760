//! CLI binary for docfeed.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, runs one batch, and optionally uploads the results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docfeed::{
    upload_new_artifacts, AnythingLlmIndex, BatchProgressCallback, BatchStats, ConversionResult,
    DocumentIndex, IndexConfig, PassthroughMode, PipelineConfig, PipelineError, ProgressCallback,
    RetryPolicy, Scheduler, SpreadsheetFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch, a log line per file
/// that did not simply convert. Files finish out of order, so every line
/// names its own path.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Walking input tree…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_files} files"))
        ));
    }

    fn on_file_start(&self, path: &Path) {
        if let Some(name) = path.file_name() {
            self.bar.set_message(name.to_string_lossy().into_owned());
        }
    }

    fn on_file_complete(&self, path: &Path, result: &ConversionResult) {
        match result {
            ConversionResult::Success(_) => {}
            ConversionResult::Skipped(reason) => {
                self.bar.println(format!(
                    "  {} {}  {}",
                    dim("–"),
                    path.display(),
                    dim(&reason.to_string())
                ));
            }
            ConversionResult::Failed(err) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.bar
                    .println(format!("  {} {}", red("✗"), red(&err.to_string())));
            }
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let mark = if self.failures.load(Ordering::SeqCst) == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{} {} converted  {} skipped  {} failed  →  {} artifacts  {}",
            mark,
            bold(&stats.succeeded.to_string()),
            stats.skipped,
            if stats.failed > 0 {
                red(&stats.failed.to_string())
            } else {
                stats.failed.to_string()
            },
            stats.artifacts,
            dim(&format!("{}ms", stats.duration_ms)),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert everything under ./inbox into ./converted
  docfeed ./inbox -o ./converted

  # Spreadsheets as one Markdown file per workbook, 4 workers
  docfeed ./inbox -o ./converted --spreadsheet-format markdown -w 4

  # Convert, then push new artifacts to the indexing service
  WORKSPACE=docs API_KEY=... docfeed ./inbox -o ./converted --upload

  # Machine-readable report
  docfeed ./inbox -o ./converted --json > report.json

WHAT HAPPENS TO EACH FILE:
  pdf                    text extracted page by page  → .txt, source deleted
  docx / doc             paragraph text               → .txt, source deleted
  xls / xlsx             cleaned sheets               → .csv/.md/.json, source deleted
  code, txt, md          copied (or re-encoded)       → same extension, source deleted
  jpg / jpeg / png       deleted, no artifact
  audio                  left in place
  anything else          left in place

ENVIRONMENT VARIABLES:
  DOCFEED_INPUT_DIR / INPUT_DIR     Input tree (if no positional argument)
  DOCFEED_OUTPUT_DIR / OUTPUT_DIR   Output directory
  DOCFEED_INDEX_URL                 Indexing service base URL
  WORKSPACE                         Workspace slug for uploads
  API_KEY                           Bearer token for uploads
  RUST_LOG                          Log filter (overrides --verbose/--quiet)
"#;

/// Convert a folder of mixed documents into indexable text artifacts.
#[derive(Parser, Debug)]
#[command(
    name = "docfeed",
    version,
    about = "Convert a folder of mixed documents into indexable text artifacts",
    long_about = "Walk an input tree, convert PDF, Word, Excel, code and text files into \
uniquely named artifacts in one flat output directory, delete converted sources, prune \
empty directories, and optionally upload new artifacts to an AnythingLLM workspace.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input directory to convert.
    #[arg(env = "DOCFEED_INPUT_DIR")]
    input: Option<PathBuf>,

    /// Flat output directory for artifacts.
    #[arg(short, long, env = "DOCFEED_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Worker pool width.
    #[arg(short, long, env = "DOCFEED_WORKERS", default_value_t = 10)]
    workers: usize,

    /// Spreadsheet output: csv, markdown, json.
    #[arg(long, env = "DOCFEED_SPREADSHEET_FORMAT", value_enum, default_value = "csv")]
    spreadsheet_format: SpreadsheetArg,

    /// Re-encode code and text files as UTF-8 instead of copying bytes.
    #[arg(long, env = "DOCFEED_REENCODE_UTF8")]
    reencode_utf8: bool,

    /// Per-file conversion timeout in seconds.
    #[arg(long, env = "DOCFEED_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Attempts when deleting a converted source.
    #[arg(long, env = "DOCFEED_DELETE_ATTEMPTS", default_value_t = 3)]
    delete_attempts: u32,

    /// Pause between delete attempts, in milliseconds.
    #[arg(long, env = "DOCFEED_DELETE_BACKOFF_MS", default_value_t = 200)]
    delete_backoff_ms: u64,

    /// Submit files to the pool in chunks of this size.
    #[arg(long, env = "DOCFEED_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Keep directories left empty by the batch.
    #[arg(long, env = "DOCFEED_KEEP_EMPTY_DIRS")]
    keep_empty_dirs: bool,

    /// Command used to extract text from legacy .doc files.
    #[arg(long, env = "DOCFEED_DOC_COMMAND", default_value = "antiword")]
    doc_command: String,

    /// Upload new artifacts to the indexing service after the batch.
    #[arg(long, env = "DOCFEED_UPLOAD")]
    upload: bool,

    /// Indexing service base URL.
    #[arg(long, env = "DOCFEED_INDEX_URL", default_value = "http://anythingllm:3001")]
    index_url: String,

    /// Workspace slug receiving uploads.
    #[arg(long, env = "WORKSPACE")]
    workspace: Option<String>,

    /// Bearer token for the indexing service.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Output the batch outcome as JSON on stdout.
    #[arg(long, env = "DOCFEED_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCFEED_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCFEED_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCFEED_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SpreadsheetArg {
    Csv,
    Markdown,
    Json,
}

impl From<SpreadsheetArg> for SpreadsheetFormat {
    fn from(v: SpreadsheetArg) -> Self {
        match v {
            SpreadsheetArg::Csv => SpreadsheetFormat::Csv,
            SpreadsheetArg::Markdown => SpreadsheetFormat::Markdown,
            SpreadsheetArg::Json => SpreadsheetFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs; --verbose brings them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let output_root = config.output_root.clone();

    // ── Run batch ────────────────────────────────────────────────────────
    let outcome = Scheduler::new(config)
        .run_configured()
        .await
        .context("Batch could not run")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        let s = &outcome.stats;
        eprintln!(
            "Converted {} / skipped {} / failed {} ({} artifacts, {} dirs pruned) in {}ms",
            s.succeeded, s.skipped, s.failed, s.artifacts, s.pruned_dirs, s.duration_ms
        );
        for (path, err) in outcome.failures() {
            eprintln!("  {} {}: {}", red("✗"), path.display(), err);
        }
    }

    // ── Optional upload ──────────────────────────────────────────────────
    if cli.upload {
        let index_config = IndexConfig::new(
            &cli.index_url,
            cli.workspace.clone().unwrap_or_default(),
            cli.api_key.clone().unwrap_or_default(),
        )
        .context("WORKSPACE and API_KEY must be set to upload")?;
        let readiness = index_config.readiness;
        let index = AnythingLlmIndex::new(index_config).context("Failed to build index client")?;

        if !index.wait_until_available(&readiness).await {
            return Err(PipelineError::IndexUnavailable {
                url: cli.index_url.clone(),
                attempts: readiness.max_attempts,
            })
            .context("Upload aborted");
        }
        let report = upload_new_artifacts(&index, &output_root)
            .await
            .context("Upload failed")?;
        if !cli.quiet {
            eprintln!(
                "{} uploaded {}  already present {}  failed {}{}",
                if report.failed.is_empty() {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                bold(&report.uploaded.len().to_string()),
                report.already_present.len(),
                report.failed.len(),
                if report.embeddings_updated {
                    String::new()
                } else if report.uploaded.is_empty() {
                    dim("  (nothing to embed)")
                } else {
                    red("  (embeddings update failed)")
                },
            );
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let input = match cli.input.clone().or_else(|| env_path("INPUT_DIR")) {
        Some(p) => p,
        None => bail!("No input directory: pass one, or set DOCFEED_INPUT_DIR / INPUT_DIR"),
    };
    let output = match cli.output.clone().or_else(|| env_path("OUTPUT_DIR")) {
        Some(p) => p,
        None => bail!("No output directory: pass -o, or set DOCFEED_OUTPUT_DIR / OUTPUT_DIR"),
    };

    let mut builder = PipelineConfig::builder(input, output)
        .workers(cli.workers)
        .spreadsheet_format(cli.spreadsheet_format.into())
        .passthrough(if cli.reencode_utf8 {
            PassthroughMode::Utf8
        } else {
            PassthroughMode::Copy
        })
        .conversion_timeout_secs(cli.timeout)
        .delete_retry(RetryPolicy::new(
            cli.delete_attempts,
            Duration::from_millis(cli.delete_backoff_ms),
        ))
        .submit_chunk_size(cli.chunk_size)
        .prune_empty_dirs(!cli.keep_empty_dirs)
        .doc_command(cli.doc_command.clone());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
