//! Batch scheduling: walk the input tree and drive every file through the
//! dispatcher with bounded concurrency.
//!
//! ## Why tokio::spawn inside buffer_unordered?
//!
//! `buffer_unordered(workers)` caps how many files are in flight. Wrapping
//! each unit in its own spawned task means a panic anywhere in that file's
//! path surfaces as a `JoinError` for that file alone; siblings keep
//! running and the batch still reports every result.

use crate::config::PipelineConfig;
use crate::dispatch::Dispatcher;
use crate::error::{ConvertError, PipelineError};
use crate::output::{BatchOutcome, ConversionResult};
use crate::pipeline::{cleanup, walk};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Runs conversion batches over an input tree.
pub struct Scheduler {
    config: PipelineConfig,
    dispatcher: Arc<Dispatcher>,
}

impl Scheduler {
    pub fn new(config: PipelineConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(&config));
        Self { config, dispatcher }
    }

    /// Use a pre-built dispatcher (custom converter registry).
    pub fn with_dispatcher(config: PipelineConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one batch over the configured input root.
    pub async fn run_configured(&self) -> Result<BatchOutcome, PipelineError> {
        self.run(&self.config.input_root).await
    }

    /// Run one batch over `input_root`.
    ///
    /// Returns `Err` only when the batch cannot start: the root is missing
    /// or not a directory, the output directory is the root or one of its
    /// ancestors, or the output directory cannot be created. Every
    /// per-file problem is recorded in the returned [`BatchOutcome`].
    pub async fn run(&self, input_root: impl AsRef<Path>) -> Result<BatchOutcome, PipelineError> {
        let start = Instant::now();
        let root = absolute(input_root.as_ref())?;

        // ── Step 1: Validate roots ───────────────────────────────────────
        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|_| PipelineError::InputNotFound { path: root.clone() })?;
        if !meta.is_dir() {
            return Err(PipelineError::NotADirectory { path: root });
        }
        let output = absolute(&self.config.output_root)?;
        if root.starts_with(&output) {
            return Err(PipelineError::InvalidConfig(format!(
                "Output directory '{}' must not contain the input root '{}'",
                output.display(),
                root.display()
            )));
        }
        tokio::fs::create_dir_all(&output)
            .await
            .map_err(|e| PipelineError::OutputDirFailed {
                path: output.clone(),
                source: e,
            })?;
        info!("Starting batch: {} → {}", root.display(), output.display());

        // ── Step 2 + 3: Discover and dispatch ────────────────────────────
        let mut outcome = BatchOutcome::default();
        match self.config.submit_chunk_size {
            None => {
                let files = {
                    let (root, output) = (root.clone(), output.clone());
                    tokio::task::spawn_blocking(move || walk::discover_files(&root, &output))
                        .await
                        .map_err(walk_panicked)?
                };
                info!("Found {} files", files.len());
                self.notify_batch_start(files.len());
                for (path, result) in self.process_chunk(&files).await {
                    outcome.record(path, result);
                }
            }
            Some(chunk_size) => {
                self.process_streamed(&root, &output, chunk_size, &mut outcome)
                    .await?;
            }
        }

        // ── Step 4: Cleanup ──────────────────────────────────────────────
        if self.config.prune_empty_dirs {
            let (root, output) = (root.clone(), output.clone());
            outcome.stats.pruned_dirs = tokio::task::spawn_blocking(move || {
                cleanup::prune_empty_dirs_except(&root, Some(&output))
            })
            .await
            .unwrap_or_else(|e| {
                warn!("Cleanup task panicked: {}", e);
                0
            });
        }

        // ── Step 5: Stats ────────────────────────────────────────────────
        outcome.stats.duration_ms = start.elapsed().as_millis() as u64;
        outcome.tally();
        let stats = &outcome.stats;
        info!(
            "Batch complete: {} converted, {} skipped, {} failed, {} artifacts, {}ms",
            stats.succeeded, stats.skipped, stats.failed, stats.artifacts, stats.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(&outcome.stats);
        }

        Ok(outcome)
    }

    fn notify_batch_start(&self, total: usize) {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }
    }

    /// Walk and dispatch in chunks of `chunk_size`.
    ///
    /// The walker feeds a channel holding at most one chunk, so no more than
    /// two chunks of paths are alive at once however large the tree is. A
    /// counting pass runs first so progress still gets the total up front.
    async fn process_streamed(
        &self,
        root: &Path,
        output: &Path,
        chunk_size: usize,
        outcome: &mut BatchOutcome,
    ) -> Result<(), PipelineError> {
        let total = {
            let (root, output) = (root.to_path_buf(), output.to_path_buf());
            tokio::task::spawn_blocking(move || walk::count_files(&root, &output))
                .await
                .map_err(walk_panicked)?
        };
        info!("Found {} files", total);
        self.notify_batch_start(total);

        let (tx, mut rx) = mpsc::channel::<PathBuf>(chunk_size);
        let walker = {
            let (root, output) = (root.to_path_buf(), output.to_path_buf());
            tokio::task::spawn_blocking(move || {
                walk::visit_files(&root, &output, |path| tx.blocking_send(path).is_ok())
            })
        };

        let mut chunk_no = 0;
        loop {
            let mut chunk = Vec::with_capacity(chunk_size);
            while chunk.len() < chunk_size {
                match rx.recv().await {
                    Some(path) => chunk.push(path),
                    None => break,
                }
            }
            if chunk.is_empty() {
                break;
            }
            chunk_no += 1;
            debug!("Submitting chunk {} ({} files)", chunk_no, chunk.len());
            for (path, result) in self.process_chunk(&chunk).await {
                outcome.record(path, result);
            }
        }

        walker.await.map_err(walk_panicked)
    }

    /// Drain one chunk through the worker pool.
    async fn process_chunk(&self, chunk: &[PathBuf]) -> Vec<(PathBuf, ConversionResult)> {
        stream::iter(chunk.iter().cloned())
            .map(|path| {
                let dispatcher = Arc::clone(&self.dispatcher);
                let cb = self.config.progress_callback.clone();
                async move {
                    if let Some(ref cb) = cb {
                        cb.on_file_start(&path);
                    }

                    let task_path = path.clone();
                    let handle =
                        tokio::spawn(async move { dispatcher.process(&task_path).await });
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("Worker for {} died: {}", path.display(), e);
                            ConversionResult::Failed(ConvertError::TaskPanicked {
                                path: path.clone(),
                                detail: e.to_string(),
                            })
                        }
                    };

                    if let Some(ref cb) = cb {
                        cb.on_file_complete(&path, &result);
                    }
                    (path, result)
                }
            })
            .buffer_unordered(self.config.workers)
            .collect()
            .await
    }
}

fn walk_panicked(e: tokio::task::JoinError) -> PipelineError {
    PipelineError::Internal(format!("Walk task panicked: {e}"))
}

fn absolute(path: &Path) -> Result<PathBuf, PipelineError> {
    std::path::absolute(path)
        .map_err(|e| PipelineError::Internal(format!("Cannot resolve '{}': {e}", path.display())))
}
