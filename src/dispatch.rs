//! Per-file dispatch: route by extension, convert, then delete the source.
//!
//! ## Why spawn_blocking + timeout?
//!
//! Every converter is synchronous: `lopdf`, `calamine` and the zip reader
//! do blocking I/O and CPU work, and legacy `.doc` shells out to a child
//! process. Running them on Tokio's blocking pool keeps the async workers
//! free. The timeout releases the worker slot when a conversion hangs; the
//! blocking thread itself cannot be cancelled and finishes in the
//! background, but its result is discarded and the source is kept. The
//! legacy `.doc` converter enforces the same deadline on its child process
//! and kills it, so a hung tool does not outlive the slot.

use crate::config::{PipelineConfig, RetryPolicy};
use crate::converters::{Converter, ConverterRegistry, FileCategory, OutputDir};
use crate::error::ConvertError;
use crate::output::{ConversionResult, InputFile, SkipReason};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Routes one file at a time to its converter.
///
/// Holds only immutable state, so one instance is shared by every worker
/// task; concurrent calls must target disjoint paths.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ConverterRegistry,
    output: OutputDir,
    delete_retry: RetryPolicy,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_registry(config, ConverterRegistry::from_config(config))
    }

    /// Use a custom registry (extra formats, test doubles).
    pub fn with_registry(config: &PipelineConfig, registry: ConverterRegistry) -> Self {
        Self {
            registry,
            output: OutputDir::new(&config.output_root),
            delete_retry: config.delete_retry,
            timeout: config.conversion_timeout,
        }
    }

    /// Convert `path` and settle the source's fate.
    ///
    /// The source is deleted after a successful conversion and for images;
    /// in every other case it is left exactly where it was.
    pub async fn process(&self, path: &Path) -> ConversionResult {
        let input = match InputFile::from_path(path) {
            Ok(input) => input,
            Err(e) => return ConversionResult::Failed(ConvertError::io(path, e)),
        };

        let category = FileCategory::from_extension(&input.extension);
        debug!("{} → {:?}", input.path.display(), category);

        match category {
            FileCategory::Image => {
                if delete_with_retry(&input.path, &self.delete_retry).await {
                    info!("Image discarded: {}", input.path.display());
                } else {
                    error!(
                        "Image {} could not be deleted and is still in place",
                        input.path.display()
                    );
                }
                return ConversionResult::Skipped(SkipReason::ImageDiscarded);
            }
            FileCategory::Audio => {
                info!("Audio file left for later processing: {}", input.path.display());
                return ConversionResult::Skipped(SkipReason::AudioDeferred);
            }
            _ => {}
        }

        let Some(converter) = self.registry.get(category) else {
            info!("Ignored (unsupported type): {}", input.path.display());
            return ConversionResult::Skipped(SkipReason::Unsupported);
        };

        let result = self.convert_blocking(converter, input.clone()).await;

        match &result {
            ConversionResult::Success(outputs) => {
                info!(
                    "Converted {} → {} artifact(s)",
                    input.path.display(),
                    outputs.len()
                );
                if !delete_with_retry(&input.path, &self.delete_retry).await {
                    error!(
                        "Converted but could not delete source {}; it will be picked up again next run",
                        input.path.display()
                    );
                }
            }
            ConversionResult::Skipped(reason) => {
                info!("Skipped {}: {}", input.path.display(), reason);
            }
            ConversionResult::Failed(e) => {
                error!("{}", e);
            }
        }
        result
    }

    async fn convert_blocking(
        &self,
        converter: Arc<dyn Converter>,
        input: InputFile,
    ) -> ConversionResult {
        let output = self.output.clone();
        let path = input.path.clone();
        let name = converter.name();

        let handle = tokio::task::spawn_blocking(move || converter.convert(&input, &output));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => ConversionResult::Failed(ConvertError::TaskPanicked {
                path,
                detail: format!("{name} converter: {join_err}"),
            }),
            Err(_) => {
                warn!(
                    "{} converter exceeded {:?} on {}",
                    name,
                    self.timeout,
                    path.display()
                );
                ConversionResult::Failed(ConvertError::Timeout {
                    path,
                    limit: self.timeout,
                })
            }
        }
    }
}

/// Remove `path`, retrying per `policy`.
///
/// A file that is already gone counts as deleted. Returns `false` only when
/// every attempt failed.
pub async fn delete_with_retry(path: &Path, policy: &RetryPolicy) -> bool {
    for attempt in 1..=policy.max_attempts {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} already removed", path.display());
                return true;
            }
            Err(e) => {
                warn!(
                    "Delete attempt {}/{} failed for {}: {}",
                    attempt,
                    policy.max_attempts,
                    path.display(),
                    e
                );
                if attempt < policy.max_attempts {
                    sleep(policy.backoff).await;
                }
            }
        }
    }
    false
}
