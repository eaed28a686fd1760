//! Data types flowing through the pipeline: discovered inputs, per-file
//! results, and the aggregate batch outcome.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read-only view of a discovered input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Lower-cased extension without the leading dot; empty when absent.
    pub extension: String,
    /// Size in bytes at discovery time.
    pub size: u64,
}

impl InputFile {
    /// Stat `path` and build the view.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let size = std::fs::metadata(&path)?.len();
        Ok(Self {
            extension: extension_of(&path),
            path,
            size,
        })
    }
}

/// Lower-cased extension of `path` without the dot.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Why a file was not converted. None of these count as failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// No converter is registered for the extension; the file stays put.
    Unsupported,
    /// Images carry no indexable text; the file was deleted.
    ImageDiscarded,
    /// Audio is recognised but not processed yet; the file stays put.
    AudioDeferred,
    /// The container was valid but yielded no content (scanned PDF, blank
    /// workbook); the file stays put.
    EmptyDocument,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::Unsupported => "unsupported extension",
            SkipReason::ImageDiscarded => "image discarded",
            SkipReason::AudioDeferred => "audio deferred",
            SkipReason::EmptyDocument => "no extractable content",
        };
        f.write_str(s)
    }
}

/// Result of one file's trip through the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionResult {
    /// Artifacts written, in emission order. The source was deleted.
    Success(Vec<PathBuf>),
    /// Not converted; see [`SkipReason`] for what happened to the source.
    Skipped(SkipReason),
    /// Conversion failed; the source is retained.
    Failed(ConvertError),
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ConversionResult::Failed(_))
    }

    /// Short label for logs and progress lines.
    pub fn label(&self) -> String {
        match self {
            ConversionResult::Success(outputs) => {
                format!("converted ({} artifacts)", outputs.len())
            }
            ConversionResult::Skipped(reason) => format!("skipped: {reason}"),
            ConversionResult::Failed(err) => format!("failed: {err}"),
        }
    }
}

/// Summary counters for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Artifacts written across all successful files.
    pub artifacts: usize,
    /// Directories removed by the cleanup pass.
    pub pruned_dirs: usize,
    pub duration_ms: u64,
}

/// Aggregate of every file's result in one batch.
///
/// Informational only: each file's failure is independent, and nothing in
/// the pipeline branches on this map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: BTreeMap<PathBuf, ConversionResult>,
    pub stats: BatchStats,
}

impl BatchOutcome {
    pub fn record(&mut self, path: PathBuf, result: ConversionResult) {
        self.results.insert(path, result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&ConversionResult> {
        self.results.get(path)
    }

    /// Paths whose conversion failed.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &ConvertError)> {
        self.results.iter().filter_map(|(p, r)| match r {
            ConversionResult::Failed(e) => Some((p, e)),
            _ => None,
        })
    }

    /// Every artifact written by the batch.
    pub fn artifacts(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.values().flat_map(|r| match r {
            ConversionResult::Success(outputs) => outputs.as_slice(),
            _ => &[],
        })
    }

    /// Recompute the counters from `results`. Duration and pruned counts are
    /// left as set by the scheduler.
    pub fn tally(&mut self) {
        let mut stats = BatchStats {
            total_files: self.results.len(),
            pruned_dirs: self.stats.pruned_dirs,
            duration_ms: self.stats.duration_ms,
            ..Default::default()
        };
        for result in self.results.values() {
            match result {
                ConversionResult::Success(outputs) => {
                    stats.succeeded += 1;
                    stats.artifacts += outputs.len();
                }
                ConversionResult::Skipped(_) => stats.skipped += 1,
                ConversionResult::Failed(_) => stats.failed += 1,
            }
        }
        self.stats = stats;
    }
}
