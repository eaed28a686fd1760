//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the scheduler works through the input tree.
//!
//! # Example
//!
//! ```rust
//! use docfeed::{BatchProgressCallback, ConversionResult, PipelineConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, path: &Path, result: &ConversionResult) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {} -> {}", path.display(), result.label());
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder("in", "out")
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchStats, ConversionResult};
use std::path::Path;
use std::sync::Arc;

/// Called by the scheduler as it processes each file.
///
/// Files are processed concurrently, so `on_file_start` and
/// `on_file_complete` may be called from several worker tasks at once.
/// Implementations must protect shared mutable state themselves.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery, before any file is dispatched.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a worker picks up a file.
    fn on_file_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called when a file reaches its final result.
    fn on_file_complete(&self, path: &Path, result: &ConversionResult) {
        let _ = (path, result);
    }

    /// Called once after every file finished and cleanup ran.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
