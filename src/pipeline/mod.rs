//! Batch-level stages that surround the per-file converters.
//!
//! ## Data Flow
//!
//! ```text
//! walk ──▶ (dispatch per file) ──▶ cleanup
//!            └─ naming (artifact file names)
//! ```
//!
//! 1. [`walk`]    — enumerate every regular file under the input root
//! 2. [`naming`]  — collision-resistant artifact names for the flat output
//!    directory; pure, no I/O
//! 3. [`cleanup`] — prune directories the batch left empty, children first

pub mod cleanup;
pub mod naming;
pub mod walk;
