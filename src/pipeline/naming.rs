//! Unique artifact names.
//!
//! Every artifact lands in one flat output directory, so two inputs sharing
//! a base name (`a/report.pdf`, `b/report.pdf`) must never produce the same
//! file. The name keeps the human-readable stem and appends the first
//! [`FINGERPRINT_LEN`] hex characters of the SHA-256 of the full source path.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Hex characters kept from the path digest.
pub const FINGERPRINT_LEN: usize = 8;

/// `"<stem>_<fingerprint>.<extension>"` for `path`.
///
/// `extension` may be given with or without its leading dot.
pub fn unique_output_name(path: &Path, extension: &str) -> String {
    let fingerprint = fingerprint(&[path.to_string_lossy().as_bytes()]);
    format!("{}_{}{}", stem_of(path), fingerprint, dotted(extension))
}

/// `"<stem>_<suffix>_<fingerprint>.<extension>"`, used when one input emits
/// several artifacts (one per spreadsheet sheet).
///
/// The fingerprint covers the path and the raw suffix, so two suffixes that
/// sanitise to the same text still get different names.
pub fn unique_output_name_with_suffix(path: &Path, suffix: &str, extension: &str) -> String {
    let fingerprint = fingerprint(&[path.to_string_lossy().as_bytes(), b"#", suffix.as_bytes()]);
    format!(
        "{}_{}_{}{}",
        stem_of(path),
        sanitise(suffix),
        fingerprint,
        dotted(extension)
    )
}

fn fingerprint(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string())
}

fn dotted(extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    }
}

/// Keep suffixes filesystem-safe: alphanumerics, `-` and `_` only.
fn sanitise(suffix: &str) -> String {
    let cleaned: String = suffix
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "sheet".to_string()
    } else {
        cleaned
    }
}
