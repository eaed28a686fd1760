//! Input discovery: enumerate every regular file under the input root.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Collect the files to dispatch.
///
/// Order is whatever the filesystem yields; callers must not rely on it.
/// Anything under `exclude` (the output directory, when it is nested in the
/// input tree) is skipped so a batch never re-ingests its own artifacts.
/// Unreadable entries are logged and skipped.
pub fn discover_files(root: &Path, exclude: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    visit_files(root, exclude, |path| {
        files.push(path);
        true
    });
    debug!("Discovered {} files under {}", files.len(), root.display());
    files
}

/// Number of files [`discover_files`] would return, without holding them.
pub fn count_files(root: &Path, exclude: &Path) -> usize {
    let mut count = 0;
    visit_files(root, exclude, |_| {
        count += 1;
        true
    });
    count
}

/// Hand each discovered file to `visit` as the walk reaches it. The walk
/// stops early when `visit` returns `false`.
pub fn visit_files(root: &Path, exclude: &Path, mut visit: impl FnMut(PathBuf) -> bool) {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(exclude));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && !visit(entry.into_path()) {
            break;
        }
    }
}
