//! Post-batch pruning of directories the batch left empty.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Remove every empty directory below `root`, children before parents.
///
/// `root` itself is kept so the next run finds its input directory. A
/// directory the filesystem refuses to remove (permissions, a concurrent
/// writer) is logged and left in place. Returns the number removed.
pub fn prune_empty_dirs(root: &Path) -> usize {
    prune_empty_dirs_except(root, None)
}

/// [`prune_empty_dirs`], leaving `keep` and everything below it alone.
pub fn prune_empty_dirs_except(root: &Path, keep: Option<&Path>) -> usize {
    let mut removed = 0;

    // contents_first yields a directory only after everything inside it,
    // so a parent sees its children already pruned.
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cleanup could not read entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let dir = entry.path();
        if keep.is_some_and(|k| dir.starts_with(k)) {
            continue;
        }
        match is_empty_dir(dir) {
            Ok(true) => match fs::remove_dir(dir) {
                Ok(()) => {
                    debug!("Removed empty directory {}", dir.display());
                    removed += 1;
                }
                Err(e) => warn!("Could not remove empty directory {}: {}", dir.display(), e),
            },
            Ok(false) => {}
            Err(e) => warn!("Could not inspect directory {}: {}", dir.display(), e),
        }
    }

    if removed > 0 {
        info!("Pruned {} empty directories under {}", removed, root.display());
    }
    removed
}

fn is_empty_dir(dir: &Path) -> std::io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}
