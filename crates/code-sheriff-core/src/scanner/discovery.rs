use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Enumerate candidate paths under `root` in lexicographic order.
///
/// A file root yields itself. A directory yields its regular files, descending
/// into subdirectories only when `recursive` is set. Symlinks are followed and
/// `.git` directories are never entered. Entries that cannot be inspected are
/// still yielded so the scan records them as read errors; unreadable
/// directories and symlink loops are logged and skipped.
pub fn discover(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("path not found: {}", root.display()))?;

    if root.is_file() {
        return Ok(vec![root]);
    }
    if !root.is_dir() {
        bail!("not a file or directory: {}", root.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();
    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_git_dir(entry))
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => match err.path() {
                Some(path) if err.loop_ancestor().is_none() && !path.is_dir() => {
                    warn!(path = %path.display(), error = %err, "unreadable entry during discovery");
                    paths.push(path.to_path_buf());
                }
                _ => warn!(error = %err, "skipping unreadable directory during discovery"),
            },
        }
    }
    paths.sort();
    debug!(root = %root.display(), count = paths.len(), "discovered files");
    Ok(paths)
}

fn is_git_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() == ".git"
}
