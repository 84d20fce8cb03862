//! Local corpus loading
//!
//! Walks a directory tree and reads every file whose name ends with one of
//! the allowed extensions. Tooling directories are never descended into.

use super::scanner::{has_extension, Corpus, SourceFile};
use super::ImpactError;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Directory names skipped during traversal
pub const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target", "build", ".idea", "__pycache__"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Load a corpus from `root`. Paths are relative to `root` and use `/`;
/// files are visited in name order so results are stable.
pub fn load_local(root: &Path, extensions: &[String]) -> Result<Corpus, ImpactError> {
    if !root.is_dir() {
        return Err(ImpactError::PathNotFound(root.display().to_string()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !has_extension(&relative, extensions) {
            continue;
        }

        match std::fs::read(entry.path()) {
            Ok(bytes) => files.push(SourceFile::new(relative, String::from_utf8_lossy(&bytes))),
            Err(e) => tracing::debug!("Skipping {}: {}", relative, e),
        }
    }

    tracing::info!("Loaded {} files from {}", files.len(), root.display());
    Ok(Corpus::new(files))
}
