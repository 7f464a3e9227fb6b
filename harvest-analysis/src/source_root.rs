//! Locating the most representative source directory in an acquired tree

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Find the best source root under `root` for files with `extension`.
///
/// A directory whose path ends in the conventional layout suffix wins
/// outright. Otherwise the directory holding the most matching files is
/// chosen, first encountered winning ties. Hidden directories are never
/// descended into. Returns None when the tree holds no matching files at
/// all, so the caller can skip the analysis tool entirely.
pub fn find_source_root(root: &Path, extension: &str, conventional_suffix: &str) -> Option<PathBuf> {
    let mut counts: HashMap<PathBuf, usize> = HashMap::new();
    let mut order: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            if !conventional_suffix.is_empty() && entry.path().ends_with(conventional_suffix) {
                debug!(
                    path = %entry.path().display(),
                    "Conventional source layout found"
                );
                return Some(entry.path().to_path_buf());
            }
            continue;
        }

        if entry.path().extension().and_then(|e| e.to_str()) == Some(extension) {
            let parent = entry
                .path()
                .parent()
                .unwrap_or(root)
                .to_path_buf();
            if !counts.contains_key(&parent) {
                order.push(parent.clone());
            }
            *counts.entry(parent).or_insert(0) += 1;
        }
    }

    let mut best: Option<(&PathBuf, usize)> = None;
    for dir in &order {
        let count = counts[dir];
        if best.map_or(true, |(_, b)| count > b) {
            best = Some((dir, count));
        }
    }

    best.map(|(dir, count)| {
        debug!(
            path = %dir.display(),
            files = count,
            "Densest source directory selected"
        );
        dir.clone()
    })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
