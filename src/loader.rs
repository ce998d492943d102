// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Loading a viewer's file collection from a local directory

use glob::Pattern;
use std::path::{Component, Path};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::index::FileEntry;
use crate::{JuxtaError, Result};

/// Collect every file under `dir` as entries rooted at the directory name,
/// e.g. `renders/sub/chair.png`.
///
/// Entries are sorted by path. Unreadable entries are logged and skipped.
pub fn load_directory(dir: &Path, include: &[String], config: &LoaderConfig) -> Result<Vec<FileEntry>> {
    if !std::fs::metadata(dir)?.is_dir() {
        return Err(JuxtaError::InvalidInput(format!("{} is not a directory", dir.display())));
    }

    let root = root_name(dir)?;
    let patterns = include
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut entries = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(config.follow_links)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("Error reading entry under {:?}: {}", dir, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(dir).ok().and_then(slash_path) {
            Some(relative) => relative,
            None => {
                error!("Skipping file with unreadable name: {:?}", entry.path());
                continue;
            }
        };

        if config.skip_system_files && !should_process(entry.path()) {
            debug!("Skipping system file: {}", relative);
            continue;
        }
        if !patterns.is_empty() && !patterns.iter().any(|p| p.matches(&relative)) {
            continue;
        }

        entries.push(FileEntry::with_source(
            format!("{}/{}", root, relative),
            entry.path().to_path_buf(),
        ));
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Loaded {} files from {:?}", entries.len(), dir);
    Ok(entries)
}

fn root_name(dir: &Path) -> Result<String> {
    let resolved = if dir.file_name().is_some() {
        dir.to_path_buf()
    } else {
        dir.canonicalize()?
    };
    resolved
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| JuxtaError::InvalidInput(format!("Cannot name directory {:?}", dir)))
}

fn slash_path(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

/// Check if a file belongs in a collection
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip temporary files
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    !skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n))
}
