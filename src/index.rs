// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-viewer file indexing
//!
//! A [`FileIndex`] maps normalized keys to the assets of one viewer's file
//! collection. Each inserted asset is given an [`AssetHandle`] from the
//! index's own [`HandleScope`]; all of them are released together when the
//! index is rebuilt or dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::key::{normalize_key, strip_root};
use crate::{JuxtaError, Result};

/// One raw file entry of a viewer's collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path including the uploaded root directory, `/`-separated
    pub path: String,
    /// Location on disk, when the entry came from a local directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: None,
        }
    }

    pub fn with_source(path: impl Into<String>, source: PathBuf) -> Self {
        Self {
            path: path.into(),
            source: Some(source),
        }
    }

    fn check(&self) -> Result<()> {
        if self.path.contains('\0') {
            return Err(JuxtaError::InvalidInput(format!(
                "path contains a NUL byte: {:?}",
                self.path
            )));
        }
        if let Some(source) = &self.source {
            if !source.is_file() {
                return Err(JuxtaError::InvalidInput(format!(
                    "{} is not a readable file",
                    source.display()
                )));
            }
        }
        Ok(())
    }
}

/// Rendering hint for an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Model3d,
}

impl AssetKind {
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if [".glb", ".gltf"].iter().any(|ext| lower.ends_with(ext)) {
            AssetKind::Model3d
        } else {
            AssetKind::Image
        }
    }
}

/// Revocable reference to an indexed file, valid while its index lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(String);

impl AssetHandle {
    fn issue() -> Self {
        Self(format!("blob:juxta/{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One file matched into a comparison row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Path relative to the uploaded root directory
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub handle: AssetHandle,
    pub kind: AssetKind,
}

/// Shared counters of issued and live handles
#[derive(Debug, Clone, Default)]
pub struct HandleLedger {
    live: Arc<AtomicUsize>,
    issued: Arc<AtomicUsize>,
}

impl HandleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles acquired and not yet released
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Handles acquired over the ledger's lifetime
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

/// Owner of every handle issued for one index
#[derive(Debug)]
pub struct HandleScope {
    ledger: HandleLedger,
    handles: Vec<AssetHandle>,
}

impl HandleScope {
    pub fn new(ledger: HandleLedger) -> Self {
        Self {
            ledger,
            handles: Vec::new(),
        }
    }

    fn acquire(&mut self) -> AssetHandle {
        let handle = AssetHandle::issue();
        self.ledger.live.fetch_add(1, Ordering::SeqCst);
        self.ledger.issued.fetch_add(1, Ordering::SeqCst);
        self.handles.push(handle.clone());
        handle
    }

    /// Release every handle in the scope, returning how many were released
    pub fn release(&mut self) -> usize {
        let released = self.handles.len();
        if released > 0 {
            self.handles.clear();
            self.ledger.live.fetch_sub(released, Ordering::SeqCst);
            debug!("Released {} asset handles", released);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, handle: &AssetHandle) -> bool {
        self.handles.contains(handle)
    }
}

impl Drop for HandleScope {
    fn drop(&mut self) {
        self.release();
    }
}

/// Key-to-asset mapping for one viewer
#[derive(Debug)]
pub struct FileIndex {
    keys: Vec<String>,
    assets: HashMap<String, Asset>,
    scope: HandleScope,
}

impl FileIndex {
    /// An index with no assets
    pub fn empty(ledger: HandleLedger) -> Self {
        Self {
            keys: Vec::new(),
            assets: HashMap::new(),
            scope: HandleScope::new(ledger),
        }
    }

    /// Keys in insertion order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn get(&self, key: &str) -> Option<&Asset> {
        self.assets.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.assets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn scope(&self) -> &HandleScope {
        &self.scope
    }

    /// Release all handles and forget every asset
    pub fn release(&mut self) -> usize {
        self.keys.clear();
        self.assets.clear();
        self.scope.release()
    }

    fn insert(&mut self, key: String, entry: &FileEntry) {
        let path = strip_root(&entry.path).to_string();
        let asset = Asset {
            kind: AssetKind::from_path(&path),
            handle: self.scope.acquire(),
            source: entry.source.clone(),
            path,
        };
        self.keys.push(key.clone());
        self.assets.insert(key, asset);
    }
}

/// Build the index of one file collection.
///
/// The first entry wins when several normalize to the same key. Entries
/// with no key, or that cannot be read, are skipped.
pub fn build_index(entries: &[FileEntry], ledger: &HandleLedger) -> FileIndex {
    let mut index = FileIndex::empty(ledger.clone());

    for entry in entries {
        if let Err(e) = entry.check() {
            error!("Error processing file {:?}: {}", entry.path, e);
            continue;
        }

        let key = normalize_key(&entry.path);
        if key.is_empty() {
            warn!("No matching key for {:?}, skipping", entry.path);
            continue;
        }
        if index.contains_key(&key) {
            debug!("Duplicate key '{}' from {:?}, keeping first", key, entry.path);
            continue;
        }

        index.insert(key, entry);
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(paths: &[&str]) -> Vec<FileEntry> {
        paths.iter().map(|p| FileEntry::new(*p)).collect()
    }

    #[test]
    fn test_build_index_keys_and_paths() {
        let ledger = HandleLedger::new();
        let index = build_index(&entries(&["renders/chair.png", "renders/sub/table.glb"]), &ledger);

        assert_eq!(index.keys(), &["chair".to_string(), "sub/table".to_string()]);
        let table = index.get("sub/table").unwrap();
        assert_eq!(table.path, "sub/table.glb");
        assert_eq!(table.kind, AssetKind::Model3d);
        assert_eq!(index.get("chair").unwrap().kind, AssetKind::Image);
    }

    #[test]
    fn test_duplicate_keys_first_wins() {
        let ledger = HandleLedger::new();
        let index = build_index(&entries(&["r/chair.png", "r/chair.glb"]), &ledger);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("chair").unwrap().path, "chair.png");
        assert_eq!(ledger.live(), 1);
    }

    #[test]
    fn test_entries_without_key_are_skipped() {
        let ledger = HandleLedger::new();
        let index = build_index(&entries(&["", "r/", "r/ok.png", "r/bad\0.png"]), &ledger);

        assert_eq!(index.keys(), &["ok".to_string()]);
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let ledger = HandleLedger::new();
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.png");
        std::fs::write(&present, b"png").unwrap();

        let index = build_index(
            &[
                FileEntry::with_source("r/a.png", present),
                FileEntry::with_source("r/b.png", dir.path().join("b.png")),
            ],
            &ledger,
        );

        assert_eq!(index.keys(), &["a".to_string()]);
    }

    #[test]
    fn test_handles_released_on_drop() {
        let ledger = HandleLedger::new();
        {
            let index = build_index(&entries(&["r/a.png", "r/b.png", "r/c.png"]), &ledger);
            assert_eq!(index.scope().len(), 3);
            assert_eq!(ledger.live(), 3);
        }
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.issued(), 3);
    }

    #[test]
    fn test_repeated_builds_do_not_leak() {
        let ledger = HandleLedger::new();
        let files = entries(&["r/a.png", "r/b.png"]);
        let mut index = build_index(&files, &ledger);
        for _ in 0..5 {
            index = build_index(&files, &ledger);
        }
        assert_eq!(index.len(), 2);
        assert_eq!(ledger.live(), 2);
        assert_eq!(ledger.issued(), 12);
    }

    #[test]
    fn test_explicit_release() {
        let ledger = HandleLedger::new();
        let mut index = build_index(&entries(&["r/a.png"]), &ledger);
        let handle = index.get("a").unwrap().handle.clone();
        assert!(index.scope().contains(&handle));
        assert!(handle.as_str().starts_with("blob:juxta/"));

        assert_eq!(index.release(), 1);
        assert!(index.is_empty());
        assert_eq!(ledger.live(), 0);
    }
}
