// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Alignment of viewer collections into comparison rows
//!
//! Rows come either from a manifest (exact key lookups, manifest order) or
//! from automatic discovery, where keys that extend a shorter key are
//! grouped under it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::index::{build_index, Asset, FileEntry, FileIndex, HandleLedger};
use crate::judgment::VoteValue;

/// One column of the comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewer {
    pub id: String,
    pub title: String,
    /// Raw entries of the assigned collection, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
    #[serde(default)]
    pub directory_name: Option<String>,
    /// Presentation metadata, never interpreted here
    #[serde(default)]
    pub display_order: usize,
    #[serde(default = "default_flex")]
    pub flex: f64,
}

fn default_flex() -> f64 {
    1.0
}

impl Viewer {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            files: None,
            directory_name: None,
            display_order: 0,
            flex: default_flex(),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.as_ref().map_or(0, Vec::len)
    }
}

/// One logical asset across all viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub key: String,
    /// Positional: `assets[i]` belongs to `viewers[i]`
    pub assets: Vec<Option<Asset>>,
    #[serde(default)]
    pub votes: BTreeMap<String, VoteValue>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ComparisonRow {
    /// A row with no judgments attached
    pub fn skeleton(key: impl Into<String>, assets: Vec<Option<Asset>>) -> Self {
        Self {
            key: key.into(),
            assets,
            votes: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn has_judgments(&self) -> bool {
        !self.votes.is_empty() || !self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    Manifest,
    Auto,
}

/// Output of one alignment pass
///
/// Owns the per-viewer indices, so every asset handle referenced by
/// `rows` stays valid until the alignment is dropped or superseded.
#[derive(Debug)]
pub struct Alignment {
    pub rows: Vec<ComparisonRow>,
    pub mode: AlignMode,
    indices: Vec<FileIndex>,
}

impl Alignment {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            mode: AlignMode::Auto,
            indices: Vec::new(),
        }
    }

    pub fn indices(&self) -> &[FileIndex] {
        &self.indices
    }

    /// Handles held by this pass
    pub fn handle_count(&self) -> usize {
        self.indices.iter().map(|i| i.scope().len()).sum()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }
}

/// Run an alignment pass over the viewers' current collections.
///
/// A non-empty manifest selects manifest mode; otherwise rows are
/// discovered from the indexed keys.
pub fn align(viewers: &[Viewer], manifest: Option<&[String]>, ledger: &HandleLedger) -> Alignment {
    let indices: Vec<FileIndex> = viewers
        .iter()
        .map(|v| match &v.files {
            Some(files) => build_index(files, ledger),
            None => FileIndex::empty(ledger.clone()),
        })
        .collect();

    for (viewer, index) in viewers.iter().zip(&indices) {
        debug!("Indexed {} keys for viewer '{}'", index.len(), viewer.title);
    }

    let (mode, rows) = match manifest {
        Some(keys) if !keys.is_empty() => (AlignMode::Manifest, manifest_rows(keys, &indices)),
        _ => (AlignMode::Auto, discovered_rows(&indices)),
    };

    info!(
        "Aligned {} rows across {} viewers ({:?} mode)",
        rows.len(),
        viewers.len(),
        mode
    );

    Alignment { rows, mode, indices }
}

fn manifest_rows(manifest: &[String], indices: &[FileIndex]) -> Vec<ComparisonRow> {
    let mut seen = HashSet::new();
    manifest
        .iter()
        .filter(|key| {
            let first = seen.insert(key.as_str());
            if !first {
                debug!("Repeated manifest key '{}' ignored", key);
            }
            first
        })
        .map(|key| {
            let assets = indices.iter().map(|index| index.get(key).cloned()).collect();
            ComparisonRow::skeleton(key.clone(), assets)
        })
        .collect()
}

fn discovered_rows(indices: &[FileIndex]) -> Vec<ComparisonRow> {
    let mut groups = canonical_groups(indices.iter().map(|i| i.keys()));
    groups.sort_by(|a, b| a.canonical.cmp(&b.canonical));

    groups
        .into_iter()
        .map(|group| {
            let assets = indices
                .iter()
                .map(|index| {
                    group
                        .members
                        .iter()
                        .find_map(|key| index.get(key))
                        .cloned()
                })
                .collect();
            ComparisonRow::skeleton(group.canonical, assets)
        })
        .collect()
}

/// Keys considered the same logical asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup {
    pub canonical: String,
    /// Lookup order: the canonical key first, then the keys it absorbed
    pub members: Vec<String>,
}

/// Group keys by shortest prefix.
///
/// Keys are visited shortest first; an unassigned key becomes canonical and
/// absorbs every unassigned key that starts with it. Groups are returned in
/// creation order.
pub fn canonical_groups<'a, I>(key_sets: I) -> Vec<KeyGroup>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut keys: Vec<&str> = Vec::new();
    for set in key_sets {
        for key in set {
            if seen.insert(key.as_str()) {
                keys.push(key);
            }
        }
    }
    keys.sort_by_key(|k| k.len());

    let mut assigned = vec![false; keys.len()];
    let mut groups = Vec::new();

    for i in 0..keys.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let canonical = keys[i];
        let mut members = vec![canonical.to_string()];

        for j in (i + 1)..keys.len() {
            if !assigned[j] && keys[j].starts_with(canonical) {
                assigned[j] = true;
                members.push(keys[j].to_string());
            }
        }

        groups.push(KeyGroup {
            canonical: canonical.to_string(),
            members,
        });
    }

    groups
}
