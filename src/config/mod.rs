// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Juxta

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::judgment::DEFAULT_CATEGORIES;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directories to compare, in display order
    #[serde(default = "default_viewers")]
    pub viewers: Vec<ViewerSource>,

    /// Vote categories
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Manifest file fixing which rows exist and their order
    #[serde(default)]
    pub manifest: Option<String>,

    /// Results file settings
    #[serde(default)]
    pub results: ResultsConfig,

    /// Directory loading settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Whether the onboarding text has been shown
    #[serde(default)]
    pub onboarding_seen: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ViewerSource {
    /// Stable id that votes refer to. Older configs without one get an id
    /// derived from the title on load.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub path: Option<String>,
    /// Glob patterns matched against root-relative paths; empty means all
    #[serde(default)]
    pub include: Vec<String>,
}

impl ViewerSource {
    pub fn new(title: impl Into<String>, path: Option<String>) -> Self {
        let title = title.into();
        Self {
            id: default_viewer_id(&title),
            title,
            path,
            include: Vec::new(),
        }
    }

    /// Parse a `TITLE=PATH` command-line override
    pub fn parse_override(spec: &str) -> crate::Result<Self> {
        match spec.split_once('=') {
            Some((title, path)) if !title.trim().is_empty() && !path.is_empty() => {
                Ok(Self::new(title.trim(), Some(path.to_string())))
            }
            _ => Err(crate::JuxtaError::Config(format!(
                "Viewer must be given as TITLE=PATH, got '{}'",
                spec
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResultsConfig {
    #[serde(default = "default_results_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub pretty: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoaderConfig {
    /// Skip `.DS_Store`, `Thumbs.db`, partial downloads and the like
    #[serde(default = "default_true")]
    pub skip_system_files: bool,
    #[serde(default)]
    pub follow_links: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// `viewer-` followed by the lowercased words of the title,
/// e.g. `New Model` becomes `viewer-new-model`
pub fn default_viewer_id(title: &str) -> String {
    let words: Vec<String> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        "viewer".to_string()
    } else {
        format!("viewer-{}", words.join("-"))
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_debounce_ms() -> u64 { 500 }
fn default_results_path() -> String { "comparison-results.json".to_string() }

fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

fn default_viewers() -> Vec<ViewerSource> {
    ["Input Images", "Old Model", "New Model"]
        .into_iter()
        .map(|title| ViewerSource::new(title, None))
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            viewers: default_viewers(),
            categories: default_categories(),
            manifest: None,
            results: ResultsConfig::default(),
            loader: LoaderConfig::default(),
            watch: WatchConfig::default(),
            onboarding_seen: false,
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            path: default_results_path(),
            pretty: true,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            skip_system_files: true,
            follow_links: false,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::JuxtaError::Config(format!("Failed to parse config: {}", e)))?;
            config.fill_viewer_ids();
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check for mistakes serde cannot catch
    pub fn validate(&self) -> crate::Result<()> {
        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.trim().is_empty() {
                return Err(crate::JuxtaError::Config("Empty vote category name".to_string()));
            }
            if !seen.insert(category.as_str()) {
                return Err(crate::JuxtaError::Config(format!(
                    "Vote category '{}' is listed twice",
                    category
                )));
            }
        }

        let mut ids = HashSet::new();
        for viewer in &self.viewers {
            if !viewer.id.is_empty() && !ids.insert(viewer.id.as_str()) {
                return Err(crate::JuxtaError::Config(format!(
                    "Viewer id '{}' is used twice",
                    viewer.id
                )));
            }
            if viewer.title.trim().is_empty() {
                return Err(crate::JuxtaError::Config("Viewer title must not be empty".to_string()));
            }
            for pattern in &viewer.include {
                glob::Pattern::new(pattern)?;
            }
        }

        Ok(())
    }

    /// The id of each configured viewer, in order. Missing ids fall back to
    /// the title-derived id; clashes get a numeric suffix.
    pub fn viewer_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.viewers
            .iter()
            .map(|viewer| {
                let base = match viewer.id.trim() {
                    "" => default_viewer_id(&viewer.title),
                    id => id.to_string(),
                };
                let mut id = base.clone();
                let mut n = 2;
                while !seen.insert(id.clone()) {
                    id = format!("{}-{}", base, n);
                    n += 1;
                }
                id
            })
            .collect()
    }

    /// Write the resolved ids back so they persist with the next save
    pub fn fill_viewer_ids(&mut self) {
        let ids = self.viewer_ids();
        for (viewer, id) in self.viewers.iter_mut().zip(ids) {
            viewer.id = id;
        }
    }

    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.manifest.as_ref().map(PathBuf::from)
    }

    pub fn results_path(&self) -> PathBuf {
        PathBuf::from(&self.results.path)
    }
}
