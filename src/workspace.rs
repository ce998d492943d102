// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The comparison workspace
//!
//! Owns the viewers, the optional manifest, the current alignment pass and
//! the judgment store. Any change to viewers, their files or the manifest
//! re-runs alignment and reconciles judgments by row key, so votes and tags
//! survive adding, removing or reordering viewers.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::align::{align, AlignMode, Alignment, ComparisonRow, Viewer};
use crate::config::AppConfig;
use crate::index::{FileEntry, HandleLedger};
use crate::judgment::{JudgmentStore, ReconcileReport, RowFilter, VoteSummary, VoteValue, ALL_BAD};
use crate::key::root_segment;
use crate::loader::load_directory;
use crate::snapshot::{self, ImportReport, Snapshot};
use crate::{JuxtaError, Result};

pub struct Workspace {
    viewers: Vec<Viewer>,
    manifest: Option<Vec<String>>,
    alignment: Alignment,
    store: JudgmentStore,
    ledger: HandleLedger,
    loading: bool,
}

impl Workspace {
    /// An empty workspace with no viewers
    pub fn new(categories: Vec<String>) -> Self {
        Self {
            viewers: Vec::new(),
            manifest: None,
            alignment: Alignment::empty(),
            store: JudgmentStore::new(categories),
            ledger: HandleLedger::new(),
            loading: false,
        }
    }

    /// Build a workspace from configuration, loading every viewer directory
    /// and the manifest if one is configured.
    ///
    /// Viewers take their ids from the configuration, so votes saved in one
    /// session still name the same viewers in the next.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let mut workspace = Self::new(config.categories.clone());

        for (source, id) in config.viewers.iter().zip(config.viewer_ids()) {
            workspace.push_viewer_as(id.clone(), Some(source.title.as_str()));
            if let Some(path) = &source.path {
                let entries = load_directory(Path::new(path), &source.include, &config.loader)?;
                workspace.set_files(&id, Some(entries))?;
            }
        }

        if let Some(path) = config.manifest_path() {
            workspace.manifest = Some(snapshot::load_manifest(&path)?);
        }

        workspace.realign();
        Ok(workspace)
    }

    /// Re-read every configured viewer directory, then realign once.
    ///
    /// A directory that can no longer be read leaves its viewer empty.
    pub fn reload(&mut self, config: &AppConfig) -> Result<ReconcileReport> {
        for (source, id) in config.viewers.iter().zip(config.viewer_ids()) {
            let Some(path) = &source.path else {
                continue;
            };
            if self.position(&id).is_err() {
                continue;
            }
            match load_directory(Path::new(path), &source.include, &config.loader) {
                Ok(entries) => self.set_files(&id, Some(entries))?,
                Err(e) => {
                    warn!("Cannot reload '{}' from {}: {}", source.title, path, e);
                    self.set_files(&id, None)?;
                }
            }
        }
        Ok(self.realign())
    }

    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    pub fn viewer_ids(&self) -> Vec<String> {
        self.viewers.iter().map(|v| v.id.clone()).collect()
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        self.store.rows()
    }

    pub fn row(&self, key: &str) -> Option<&ComparisonRow> {
        self.store.row(key)
    }

    pub fn store(&self) -> &JudgmentStore {
        &self.store
    }

    pub fn categories(&self) -> &[String] {
        self.store.categories()
    }

    pub fn manifest(&self) -> Option<&[String]> {
        self.manifest.as_deref()
    }

    pub fn mode(&self) -> AlignMode {
        self.alignment.mode
    }

    /// True only while an alignment pass runs
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn handle_ledger(&self) -> &HandleLedger {
        &self.ledger
    }

    /// Re-run alignment and carry judgments over to the new rows.
    ///
    /// The previous pass, and every asset handle it held, is released once
    /// the new one is in place.
    pub fn realign(&mut self) -> ReconcileReport {
        self.loading = true;
        let mut alignment = align(&self.viewers, self.manifest.as_deref(), &self.ledger);
        let skeletons = std::mem::take(&mut alignment.rows);
        let report = self.store.reconcile(skeletons);
        self.alignment = alignment;
        self.loading = false;
        report
    }

    fn push_viewer(&mut self, title: Option<&str>) -> String {
        let id = format!("viewer-{}", uuid::Uuid::new_v4());
        self.push_viewer_as(id.clone(), title);
        id
    }

    fn push_viewer_as(&mut self, id: String, title: Option<&str>) {
        let title = match title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => format!("Viewer {}", self.viewers.len() + 1),
        };
        let mut viewer = Viewer::new(id, title);
        viewer.display_order = self.viewers.len();
        self.viewers.push(viewer);
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.viewers
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| JuxtaError::UnknownViewer(id.to_string()))
    }

    fn renumber(&mut self) {
        for (i, viewer) in self.viewers.iter_mut().enumerate() {
            viewer.display_order = i;
        }
    }

    fn set_files(&mut self, id: &str, files: Option<Vec<FileEntry>>) -> Result<()> {
        let pos = self.position(id)?;
        let viewer = &mut self.viewers[pos];
        viewer.directory_name = files
            .as_ref()
            .and_then(|f| f.first())
            .and_then(|entry| root_segment(&entry.path))
            .map(str::to_string);
        viewer.files = files;
        Ok(())
    }

    /// Add a viewer; without a title it is named `Viewer N`
    pub fn add_viewer(&mut self, title: Option<&str>) -> String {
        let id = self.push_viewer(title);
        info!("Added viewer {}", id);
        self.realign();
        id
    }

    pub fn remove_viewer(&mut self, id: &str) -> Result<Viewer> {
        let pos = self.position(id)?;
        let viewer = self.viewers.remove(pos);
        self.renumber();
        info!("Removed viewer '{}'", viewer.title);
        self.realign();
        Ok(viewer)
    }

    pub fn rename_viewer(&mut self, id: &str, title: &str) -> Result<()> {
        let pos = self.position(id)?;
        self.viewers[pos].title = title.to_string();
        Ok(())
    }

    /// Move the viewer `id` to the position currently held by `target`
    pub fn move_viewer(&mut self, id: &str, target: &str) -> Result<()> {
        let from = self.position(id)?;
        let to = self.position(target)?;
        if from == to {
            return Ok(());
        }
        let viewer = self.viewers.remove(from);
        self.viewers.insert(to, viewer);
        self.renumber();
        self.realign();
        Ok(())
    }

    /// Assign a new file collection to a viewer
    pub fn assign_files(&mut self, id: &str, entries: Vec<FileEntry>) -> Result<()> {
        self.set_files(id, Some(entries))?;
        self.realign();
        Ok(())
    }

    pub fn clear_files(&mut self, id: &str) -> Result<()> {
        self.set_files(id, None)?;
        self.realign();
        Ok(())
    }

    /// Install or clear the manifest. An empty list counts as no manifest.
    pub fn set_manifest(&mut self, manifest: Option<Vec<String>>) {
        self.manifest = manifest.filter(|keys| !keys.is_empty());
        self.realign();
    }

    /// Parse a manifest document and apply it. On error the current
    /// manifest stays in place.
    pub fn import_manifest(&mut self, text: &str) -> Result<usize> {
        let keys = snapshot::parse_manifest(text)?;
        let count = keys.len();
        self.set_manifest(Some(keys));
        Ok(count)
    }

    /// Resolve user input to a vote value: `all_bad`, a viewer id, a viewer
    /// title, or a 1-based viewer position.
    pub fn resolve_vote(&self, input: &str) -> Result<VoteValue> {
        let input = input.trim();
        if input.eq_ignore_ascii_case(ALL_BAD) || input.eq_ignore_ascii_case("all bad") {
            return Ok(VoteValue::AllBad);
        }
        if let Some(v) = self.viewers.iter().find(|v| v.id == input) {
            return Ok(VoteValue::viewer(&v.id));
        }
        if let Some(v) = self.viewers.iter().find(|v| v.title.eq_ignore_ascii_case(input)) {
            return Ok(VoteValue::viewer(&v.id));
        }
        if let Ok(n) = input.parse::<usize>() {
            if let Some(v) = n.checked_sub(1).and_then(|i| self.viewers.get(i)) {
                return Ok(VoteValue::viewer(&v.id));
            }
        }
        Err(JuxtaError::UnknownViewer(input.to_string()))
    }

    /// Display name of a vote value
    pub fn vote_label(&self, value: &str) -> String {
        if value == ALL_BAD {
            return "All Bad".to_string();
        }
        self.viewers
            .iter()
            .find(|v| v.id == value)
            .map(|v| v.title.clone())
            .unwrap_or_else(|| value.to_string())
    }

    pub fn set_vote(&mut self, key: &str, category: &str, value: VoteValue) -> Result<Option<VoteValue>> {
        self.store.set_vote(key, category, value)
    }

    pub fn set_batch_vote(&mut self, key: &str, value: Option<VoteValue>) -> Result<()> {
        self.store.set_batch_vote(key, value)
    }

    pub fn set_tags(&mut self, key: &str, tags: Vec<String>) -> Result<()> {
        self.store.set_tags(key, tags)
    }

    /// Add one tag, trimmed. Tags already on the row are rejected.
    pub fn add_tag(&mut self, key: &str, tag: &str) -> Result<()> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(JuxtaError::InvalidInput("tag is empty".to_string()));
        }
        let row = self.row(key).ok_or_else(|| JuxtaError::UnknownRow(key.to_string()))?;
        if row.tags.iter().any(|t| t == tag) {
            return Err(JuxtaError::DuplicateTag {
                key: key.to_string(),
                tag: tag.to_string(),
            });
        }
        let mut tags = row.tags.clone();
        tags.push(tag.to_string());
        self.store.set_tags(key, tags)
    }

    /// Remove a tag; returns whether it was present
    pub fn remove_tag(&mut self, key: &str, tag: &str) -> Result<bool> {
        let row = self.row(key).ok_or_else(|| JuxtaError::UnknownRow(key.to_string()))?;
        let tags: Vec<String> = row.tags.iter().filter(|t| *t != tag).cloned().collect();
        let removed = tags.len() != row.tags.len();
        if removed {
            self.store.set_tags(key, tags)?;
        }
        Ok(removed)
    }

    pub fn add_category(&mut self, name: &str) -> Result<()> {
        self.store.add_category(name)
    }

    pub fn remove_category(&mut self, name: &str) -> Result<()> {
        self.store.remove_category(name)
    }

    pub fn filter<'a>(&'a self, filter: &'a RowFilter) -> Vec<&'a ComparisonRow> {
        self.store.filter(filter).collect()
    }

    pub fn summary(&self) -> VoteSummary {
        self.store.summary(&self.viewer_ids())
    }

    pub fn export_results(&self) -> Snapshot {
        snapshot::export(&self.store)
    }

    /// Merge a results document into the current rows
    pub fn import_results(&mut self, text: &str) -> Result<ImportReport> {
        let report = snapshot::import(&mut self.store, text)?;
        if !report.unmatched.is_empty() {
            warn!("{} imported keys match no current row", report.unmatched.len());
            debug!("Unmatched keys: {:?}", report.unmatched);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(paths: &[&str]) -> Vec<FileEntry> {
        paths.iter().map(|p| FileEntry::new(*p)).collect()
    }

    fn workspace() -> (Workspace, String, String) {
        let mut ws = Workspace::new(vec!["Material".into(), "Texture".into()]);
        let a = ws.add_viewer(Some("Old"));
        let b = ws.add_viewer(Some("New"));
        ws.assign_files(&a, entries(&["old/chair.png", "old/table.png"])).unwrap();
        ws.assign_files(&b, entries(&["new/chair.glb"])).unwrap();
        (ws, a, b)
    }

    fn assert_row_widths(ws: &Workspace) {
        for row in ws.rows() {
            assert_eq!(row.assets.len(), ws.viewers().len());
        }
    }

    #[test]
    fn test_viewer_defaults() {
        let mut ws = Workspace::new(vec![]);
        let id = ws.add_viewer(None);
        assert!(id.starts_with("viewer-"));
        assert_eq!(ws.viewers()[0].title, "Viewer 1");
        assert!(!ws.is_loading());
    }

    #[test]
    fn test_assign_sets_directory_name() {
        let (ws, a, _) = workspace();
        let viewer = ws.viewers().iter().find(|v| v.id == a).unwrap();
        assert_eq!(viewer.directory_name.as_deref(), Some("old"));
        assert_eq!(viewer.file_count(), 2);
    }

    #[test]
    fn test_judgments_survive_viewer_changes() {
        let (mut ws, a, b) = workspace();
        ws.set_vote("chair", "Material", VoteValue::viewer(&b)).unwrap();
        ws.add_tag("table", "missing-new").unwrap();

        let c = ws.add_viewer(Some("Input"));
        assert_row_widths(&ws);
        ws.move_viewer(&c, &a).unwrap();
        assert_row_widths(&ws);
        assert_eq!(ws.viewers()[0].id, c);
        assert_eq!(ws.viewers()[0].display_order, 0);
        assert_eq!(ws.row("chair").unwrap().assets[2].as_ref().unwrap().path, "chair.glb");

        ws.remove_viewer(&c).unwrap();
        assert_row_widths(&ws);
        assert_eq!(ws.row("chair").unwrap().votes["Material"], VoteValue::viewer(&b));
        assert_eq!(ws.row("table").unwrap().tags, vec!["missing-new".to_string()]);
    }

    #[test]
    fn test_rows_dropped_when_files_disappear() {
        let (mut ws, a, _) = workspace();
        ws.add_tag("table", "x").unwrap();
        ws.assign_files(&a, entries(&["old/chair.png"])).unwrap();
        assert!(ws.row("table").is_none());
        assert_eq!(ws.rows().len(), 1);
    }

    #[test]
    fn test_manifest_overrides_discovery() {
        let (mut ws, _, _) = workspace();
        ws.import_manifest(r#"["table", "lamp"]"#).unwrap();
        assert_eq!(ws.mode(), AlignMode::Manifest);
        let keys: Vec<_> = ws.rows().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["table", "lamp"]);
        assert!(ws.row("lamp").unwrap().assets.iter().all(Option::is_none));

        assert!(ws.import_manifest("{}").is_err());
        assert_eq!(ws.manifest().unwrap().len(), 2);

        ws.set_manifest(None);
        assert_eq!(ws.mode(), AlignMode::Auto);
        assert!(ws.row("chair").unwrap().assets[1].is_some());
    }

    #[test]
    fn test_handles_released_between_passes() {
        let (mut ws, a, _) = workspace();
        assert_eq!(ws.handle_ledger().live(), 3);
        ws.realign();
        ws.realign();
        assert_eq!(ws.handle_ledger().live(), 3);
        ws.clear_files(&a).unwrap();
        assert_eq!(ws.handle_ledger().live(), 1);
    }

    #[test]
    fn test_resolve_vote() {
        let (ws, a, b) = workspace();
        assert_eq!(ws.resolve_vote("all_bad").unwrap(), VoteValue::AllBad);
        assert_eq!(ws.resolve_vote("new").unwrap(), VoteValue::viewer(&b));
        assert_eq!(ws.resolve_vote("1").unwrap(), VoteValue::viewer(&a));
        assert_eq!(ws.resolve_vote(&a).unwrap(), VoteValue::viewer(&a));
        assert!(ws.resolve_vote("3").is_err());
        assert!(ws.resolve_vote("0").is_err());
        assert_eq!(ws.vote_label(ALL_BAD), "All Bad");
        assert_eq!(ws.vote_label(&b), "New");
    }

    #[test]
    fn test_tag_editing() {
        let (mut ws, _, _) = workspace();
        ws.add_tag("chair", " scratched ").unwrap();
        assert!(matches!(ws.add_tag("chair", "scratched"), Err(JuxtaError::DuplicateTag { .. })));
        assert!(ws.add_tag("chair", "").is_err());
        assert!(ws.remove_tag("chair", "scratched").unwrap());
        assert!(!ws.remove_tag("chair", "scratched").unwrap());
        assert!(ws.add_tag("ghost", "x").is_err());
    }

    #[test]
    fn test_results_round_trip_through_workspace() {
        let (mut ws, a, _) = workspace();
        ws.set_batch_vote("chair", Some(VoteValue::viewer(&a))).unwrap();
        let text = serde_json::to_string(&ws.export_results()).unwrap();

        ws.set_batch_vote("chair", None).unwrap();
        let report = ws.import_results(&text).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(ws.row("chair").unwrap().votes.len(), 2);
        assert_eq!(ws.summary().voted, 1);
    }

    #[test]
    fn test_open_from_config() {
        let tmp = tempfile::tempdir().unwrap();
        let old = tmp.path().join("old");
        let new = tmp.path().join("new");
        std::fs::create_dir_all(&old).unwrap();
        std::fs::create_dir_all(&new).unwrap();
        std::fs::write(old.join("car.png"), b"x").unwrap();
        std::fs::write(new.join("car_v2.png"), b"x").unwrap();

        let mut config = AppConfig::default();
        config.viewers = vec![
            crate::config::ViewerSource::new("Old", Some(old.to_string_lossy().into_owned())),
            crate::config::ViewerSource::new("New", Some(new.to_string_lossy().into_owned())),
        ];

        let ws = Workspace::open(&config).unwrap();
        assert_eq!(ws.viewer_ids(), vec!["viewer-old", "viewer-new"]);
        assert_eq!(ws.rows().len(), 1);
        assert_eq!(ws.rows()[0].key, "car");
        assert!(ws.rows()[0].assets.iter().all(Option::is_some));
    }

    #[test]
    fn test_filter_by_tag_and_vote() {
        let (mut ws, a, _) = workspace();
        ws.add_tag("chair", "scratched").unwrap();
        ws.set_vote("table", "Material", VoteValue::viewer(&a)).unwrap();

        let by_tag = RowFilter {
            tags: vec!["scratched".to_string()],
            vote: None,
        };
        let keys: Vec<_> = ws.filter(&by_tag).iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["chair"]);

        let by_vote = RowFilter {
            tags: Vec::new(),
            vote: Some(VoteValue::viewer(&a)),
        };
        let keys: Vec<_> = ws.filter(&by_vote).iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["table"]);
    }
}
