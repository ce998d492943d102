// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Results snapshots and manifests
//!
//! A snapshot is the portable JSON form of the judgment store:
//!
//! ```json
//! { "meta": { "version": 2, "categories": ["Material"] },
//!   "items": [{ "key": "chair", "votes": { "Material": "viewer-1" }, "tags": [] }] }
//! ```
//!
//! Older exports are a bare array of `{ key, vote, tags }` with a single
//! vote; those are migrated onto the first configured category on import.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::judgment::{JudgmentStore, VoteValue, DEFAULT_CATEGORIES};
use crate::{JuxtaError, Result};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub version: u32,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotItem {
    pub key: String,
    pub votes: BTreeMap<String, VoteValue>,
    pub tags: Vec<String>,
}

/// Snapshot of every row that carries a vote or a tag
pub fn export(store: &JudgmentStore) -> Snapshot {
    let items = store
        .rows()
        .iter()
        .filter(|row| row.has_judgments())
        .map(|row| SnapshotItem {
            key: row.key.clone(),
            votes: row.votes.clone(),
            tags: row.tags.clone(),
        })
        .collect();

    Snapshot {
        meta: SnapshotMeta {
            version: SNAPSHOT_VERSION,
            categories: store.categories().to_vec(),
        },
        items,
    }
}

pub fn to_json(snapshot: &Snapshot, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    Ok(json)
}

/// Suggested download name, e.g. `comparison-results-2025-01-01T10:00:00.000Z.json`
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!(
        "comparison-results-{}.json",
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Write the store's snapshot to a file
pub fn save(store: &JudgmentStore, path: &Path, pretty: bool) -> Result<usize> {
    let snapshot = export(store);
    std::fs::write(path, to_json(&snapshot, pretty)?)?;
    info!("Exported {} judged rows to {:?}", snapshot.items.len(), path);
    Ok(snapshot.items.len())
}

/// One imported item after legacy migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedItem {
    pub key: String,
    pub votes: BTreeMap<String, VoteValue>,
    pub tags: Vec<String>,
}

/// A parsed results file, not yet applied to any rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDocument {
    /// Categories listed in the document's meta block (v2 only)
    pub categories: Vec<String>,
    pub items: Vec<ImportedItem>,
    pub legacy: bool,
}

/// Only `key` must be well formed; off-type judgment fields are dropped
/// value by value so the rest of the item still applies.
#[derive(Debug, Deserialize)]
struct RawItem {
    key: String,
    #[serde(default)]
    votes: Option<Value>,
    #[serde(default)]
    vote: Option<Value>,
    #[serde(default)]
    tags: Option<Value>,
}

fn vote_map(votes: serde_json::Map<String, Value>) -> BTreeMap<String, VoteValue> {
    votes
        .into_iter()
        .filter_map(|(category, value)| match value {
            Value::String(v) if !v.is_empty() => Some((category, VoteValue::from(v))),
            other => {
                debug!("Dropping vote {} for category '{}'", other, category);
                None
            }
        })
        .collect()
}

fn tag_list(tags: Option<Value>) -> Vec<String> {
    match tags {
        Some(Value::Array(tags)) => tags
            .into_iter()
            .filter_map(|tag| match tag {
                Value::String(tag) => Some(tag),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Parse a results file in either the v2 or the legacy array format.
///
/// `legacy_category` receives a single legacy `vote`.
pub fn parse(text: &str, legacy_category: &str) -> Result<ImportDocument> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| JuxtaError::InvalidSnapshot(format!("not valid JSON: {}", e)))?;

    let (entries, categories, legacy) = match raw {
        Value::Array(entries) => (entries, Vec::new(), true),
        Value::Object(mut doc) => {
            let entries = match doc.remove("items") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(JuxtaError::InvalidSnapshot(
                        "expected an array or an object with an 'items' array".to_string(),
                    ))
                }
            };
            let categories = doc
                .get("meta")
                .and_then(|meta| meta.get("categories"))
                .and_then(Value::as_array)
                .map(|cats| {
                    cats.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            (entries, categories, false)
        }
        _ => {
            return Err(JuxtaError::InvalidSnapshot(
                "expected an array or an object with an 'items' array".to_string(),
            ))
        }
    };

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw: RawItem = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping unreadable result item: {}", e);
                continue;
            }
        };

        let votes = match (raw.votes, raw.vote) {
            (Some(Value::Object(votes)), _) => vote_map(votes),
            (_, Some(Value::String(vote))) if !vote.is_empty() => {
                BTreeMap::from([(legacy_category.to_string(), VoteValue::from(vote))])
            }
            _ => BTreeMap::new(),
        };

        items.push(ImportedItem {
            key: raw.key,
            votes,
            tags: tag_list(raw.tags),
        });
    }

    Ok(ImportDocument {
        categories,
        items,
        legacy,
    })
}

/// What an import changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    /// Imported keys with no aligned row, left unmerged
    pub unmatched: Vec<String>,
    pub categories_added: usize,
}

/// Parse `text` and merge it into the store.
///
/// Unknown categories are appended to the configured list; judgments are
/// applied only to rows whose key matches exactly, the last item winning
/// when a key repeats. On a parse error the store is left untouched.
pub fn import(store: &mut JudgmentStore, text: &str) -> Result<ImportReport> {
    let legacy_category = store
        .categories()
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_CATEGORIES[0].to_string());
    let document = parse(text, &legacy_category)?;
    Ok(apply(store, document))
}

/// Merge an already parsed document into the store
pub fn apply(store: &mut JudgmentStore, document: ImportDocument) -> ImportReport {
    let mut report = ImportReport {
        categories_added: store.merge_categories(&document.categories),
        ..ImportReport::default()
    };

    let mut by_key: HashMap<String, ImportedItem> = HashMap::new();
    for item in document.items {
        by_key.insert(item.key.clone(), item);
    }

    let mut keys: Vec<String> = by_key.keys().cloned().collect();
    keys.sort();
    for key in keys {
        let Some(item) = by_key.remove(&key) else {
            continue;
        };
        if store.row(&key).is_none() {
            report.unmatched.push(key);
            continue;
        }
        if store.replace_judgments(&key, item.votes, item.tags).is_ok() {
            report.applied += 1;
        }
    }

    info!(
        "Imported judgments for {} rows ({} unmatched, {} new categories)",
        report.applied,
        report.unmatched.len(),
        report.categories_added
    );
    report
}

/// Read a results file and merge it into the store
pub fn load(store: &mut JudgmentStore, path: &Path) -> Result<ImportReport> {
    let text = std::fs::read_to_string(path)?;
    import(store, &text)
}

/// Extract manifest keys from a JSON array.
///
/// String entries are keys as-is. Object entries use `key`, then `id`,
/// then `name`, falling back to the object's compact JSON text.
pub fn parse_manifest(text: &str) -> Result<Vec<String>> {
    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| JuxtaError::InvalidManifest(format!("not valid JSON: {}", e)))?;
    let Value::Array(entries) = parsed else {
        return Err(JuxtaError::InvalidManifest("JSON must be an array".to_string()));
    };

    let keys: Vec<String> = entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(obj) => Some(
                ["key", "id", "name"]
                    .iter()
                    .find_map(|field| obj.get(*field).and_then(field_text))
                    .unwrap_or_else(|| entry.to_string()),
            ),
            other => {
                debug!("Ignoring manifest entry {}", other);
                None
            }
        })
        .collect();

    if keys.is_empty() {
        return Err(JuxtaError::EmptyManifest);
    }
    Ok(keys)
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Read manifest keys from a file
pub fn load_manifest(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    let keys = parse_manifest(&text)?;
    info!("Loaded {} manifest keys from {:?}", keys.len(), path);
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::ComparisonRow;

    fn store(keys: &[&str], categories: &[&str]) -> JudgmentStore {
        let mut store = JudgmentStore::new(categories.iter().map(|c| c.to_string()).collect());
        store.reconcile(keys.iter().map(|k| ComparisonRow::skeleton(*k, vec![None])).collect());
        store
    }

    #[test]
    fn test_export_skips_unjudged_rows() {
        let mut s = store(&["a", "b", "c"], &["Material"]);
        s.set_vote("a", "Material", VoteValue::viewer("v1")).unwrap();
        s.set_tags("c", vec!["odd".into()]).unwrap();

        let snapshot = export(&s);
        assert_eq!(snapshot.meta.version, 2);
        assert_eq!(snapshot.meta.categories, vec!["Material".to_string()]);
        let keys: Vec<_> = snapshot.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_export_json_shape() {
        let mut s = store(&["a"], &["Material"]);
        s.set_vote("a", "Material", VoteValue::AllBad).unwrap();
        let value: Value = serde_json::from_str(&to_json(&export(&s), false).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "meta": { "version": 2, "categories": ["Material"] },
                "items": [{ "key": "a", "votes": { "Material": "all_bad" }, "tags": [] }]
            })
        );
    }

    #[test]
    fn test_round_trip_restores_judgments() {
        let mut original = store(&["a", "b"], &["Material", "Texture"]);
        original.set_vote("a", "Material", VoteValue::viewer("v1")).unwrap();
        original.set_vote("a", "Texture", VoteValue::AllBad).unwrap();
        original.set_tags("b", vec!["x".into(), "y".into()]).unwrap();
        let text = to_json(&export(&original), true).unwrap();

        let mut fresh = store(&["a", "b"], &["Material", "Texture"]);
        let report = import(&mut fresh, &text).unwrap();

        assert_eq!(report.applied, 2);
        for key in ["a", "b"] {
            assert_eq!(fresh.row(key).unwrap().votes, original.row(key).unwrap().votes);
            assert_eq!(fresh.row(key).unwrap().tags, original.row(key).unwrap().tags);
        }
    }

    #[test]
    fn test_legacy_vote_migrates_to_first_category() {
        let mut s = store(&["x"], &["Material", "Texture"]);
        import(&mut s, r#"[{ "key": "x", "vote": "viewerA", "tags": [] }]"#).unwrap();

        let votes = &s.row("x").unwrap().votes;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes["Material"], VoteValue::viewer("viewerA"));
    }

    #[test]
    fn test_legacy_null_vote() {
        let doc = parse(r#"[{ "key": "x", "vote": null }]"#, "Material").unwrap();
        assert!(doc.legacy);
        assert!(doc.items[0].votes.is_empty());
        assert!(doc.items[0].tags.is_empty());
    }

    #[test]
    fn test_votes_map_wins_over_legacy_vote() {
        let doc = parse(
            r#"{ "items": [{ "key": "x", "vote": "v9", "votes": { "Texture": "v1" } }] }"#,
            "Material",
        )
        .unwrap();
        assert_eq!(doc.items[0].votes.len(), 1);
        assert_eq!(doc.items[0].votes["Texture"], VoteValue::viewer("v1"));
    }

    #[test]
    fn test_off_type_legacy_vote_keeps_tags() {
        let mut s = store(&["x"], &["Material"]);
        let report = import(&mut s, r#"[{ "key": "x", "vote": 3, "tags": ["keep", 4] }]"#).unwrap();

        assert_eq!(report.applied, 1);
        let row = s.row("x").unwrap();
        assert!(row.votes.is_empty());
        assert_eq!(row.tags, vec!["keep".to_string()]);
    }

    #[test]
    fn test_null_entries_dropped_from_votes_map() {
        let mut s = store(&["x"], &["Material", "Texture"]);
        let text = r#"{ "items": [{ "key": "x", "votes": { "Material": null, "Texture": "v1" }, "tags": ["t"] }] }"#;
        let report = import(&mut s, text).unwrap();

        assert_eq!(report.applied, 1);
        let row = s.row("x").unwrap();
        assert_eq!(row.votes.len(), 1);
        assert_eq!(row.votes["Texture"], VoteValue::viewer("v1"));
        assert_eq!(row.tags, vec!["t".to_string()]);
    }

    #[test]
    fn test_categories_are_unioned() {
        let mut s = store(&["x"], &["Material", "Texture"]);
        let text = r#"{ "meta": { "version": 2, "categories": ["Texture", "Lighting", "Lighting"] }, "items": [] }"#;
        let report = import(&mut s, text).unwrap();

        assert_eq!(report.categories_added, 1);
        assert_eq!(s.categories(), &["Material".to_string(), "Texture".to_string(), "Lighting".to_string()]);
    }

    #[test]
    fn test_unmatched_keys_ignored_and_last_wins() {
        let mut s = store(&["a"], &["Material"]);
        let text = r#"{ "items": [
            { "key": "a", "votes": { "Material": "v1" }, "tags": [] },
            { "key": "ghost", "votes": { "Material": "v1" }, "tags": [] },
            { "key": "a", "votes": { "Material": "v2" }, "tags": ["late"] }
        ] }"#;
        let report = import(&mut s, text).unwrap();

        assert_eq!(report.unmatched, vec!["ghost".to_string()]);
        assert_eq!(s.row("a").unwrap().votes["Material"], VoteValue::viewer("v2"));
        assert_eq!(s.row("a").unwrap().tags, vec!["late".to_string()]);
        assert!(s.row("ghost").is_none());
    }

    #[test]
    fn test_import_replaces_existing_judgments() {
        let mut s = store(&["a"], &["Material"]);
        s.set_tags("a", vec!["old".into()]).unwrap();
        import(&mut s, r#"[{ "key": "a", "vote": "v1" }]"#).unwrap();
        assert!(s.row("a").unwrap().tags.is_empty());
    }

    #[test]
    fn test_malformed_documents_leave_store_unchanged() {
        let mut s = store(&["a"], &["Material"]);
        s.set_vote("a", "Material", VoteValue::viewer("v1")).unwrap();

        for bad in ["not json", "42", r#"{ "meta": {} }"#, r#"{ "items": {} }"#] {
            assert!(matches!(import(&mut s, bad), Err(JuxtaError::InvalidSnapshot(_))));
        }
        assert_eq!(s.row("a").unwrap().votes["Material"], VoteValue::viewer("v1"));
        assert_eq!(s.categories(), &["Material".to_string()]);
    }

    #[test]
    fn test_manifest_strings() {
        let keys = parse_manifest(r#"["chair_01", "table_02"]"#).unwrap();
        assert_eq!(keys, vec!["chair_01".to_string(), "table_02".to_string()]);
    }

    #[test]
    fn test_manifest_objects_priority() {
        let keys = parse_manifest(
            r#"[{ "key": "k", "id": "i" }, { "id": "i", "name": "n" }, { "name": "n" }, { "other": 1 }, { "key": "", "id": 7 }]"#,
        )
        .unwrap();
        assert_eq!(keys, vec!["k", "i", "n", r#"{"other":1}"#, "7"]);
    }

    #[test]
    fn test_manifest_rejections() {
        assert!(matches!(parse_manifest("{}"), Err(JuxtaError::InvalidManifest(_))));
        assert!(matches!(parse_manifest("nope"), Err(JuxtaError::InvalidManifest(_))));
        assert!(matches!(parse_manifest("[]"), Err(JuxtaError::EmptyManifest)));
        assert!(matches!(parse_manifest("[1, 2, null]"), Err(JuxtaError::EmptyManifest)));
    }

    #[test]
    fn test_export_filename() {
        let now = DateTime::parse_from_rfc3339("2025-03-04T05:06:07Z").unwrap().with_timezone(&Utc);
        assert_eq!(export_filename(now), "comparison-results-2025-03-04T05:06:07.000Z.json");
    }

    #[test]
    fn test_save_and_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let mut s = store(&["a"], &["Material"]);
        s.set_tags("a", vec!["keep".into()]).unwrap();
        assert_eq!(save(&s, &path, true).unwrap(), 1);

        let mut other = store(&["a"], &["Material"]);
        load(&mut other, &path).unwrap();
        assert_eq!(other.row("a").unwrap().tags, vec!["keep".to_string()]);
    }
}
