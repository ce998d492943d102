// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Judgment store: votes per category and tags per comparison row

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::align::ComparisonRow;
use crate::{JuxtaError, Result};

/// Sentinel vote meaning every viewer's asset is unacceptable
pub const ALL_BAD: &str = "all_bad";

/// Categories offered when none are configured
pub const DEFAULT_CATEGORIES: [&str; 5] = [
    "Material",
    "Texture",
    "Geometry",
    "Consistency",
    "Background Separation",
];

/// A vote: the winning viewer's id, or all-bad
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VoteValue {
    Viewer(String),
    AllBad,
}

impl VoteValue {
    pub fn viewer(id: impl Into<String>) -> Self {
        VoteValue::Viewer(id.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            VoteValue::Viewer(id) => id,
            VoteValue::AllBad => ALL_BAD,
        }
    }

    pub fn is_all_bad(&self) -> bool {
        matches!(self, VoteValue::AllBad)
    }
}

impl From<String> for VoteValue {
    fn from(value: String) -> Self {
        if value == ALL_BAD {
            VoteValue::AllBad
        } else {
            VoteValue::Viewer(value)
        }
    }
}

impl From<&str> for VoteValue {
    fn from(value: &str) -> Self {
        VoteValue::from(value.to_string())
    }
}

impl From<VoteValue> for String {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Viewer(id) => id,
            VoteValue::AllBad => ALL_BAD.to_string(),
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall verdict of a row's votes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Unvoted,
    /// At least one category picked a viewer
    Accepted,
    /// Every vote is all-bad
    Rejected,
}

impl VoteStatus {
    pub fn of(row: &ComparisonRow) -> Self {
        if row.votes.is_empty() {
            VoteStatus::Unvoted
        } else if row.votes.values().any(|v| !v.is_all_bad()) {
            VoteStatus::Accepted
        } else {
            VoteStatus::Rejected
        }
    }
}

/// Row filter: all listed tags, OR any category voted `vote`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub tags: Vec<String>,
    pub vote: Option<VoteValue>,
}

impl RowFilter {
    pub fn is_active(&self) -> bool {
        !self.tags.is_empty() || self.vote.is_some()
    }

    pub fn matches(&self, row: &ComparisonRow) -> bool {
        let tag_match = !self.tags.is_empty() && self.tags.iter().all(|t| row.tags.contains(t));
        let vote_match = self
            .vote
            .as_ref()
            .is_some_and(|wanted| row.votes.values().any(|v| v == wanted));

        match (self.tags.is_empty(), self.vote.is_none()) {
            (true, true) => true,
            (false, true) => tag_match,
            (true, false) => vote_match,
            (false, false) => tag_match || vote_match,
        }
    }
}

/// Count of votes for one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub tallies: Vec<Tally>,
}

/// Aggregate view of the store for the summary screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSummary {
    /// Rows with at least one vote
    pub voted: usize,
    /// Votes per value summed across every category
    pub totals: Vec<Tally>,
    /// Votes per value within each configured category
    pub breakdown: Vec<CategoryBreakdown>,
    /// Tag frequency, most used first
    pub tags: Vec<Tally>,
}

fn bump(tallies: &mut Vec<Tally>, value: &str) {
    match tallies.iter_mut().find(|t| t.value == value) {
        Some(t) => t.count += 1,
        None => tallies.push(Tally {
            value: value.to_string(),
            count: 1,
        }),
    }
}

fn zeroed(viewer_ids: &[String]) -> Vec<Tally> {
    viewer_ids
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(ALL_BAD))
        .map(|value| Tally {
            value: value.to_string(),
            count: 0,
        })
        .collect()
}

/// Outcome of reconciling fresh row skeletons with held judgments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub carried: usize,
    pub fresh: usize,
    /// Keys whose judgments were discarded because the row disappeared
    pub dropped: Vec<String>,
}

/// Holds the live rows and the configured vote categories
#[derive(Debug, Clone)]
pub struct JudgmentStore {
    categories: Vec<String>,
    rows: Vec<ComparisonRow>,
    positions: HashMap<String, usize>,
}

impl Default for JudgmentStore {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect())
    }
}

impl JudgmentStore {
    pub fn new(categories: Vec<String>) -> Self {
        Self {
            categories,
            rows: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn row(&self, key: &str) -> Option<&ComparisonRow> {
        self.positions.get(key).map(|&i| &self.rows[i])
    }

    fn row_mut(&mut self, key: &str) -> Result<&mut ComparisonRow> {
        match self.positions.get(key) {
            Some(&i) => Ok(&mut self.rows[i]),
            None => Err(JuxtaError::UnknownRow(key.to_string())),
        }
    }

    /// Replace the rows with freshly aligned skeletons, carrying votes and
    /// tags forward for every key that survives.
    pub fn reconcile(&mut self, skeletons: Vec<ComparisonRow>) -> ReconcileReport {
        let mut previous: HashMap<String, ComparisonRow> = self
            .rows
            .drain(..)
            .map(|row| (row.key.clone(), row))
            .collect();
        let mut report = ReconcileReport::default();

        self.rows = skeletons
            .into_iter()
            .map(|mut row| {
                match previous.remove(&row.key) {
                    Some(old) => {
                        row.votes = old.votes;
                        row.tags = old.tags;
                        report.carried += 1;
                    }
                    None => {
                        row.votes.clear();
                        row.tags.clear();
                        report.fresh += 1;
                    }
                }
                row
            })
            .collect();
        self.reindex();

        report.dropped = previous
            .into_values()
            .filter(ComparisonRow::has_judgments)
            .map(|row| row.key)
            .collect();
        report.dropped.sort();

        if !report.dropped.is_empty() {
            info!("Dropped judgments for {} rows no longer aligned", report.dropped.len());
        }
        debug!(
            "Reconciled rows: {} carried, {} fresh",
            report.carried, report.fresh
        );
        report
    }

    fn reindex(&mut self) {
        self.positions = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.key.clone(), i))
            .collect();
    }

    /// Toggle a vote: repeating the current value removes it.
    ///
    /// Returns the category's vote after the call.
    pub fn set_vote(
        &mut self,
        key: &str,
        category: &str,
        value: VoteValue,
    ) -> Result<Option<VoteValue>> {
        if category.is_empty() {
            return Err(JuxtaError::UnknownCategory(String::new()));
        }
        let row = self.row_mut(key)?;

        if row.votes.get(category) == Some(&value) {
            row.votes.remove(category);
            debug!("Cleared '{}' vote on '{}'", category, key);
            Ok(None)
        } else {
            debug!("Voted '{}' for '{}' on '{}'", value, category, key);
            row.votes.insert(category.to_string(), value.clone());
            Ok(Some(value))
        }
    }

    /// Set every configured category to `value`, or clear all votes when
    /// `value` is `None`.
    pub fn set_batch_vote(&mut self, key: &str, value: Option<VoteValue>) -> Result<()> {
        let categories = self.categories.clone();
        let row = self.row_mut(key)?;

        match value {
            Some(value) => {
                for category in categories {
                    row.votes.insert(category, value.clone());
                }
            }
            None => row.votes.clear(),
        }
        Ok(())
    }

    /// Replace the row's tags. Duplicate checks belong to the caller.
    pub fn set_tags(&mut self, key: &str, tags: Vec<String>) -> Result<()> {
        self.row_mut(key)?.tags = tags;
        Ok(())
    }

    /// Overwrite a row's judgments wholesale, as an import does
    pub(crate) fn replace_judgments(
        &mut self,
        key: &str,
        votes: BTreeMap<String, VoteValue>,
        tags: Vec<String>,
    ) -> Result<()> {
        let row = self.row_mut(key)?;
        row.votes = votes;
        row.tags = tags;
        Ok(())
    }

    /// Append a category. Names are trimmed; empty or existing names fail.
    pub fn add_category(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JuxtaError::InvalidInput("category name is empty".to_string()));
        }
        if self.categories.iter().any(|c| c == name) {
            return Err(JuxtaError::DuplicateCategory(name.to_string()));
        }
        self.categories.push(name.to_string());
        Ok(())
    }

    /// Remove a category from the configured list. Votes already cast for
    /// it stay on their rows.
    pub fn remove_category(&mut self, name: &str) -> Result<()> {
        let before = self.categories.len();
        self.categories.retain(|c| c != name);
        if self.categories.len() == before {
            return Err(JuxtaError::UnknownCategory(name.to_string()));
        }
        Ok(())
    }

    /// Append every category not yet configured, preserving existing order.
    /// Returns the number added.
    pub fn merge_categories<I, S>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for category in incoming {
            let category = category.as_ref();
            if !self.categories.iter().any(|c| c == category) {
                self.categories.push(category.to_string());
                added += 1;
            }
        }
        added
    }

    /// Sorted union of every row's tags
    pub fn all_tags(&self) -> Vec<String> {
        self.rows
            .iter()
            .flat_map(|row| row.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Tags used elsewhere that the row does not carry yet
    pub fn tag_suggestions(&self, key: &str) -> Vec<String> {
        let own = self.row(key).map(|r| r.tags.as_slice()).unwrap_or_default();
        self.all_tags()
            .into_iter()
            .filter(|t| !own.contains(t))
            .collect()
    }

    /// Rows with at least one category vote
    pub fn voted_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.votes.is_empty()).count()
    }

    pub fn filter<'a>(&'a self, filter: &'a RowFilter) -> impl Iterator<Item = &'a ComparisonRow> + 'a {
        self.rows.iter().filter(move |row| filter.matches(row))
    }

    /// Category x value breakdown, overall totals and tag frequency.
    ///
    /// Every viewer id and all-bad start at zero; votes for categories that
    /// are no longer configured count toward totals only.
    pub fn summary(&self, viewer_ids: &[String]) -> VoteSummary {
        let mut totals = zeroed(viewer_ids);
        let mut breakdown: Vec<CategoryBreakdown> = self
            .categories
            .iter()
            .map(|category| CategoryBreakdown {
                category: category.clone(),
                tallies: zeroed(viewer_ids),
            })
            .collect();
        let mut tags: Vec<Tally> = Vec::new();

        for row in &self.rows {
            for (category, value) in &row.votes {
                bump(&mut totals, value.as_str());
                if let Some(entry) = breakdown.iter_mut().find(|b| &b.category == category) {
                    bump(&mut entry.tallies, value.as_str());
                }
            }
            for tag in &row.tags {
                bump(&mut tags, tag);
            }
        }
        tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));

        VoteSummary {
            voted: self.voted_count(),
            totals,
            breakdown,
            tags,
        }
    }
}
