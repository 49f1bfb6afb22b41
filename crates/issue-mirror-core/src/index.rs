//! Issue index with derived label and type views.
//!
//! The [`IssueIndex`] maps issue numbers to lightweight [`Issue`] records
//! and keeps two denormalized views:
//!
//! - `label_map`: label name → issue numbers currently carrying that label
//! - `type_map`: type name → issue numbers of that type (0 or 1 type per issue)
//!
//! [`IssueIndex::merge`] replaces everything known about an issue, so
//! re-syncing the same issue with different labels never leaves a stale
//! membership behind. Label and type sets that become empty are pruned.
//!
//! The index does no I/O. It serializes with `serde` using the
//! `issues` / `labelMap` / `typeMap` field names of the on-disk
//! `repo.json` document.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A single indexed issue. Only the identifier is retained.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    pub number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueIndex {
    #[serde(default)]
    issues: BTreeMap<String, Issue>,
    #[serde(default)]
    label_map: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    type_map: BTreeMap<String, BTreeSet<String>>,
}

impl IssueIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all index state for `number`.
    ///
    /// Equivalent to [`close`](Self::close) followed by inserting the issue
    /// under every label in `labels` and under `issue_type` if present.
    pub fn merge<I, S>(&mut self, number: &str, labels: I, issue_type: Option<&str>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.close(number);

        self.issues.insert(
            number.to_string(),
            Issue {
                number: number.to_string(),
            },
        );
        for label in labels {
            self.label_map
                .entry(label.into())
                .or_default()
                .insert(number.to_string());
        }
        if let Some(t) = issue_type {
            self.type_map
                .entry(t.to_string())
                .or_default()
                .insert(number.to_string());
        }
    }

    /// Remove `number` from the issue table and every label/type set.
    ///
    /// Returns `true` if the issue was indexed. Closing an unknown issue
    /// is a no-op.
    pub fn close(&mut self, number: &str) -> bool {
        let existed = self.issues.remove(number).is_some();
        remove_everywhere(&mut self.label_map, number);
        remove_everywhere(&mut self.type_map, number);
        existed
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn contains(&self, number: &str) -> bool {
        self.issues.contains_key(number)
    }

    pub fn get(&self, number: &str) -> Option<&Issue> {
        self.issues.get(number)
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.values()
    }

    /// Issue numbers currently carrying `label`.
    pub fn issues_with_label(&self, label: &str) -> Option<&BTreeSet<String>> {
        self.label_map.get(label)
    }

    /// Issue numbers currently of type `issue_type`.
    pub fn issues_of_type(&self, issue_type: &str) -> Option<&BTreeSet<String>> {
        self.type_map.get(issue_type)
    }

    /// Labels carried by `number`, in name order.
    pub fn labels_of(&self, number: &str) -> BTreeSet<&str> {
        self.label_map
            .iter()
            .filter(|(_, members)| members.contains(number))
            .map(|(label, _)| label.as_str())
            .collect()
    }

    /// The type of `number`, if any.
    pub fn type_of(&self, number: &str) -> Option<&str> {
        self.type_map
            .iter()
            .find(|(_, members)| members.contains(number))
            .map(|(t, _)| t.as_str())
    }

    pub fn count_by_label(&self) -> BTreeMap<String, usize> {
        counts(&self.label_map)
    }

    pub fn count_by_type(&self) -> BTreeMap<String, usize> {
        counts(&self.type_map)
    }
}

fn remove_everywhere(map: &mut BTreeMap<String, BTreeSet<String>>, number: &str) {
    map.retain(|_, members| {
        members.remove(number);
        !members.is_empty()
    });
}

fn counts(map: &BTreeMap<String, BTreeSet<String>>) -> BTreeMap<String, usize> {
    map.iter()
        .map(|(key, members)| (key.clone(), members.len()))
        .collect()
}
