//! Issue payload decoding and the documents built from it.
//!
//! Raw issue pages arrive as JSON. [`decode_page`] turns one page into
//! normalized [`IssueRecord`]s, accepting the shape variations seen in
//! tracker payloads:
//!
//! | Field | Accepted shapes |
//! |-------|-----------------|
//! | `number` | integer or string |
//! | `body` | string, `null`, absent (→ empty) |
//! | `labels` | array of `{name}`, single `{name}`, bare strings, `null`, absent |
//! | `type` | `{name}`, `null`, absent |
//!
//! Each record becomes one [`IssueDocument`] for the embedding pipeline.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{CoreError, Result};

/// Metadata key holding the owning issue's identifier.
pub const METADATA_NUMBER: &str = "number";
/// Metadata key holding the issue type, when present.
pub const METADATA_TYPE: &str = "type";
/// Value stored under each label key.
pub const LABEL_MARKER: &str = "true";

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum IssueNumber {
    Int(u64),
    Text(String),
}

impl IssueNumber {
    fn into_string(self) -> String {
        match self {
            IssueNumber::Int(n) => n.to_string(),
            IssueNumber::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LabelRef {
    Named(Named),
    Bare(String),
}

impl LabelRef {
    fn into_name(self) -> String {
        match self {
            LabelRef::Named(n) => n.name,
            LabelRef::Bare(s) => s,
        }
    }
}

/// The `labels` field is normally an array but some payloads carry a
/// single label object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LabelsField {
    Many(Vec<LabelRef>),
    One(LabelRef),
}

impl LabelsField {
    fn into_names(self) -> BTreeSet<String> {
        match self {
            LabelsField::Many(labels) => labels.into_iter().map(LabelRef::into_name).collect(),
            LabelsField::One(label) => BTreeSet::from([label.into_name()]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawIssue {
    number: IssueNumber,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Option<LabelsField>,
    #[serde(default, rename = "type")]
    issue_type: Option<Named>,
    #[serde(default)]
    state: Option<String>,
}

/// A normalized issue, ready for indexing and embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRecord {
    pub number: String,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub issue_type: Option<String>,
    pub closed: bool,
}

impl From<RawIssue> for IssueRecord {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number.into_string(),
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            labels: raw.labels.map(LabelsField::into_names).unwrap_or_default(),
            issue_type: raw.issue_type.map(|t| t.name),
            closed: raw.state.as_deref() == Some("closed"),
        }
    }
}

/// Decode one issue from its JSON value.
pub fn decode_issue(value: Value) -> std::result::Result<IssueRecord, serde_json::Error> {
    serde_json::from_value::<RawIssue>(value).map(IssueRecord::from)
}

/// Decode a whole page. The page must be a JSON array and every element
/// must decode; the first bad element fails the page.
pub fn decode_page(body: Value) -> Result<Vec<IssueRecord>> {
    let items = match body {
        Value::Array(items) => items,
        other => {
            return Err(CoreError::NotAnArray {
                found: json_kind(&other),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            decode_issue(item).map_err(|e| CoreError::MalformedIssue {
                position,
                reason: e.to_string(),
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A document handed to the splitter and embedder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDocument {
    pub number: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl IssueRecord {
    /// Content in the fixed `Title: ...\n\nDescription:\n...` template.
    pub fn content(&self) -> String {
        format!("Title: {}\n\nDescription:\n{}", self.title, self.body)
    }

    /// Build the embedding document.
    ///
    /// Metadata holds the issue number, the type if any, and one
    /// `label -> "true"` entry per label. The reserved keys `number` and
    /// `type` always keep their meaning; a label with a reserved name is
    /// left out of the metadata.
    pub fn to_document(&self) -> IssueDocument {
        let mut metadata = BTreeMap::new();
        for label in &self.labels {
            if label == METADATA_NUMBER || label == METADATA_TYPE {
                warn!(
                    issue = %self.number,
                    label = %label,
                    "label name collides with a reserved metadata key; not tagging it"
                );
                continue;
            }
            metadata.insert(label.clone(), LABEL_MARKER.to_string());
        }
        metadata.insert(METADATA_NUMBER.to_string(), self.number.clone());
        if let Some(t) = &self.issue_type {
            metadata.insert(METADATA_TYPE.to_string(), t.clone());
        }

        IssueDocument {
            number: self.number.clone(),
            content: self.content(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decodes_label_array_and_type() {
        let issue = decode_issue(json!({
            "number": 42,
            "title": "Crash on start",
            "body": "It crashes.",
            "labels": [{"name": "bug", "color": "f00"}, {"name": "p1"}],
            "type": {"id": 3, "name": "Bug"},
            "state": "open"
        }))
        .unwrap();

        assert_eq!(issue.number, "42");
        assert_eq!(issue.labels, BTreeSet::from(["bug".to_string(), "p1".to_string()]));
        assert_eq!(issue.issue_type.as_deref(), Some("Bug"));
        assert!(!issue.closed);
    }

    #[test]
    fn test_single_label_object_becomes_one_label() {
        let issue = decode_issue(json!({
            "number": 1,
            "title": "t",
            "labels": {"name": "enhancement"}
        }))
        .unwrap();

        assert_eq!(issue.labels, BTreeSet::from(["enhancement".to_string()]));
    }

    #[test]
    fn test_nulls_and_missing_fields_normalize() {
        let issue = decode_issue(json!({
            "number": "17",
            "title": "t",
            "body": null,
            "labels": null,
            "type": null
        }))
        .unwrap();

        assert_eq!(issue.number, "17");
        assert_eq!(issue.body, "");
        assert!(issue.labels.is_empty());
        assert_eq!(issue.issue_type, None);
    }

    #[test]
    fn test_bare_string_labels_are_accepted() {
        let issue = decode_issue(json!({
            "number": 2,
            "title": "t",
            "labels": ["x", {"name": "y"}]
        }))
        .unwrap();

        assert_eq!(issue.labels, BTreeSet::from(["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn test_closed_state_is_detected() {
        let issue = decode_issue(json!({"number": 3, "title": "t", "state": "closed"})).unwrap();
        assert!(issue.closed);
    }

    #[test]
    fn test_page_must_be_an_array() {
        let err = decode_page(json!({"message": "Not Found"})).unwrap_err();
        assert!(matches!(err, CoreError::NotAnArray { found: "object" }));
    }

    #[test]
    fn test_page_reports_position_of_bad_issue() {
        let err = decode_page(json!([
            {"number": 1, "title": "ok"},
            {"title": "no number"}
        ]))
        .unwrap_err();

        assert!(matches!(err, CoreError::MalformedIssue { position: 1, .. }));
    }

    #[test]
    fn test_document_uses_template_and_metadata() {
        let issue = decode_issue(json!({
            "number": 8,
            "title": "Add search",
            "body": "Please.",
            "labels": [{"name": "feature"}],
            "type": {"name": "Task"}
        }))
        .unwrap();

        let doc = issue.to_document();
        assert_eq!(doc.content, "Title: Add search\n\nDescription:\nPlease.");
        assert_eq!(
            doc.metadata,
            BTreeMap::from([
                ("feature".to_string(), "true".to_string()),
                ("number".to_string(), "8".to_string()),
                ("type".to_string(), "Task".to_string()),
            ])
        );
    }

    #[test]
    fn test_bare_issue_has_only_number_metadata() {
        let issue = decode_issue(json!({"number": 5, "title": "t", "body": "b"})).unwrap();
        let doc = issue.to_document();
        assert_eq!(
            doc.metadata,
            BTreeMap::from([("number".to_string(), "5".to_string())])
        );
    }

    #[test]
    fn test_reserved_label_names_do_not_override_metadata() {
        let issue = decode_issue(json!({
            "number": 6,
            "title": "t",
            "labels": [{"name": "number"}, {"name": "type"}]
        }))
        .unwrap();

        let doc = issue.to_document();
        assert_eq!(doc.metadata.get("number").map(String::as_str), Some("6"));
        assert!(!doc.metadata.contains_key("type"));
        assert_eq!(issue.labels.len(), 2);
    }
}
