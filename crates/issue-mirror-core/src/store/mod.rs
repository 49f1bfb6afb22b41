//! Embedding store abstraction.
//!
//! The [`EmbeddingStore`] trait is the surface the ingestion pipeline
//! needs: add entries, delete by exact metadata match, and search by
//! vector. [`memory::InMemoryEmbeddingStore`] is the only backend; it
//! persists itself as a single JSON document.

pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingModel;

pub use memory::InMemoryEmbeddingStore;

/// One embedded chunk with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingEntry {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Exact key/value equality on entry metadata.
///
/// Every condition must hold. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter matching `key == value`.
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and(key, value)
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, metadata: &BTreeMap<String, String>) -> bool {
        self.conditions
            .iter()
            .all(|(k, v)| metadata.get(k).map(String::as_str) == Some(v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entry: EmbeddingEntry,
    pub score: f32,
}

pub trait EmbeddingStore: Send + Sync {
    fn add(&mut self, entry: EmbeddingEntry);

    /// Delete every entry matching `filter`, returning how many were removed.
    fn remove_all(&mut self, filter: &MetadataFilter) -> usize;

    fn len(&self) -> usize;

    /// The model the stored vectors came from, if any were ever added.
    fn model(&self) -> Option<&EmbeddingModel>;

    fn set_model(&mut self, model: EmbeddingModel);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries matching `filter`, best cosine similarity first.
    fn search(&self, query: &[f32], filter: &MetadataFilter, limit: usize) -> Vec<SearchHit>;
}
