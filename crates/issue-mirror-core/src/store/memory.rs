//! In-memory [`EmbeddingStore`] with JSON persistence.
//!
//! Entries live in a `Vec`; search is brute-force cosine similarity over
//! every entry that passes the metadata filter. The whole store is
//! written as one document:
//!
//! ```json
//! { "schemaVersion": 1, "model": { "name", "dims" }, "entries": [ { "id", "text", "vector", "metadata" } ] }
//! ```
//!
//! `model` is absent until the first vector is added.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, EmbeddingModel};
use crate::error::{CoreError, Result};
use crate::persist::atomic_write;

use super::{EmbeddingEntry, EmbeddingStore, MetadataFilter, SearchHit};

pub const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreFileRef<'a> {
    schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a EmbeddingModel>,
    entries: &'a [EmbeddingEntry],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    schema_version: u32,
}

#[derive(Deserialize)]
struct StoreFile {
    #[serde(default)]
    model: Option<EmbeddingModel>,
    entries: Vec<EmbeddingEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryEmbeddingStore {
    model: Option<EmbeddingModel>,
    entries: Vec<EmbeddingEntry>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[EmbeddingEntry] {
        &self.entries
    }

    pub fn entries_matching<'a>(
        &'a self,
        filter: &'a MetadataFilter,
    ) -> impl Iterator<Item = &'a EmbeddingEntry> + 'a {
        self.entries.iter().filter(|e| filter.matches(&e.metadata))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&StoreFileRef {
            schema_version: STORE_SCHEMA_VERSION,
            model: self.model.as_ref(),
            entries: &self.entries,
        })?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_str(json)?;
        if probe.schema_version != STORE_SCHEMA_VERSION {
            return Err(CoreError::SchemaVersion {
                found: probe.schema_version,
                expected: STORE_SCHEMA_VERSION,
            });
        }
        let file: StoreFile = serde_json::from_str(json)?;
        Ok(Self {
            model: file.model,
            entries: file.entries,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Write the store to `path` via temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        atomic_write(path, json.as_bytes()).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn add(&mut self, entry: EmbeddingEntry) {
        self.entries.push(entry);
    }

    fn remove_all(&mut self, filter: &MetadataFilter) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !filter.matches(&e.metadata));
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn model(&self) -> Option<&EmbeddingModel> {
        self.model.as_ref()
    }

    fn set_model(&mut self, model: EmbeddingModel) {
        self.model = Some(model);
    }

    fn search(&self, query: &[f32], filter: &MetadataFilter, limit: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries_matching(filter)
            .map(|e| SearchHit {
                score: cosine_similarity(query, &e.vector),
                entry: e.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }
}
