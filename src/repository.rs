//! Per-repository persisted state.
//!
//! Each repository owns one directory under the cache base directory:
//!
//! ```text
//! {base}/{owner}/{name}/repo.json        index document + watermark
//! {base}/{owner}/{name}/embeddings.json  embedding store
//! ```
//!
//! `repo.json` has the shape
//! `{ "schemaVersion": 1, "repo", "lastUpdated", "issues": { "issues", "labelMap", "typeMap" } }`
//! where `lastUpdated` is the watermark in epoch milliseconds (0 = never synced).
//!
//! `embeddings.json` records the embedding model its vectors came from.
//! Loading for a different model is [`MirrorError::MustReindex`], just like
//! a schema version mismatch.
//!
//! Both files are replaced atomically. [`RepositoryState::save`] writes the
//! store first and the index last, so a crash between the two leaves an
//! older watermark next to a newer store and the next sync re-fetches the
//! difference.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use issue_mirror_core::embedding::EmbeddingModel;
use issue_mirror_core::index::IssueIndex;
use issue_mirror_core::persist::atomic_write;
use issue_mirror_core::store::{EmbeddingStore, InMemoryEmbeddingStore};
use issue_mirror_core::CoreError;

use crate::error::{MirrorError, Result};
use crate::models::RepoName;

pub const INDEX_FILE: &str = "repo.json";
pub const STORE_FILE: &str = "embeddings.json";
pub const INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexFileRef<'a> {
    schema_version: u32,
    repo: String,
    last_updated: i64,
    issues: &'a IssueIndex,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexFile {
    #[serde(default)]
    schema_version: u32,
    repo: String,
    last_updated: i64,
    issues: IssueIndex,
}

#[derive(Debug)]
pub struct RepositoryState {
    repo: RepoName,
    dir: PathBuf,
    last_updated: i64,
    index: IssueIndex,
    store: InMemoryEmbeddingStore,
}

/// `{base}/{owner}/{name}`.
pub fn repo_dir(base: &Path, repo: &RepoName) -> PathBuf {
    base.join(repo.owner()).join(repo.name())
}

impl RepositoryState {
    /// True iff both the index and the store file exist.
    pub fn exists(base: &Path, repo: &RepoName) -> bool {
        let dir = repo_dir(base, repo);
        dir.join(INDEX_FILE).is_file() && dir.join(STORE_FILE).is_file()
    }

    /// Load saved state. Any missing, unreadable, or incompatible artifact
    /// is reported as [`MirrorError::MustReindex`].
    pub fn load(base: &Path, repo: &RepoName) -> Result<Self> {
        Self::load_for(base, repo, None)
    }

    /// Like [`load`](Self::load), and also MustReindex when the store's
    /// vectors came from a model other than `model`.
    pub fn load_for(base: &Path, repo: &RepoName, model: Option<&EmbeddingModel>) -> Result<Self> {
        let reindex = |reason: String| MirrorError::MustReindex {
            repo: repo.to_string(),
            reason,
        };

        if !Self::exists(base, repo) {
            return Err(reindex("no saved state".to_string()));
        }
        let dir = repo_dir(base, repo);

        let index_path = dir.join(INDEX_FILE);
        let raw = std::fs::read_to_string(&index_path)
            .map_err(|e| reindex(format!("cannot read {}: {}", index_path.display(), e)))?;
        let file: IndexFile = serde_json::from_str(&raw)
            .map_err(|e| reindex(format!("corrupt {}: {}", index_path.display(), e)))?;
        if file.schema_version != INDEX_SCHEMA_VERSION {
            return Err(reindex(format!(
                "index schema version {} (expected {})",
                file.schema_version, INDEX_SCHEMA_VERSION
            )));
        }
        if file.repo != repo.to_string() {
            return Err(reindex(format!(
                "{} belongs to {}",
                index_path.display(),
                file.repo
            )));
        }

        let store = InMemoryEmbeddingStore::load(&dir.join(STORE_FILE))
            .map_err(|e| reindex(format!("embedding store: {}", e)))?;
        if let (Some(wanted), Some(stored)) = (model, store.model()) {
            if wanted != stored {
                return Err(reindex(format!(
                    "embeddings were built with {}, configured model is {}",
                    stored, wanted
                )));
            }
        }

        Ok(Self {
            repo: repo.clone(),
            dir,
            last_updated: file.last_updated,
            index: file.issues,
            store,
        })
    }

    /// Load saved state, or start empty with watermark 0.
    pub fn create_if_absent(base: &Path, repo: &RepoName) -> Result<Self> {
        Self::create_if_absent_for(base, repo, None)
    }

    /// [`create_if_absent`](Self::create_if_absent) for vectors from `model`.
    pub fn create_if_absent_for(
        base: &Path,
        repo: &RepoName,
        model: Option<&EmbeddingModel>,
    ) -> Result<Self> {
        match Self::load_for(base, repo, model) {
            Ok(state) => Ok(state),
            Err(MirrorError::MustReindex { reason, .. }) => {
                if Self::exists(base, repo) {
                    warn!(repo = %repo, %reason, "discarding saved state; full reindex");
                } else {
                    info!(repo = %repo, "no saved state; full sync");
                }
                let dir = repo_dir(base, repo);
                std::fs::create_dir_all(&dir).map_err(|source| MirrorError::Persist {
                    path: dir.clone(),
                    source,
                })?;
                Ok(Self {
                    repo: repo.clone(),
                    dir,
                    last_updated: 0,
                    index: IssueIndex::new(),
                    store: InMemoryEmbeddingStore::new(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Write the store, then the index with the watermark.
    pub fn save(&self) -> Result<()> {
        let store_path = self.dir.join(STORE_FILE);
        self.store.save(&store_path).map_err(|e| match e {
            CoreError::Io { path, source } => MirrorError::Persist { path, source },
            other => MirrorError::Persist {
                path: store_path.clone(),
                source: std::io::Error::other(other),
            },
        })?;

        let index_path = self.dir.join(INDEX_FILE);
        let json = serde_json::to_vec_pretty(&IndexFileRef {
            schema_version: INDEX_SCHEMA_VERSION,
            repo: self.repo.to_string(),
            last_updated: self.last_updated,
            issues: &self.index,
        })
        .map_err(|e| MirrorError::Persist {
            path: index_path.clone(),
            source: std::io::Error::other(e),
        })?;
        atomic_write(&index_path, &json).map_err(|source| MirrorError::Persist {
            path: index_path,
            source,
        })
    }

    pub fn repo(&self) -> &RepoName {
        &self.repo
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Watermark in epoch milliseconds; 0 means never synced.
    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    pub fn set_last_updated(&mut self, millis: i64) {
        self.last_updated = millis;
    }

    pub fn index(&self) -> &IssueIndex {
        &self.index
    }

    pub fn store(&self) -> &InMemoryEmbeddingStore {
        &self.store
    }

    /// Mutable access to the index and the store together.
    pub fn parts_mut(&mut self) -> (&mut IssueIndex, &mut InMemoryEmbeddingStore) {
        (&mut self.index, &mut self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use issue_mirror_core::store::{EmbeddingEntry, EmbeddingStore};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn repo() -> RepoName {
        "acme/widgets".parse().unwrap()
    }

    #[test]
    fn test_load_absent_is_must_reindex() {
        let tmp = TempDir::new().unwrap();
        assert!(!RepositoryState::exists(tmp.path(), &repo()));
        let err = RepositoryState::load(tmp.path(), &repo()).unwrap_err();
        assert!(err.is_must_reindex());
    }

    #[test]
    fn test_create_if_absent_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        assert_eq!(state.last_updated(), 0);
        assert!(state.index().is_empty());
        assert!(tmp.path().join("acme/widgets").is_dir());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let mut state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        state.set_last_updated(1_700_000_000_000);
        {
            let (index, store) = state.parts_mut();
            index.merge("1", ["bug"], Some("Bug"));
            store.add(EmbeddingEntry {
                id: "c1".to_string(),
                text: "Title: t".to_string(),
                vector: vec![1.0, 0.0],
                metadata: BTreeMap::from([("number".to_string(), "1".to_string())]),
            });
        }
        state.save().unwrap();

        assert!(RepositoryState::exists(tmp.path(), &repo()));
        let loaded = RepositoryState::load(tmp.path(), &repo()).unwrap();
        assert_eq!(loaded.last_updated(), 1_700_000_000_000);
        assert_eq!(loaded.index(), state.index());
        assert_eq!(loaded.store(), state.store());

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join("acme/widgets/repo.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["schemaVersion"], 1);
        assert_eq!(raw["repo"], "acme/widgets");
        assert_eq!(raw["lastUpdated"], 1_700_000_000_000i64);
        assert_eq!(raw["issues"]["labelMap"]["bug"][0], "1");
    }

    #[test]
    fn test_corrupt_index_recovers_with_empty_state() {
        let tmp = TempDir::new().unwrap();
        let state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        state.save().unwrap();
        std::fs::write(tmp.path().join("acme/widgets/repo.json"), "{not json").unwrap();

        assert!(RepositoryState::load(tmp.path(), &repo())
            .unwrap_err()
            .is_must_reindex());
        let recovered = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        assert_eq!(recovered.last_updated(), 0);
    }

    #[test]
    fn test_schema_version_mismatch_is_must_reindex() {
        let tmp = TempDir::new().unwrap();
        let state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        state.save().unwrap();
        std::fs::write(
            tmp.path().join("acme/widgets/repo.json"),
            r#"{"repo":"acme/widgets","lastUpdated":5,"issues":{}}"#,
        )
        .unwrap();

        let err = RepositoryState::load(tmp.path(), &repo()).unwrap_err();
        assert!(err.is_must_reindex());
        assert!(err.to_string().contains("schema version 0"), "{}", err);
    }

    #[test]
    fn test_missing_store_file_is_must_reindex() {
        let tmp = TempDir::new().unwrap();
        let state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        state.save().unwrap();
        std::fs::remove_file(tmp.path().join("acme/widgets/embeddings.json")).unwrap();

        assert!(!RepositoryState::exists(tmp.path(), &repo()));
        assert!(RepositoryState::load(tmp.path(), &repo())
            .unwrap_err()
            .is_must_reindex());
    }

    fn model(name: &str, dims: usize) -> EmbeddingModel {
        EmbeddingModel {
            name: name.to_string(),
            dims,
        }
    }

    fn saved_at(tmp: &TempDir, millis: i64) -> RepositoryState {
        let mut state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        state.set_last_updated(millis);
        state.save().unwrap();
        state
    }

    #[test]
    fn test_other_embedding_model_is_must_reindex() {
        let tmp = TempDir::new().unwrap();
        let mut state = RepositoryState::create_if_absent(tmp.path(), &repo()).unwrap();
        state.set_last_updated(1_000);
        state.parts_mut().1.set_model(model("nomic-embed-text", 768));
        state.save().unwrap();

        let err = RepositoryState::load_for(tmp.path(), &repo(), Some(&model("mxbai-embed-large", 1024)))
            .unwrap_err();
        assert!(err.is_must_reindex());
        assert!(err.to_string().contains("nomic-embed-text (768 dims)"), "{}", err);

        assert!(RepositoryState::load_for(tmp.path(), &repo(), Some(&model("nomic-embed-text", 768))).is_ok());
        assert!(RepositoryState::load(tmp.path(), &repo()).is_ok());

        let rebuilt =
            RepositoryState::create_if_absent_for(tmp.path(), &repo(), Some(&model("mxbai-embed-large", 1024)))
                .unwrap();
        assert_eq!(rebuilt.last_updated(), 0);
        assert!(rebuilt.store().model().is_none());
    }

    #[test]
    fn test_store_write_failure_is_persist_error() {
        let tmp = TempDir::new().unwrap();
        let mut state = saved_at(&tmp, 1_000);
        let dir = tmp.path().join("acme/widgets");
        let index_before = std::fs::read_to_string(dir.join(INDEX_FILE)).unwrap();

        // A directory where the temp file must go makes the write fail.
        std::fs::create_dir(dir.join("embeddings.json.tmp")).unwrap();
        state.set_last_updated(2_000);
        let err = state.save().unwrap_err();

        match err {
            MirrorError::Persist { path, .. } => assert_eq!(path, dir.join(STORE_FILE)),
            other => panic!("expected persist error, got {:?}", other),
        }
        assert_eq!(std::fs::read_to_string(dir.join(INDEX_FILE)).unwrap(), index_before);
    }

    #[test]
    fn test_index_write_failure_keeps_old_watermark() {
        let tmp = TempDir::new().unwrap();
        let mut state = saved_at(&tmp, 1_000);
        let dir = tmp.path().join("acme/widgets");

        std::fs::create_dir(dir.join("repo.json.tmp")).unwrap();
        state.set_last_updated(2_000);
        state.parts_mut().1.add(EmbeddingEntry {
            id: "c1".to_string(),
            text: "Title: t".to_string(),
            vector: vec![1.0],
            metadata: BTreeMap::from([("number".to_string(), "1".to_string())]),
        });
        let err = state.save().unwrap_err();

        match err {
            MirrorError::Persist { path, .. } => assert_eq!(path, dir.join(INDEX_FILE)),
            other => panic!("expected persist error, got {:?}", other),
        }
        // The store was replaced first; the index still holds the old watermark.
        let store = InMemoryEmbeddingStore::load(&dir.join(STORE_FILE)).unwrap();
        assert_eq!(store.len(), 1);
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(raw["lastUpdated"], 1_000);
    }
}
