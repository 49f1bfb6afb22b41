//! In-process cache of loaded repository state.
//!
//! The registry maps each repository to a slot guarded by its own
//! `tokio::sync::Mutex`. Holding the slot's lock is what makes a sync
//! exclusive: two syncs of the same repository run one after the other,
//! while different repositories never contend.
//!
//! A slot holds `Some(state)` only after a successful sync. The
//! orchestrator takes the state out for the duration of a sync and puts
//! it back on success; a failed sync leaves the slot empty so the next
//! one reloads from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::RepoName;
use crate::repository::RepositoryState;

pub type StateSlot = Arc<Mutex<Option<RepositoryState>>>;

pub struct RepositoryRegistry {
    base_dir: PathBuf,
    slots: Mutex<HashMap<RepoName, StateSlot>>,
}

impl RepositoryRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The slot for `repo`, created empty on first use.
    pub async fn slot(&self, repo: &RepoName) -> StateSlot {
        let mut slots = self.slots.lock().await;
        slots.entry(repo.clone()).or_default().clone()
    }

    /// True if a synced state for `repo` is cached.
    pub async fn is_cached(&self, repo: &RepoName) -> bool {
        let slot = self.slot(repo).await;
        let guard = slot.lock().await;
        guard.is_some()
    }

    /// Drop every cached state. The next sync of each repository reloads
    /// from disk.
    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }
}
