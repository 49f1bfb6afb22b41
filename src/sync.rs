//! Incremental sync of one repository.
//!
//! # Algorithm
//!
//! 1. Lock the repository's registry slot and take its cached state, or
//!    load it from disk (an empty state with watermark 0 if none exists,
//!    or if its embeddings came from another model).
//! 2. Derive `since` from the watermark: none when it is 0, otherwise the
//!    watermark formatted as `yyyy-MM-ddTHH:mm:ssZ` in UTC.
//! 3. Stamp the watermark with the current time *before* fetching, so any
//!    issue updated while the sync runs is fetched again next time.
//! 4. Fetch the first page, then follow `rel="next"` links until a page
//!    has none. Each page is decoded and ingested in fetch order.
//! 5. Save the state and return it to the slot.
//!
//! Any transport error, non-success status, malformed page, or embedding
//! failure aborts the sync before anything is saved. The state is not
//! returned to the slot, so the advanced watermark and any partial
//! changes are discarded and the next sync starts from disk.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use issue_mirror_core::ingestor::EmbeddingIngestor;
use issue_mirror_core::models::decode_page;
use tracing::{debug, info};

use crate::config::Config;
use crate::embedder::create_embedder;
use crate::error::{MirrorError, Result};
use crate::github::{GithubTransport, IssueTransport, PageRequest};
use crate::ingest::IngestionStep;
use crate::models::RepoName;
use crate::registry::RepositoryRegistry;
use crate::repository::RepositoryState;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Format a watermark as the `since` query value, or `None` for a full sync.
pub fn since_filter(last_updated_millis: i64) -> Option<String> {
    if last_updated_millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(last_updated_millis)
        .single()
        .map(|ts| ts.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub repo: String,
    pub since: Option<String>,
    pub pages: usize,
    pub issues_fetched: usize,
    pub issues_closed: usize,
    pub chunks_embedded: usize,
    pub total_issues: usize,
    pub by_label: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub watermark: i64,
}

pub struct SyncOrchestrator {
    transport: Arc<dyn IssueTransport>,
    ingestion: IngestionStep,
    registry: Arc<RepositoryRegistry>,
    page_size: u32,
    include_closed: bool,
}

impl SyncOrchestrator {
    pub fn new(
        transport: Arc<dyn IssueTransport>,
        ingestion: IngestionStep,
        registry: Arc<RepositoryRegistry>,
    ) -> Self {
        Self {
            transport,
            ingestion,
            registry,
            page_size: DEFAULT_PAGE_SIZE,
            include_closed: false,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Request closed issues too (`state=all`).
    pub fn with_closed_issues(mut self, include_closed: bool) -> Self {
        self.include_closed = include_closed;
        self
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    pub async fn sync(&self, repo: &RepoName) -> Result<SyncSummary> {
        let slot = self.registry.slot(repo).await;
        let mut cached = slot.lock().await;

        let mut state = match cached.take() {
            Some(state) => {
                debug!(repo = %repo, "using cached state");
                state
            }
            None => {
                let model = self.ingestion.ingestor().model();
                RepositoryState::create_if_absent_for(self.registry.base_dir(), repo, model.as_ref())?
            }
        };

        let summary = self.run(&mut state).await?;
        *cached = Some(state);
        Ok(summary)
    }

    async fn run(&self, state: &mut RepositoryState) -> Result<SyncSummary> {
        let repo = state.repo().clone();
        let since = since_filter(state.last_updated());
        state.set_last_updated(Utc::now().timestamp_millis());

        info!(
            repo = %repo,
            since = since.as_deref().unwrap_or("full history"),
            "starting sync"
        );

        let mut request = PageRequest::First {
            repo: repo.clone(),
            since: since.clone(),
            per_page: self.page_size,
            include_closed: self.include_closed,
        };
        let mut pages = 0;
        let mut issues_fetched = 0;
        let mut issues_closed = 0;
        let mut chunks_embedded = 0;

        loop {
            let page = self.transport.fetch_issue_page(&request).await?;
            pages += 1;

            if !page.is_success() {
                return Err(MirrorError::Transport {
                    repo: repo.to_string(),
                    status: page.status,
                    body: page.body,
                });
            }

            let malformed = |reason: String| MirrorError::MalformedPayload {
                repo: repo.to_string(),
                reason: format!("page {}: {}", pages, reason),
            };
            let body: serde_json::Value =
                serde_json::from_str(&page.body).map_err(|e| malformed(e.to_string()))?;
            let issues = decode_page(body).map_err(|e| malformed(e.to_string()))?;

            let count = issues.len();
            let outcome = self.ingestion.ingest_page(state, issues).await?;
            issues_fetched += count;
            issues_closed += outcome.closed;
            chunks_embedded += outcome.embedding.inserted;

            info!(
                repo = %repo,
                page = pages,
                issues = count,
                removed = outcome.entries_removed,
                "ingested page"
            );

            match page.next {
                Some(link) => request = PageRequest::Next { link },
                None => break,
            }
        }

        state.save()?;

        let index = state.index();
        Ok(SyncSummary {
            repo: repo.to_string(),
            since,
            pages,
            issues_fetched,
            issues_closed,
            chunks_embedded,
            total_issues: index.len(),
            by_label: index.count_by_label(),
            by_type: index.count_by_type(),
            watermark: state.last_updated(),
        })
    }
}

/// Wire up the GitHub transport, configured embedder, and a fresh registry.
pub fn build_orchestrator(cfg: &Config) -> anyhow::Result<SyncOrchestrator> {
    let transport = GithubTransport::new(&cfg.github)?;
    let embedder = create_embedder(&cfg.embedding)?;
    let ingestor = EmbeddingIngestor::new(
        embedder,
        cfg.chunking.split_config(),
        cfg.embedding.batch_size,
    );
    let ingestion = IngestionStep::new(ingestor, cfg.github.include_closed);
    let registry = Arc::new(RepositoryRegistry::new(cfg.cache.dir.clone()));

    Ok(SyncOrchestrator::new(Arc::new(transport), ingestion, registry)
        .with_page_size(cfg.github.page_size)
        .with_closed_issues(cfg.github.include_closed))
}

/// `issue-mirror pull <owner/name>`: sync and print the summary.
pub async fn run_pull(cfg: &Config, repo: &RepoName) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(cfg)?;
    let summary = orchestrator
        .sync(repo)
        .await
        .map_err(|e| anyhow::anyhow!("sync failed for {}: {}", repo, e))?;

    println!("pull {}", summary.repo);
    println!("  since: {}", summary.since.as_deref().unwrap_or("(full history)"));
    println!("  pages: {}", summary.pages);
    println!("  fetched: {} issues", summary.issues_fetched);
    if summary.issues_closed > 0 {
        println!("  closed: {}", summary.issues_closed);
    }
    println!("  chunks embedded: {}", summary.chunks_embedded);
    println!("  total issues: {}", summary.total_issues);
    println!("  by label:");
    for (label, count) in &summary.by_label {
        println!("    {}: {}", label, count);
    }
    println!("  by type:");
    for (issue_type, count) in &summary.by_type {
        println!("    {}: {}", issue_type, count);
    }
    println!("ok");

    Ok(())
}
