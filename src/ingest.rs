//! Per-page ingestion: index updates and embedding upserts.
//!
//! For each issue in a page, in payload order:
//!
//! 1. Closed issues (when closed issues are fetched) are removed from the
//!    index and the store, and produce no document.
//! 2. Otherwise the index entry is replaced with [`IssueIndex::merge`](issue_mirror_core::index::IssueIndex::merge).
//! 3. Every store entry tagged with the issue's number is removed.
//! 4. A document is built from the issue.
//!
//! The page's documents are then handed to the [`EmbeddingIngestor`] in
//! one batch.

use issue_mirror_core::ingestor::{EmbeddingIngestor, IngestStats};
use issue_mirror_core::models::{IssueDocument, IssueRecord, METADATA_NUMBER};
use issue_mirror_core::store::{EmbeddingStore, MetadataFilter};
use tracing::debug;

use crate::error::{MirrorError, Result};
use crate::repository::RepositoryState;

/// What one page did to the repository state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub merged: usize,
    pub closed: usize,
    pub entries_removed: usize,
    pub embedding: IngestStats,
}

pub struct IngestionStep {
    ingestor: EmbeddingIngestor,
    include_closed: bool,
}

impl IngestionStep {
    pub fn new(ingestor: EmbeddingIngestor, include_closed: bool) -> Self {
        Self {
            ingestor,
            include_closed,
        }
    }

    pub fn ingestor(&self) -> &EmbeddingIngestor {
        &self.ingestor
    }

    pub async fn ingest_page(
        &self,
        state: &mut RepositoryState,
        issues: Vec<IssueRecord>,
    ) -> Result<PageOutcome> {
        let repo = state.repo().to_string();
        let (index, store) = state.parts_mut();
        let mut outcome = PageOutcome::default();
        let mut documents: Vec<IssueDocument> = Vec::with_capacity(issues.len());

        for issue in issues {
            let filter = MetadataFilter::eq(METADATA_NUMBER, issue.number.as_str());
            documents.retain(|d| d.number != issue.number);

            if self.include_closed && issue.closed {
                index.close(&issue.number);
                outcome.entries_removed += store.remove_all(&filter);
                outcome.closed += 1;
                debug!(repo = %repo, issue = %issue.number, "closed issue removed");
                continue;
            }

            index.merge(&issue.number, issue.labels.iter().cloned(), issue.issue_type.as_deref());
            outcome.entries_removed += store.remove_all(&filter);
            documents.push(issue.to_document());
            outcome.merged += 1;
        }

        outcome.embedding = self
            .ingestor
            .ingest(store, &documents)
            .await
            .map_err(|source| MirrorError::Embedding {
                repo: repo.clone(),
                source,
            })?;

        Ok(outcome)
    }
}
