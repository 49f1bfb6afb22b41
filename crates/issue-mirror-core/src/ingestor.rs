//! Split, embed, and insert.
//!
//! [`EmbeddingIngestor`] takes a batch of [`IssueDocument`]s, splits each
//! into chunks, embeds all chunk texts in batches, and adds one
//! [`EmbeddingEntry`] per chunk to the store. Every vector is computed
//! and checked against the embedder's `dims()` before anything is
//! inserted, so an embedding failure leaves the store unchanged.
//!
//! A store records the [`EmbeddingModel`] of its vectors. Ingesting with a
//! different model is refused; the caller must rebuild the store.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chunk::{chunk_document, Chunk, SplitConfig};
use crate::embedding::{Embedder, EmbeddingModel};
use crate::error::{CoreError, Result};
use crate::models::IssueDocument;
use crate::store::{EmbeddingEntry, EmbeddingStore};

/// Counts reported by one [`EmbeddingIngestor::ingest`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
    pub inserted: usize,
}

pub struct EmbeddingIngestor {
    embedder: Arc<dyn Embedder>,
    split: SplitConfig,
    batch_size: usize,
}

impl EmbeddingIngestor {
    pub fn new(embedder: Arc<dyn Embedder>, split: SplitConfig, batch_size: usize) -> Self {
        Self {
            embedder,
            split,
            batch_size: batch_size.max(1),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// The model new vectors come from; `None` when embeddings are disabled.
    pub fn model(&self) -> Option<EmbeddingModel> {
        EmbeddingModel::of(self.embedder.as_ref())
    }

    pub async fn ingest<S>(&self, store: &mut S, documents: &[IssueDocument]) -> Result<IngestStats>
    where
        S: EmbeddingStore + ?Sized,
    {
        let mut stats = IngestStats {
            documents: documents.len(),
            ..IngestStats::default()
        };
        if documents.is_empty() {
            return Ok(stats);
        }

        let pieces: Vec<(&IssueDocument, Chunk)> = documents
            .iter()
            .flat_map(|doc| {
                chunk_document(&doc.number, &doc.content, &self.split)
                    .into_iter()
                    .map(move |chunk| (doc, chunk))
            })
            .collect();
        stats.chunks = pieces.len();

        let model = match self.model() {
            Some(model) => model,
            None => {
                warn!(
                    documents = stats.documents,
                    chunks = stats.chunks,
                    "embeddings disabled; issues indexed without vectors"
                );
                return Ok(stats);
            }
        };
        if let Some(stored) = store.model() {
            if *stored != model {
                return Err(CoreError::ModelMismatch {
                    stored: stored.to_string(),
                    configured: model.to_string(),
                });
            }
        }

        let mut vectors = Vec::with_capacity(pieces.len());
        for batch in pieces.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, c)| c.text.clone()).collect();
            let batch_vectors = self.embedder.embed(&texts).await?;
            if batch_vectors.len() != texts.len() {
                return Err(CoreError::VectorCountMismatch {
                    expected: texts.len(),
                    got: batch_vectors.len(),
                });
            }
            if let Some(bad) = batch_vectors.iter().find(|v| v.len() != model.dims) {
                return Err(CoreError::VectorDimsMismatch {
                    expected: model.dims,
                    got: bad.len(),
                });
            }
            debug!(
                model = self.embedder.model_name(),
                texts = texts.len(),
                "embedded batch"
            );
            vectors.extend(batch_vectors);
        }

        if store.model().is_none() {
            store.set_model(model);
        }
        for ((doc, chunk), vector) in pieces.into_iter().zip(vectors) {
            store.add(EmbeddingEntry {
                id: chunk.id,
                text: chunk.text,
                vector,
                metadata: doc.metadata.clone(),
            });
            stats.inserted += 1;
        }

        Ok(stats)
    }
}
