//! Semantic search over a synced repository.
//!
//! Loads the saved embedding store, embeds the query, and ranks chunks by
//! cosine similarity. Results are grouped by issue: each issue appears
//! once, with its best-scoring chunk.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use issue_mirror_core::embedding::{Embedder, EmbeddingModel};
use issue_mirror_core::models::{LABEL_MARKER, METADATA_NUMBER, METADATA_TYPE};
use issue_mirror_core::store::{EmbeddingStore, MetadataFilter};

use crate::config::Config;
use crate::embedder::create_embedder;
use crate::models::RepoName;
use crate::repository::RepositoryState;

#[derive(Debug, Clone, PartialEq)]
pub struct IssueMatch {
    pub number: String,
    pub score: f32,
    pub issue_type: Option<String>,
    pub excerpt: String,
}

/// Restrict search to issues carrying a label and/or of a type.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub label: Option<String>,
    pub issue_type: Option<String>,
}

impl SearchFilter {
    fn to_metadata_filter(&self) -> MetadataFilter {
        let mut filter = MetadataFilter::new();
        if let Some(label) = &self.label {
            filter = filter.and(label.as_str(), LABEL_MARKER);
        }
        if let Some(t) = &self.issue_type {
            filter = filter.and(METADATA_TYPE, t.as_str());
        }
        filter
    }
}

pub async fn search_issues(
    base_dir: &Path,
    repo: &RepoName,
    embedder: &dyn Embedder,
    query: &str,
    filter: &SearchFilter,
    limit: usize,
) -> Result<Vec<IssueMatch>> {
    if !embedder.is_enabled() {
        bail!("search requires an embedding provider; set [embedding] provider in the config");
    }
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let model = EmbeddingModel::of(embedder);
    let state = RepositoryState::load_for(base_dir, repo, model.as_ref())
        .with_context(|| format!("no usable synced state for {}; run `issue-mirror pull {}` first", repo, repo))?;

    let query_vec = embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

    let hits = state
        .store()
        .search(&query_vec, &filter.to_metadata_filter(), state.store().len());

    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for hit in hits {
        let number = match hit.entry.metadata.get(METADATA_NUMBER) {
            Some(n) => n.clone(),
            None => continue,
        };
        if !seen.insert(number.clone()) {
            continue;
        }
        matches.push(IssueMatch {
            number,
            score: hit.score,
            issue_type: hit.entry.metadata.get(METADATA_TYPE).cloned(),
            excerpt: excerpt(&hit.entry.text),
        });
        if matches.len() >= limit {
            break;
        }
    }

    Ok(matches)
}

/// The first line of the chunk, capped at 160 characters.
fn excerpt(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    let mut out: String = line.chars().take(160).collect();
    if line.chars().count() > 160 {
        out.push('…');
    }
    out
}

pub async fn run_search(
    cfg: &Config,
    repo: &RepoName,
    query: &str,
    filter: SearchFilter,
    limit: usize,
) -> Result<()> {
    let embedder = create_embedder(&cfg.embedding)?;
    let results = search_issues(&cfg.cache.dir, repo, embedder.as_ref(), query, &filter, limit).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}#{}", i + 1, result.score, repo, result.number);
        if let Some(t) = &result.issue_type {
            println!("    type: {}", t);
        }
        println!("    excerpt: \"{}\"", result.excerpt);
        println!();
    }

    Ok(())
}
