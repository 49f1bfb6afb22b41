//! Embedder trait and vector utilities.
//!
//! Concrete embedders (OpenAI, Ollama, disabled) live in the `issue-mirror`
//! app crate. Core code only sees the [`Embedder`] trait.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Turns text into vectors.
///
/// `embed` must return exactly one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded for diagnostics.
    fn model_name(&self) -> &str;
    /// Length of every vector this embedder returns.
    fn dims(&self) -> usize;
    /// A disabled embedder accepts no work; callers skip embedding.
    fn is_enabled(&self) -> bool {
        true
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// The model a set of vectors was produced with.
///
/// Vectors from different models (or different dimensionalities) are not
/// comparable, so the store records this next to its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub name: String,
    pub dims: usize,
}

impl EmbeddingModel {
    /// `None` for a disabled embedder.
    pub fn of(embedder: &dyn Embedder) -> Option<Self> {
        embedder.is_enabled().then(|| Self {
            name: embedder.model_name().to_string(),
            dims: embedder.dims(),
        })
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.name, self.dims)
    }
}

/// Cosine of the angle between two vectors.
///
/// Empty inputs, length mismatches and zero vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    let norm = (aa * bb).sqrt();
    if norm < f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}
