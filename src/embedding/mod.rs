//! Embedding seam: text → fixed-dimension vectors.
//!
//! The engine talks to embedding models through [`EmbeddingProvider`], which
//! keeps the hot path free of per-call client construction and lets tests
//! substitute a deterministic provider. The HTTP implementation lives in
//! [`openai`]; [`HashEmbeddingProvider`] is a network-free stand-in with the
//! same contract.
//!
//! All failures carry an [`EmbeddingError`]; callers in the retrieval path
//! treat them as recoverable and fall back to the keyword tier.

pub mod openai;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use thiserror::Error;

pub use openai::OpenAiEmbeddingProvider;

/// Errors raised by embedding providers and vector math.
#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    /// The embedding endpoint could not be reached or answered non-2xx.
    #[error("embedding request failed: {0}")]
    #[diagnostic(
        code(marginalia::embedding::http),
        help("Check the embedding endpoint URL and credentials.")
    )]
    Http(String),

    /// The endpoint answered, but not with the expected shape.
    #[error("malformed embedding response: {0}")]
    #[diagnostic(code(marginalia::embedding::malformed))]
    Malformed(String),

    /// Cosine similarity was asked of vectors with different lengths.
    #[error("vector dimension mismatch: {left} vs {right}")]
    #[diagnostic(code(marginalia::embedding::dimension_mismatch))]
    DimensionMismatch { left: usize, right: usize },

    /// Cosine similarity is undefined for a zero-magnitude vector.
    #[error("cosine similarity undefined for zero-norm vector")]
    #[diagnostic(code(marginalia::embedding::zero_norm))]
    ZeroNorm,
}

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic in dimension: every vector returned
/// by one provider instance has exactly [`dimension`](Self::dimension)
/// components.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts, preserving input order.
    ///
    /// At least as efficient as repeated [`embed`](Self::embed) calls; the
    /// HTTP implementation sends the whole batch in one request.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Cosine similarity of two equal-length vectors.
///
/// Fails with [`EmbeddingError::DimensionMismatch`] on unequal lengths and
/// [`EmbeddingError::ZeroNorm`] when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EmbeddingError> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(EmbeddingError::ZeroNorm);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Deterministic, network-free embedding provider.
///
/// Projects a bag of lowercased tokens into `dimension` buckets by token
/// hash and L2-normalizes the result. Similar token sets land near each
/// other, identical texts embed identically, and no model or network is
/// involved, which makes it the provider of choice for tests and offline
/// runs.
#[derive(Clone, Debug)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let mut saw_token = false;
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            saw_token = true;
            vector[bucket(token, self.dimension)] += 1.0;
        }
        // Token-free but non-empty input still deserves a stable direction.
        if !saw_token && !lowered.is_empty() {
            vector[bucket(&lowered, self.dimension)] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write(token.as_bytes());
    (hasher.finish() as usize) % dimension
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}
