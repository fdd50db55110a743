//! Relevance retrieval with a strict fallback cascade.
//!
//! The primary tier embeds the query and searches the vector index. Any
//! failure there (embedding model down, vector store erroring) is logged
//! and recovered by scanning the content store for keyword matches. Only
//! when the content store itself is unavailable does retrieval fail, because
//! there is no tier below the keyword scan.
//!
//! The two tiers score on incompatible scales (cosine similarity vs. raw
//! match count); see [`RelevanceScore`].

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::content::{ContentError, ContentStore};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexError, VectorIndex};
use crate::types::{Chapter, RelevanceScore, RetrievedChunk};

/// Default number of chunks returned per query.
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// Shortest token the keyword tier will look for.
const MIN_TOKEN_CHARS: usize = 3;

/// Raised only when every retrieval tier is exhausted.
#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    /// Vector retrieval already failed and the content store is unreachable
    /// too, so no tier remains.
    #[error("all retrieval tiers exhausted: {source}")]
    #[diagnostic(
        code(marginalia::retrieval::exhausted),
        help("The content store must be reachable for the keyword fallback to work.")
    )]
    Exhausted {
        #[from]
        source: ContentError,
    },
}

/// Reason the vector tier was skipped; logged, never surfaced to callers.
#[derive(Debug, Error)]
enum VectorTierError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Finds the chunks most relevant to a query.
pub struct Retriever {
    content: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(
        content: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
    ) -> Self {
        Self {
            content,
            embedder,
            index,
        }
    }

    /// Up to `limit` relevant chunks, best first. Fewer, including zero,
    /// is a valid result of either tier.
    pub async fn find_relevant(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        match self.vector_tier(query, limit).await {
            Ok(chunks) => {
                debug!(count = chunks.len(), "vector retrieval succeeded");
                Ok(chunks)
            }
            Err(err) => {
                warn!(error = %err, "vector retrieval failed, scanning content store for keywords");
                self.keyword_tier(query, limit).await
            }
        }
    }

    async fn vector_tier(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, VectorTierError> {
        let query_vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vector, limit).await?;
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                chapter_id: hit.payload.chapter_id,
                title: hit.payload.title,
                text: hit.payload.text,
                score: RelevanceScore::Cosine(hit.score),
            })
            .collect())
    }

    /// Count keyword occurrences per chapter and return the best matches.
    ///
    /// Results carry whole chapters: this tier has no chunk boundaries.
    /// Ties keep the content store's chapter order (stable sort).
    async fn keyword_tier(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let chapters = self.content.list_chapters().await?;
        let tokens = query_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u32, &Chapter)> = chapters
            .iter()
            .filter_map(|chapter| {
                let count = keyword_matches(chapter, &tokens);
                (count > 0).then_some((count, chapter))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(count, chapter)| RetrievedChunk {
                chapter_id: chapter.chapter_id.clone(),
                title: chapter.title.clone(),
                text: chapter.full_text.clone(),
                score: RelevanceScore::KeywordCount(count),
            })
            .collect())
    }
}

/// Lowercased query words longer than two characters.
fn query_tokens(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Case-insensitive substring occurrences of every token across the
/// chapter's title and body.
fn keyword_matches(chapter: &Chapter, tokens: &[String]) -> u32 {
    let title = chapter.title.to_lowercase();
    let body = chapter.full_text.to_lowercase();
    tokens
        .iter()
        .map(|token| (title.matches(token.as_str()).count() + body.matches(token.as_str()).count()) as u32)
        .sum()
}
