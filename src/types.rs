//! Core domain types for the marginalia engine.
//!
//! This module defines the data that flows between the engine's components:
//! chapters coming in from the content store, chunks produced for indexing,
//! retrieved chunks coming back out of search, and the citation/answer types
//! handed to the request gateway.
//!
//! For indexing-side types (points, payloads, search hits) see
//! [`crate::index`]; for task types see [`crate::tasks`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A textbook chapter as served by the content store.
///
/// Chapters are immutable within a process lifetime; the engine only reads
/// them and re-derives chunks whenever a chapter is (re)indexed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Unique, stable identifier (e.g. `"ch1-introduction-to-physical-ai"`).
    pub chapter_id: String,
    /// Human-readable chapter title.
    pub title: String,
    /// Full chapter body.
    pub full_text: String,
    /// 1-based position of the chapter in the book.
    pub chapter_number: u32,
}

impl Chapter {
    pub fn new(
        chapter_id: impl Into<String>,
        title: impl Into<String>,
        full_text: impl Into<String>,
        chapter_number: u32,
    ) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            title: title.into(),
            full_text: full_text.into(),
            chapter_number,
        }
    }
}

/// A bounded-size slice of a chapter's text, ready for embedding.
///
/// Chunks are ephemeral: they are recomputed from the chapter body on every
/// (re)index and never persisted outside the vector collection's payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chapter_id: String,
    /// 0-based, contiguous position of this chunk within its chapter.
    pub chunk_index: usize,
    pub text: String,
    /// Number of chunks the chapter was split into.
    pub total_chunks: usize,
}

/// Relevance score of a retrieved chunk.
///
/// The two retrieval tiers produce scores on incompatible scales: cosine
/// similarity in `[-1, 1]` from vector search, and a raw keyword match count
/// from the content scan. The variants are deliberately not comparable with
/// each other; callers that need a number must match on the tier that
/// produced it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceScore {
    /// Cosine similarity reported by the vector index.
    Cosine(f32),
    /// Raw number of keyword occurrences found by the content scan.
    KeywordCount(u32),
}

/// A chunk of content retrieved for a query, with its relevance score.
///
/// Produced per query and handed to the synthesizer and citation assembler.
/// The keyword tier has no chunk boundaries, so its results carry the whole
/// chapter body as `text`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chapter_id: String,
    pub title: String,
    pub text: String,
    pub score: RelevanceScore,
}

/// A citation pointing back into the corpus, derived 1:1 from a
/// [`RetrievedChunk`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chapter_id: String,
    pub chapter_title: String,
    /// Section label. A fixed placeholder until chunks carry finer-grained
    /// location metadata.
    pub section: String,
    /// Chunk text truncated to 100 characters, with an ellipsis appended
    /// only when truncation happened.
    pub content_preview: String,
}

/// The engine's answer to one query, as returned to the request gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub response_text: String,
    /// Citations in retrieval order.
    pub citations: Vec<Citation>,
    pub query_id: Uuid,
    /// Placeholder confidence carried over from the original service; not a
    /// calibrated probability.
    pub confidence: f32,
}
