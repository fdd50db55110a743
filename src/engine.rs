//! The query engine: the crate's surface for the request gateway.
//!
//! `QueryEngine` wires the content store, embedding provider, vector index,
//! and (optional) generative model together. Every collaborator is injected
//! at construction, there is no global service state, and the HTTP clients
//! behind the providers are built once and shared across requests.
//!
//! ```text
//! indexing:  ContentStore ─► chunking ─► EmbeddingProvider ─► VectorIndex
//! querying:  query ─► Retriever ─► Synthesizer ─► citations ─► QueryResult
//! ```

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::chunking::chunk_text;
use crate::citations::to_citations;
use crate::config::EngineConfig;
use crate::content::{ContentError, ContentStore};
use crate::embedding::{EmbeddingError, EmbeddingProvider, OpenAiEmbeddingProvider};
use crate::index::{CollectionSchema, IndexError, IndexPoint, Metric, PointPayload, VectorIndex};
use crate::retrieval::{RetrievalError, Retriever};
use crate::synthesis::{GenerativeProvider, OpenAiChatProvider, Synthesizer};
use crate::types::{Chapter, QueryResult};

/// Placeholder confidence attached to every answer.
const ANSWER_CONFIDENCE: f32 = 0.9;

/// Errors surfaced to the request gateway.
///
/// Query-path failures only reach this type when every retrieval tier is
/// exhausted; indexing-path failures carry whichever dependency broke.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}

/// Outcome of a full corpus rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexReport {
    pub chapters: usize,
    pub points: usize,
}

/// Retrieval-and-synthesis engine over one textbook corpus.
pub struct QueryEngine {
    content: Arc<dyn ContentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    synthesizer: Synthesizer,
    config: EngineConfig,
}

impl QueryEngine {
    /// Wire an engine from its collaborators.
    ///
    /// Pass `None` as the generative provider when no model credential is
    /// configured; the synthesizer then goes straight to its templated
    /// fallback instead of attempting calls that cannot succeed.
    pub fn new(
        content: Arc<dyn ContentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        generative: Option<Arc<dyn GenerativeProvider>>,
        config: EngineConfig,
    ) -> Self {
        let retriever = Retriever::new(content.clone(), embedder.clone(), index.clone());
        Self {
            content,
            embedder,
            index,
            retriever,
            synthesizer: Synthesizer::new(generative),
            config,
        }
    }

    /// Wire an engine from configuration alone.
    ///
    /// Connects to the configured vector store (degrading to the in-memory
    /// index when it is unreachable) and builds the HTTP providers once.
    /// When no API key is configured the generative model is left out
    /// entirely, so no per-request call can be attempted against it.
    pub async fn from_config(
        content: Arc<dyn ContentStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let schema = CollectionSchema::new(
            config.collection_name.clone(),
            config.embedding_dimension,
            Metric::Cosine,
        );
        let index = VectorIndex::connect(&config.qdrant_url, schema).await?;
        let embedder = OpenAiEmbeddingProvider::new(
            &config.openai_base_url,
            config.embedding_model.clone(),
            config.openai_api_key.clone(),
            config.embedding_dimension,
        );
        let generative: Option<Arc<dyn GenerativeProvider>> =
            config.openai_api_key.as_ref().map(|key| {
                Arc::new(OpenAiChatProvider::new(
                    &config.openai_base_url,
                    config.chat_model.clone(),
                    key.clone(),
                    config.max_tokens,
                    config.temperature,
                )) as Arc<dyn GenerativeProvider>
            });

        Ok(Self::new(
            content,
            Arc::new(embedder),
            Arc::new(index),
            generative,
            config,
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Answer a user query against the corpus.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn process_query(
        &self,
        query: &str,
        session_id: &str,
    ) -> Result<QueryResult, EngineError> {
        let chunks = self
            .retriever
            .find_relevant(query, self.config.retrieval_limit)
            .await?;
        let response_text = self.synthesizer.generate(query, &chunks).await;
        let citations = to_citations(&chunks);
        info!(citations = citations.len(), "answered query");

        Ok(QueryResult {
            response_text,
            citations,
            query_id: Uuid::new_v4(),
            confidence: ANSWER_CONFIDENCE,
        })
    }

    /// Answer a question about a passage the user selected.
    ///
    /// Retrieval runs on the selection-augmented query so the passage's
    /// vocabulary drives the search, while the synthesizer sees the user's
    /// original question.
    #[instrument(skip(self, selected_text), fields(session_id = %session_id))]
    pub async fn process_text_selection_query(
        &self,
        selected_text: &str,
        query: &str,
        session_id: &str,
    ) -> Result<QueryResult, EngineError> {
        let augmented = format!("Regarding this text: '{selected_text}'. {query}");
        let chunks = self
            .retriever
            .find_relevant(&augmented, self.config.retrieval_limit)
            .await?;
        let response_text = self.synthesizer.generate(query, &chunks).await;
        let citations = to_citations(&chunks);
        info!(citations = citations.len(), "answered text selection query");

        Ok(QueryResult {
            response_text,
            citations,
            query_id: Uuid::new_v4(),
            confidence: ANSWER_CONFIDENCE,
        })
    }

    /// Rebuild the index for every chapter in the content store.
    ///
    /// Idempotent: each chapter is deleted from the index and re-upserted,
    /// so repeated runs leave exactly one point-set per chapter. A crash
    /// partway can leave a chapter partially indexed; re-running this
    /// operation repairs it.
    #[instrument(skip(self))]
    pub async fn index_all_chapters(&self) -> Result<IndexReport, EngineError> {
        let chapters = self.content.list_chapters().await?;
        info!(chapters = chapters.len(), "indexing corpus");

        let mut points = 0usize;
        for chapter in &chapters {
            points += self.index_chapter(chapter).await?;
        }

        info!(chapters = chapters.len(), points, "corpus indexed");
        Ok(IndexReport {
            chapters: chapters.len(),
            points,
        })
    }

    /// (Re)index one chapter; returns the number of points written.
    ///
    /// The delete-then-upsert pair runs under the index's write lock so a
    /// concurrent re-index of the same collection cannot interleave with it.
    pub async fn index_chapter(&self, chapter: &Chapter) -> Result<usize, EngineError> {
        let chunks = chunk_text(chapter, self.config.chunk_size);

        let _writes = self.index.lock_writes().await;
        self.index.delete_by_chapter(&chapter.chapter_id).await?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let points: Vec<IndexPoint> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexPoint {
                id: Uuid::new_v4(),
                vector,
                payload: PointPayload {
                    chapter_id: chunk.chapter_id.clone(),
                    text: chunk.text.clone(),
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunk.total_chunks,
                    title: chapter.title.clone(),
                },
            })
            .collect();
        let written = points.len();
        self.index.upsert(points).await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StaticContentStore;
    use crate::embedding::HashEmbeddingProvider;
    use crate::index::{CollectionSchema, Metric};

    fn corpus() -> Vec<Chapter> {
        vec![
            Chapter::new(
                "ch1-intro",
                "Introduction to Physical AI",
                "Physical AI combines perception reasoning and action. ".repeat(30),
                1,
            ),
            Chapter::new(
                "ch2-robotics",
                "Basics of Humanoid Robotics",
                "Humanoid robotics studies robots with human form. ".repeat(30),
                2,
            ),
        ]
    }

    async fn engine() -> QueryEngine {
        let config = EngineConfig::default();
        let schema = CollectionSchema::new(
            config.collection_name.clone(),
            config.embedding_dimension,
            Metric::Cosine,
        );
        QueryEngine::new(
            Arc::new(StaticContentStore::new(corpus())),
            Arc::new(HashEmbeddingProvider::new(config.embedding_dimension)),
            Arc::new(VectorIndex::in_memory(schema).await.unwrap()),
            None,
            config,
        )
    }

    #[tokio::test]
    async fn double_index_leaves_one_point_set_per_chapter() {
        let engine = engine().await;
        let first = engine.index_all_chapters().await.unwrap();
        let second = engine.index_all_chapters().await.unwrap();
        assert_eq!(first.points, second.points);
        assert_eq!(engine.index().count().await.unwrap(), second.points);
        assert_eq!(second.chapters, 2);
    }

    #[tokio::test]
    async fn query_over_indexed_corpus_cites_chapters() {
        let engine = engine().await;
        engine.index_all_chapters().await.unwrap();

        let result = engine
            .process_query("What is Physical AI?", "session-1")
            .await
            .unwrap();
        assert!(!result.response_text.is_empty());
        assert!(!result.citations.is_empty());
        assert!((result.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn selection_query_retrieves_on_augmented_text() {
        let engine = engine().await;
        engine.index_all_chapters().await.unwrap();

        let result = engine
            .process_text_selection_query(
                "Physical AI combines perception reasoning and action.",
                "Explain this passage.",
                "session-1",
            )
            .await
            .unwrap();
        assert!(!result.citations.is_empty());
        // The synthesizer sees the original question, not the rewrite.
        assert!(result.response_text.contains("Explain this passage."));
    }

    #[tokio::test]
    async fn from_config_survives_an_unreachable_vector_store() {
        // Nothing listens on port 1 and no API key is configured; the
        // engine must still come up, degraded.
        let config = EngineConfig::default().with_qdrant_url("http://127.0.0.1:1");
        let engine = QueryEngine::from_config(Arc::new(StaticContentStore::new(corpus())), config)
            .await
            .unwrap();
        assert!(engine.index().is_degraded());
    }

    #[tokio::test]
    async fn empty_chapter_indexes_zero_points() {
        let engine = engine().await;
        let empty = Chapter::new("ch9-empty", "Empty", "", 9);
        assert_eq!(engine.index_chapter(&empty).await.unwrap(), 0);
    }
}
