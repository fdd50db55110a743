//! # Marginalia: grounded textbook question answering
//!
//! Marginalia answers natural-language questions against a fixed corpus of
//! textbook chapters: it retrieves the most relevant passages and
//! synthesizes an answer with citations, degrading through defined fallback
//! tiers instead of failing when a dependency is down.
//!
//! ```text
//! ContentStore ──► chunking ──► EmbeddingProvider ──► VectorIndex
//!                                                          │
//! query ──► EmbeddingProvider ──► VectorIndex.search ──────┤
//!   │            (fallback: keyword scan of ContentStore)  │
//!   │                                                      ▼
//!   └──────────► Synthesizer ◄───────────────── RetrievedChunks
//!                    │ (fallback: templated answer)
//!                    ▼
//!          QueryResult + Citations
//!
//! TaskScheduler: bounded-concurrency wrapper around any of the above.
//! ```
//!
//! ## Failure design
//!
//! Every external dependency can be absent or erroring:
//!
//! - Vector store unreachable at construction → in-memory index, logged.
//! - Embedding model or vector search failing at query time → keyword scan
//!   of the content store.
//! - Generative model unconfigured or failing → deterministic templated
//!   answer built from the retrieved chunks.
//!
//! Only when the content store itself is unreachable does a query fail.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use marginalia::config::EngineConfig;
//! use marginalia::content::StaticContentStore;
//! use marginalia::embedding::HashEmbeddingProvider;
//! use marginalia::engine::QueryEngine;
//! use marginalia::index::{CollectionSchema, Metric, VectorIndex};
//! use marginalia::types::Chapter;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_env();
//! let schema = CollectionSchema::new(
//!     config.collection_name.clone(),
//!     config.embedding_dimension,
//!     Metric::Cosine,
//! );
//!
//! let engine = QueryEngine::new(
//!     Arc::new(StaticContentStore::new(vec![Chapter::new(
//!         "ch1-intro",
//!         "Introduction",
//!         "Physical AI combines perception reasoning and action.",
//!         1,
//!     )])),
//!     Arc::new(HashEmbeddingProvider::new(config.embedding_dimension)),
//!     Arc::new(VectorIndex::connect(&config.qdrant_url, schema).await?),
//!     None,
//!     config,
//! );
//!
//! engine.index_all_chapters().await?;
//! let answer = engine.process_query("What is Physical AI?", "session-1").await?;
//! println!("{}", answer.response_text);
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod citations;
pub mod config;
pub mod content;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod retrieval;
pub mod synthesis;
pub mod tasks;
pub mod telemetry;
pub mod types;

pub use config::EngineConfig;
pub use content::{ContentStore, MarkdownContentStore, StaticContentStore};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider};
pub use engine::{EngineError, IndexReport, QueryEngine};
pub use index::{CollectionSchema, Metric, VectorIndex};
pub use retrieval::Retriever;
pub use synthesis::{GenerativeProvider, OpenAiChatProvider, Synthesizer};
pub use tasks::{TaskResult, TaskScheduler, TaskSpec, TaskStatus};
pub use types::{Chapter, Chunk, Citation, QueryResult, RelevanceScore, RetrievedChunk};
