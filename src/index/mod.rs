//! Vector index: durable storage of embedding points with k-NN search.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │   VectorIndex    │  facade: schema, write lock,
//!                  │                  │  degraded-mode construction
//!                  └────────┬─────────┘
//!                           │  VectorBackend (async operation set)
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!      ┌───────────────┐        ┌────────────────┐
//!      │ QdrantBackend │        │ MemoryBackend  │
//!      │  (REST API)   │        │ (in-process)   │
//!      └───────────────┘        └────────────────┘
//! ```
//!
//! Both backends implement the identical operation set, so the in-memory
//! twin can stand in for the real store in degraded mode and in tests
//! without semantic drift. [`VectorIndex::connect`] probes the configured
//! backend once at construction and, when the store is unreachable,
//! downgrades to the in-memory backend with a WARN log.

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

pub use memory::MemoryBackend;
pub use qdrant::QdrantBackend;

/// Errors raised by vector index operations.
#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    /// The backing store could not be reached.
    #[error("vector store unavailable: {0}")]
    #[diagnostic(
        code(marginalia::index::unavailable),
        help("Check that the vector store is running and the URL is correct.")
    )]
    Unavailable(String),

    /// A collection already exists with a different dimension or metric.
    #[error(
        "collection '{collection}' is configured with dimension {existing_dimension} ({existing_metric}), requested {requested_dimension} ({requested_metric})"
    )]
    #[diagnostic(
        code(marginalia::index::config),
        help("Drop the collection or align the requested schema with the existing one.")
    )]
    Config {
        collection: String,
        existing_dimension: usize,
        existing_metric: Metric,
        requested_dimension: usize,
        requested_metric: Metric,
    },

    /// The store rejected an operation.
    #[error("vector store operation failed: {0}")]
    #[diagnostic(code(marginalia::index::backend))]
    Backend(String),

    /// The store answered with an unexpected shape, or the caller handed in
    /// a vector that violates the collection schema.
    #[error("malformed vector data: {0}")]
    #[diagnostic(code(marginalia::index::malformed))]
    Malformed(String),
}

/// Distance metric of a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Cosine,
    Euclid,
    Dot,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => write!(f, "Cosine"),
            Metric::Euclid => write!(f, "Euclid"),
            Metric::Dot => write!(f, "Dot"),
        }
    }
}

/// Name, dimension, and metric of one collection.
///
/// Every vector stored in a collection shares the schema's dimension and
/// metric; [`VectorBackend::ensure_collection`] enforces this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
        }
    }
}

/// Payload carried by every indexed point, mapping it back to its chapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub chapter_id: String,
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub title: String,
}

/// One embedding vector plus its payload, as stored in a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// One search result: a stored point and its similarity score.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: PointPayload,
}

/// The operation set every vector store backend implements.
///
/// One backend instance serves one collection; the facade passes the schema
/// with each call so backends stay stateless about configuration.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create the collection if absent; no-op if an identically-configured
    /// collection exists; [`IndexError::Config`] on a schema mismatch.
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<(), IndexError>;

    /// Insert or overwrite points by id. Re-upserting identical data has no
    /// observable effect.
    async fn upsert(
        &self,
        schema: &CollectionSchema,
        points: Vec<IndexPoint>,
    ) -> Result<(), IndexError>;

    /// Up to `limit` points by descending similarity; ties keep insertion
    /// order. An empty collection yields an empty vector, not an error.
    async fn search(
        &self,
        schema: &CollectionSchema,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Remove every point whose payload references `chapter_id`, paging
    /// through the store until none remain. Returns the number removed.
    async fn delete_by_chapter(
        &self,
        schema: &CollectionSchema,
        chapter_id: &str,
    ) -> Result<usize, IndexError>;

    /// Drop and recreate the collection empty. Full rebuilds only.
    async fn clear_collection(&self, schema: &CollectionSchema) -> Result<(), IndexError>;

    /// Number of points currently stored.
    async fn count(&self, schema: &CollectionSchema) -> Result<usize, IndexError>;
}

/// Facade over a [`VectorBackend`] bound to one collection.
///
/// Holds the collection schema, the degraded-mode flag, and the write
/// serialization lock. Reads (`search`, `count`) run unordered in parallel;
/// writers that need the delete-then-upsert pair to be atomic per chapter
/// take [`lock_writes`](Self::lock_writes) around the pair.
pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    schema: CollectionSchema,
    degraded: bool,
    write_lock: Mutex<()>,
}

impl VectorIndex {
    /// Connect to the vector store at `url`, falling back to the in-memory
    /// backend when the store is unreachable.
    ///
    /// The downgrade is logged at WARN and visible afterwards through
    /// [`is_degraded`](Self::is_degraded). A reachable store whose existing
    /// collection disagrees with `schema` is a configuration error and does
    /// fail construction.
    pub async fn connect(url: &str, schema: CollectionSchema) -> Result<Self, IndexError> {
        match QdrantBackend::connect(url).await {
            Ok(backend) => {
                backend.ensure_collection(&schema).await?;
                info!(collection = %schema.name, url, "connected to vector store");
                Ok(Self {
                    backend: Arc::new(backend),
                    schema,
                    degraded: false,
                    write_lock: Mutex::new(()),
                })
            }
            Err(err) => {
                warn!(
                    collection = %schema.name,
                    url,
                    error = %err,
                    "vector store unreachable, falling back to in-memory index"
                );
                let backend = MemoryBackend::new();
                backend.ensure_collection(&schema).await?;
                Ok(Self {
                    backend: Arc::new(backend),
                    schema,
                    degraded: true,
                    write_lock: Mutex::new(()),
                })
            }
        }
    }

    /// Build an index over an explicit backend. This is the substitution
    /// seam for tests and for gateways that construct their own backend.
    pub async fn with_backend(
        backend: Arc<dyn VectorBackend>,
        schema: CollectionSchema,
    ) -> Result<Self, IndexError> {
        backend.ensure_collection(&schema).await?;
        Ok(Self {
            backend,
            schema,
            degraded: false,
            write_lock: Mutex::new(()),
        })
    }

    /// Purely in-process index; used for degraded/test mode without a probe.
    pub async fn in_memory(schema: CollectionSchema) -> Result<Self, IndexError> {
        Self::with_backend(Arc::new(MemoryBackend::new()), schema).await
    }

    /// Whether construction fell back to the in-memory backend.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Serialize mutations: hold the returned guard across every mutation
    /// that must be atomic with respect to other writers, notably the
    /// delete-then-upsert pair when re-indexing a chapter. Individual
    /// operations below do not self-lock.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub async fn upsert(&self, points: Vec<IndexPoint>) -> Result<(), IndexError> {
        self.backend.upsert(&self.schema, points).await
    }

    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.backend.search(&self.schema, vector, limit).await
    }

    pub async fn delete_by_chapter(&self, chapter_id: &str) -> Result<usize, IndexError> {
        self.backend.delete_by_chapter(&self.schema, chapter_id).await
    }

    pub async fn clear_collection(&self) -> Result<(), IndexError> {
        self.backend.clear_collection(&self.schema).await
    }

    pub async fn count(&self) -> Result<usize, IndexError> {
        self.backend.count(&self.schema).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_unreachable_store_degrades_to_memory() {
        // Nothing listens on this port; construction must still succeed.
        let schema = CollectionSchema::new("textbook_content", 4, Metric::Cosine);
        let index = VectorIndex::connect("http://127.0.0.1:1", schema)
            .await
            .unwrap();
        assert!(index.is_degraded());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn in_memory_index_is_not_degraded() {
        let schema = CollectionSchema::new("textbook_content", 4, Metric::Cosine);
        let index = VectorIndex::in_memory(schema).await.unwrap();
        assert!(!index.is_degraded());
    }

    #[tokio::test]
    async fn clear_collection_leaves_an_empty_usable_index() {
        let schema = CollectionSchema::new("textbook_content", 4, Metric::Cosine);
        let index = VectorIndex::in_memory(schema).await.unwrap();
        let point = IndexPoint {
            id: Uuid::new_v4(),
            vector: vec![1.0, 0.0, 0.0, 0.0],
            payload: PointPayload {
                chapter_id: "ch1".into(),
                text: "body".into(),
                chunk_index: 0,
                total_chunks: 1,
                title: "Intro".into(),
            },
        };
        index.upsert(vec![point.clone()]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        index.clear_collection().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);

        // The recreated collection accepts new points.
        index.upsert(vec![point]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }
}
