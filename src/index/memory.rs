//! In-process vector backend with the same semantics as the real store.
//!
//! Serves as the degraded-mode substitute when the configured store is
//! unreachable at construction, and as the default backend in tests. Points
//! live in insertion order; searches use a stable sort so equal scores keep
//! that order.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{CollectionSchema, IndexError, IndexPoint, Metric, SearchHit, VectorBackend};

#[derive(Default)]
struct MemoryState {
    /// Schema the collection was created with, once `ensure_collection` ran.
    config: Option<(usize, Metric)>,
    /// Points in insertion order. Upserts of an existing id replace in
    /// place, preserving the original position.
    points: Vec<IndexPoint>,
    /// id → position in `points`.
    positions: FxHashMap<Uuid, usize>,
}

/// Purely in-memory [`VectorBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_dimension(schema: &CollectionSchema, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != schema.dimension {
        return Err(IndexError::Malformed(format!(
            "vector has {} components, collection '{}' expects {}",
            vector.len(),
            schema.name,
            schema.dimension
        )));
    }
    Ok(())
}

/// Similarity under the collection metric. Dimensions are validated before
/// storage, so only degenerate (zero-norm) inputs need a guard; those score
/// zero rather than poisoning the whole search.
fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match metric {
        Metric::Dot => dot,
        Metric::Cosine => {
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        Metric::Euclid => {
            let dist: f32 = a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            -dist
        }
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        match state.config {
            None => {
                state.config = Some((schema.dimension, schema.metric));
                debug!(collection = %schema.name, dimension = schema.dimension, "created in-memory collection");
                Ok(())
            }
            Some((dimension, metric)) if dimension == schema.dimension && metric == schema.metric => {
                Ok(())
            }
            Some((dimension, metric)) => Err(IndexError::Config {
                collection: schema.name.clone(),
                existing_dimension: dimension,
                existing_metric: metric,
                requested_dimension: schema.dimension,
                requested_metric: schema.metric,
            }),
        }
    }

    async fn upsert(
        &self,
        schema: &CollectionSchema,
        points: Vec<IndexPoint>,
    ) -> Result<(), IndexError> {
        for point in &points {
            validate_dimension(schema, &point.vector)?;
        }
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        for point in points {
            match state.positions.get(&point.id).copied() {
                Some(pos) => state.points[pos] = point,
                None => {
                    state.positions.insert(point.id, state.points.len());
                    state.points.push(point);
                }
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        schema: &CollectionSchema,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        validate_dimension(schema, vector)?;
        let state = self.state.read().await;

        let mut hits: Vec<SearchHit> = state
            .points
            .iter()
            .map(|point| SearchHit {
                id: point.id,
                score: score(schema.metric, vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        // Stable: equal scores keep insertion order.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_chapter(
        &self,
        _schema: &CollectionSchema,
        chapter_id: &str,
    ) -> Result<usize, IndexError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let before = state.points.len();
        state.points.retain(|p| p.payload.chapter_id != chapter_id);
        let removed = before - state.points.len();
        if removed > 0 {
            state.positions = state
                .points
                .iter()
                .enumerate()
                .map(|(pos, p)| (p.id, pos))
                .collect();
        }
        Ok(removed)
    }

    async fn clear_collection(&self, schema: &CollectionSchema) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        state.points.clear();
        state.positions.clear();
        state.config = Some((schema.dimension, schema.metric));
        Ok(())
    }

    async fn count(&self, _schema: &CollectionSchema) -> Result<usize, IndexError> {
        Ok(self.state.read().await.points.len())
    }
}
