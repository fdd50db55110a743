//! Qdrant REST backend.
//!
//! Talks to a Qdrant instance over its HTTP API: collection lifecycle,
//! point upsert, vector search, and filtered scroll-plus-delete. The client
//! is built once at connection time and reused for every call.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{CollectionSchema, IndexError, IndexPoint, Metric, SearchHit, VectorBackend};

/// Page size used when scrolling matching points for deletion.
const SCROLL_PAGE_SIZE: usize = 256;

/// [`VectorBackend`] over the Qdrant HTTP API.
pub struct QdrantBackend {
    client: Client,
    base_url: String,
}

impl QdrantBackend {
    /// Probe the store at `base_url` and return a backend bound to it.
    ///
    /// Fails with [`IndexError::Unavailable`] when the store does not answer
    /// the collections listing; callers use that signal to downgrade to the
    /// in-memory backend.
    pub async fn connect(base_url: &str) -> Result<Self, IndexError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let response = client
            .get(format!("{base_url}/collections"))
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(IndexError::Unavailable(format!(
                "{base_url} answered {} to the collections listing",
                response.status()
            )));
        }

        Ok(Self { client, base_url })
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{name}", self.base_url)
    }

    async fn post_json(&self, url: String, body: Value) -> Result<Value, IndexError> {
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        Self::parse_body(url, response).await
    }

    async fn parse_body(url: String, response: reqwest::Response) -> Result<Value, IndexError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(IndexError::Backend(format!(
                "{url} returned {status}: {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|err| IndexError::Malformed(err.to_string()))
    }

    /// One scroll page of point ids matching a chapter filter.
    async fn scroll_chapter_page(
        &self,
        schema: &CollectionSchema,
        chapter_id: &str,
        offset: Option<Value>,
    ) -> Result<(Vec<Value>, Option<Value>), IndexError> {
        let mut body = json!({
            "filter": {
                "must": [
                    {"key": "chapter_id", "match": {"value": chapter_id}}
                ]
            },
            "limit": SCROLL_PAGE_SIZE,
            "with_payload": false,
            "with_vector": false,
        });
        if let Some(offset) = offset {
            body["offset"] = offset;
        }

        let parsed = self
            .post_json(
                format!("{}/points/scroll", self.collection_url(&schema.name)),
                body,
            )
            .await?;
        let result = &parsed["result"];
        let ids = result["points"]
            .as_array()
            .ok_or_else(|| IndexError::Malformed("scroll response missing points".into()))?
            .iter()
            .map(|p| p["id"].clone())
            .collect();
        let next = match &result["next_page_offset"] {
            Value::Null => None,
            other => Some(other.clone()),
        };
        Ok((ids, next))
    }
}

fn parse_metric(name: &str) -> Option<Metric> {
    match name {
        "Cosine" => Some(Metric::Cosine),
        "Euclid" => Some(Metric::Euclid),
        "Dot" => Some(Metric::Dot),
        _ => None,
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<(), IndexError> {
        let url = self.collection_url(&schema.name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            let body = json!({
                "vectors": {
                    "size": schema.dimension,
                    "distance": schema.metric.to_string(),
                }
            });
            let create = self
                .client
                .put(&url)
                .json(&body)
                .send()
                .await
                .map_err(|err| IndexError::Unavailable(err.to_string()))?;
            Self::parse_body(url, create).await?;
            debug!(collection = %schema.name, dimension = schema.dimension, "created collection");
            return Ok(());
        }

        let parsed = Self::parse_body(url, response).await?;
        let vectors = &parsed["result"]["config"]["params"]["vectors"];
        let existing_dimension = vectors["size"]
            .as_u64()
            .ok_or_else(|| IndexError::Malformed("collection info missing vector size".into()))?
            as usize;
        let existing_metric = vectors["distance"]
            .as_str()
            .and_then(parse_metric)
            .ok_or_else(|| IndexError::Malformed("collection info missing distance".into()))?;

        if existing_dimension != schema.dimension || existing_metric != schema.metric {
            return Err(IndexError::Config {
                collection: schema.name.clone(),
                existing_dimension,
                existing_metric,
                requested_dimension: schema.dimension,
                requested_metric: schema.metric,
            });
        }
        Ok(())
    }

    async fn upsert(
        &self,
        schema: &CollectionSchema,
        points: Vec<IndexPoint>,
    ) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({
            "points": points
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "vector": p.vector,
                        "payload": p.payload,
                    })
                })
                .collect::<Vec<_>>()
        });

        let url = format!("{}/points?wait=true", self.collection_url(&schema.name));
        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        Self::parse_body(url, response).await?;
        debug!(collection = %schema.name, count = points.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        schema: &CollectionSchema,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let parsed = self
            .post_json(
                format!("{}/points/search", self.collection_url(&schema.name)),
                body,
            )
            .await?;

        let hits = parsed["result"]
            .as_array()
            .ok_or_else(|| IndexError::Malformed("search response missing result".into()))?;

        hits.iter()
            .map(|hit| {
                let id = hit["id"]
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| IndexError::Malformed("search hit has no uuid id".into()))?;
                let score = hit["score"]
                    .as_f64()
                    .ok_or_else(|| IndexError::Malformed("search hit has no score".into()))?
                    as f32;
                let payload = serde_json::from_value(hit["payload"].clone())
                    .map_err(|err| IndexError::Malformed(err.to_string()))?;
                Ok(SearchHit { id, score, payload })
            })
            .collect()
    }

    async fn delete_by_chapter(
        &self,
        schema: &CollectionSchema,
        chapter_id: &str,
    ) -> Result<usize, IndexError> {
        let mut removed = 0usize;
        let mut offset = None;

        // Scroll until the filter stops matching; a single page can be
        // smaller than the store's total match count.
        loop {
            let (ids, next) = self
                .scroll_chapter_page(schema, chapter_id, offset.take())
                .await?;
            if ids.is_empty() {
                break;
            }
            removed += ids.len();
            self.post_json(
                format!(
                    "{}/points/delete?wait=true",
                    self.collection_url(&schema.name)
                ),
                json!({ "points": ids }),
            )
            .await?;

            match next {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        if removed > 0 {
            debug!(collection = %schema.name, chapter_id, removed, "deleted chapter points");
        }
        Ok(removed)
    }

    async fn clear_collection(&self, schema: &CollectionSchema) -> Result<(), IndexError> {
        let url = self.collection_url(&schema.name);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|err| IndexError::Unavailable(err.to_string()))?;
        // 404 means there was nothing to drop; recreate either way.
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(IndexError::Backend(format!(
                "{url} returned {status}: {detail}"
            )));
        }
        self.ensure_collection(schema).await
    }

    async fn count(&self, schema: &CollectionSchema) -> Result<usize, IndexError> {
        let parsed = self
            .post_json(
                format!("{}/points/count", self.collection_url(&schema.name)),
                json!({"exact": true}),
            )
            .await?;
        parsed["result"]["count"]
            .as_u64()
            .map(|count| count as usize)
            .ok_or_else(|| IndexError::Malformed("count response missing count".into()))
    }
}
