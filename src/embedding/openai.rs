//! OpenAI-compatible HTTP embedding provider.
//!
//! Speaks the `/v1/embeddings` wire format, which local inference gateways
//! (Ollama, TEI, vLLM and friends) implement as well, so the same provider
//! covers hosted and self-hosted embedding models.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding provider backed by an OpenAI-compatible endpoint.
///
/// The [`reqwest::Client`] is constructed once and shared across requests;
/// batches go out as a single request with the input order restored from the
/// response's `index` fields.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/v1/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            dimension,
        }
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| EmbeddingError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Http(format!(
                "{} returned {status}: {detail}",
                self.endpoint
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;
        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        let mut rows = parsed.data;
        rows.sort_by_key(|row| row.index);
        for row in &rows {
            if row.embedding.len() != self.dimension {
                return Err(EmbeddingError::Malformed(format!(
                    "embedding has {} components, expected {}",
                    row.embedding.len(),
                    self.dimension
                )));
            }
        }

        debug!(count = rows.len(), model = %self.model, "embedded batch");
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = [text.to_string()];
        let mut vectors = self.request(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Malformed("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
