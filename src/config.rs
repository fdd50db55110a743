//! Engine configuration.
//!
//! All knobs have defaults matching the original deployment; `from_env`
//! overlays `MARGINALIA_*` environment variables (a `.env` file is honored
//! via dotenvy). Gateways that construct the engine programmatically can use
//! the `with_*` setters instead.

use tracing::warn;
use url::Url;

use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::retrieval::DEFAULT_RETRIEVAL_LIMIT;
use crate::tasks::DEFAULT_MAX_CONCURRENT;

/// Configuration for the engine and its providers.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Vector collection holding the corpus.
    pub collection_name: String,
    /// Dimension of the embedding model's vectors.
    pub embedding_dimension: usize,
    /// Characters per chunk when indexing.
    pub chunk_size: usize,
    /// Chunks retrieved per query.
    pub retrieval_limit: usize,
    /// Base URL of the vector store.
    pub qdrant_url: String,
    /// Base URL of the OpenAI-compatible model gateway.
    pub openai_base_url: String,
    /// Credential for the model gateway. `None` means the generative model
    /// is unconfigured and the synthesizer uses its templated fallback.
    pub openai_api_key: Option<String>,
    /// Embedding model name.
    pub embedding_model: String,
    /// Chat model name.
    pub chat_model: String,
    /// Completion token budget per answer.
    pub max_tokens: u32,
    /// Sampling temperature for answers.
    pub temperature: f32,
    /// Concurrency limit of the task scheduler.
    pub max_concurrent_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection_name: "textbook_content".to_string(),
            embedding_dimension: 384,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retrieval_limit: DEFAULT_RETRIEVAL_LIMIT,
            qdrant_url: "http://localhost:6333".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            openai_api_key: None,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `MARGINALIA_*` environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(value) = std::env::var("MARGINALIA_QDRANT_URL") {
            config.qdrant_url = value;
        }
        if let Ok(value) = std::env::var("MARGINALIA_OPENAI_BASE_URL") {
            config.openai_base_url = value;
        }
        if let Ok(value) = std::env::var("MARGINALIA_OPENAI_API_KEY") {
            if !value.is_empty() {
                config.openai_api_key = Some(value);
            }
        }
        if let Ok(value) = std::env::var("MARGINALIA_EMBEDDING_MODEL") {
            config.embedding_model = value;
        }
        if let Ok(value) = std::env::var("MARGINALIA_CHAT_MODEL") {
            config.chat_model = value;
        }
        if let Ok(value) = std::env::var("MARGINALIA_CHUNK_SIZE") {
            match value.parse() {
                Ok(parsed) if parsed > 0 => config.chunk_size = parsed,
                _ => warn!(value = %value, "ignoring invalid MARGINALIA_CHUNK_SIZE"),
            }
        }
        if let Ok(value) = std::env::var("MARGINALIA_MAX_CONCURRENT_TASKS") {
            match value.parse() {
                Ok(parsed) if parsed > 0 => config.max_concurrent_tasks = parsed,
                _ => warn!(value = %value, "ignoring invalid MARGINALIA_MAX_CONCURRENT_TASKS"),
            }
        }

        for (name, candidate) in [
            ("MARGINALIA_QDRANT_URL", &config.qdrant_url),
            ("MARGINALIA_OPENAI_BASE_URL", &config.openai_base_url),
        ] {
            if Url::parse(candidate).is_err() {
                warn!(var = name, value = %candidate, "configured URL does not parse");
            }
        }

        config
    }

    #[must_use]
    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    #[must_use]
    pub fn with_qdrant_url(mut self, url: impl Into<String>) -> Self {
        self.qdrant_url = url.into();
        self
    }

    #[must_use]
    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.max_concurrent_tasks = limit;
        self
    }
}
