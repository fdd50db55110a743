//! Grounded answer synthesis with a deterministic outage fallback.
//!
//! The synthesizer builds a prompt from the retrieved chunks and asks the
//! configured chat model for an answer. It never raises past its caller:
//! with no chunks it returns a fixed disclaimer, and when the model is
//! unconfigured or erroring it falls back to a pure, reproducible template
//! over the first chunks, so the service keeps answering through an outage.

use async_trait::async_trait;
use miette::Diagnostic;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::citations::ellipsis_truncate;
use crate::types::RetrievedChunk;

/// Characters of chunk text quoted per section in the fallback answer.
const FALLBACK_PREVIEW_CHARS: usize = 300;

/// Number of chunks quoted in the fallback answer.
const FALLBACK_CHUNK_COUNT: usize = 2;

/// Answer returned when retrieval produced nothing to ground on.
pub const NO_CONTENT_ANSWER: &str = "I couldn't find relevant content in the textbook to answer \
     your question. The AI assistant can only respond based on information from the textbook \
     content.";

const SYSTEM_INSTRUCTION: &str = "You are an AI assistant for a textbook. Answer questions based \
     on the provided context only. Be helpful, accurate, and cite information when possible. If \
     the context does not contain enough information to answer, say so explicitly.";

/// Errors raised by generative providers.
#[derive(Debug, Error, Diagnostic)]
pub enum GenerationError {
    /// The completion endpoint could not be reached or answered non-2xx.
    #[error("completion request failed: {0}")]
    #[diagnostic(
        code(marginalia::synthesis::http),
        help("Check the chat endpoint URL and credentials.")
    )]
    Http(String),

    /// The endpoint answered, but not with the expected shape.
    #[error("malformed completion response: {0}")]
    #[diagnostic(code(marginalia::synthesis::malformed))]
    Malformed(String),
}

/// Chat-style completion seam.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// One completion for a system + user message pair.
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

/// [`GenerativeProvider`] backed by an OpenAI-compatible chat endpoint.
pub struct OpenAiChatProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiChatProvider {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens,
            temperature,
        }
    }
}

#[async_trait]
impl GenerativeProvider for OpenAiChatProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerationError::Http(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http(format!(
                "{} returned {status}: {detail}",
                self.endpoint
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::Malformed(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("completion had no choices".into()))
    }
}

/// Produces the user-visible answer text for a query.
///
/// Holds `None` as its provider when no generative model was configured;
/// that decision is made once at engine construction, not per request.
pub struct Synthesizer {
    provider: Option<Arc<dyn GenerativeProvider>>,
}

impl Synthesizer {
    pub fn new(provider: Option<Arc<dyn GenerativeProvider>>) -> Self {
        if provider.is_none() {
            warn!("no generative model configured; answers will use the templated fallback");
        }
        Self { provider }
    }

    /// Generate an answer grounded in `chunks`. Never fails: every error
    /// path resolves to the templated fallback or the no-content disclaimer.
    pub async fn generate(&self, query: &str, chunks: &[RetrievedChunk]) -> String {
        if chunks.is_empty() {
            return NO_CONTENT_ANSWER.to_string();
        }

        match &self.provider {
            Some(provider) => {
                let prompt = build_prompt(query, chunks);
                match provider.complete(SYSTEM_INSTRUCTION, &prompt).await {
                    Ok(answer) => {
                        debug!(chars = answer.len(), "model produced an answer");
                        answer.trim().to_string()
                    }
                    Err(err) => {
                        warn!(error = %err, "model call failed, using templated answer");
                        fallback_answer(query, chunks)
                    }
                }
            }
            None => fallback_answer(query, chunks),
        }
    }
}

/// Context sections, the verbatim question, and the grounding instruction.
fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let mut prompt = String::from("Relevant textbook content:\n\n");
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(prompt, "Section {} ({}):\n{}\n", i + 1, chunk.title, chunk.text);
    }
    let _ = write!(
        prompt,
        "User's question: {query}\n\nAnswer based on the textbook content above. If the content \
         doesn't contain enough information to answer the question, say so clearly."
    );
    prompt
}

/// Deterministic answer used when no model is reachable. Pure function of
/// its inputs; two calls with the same arguments return the same string.
fn fallback_answer(query: &str, chunks: &[RetrievedChunk]) -> String {
    let mut answer = format!(
        "Based on the textbook content, here's what I found regarding your question '{query}':\n\n"
    );
    for chunk in chunks.iter().take(FALLBACK_CHUNK_COUNT) {
        let _ = writeln!(
            answer,
            "From '{}': {}\n",
            chunk.title,
            ellipsis_truncate(&chunk.text, FALLBACK_PREVIEW_CHARS)
        );
    }
    answer.push_str("This information is based on the textbook content as specified.");
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelevanceScore;
    use httpmock::prelude::*;

    fn chunk(title: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chapter_id: format!("ch-{}", title.to_lowercase()),
            title: title.to_string(),
            text: text.to_string(),
            score: RelevanceScore::Cosine(0.9),
        }
    }

    #[tokio::test]
    async fn empty_chunks_return_no_content_disclaimer() {
        let synth = Synthesizer::new(None);
        let answer = synth.generate("anything", &[]).await;
        assert_eq!(answer, NO_CONTENT_ANSWER);
    }

    #[tokio::test]
    async fn fallback_is_deterministic() {
        let synth = Synthesizer::new(None);
        let chunks = vec![
            chunk("Intro", &"Physical AI combines perception. ".repeat(20)),
            chunk("Robotics", "Humanoid robotics studies robots."),
            chunk("Extra", "This chunk is beyond the fallback window."),
        ];
        let first = synth.generate("What is Physical AI?", &chunks).await;
        let second = synth.generate("What is Physical AI?", &chunks).await;
        assert_eq!(first, second);
        assert!(first.contains("What is Physical AI?"));
        assert!(first.contains("From 'Intro':"));
        assert!(first.contains("From 'Robotics':"));
        assert!(!first.contains("beyond the fallback window"));
        assert!(first.ends_with("This information is based on the textbook content as specified."));
    }

    #[tokio::test]
    async fn fallback_truncates_long_chunk_text() {
        let synth = Synthesizer::new(None);
        let long = "x".repeat(400);
        let answer = synth.generate("q", &[chunk("Intro", &long)]).await;
        let quoted = format!("{}...", "x".repeat(300));
        assert!(answer.contains(&quoted));
        assert!(!answer.contains(&"x".repeat(301)));
    }

    #[test]
    fn prompt_labels_sections_in_order() {
        let prompt = build_prompt(
            "What is ROS?",
            &[chunk("Intro", "one"), chunk("ROS", "two")],
        );
        assert!(prompt.contains("Section 1 (Intro):\none"));
        assert!(prompt.contains("Section 2 (ROS):\ntwo"));
        assert!(prompt.contains("User's question: What is ROS?"));
    }

    #[tokio::test]
    async fn model_answer_is_trimmed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "  grounded answer \n"}}]
                }));
            })
            .await;

        let provider = OpenAiChatProvider::new(&server.base_url(), "gpt-test", "key", 500, 0.7);
        let synth = Synthesizer::new(Some(Arc::new(provider)));
        let answer = synth.generate("q", &[chunk("Intro", "text")]).await;
        assert_eq!(answer, "grounded answer");
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_template() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("upstream exploded");
            })
            .await;

        let provider = OpenAiChatProvider::new(&server.base_url(), "gpt-test", "key", 500, 0.7);
        let synth = Synthesizer::new(Some(Arc::new(provider)));
        let answer = synth.generate("q", &[chunk("Intro", "text")]).await;
        assert!(answer.starts_with("Based on the textbook content"));
        assert!(answer.contains("From 'Intro': text"));
    }
}
