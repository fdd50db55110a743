//! Named task functions exposed to the task invoker.
//!
//! Each function resolves to the uniform JSON envelope the invoker expects:
//! `{"status": "success", ...}` on success, `{"status": "error", "error"}`
//! otherwise. Failures are folded into the envelope here so a task function
//! never raises into the scheduler.

use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::engine::QueryEngine;

/// Content analysis variants supported by [`analyze_content`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisKind {
    Summary,
    KeyPoints,
    Sentiment,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::Summary => write!(f, "summary"),
            AnalysisKind::KeyPoints => write!(f, "key_points"),
            AnalysisKind::Sentiment => write!(f, "sentiment"),
        }
    }
}

fn error_envelope(error: impl fmt::Display) -> Value {
    json!({"status": "error", "error": error.to_string()})
}

/// Ad-hoc query execution as a task.
pub async fn answer_query(engine: Arc<QueryEngine>, query: String, session_id: String) -> Value {
    info!(%query, "running query task");
    match engine.process_query(&query, &session_id).await {
        Ok(result) => json!({
            "status": "success",
            "response": result.response_text,
            "citations": result.citations,
            "query_id": result.query_id,
        }),
        Err(err) => error_envelope(err),
    }
}

/// Lightweight content analysis as a task.
///
/// The analysis itself is a deterministic placeholder pending a dedicated
/// analysis model; the envelope shape is what the invoker depends on.
pub async fn analyze_content(content: String, kind: AnalysisKind) -> Value {
    info!(kind = %kind, chars = content.len(), "running content analysis task");
    let result = match kind {
        AnalysisKind::Summary => {
            let preview: String = content.chars().take(100).collect();
            json!(format!("Summary of content: {preview}..."))
        }
        AnalysisKind::KeyPoints => json!(["Key point 1", "Key point 2", "Key point 3"]),
        AnalysisKind::Sentiment => json!("neutral"),
    };
    json!({
        "status": "success",
        "analysis_type": kind.to_string(),
        "result": result,
    })
}

/// Full corpus re-indexing as a task.
pub async fn reindex_corpus(engine: Arc<QueryEngine>) -> Value {
    info!("running corpus re-index task");
    match engine.index_all_chapters().await {
        Ok(report) => json!({
            "status": "success",
            "chapters": report.chapters,
            "points": report.points,
        }),
        Err(err) => error_envelope(err),
    }
}
