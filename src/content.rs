//! Content store seam.
//!
//! The engine reads chapters through the [`ContentStore`] trait and never
//! mutates them. Two implementations ship with the crate: a fixture-friendly
//! in-memory store and a loader for the markdown chapter files the textbook
//! frontend is built from.

use async_trait::async_trait;
use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::Chapter;

/// Errors surfaced by content store implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum ContentError {
    /// The backing files could not be read.
    #[error("failed to read chapter content: {0}")]
    #[diagnostic(code(marginalia::content::io))]
    Io(String),

    /// A chapter id was requested that the store does not know.
    #[error("unknown chapter: {chapter_id}")]
    #[diagnostic(code(marginalia::content::unknown_chapter))]
    UnknownChapter { chapter_id: String },
}

/// Read-only access to the chapter corpus.
///
/// Implementations must return chapters in a stable order from
/// [`list_chapters`](Self::list_chapters); the keyword retrieval tier uses
/// that order to break ties.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All chapters, in chapter order.
    async fn list_chapters(&self) -> Result<Vec<Chapter>, ContentError>;

    /// A single chapter, or `None` when the id is unknown.
    async fn chapter(&self, chapter_id: &str) -> Result<Option<Chapter>, ContentError>;
}

/// In-memory content store for fixtures, tests, and embedded corpora.
#[derive(Clone, Debug, Default)]
pub struct StaticContentStore {
    chapters: Vec<Chapter>,
}

impl StaticContentStore {
    pub fn new(mut chapters: Vec<Chapter>) -> Self {
        chapters.sort_by_key(|c| c.chapter_number);
        Self { chapters }
    }

    /// An empty corpus.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for StaticContentStore {
    async fn list_chapters(&self) -> Result<Vec<Chapter>, ContentError> {
        Ok(self.chapters.clone())
    }

    async fn chapter(&self, chapter_id: &str) -> Result<Option<Chapter>, ContentError> {
        Ok(self
            .chapters
            .iter()
            .find(|c| c.chapter_id == chapter_id)
            .cloned())
    }
}

/// Content store that loads `chNN-*.md` chapter files from a directory.
///
/// File stems become chapter ids (`ch2-basics-of-humanoid-robotics.md` →
/// `ch2-basics-of-humanoid-robotics`), the leading `chNN` prefix supplies the
/// chapter number, and the title is recovered from the stem. A `---`
/// frontmatter fence at the top of a file is stripped from the body.
/// Unreadable files are skipped with a warning rather than failing the whole
/// corpus.
#[derive(Clone, Debug)]
pub struct MarkdownContentStore {
    docs_dir: PathBuf,
}

impl MarkdownContentStore {
    pub fn new(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
        }
    }

    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    async fn load_all(&self) -> Result<Vec<Chapter>, ContentError> {
        let mut entries = tokio::fs::read_dir(&self.docs_dir)
            .await
            .map_err(|err| ContentError::Io(err.to_string()))?;

        let mut chapters = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ContentError::Io(err.to_string()))?
        {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(number) = parse_chapter_number(stem) else {
                debug!(file = %path.display(), "skipping non-chapter markdown file");
                continue;
            };

            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => {
                    chapters.push(Chapter {
                        chapter_id: stem.to_string(),
                        title: title_from_stem(stem),
                        full_text: strip_frontmatter(&raw).to_string(),
                        chapter_number: number,
                    });
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping unreadable chapter file");
                }
            }
        }

        chapters.sort_by_key(|c| c.chapter_number);
        Ok(chapters)
    }
}

#[async_trait]
impl ContentStore for MarkdownContentStore {
    async fn list_chapters(&self) -> Result<Vec<Chapter>, ContentError> {
        self.load_all().await
    }

    async fn chapter(&self, chapter_id: &str) -> Result<Option<Chapter>, ContentError> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|c| c.chapter_id == chapter_id))
    }
}

/// Extract `N` from a `chN-...` file stem.
fn parse_chapter_number(stem: &str) -> Option<u32> {
    let rest = stem.strip_prefix("ch")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Turn `ch1-introduction-to-physical-ai` into `Introduction To Physical Ai`.
fn title_from_stem(stem: &str) -> String {
    let words: Vec<String> = stem
        .split('-')
        .skip(1)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    words.join(" ")
}

/// Strip a leading `---` frontmatter fence, returning the body after the
/// closing fence. Text without a fence is returned unchanged.
fn strip_frontmatter(raw: &str) -> &str {
    let trimmed = raw.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---") else {
        return raw;
    };
    match rest.find("\n---") {
        Some(pos) => {
            let after = &rest[pos + 4..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => raw,
    }
}
