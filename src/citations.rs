//! Citation assembly: mapping retrieved chunks back to corpus locations.

use crate::types::{Citation, RetrievedChunk};

/// Characters kept in a citation's content preview.
const PREVIEW_CHARS: usize = 100;

/// Section label used until chunks carry finer-grained location metadata.
const SECTION_PLACEHOLDER: &str = "Relevant Section";

/// Map retrieved chunks 1:1 into citations, preserving input order.
pub fn to_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    chunks
        .iter()
        .map(|chunk| Citation {
            chapter_id: chunk.chapter_id.clone(),
            chapter_title: chunk.title.clone(),
            section: SECTION_PLACEHOLDER.to_string(),
            content_preview: ellipsis_truncate(&chunk.text, PREVIEW_CHARS),
        })
        .collect()
}

/// First `max_chars` characters of `text`, with `"..."` appended only when
/// truncation happened. Counts characters, not bytes, so the cut can never
/// land inside a UTF-8 code point.
pub(crate) fn ellipsis_truncate(text: &str, max_chars: usize) -> String {
    let mut count = 0usize;
    for (byte_index, _) in text.char_indices() {
        if count == max_chars {
            return format!("{}...", &text[..byte_index]);
        }
        count += 1;
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelevanceScore;

    fn chunk(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chapter_id: "ch1".to_string(),
            title: "Intro".to_string(),
            text: text.to_string(),
            score: RelevanceScore::Cosine(0.5),
        }
    }

    #[test]
    fn long_text_previews_to_exactly_100_chars_plus_ellipsis() {
        let citations = to_citations(&[chunk(&"a".repeat(150))]);
        let preview = &citations[0].content_preview;
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 103);
        assert_eq!(&preview[..100], "a".repeat(100).as_str());
    }

    #[test]
    fn short_text_is_untouched() {
        let text = "b".repeat(50);
        let citations = to_citations(&[chunk(&text)]);
        assert_eq!(citations[0].content_preview, text);
    }

    #[test]
    fn boundary_text_gets_no_ellipsis() {
        let text = "c".repeat(100);
        let citations = to_citations(&[chunk(&text)]);
        assert_eq!(citations[0].content_preview, text);
    }

    #[test]
    fn order_and_fields_carry_over() {
        let chunks = vec![chunk("first"), chunk("second")];
        let citations = to_citations(&chunks);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].content_preview, "first");
        assert_eq!(citations[1].content_preview, "second");
        assert_eq!(citations[0].chapter_title, "Intro");
        assert_eq!(citations[0].section, "Relevant Section");
    }

    #[test]
    fn truncation_respects_multibyte_boundaries() {
        let text = "日".repeat(120);
        let preview = ellipsis_truncate(&text, 100);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 103);
    }
}
