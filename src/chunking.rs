//! Fixed-size chunking of chapter text.
//!
//! Chapters are split into character windows of `chunk_size` so that every
//! character of the source appears in exactly one chunk, in order, with no
//! overlap. The last chunk may be shorter than `chunk_size`. Splitting is
//! done on characters rather than bytes so a window boundary can never land
//! inside a UTF-8 code point.

use crate::types::{Chapter, Chunk};

/// Default chunk window, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Split a chapter's body into ordered, contiguous chunks.
///
/// Returns an empty vector for an empty body. `chunk_size` must be non-zero;
/// a zero size is clamped to 1 so the function stays total.
///
/// The concatenation of the returned chunk texts reproduces the chapter body
/// exactly, and `total_chunks` on every chunk equals
/// `ceil(char_count / chunk_size)`.
pub fn chunk_text(chapter: &Chapter, chunk_size: usize) -> Vec<Chunk> {
    debug_assert!(chunk_size > 0, "chunk_size must be non-zero");
    let size = chunk_size.max(1);

    let chars: Vec<char> = chapter.full_text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let total_chunks = chars.len().div_ceil(size);
    chars
        .chunks(size)
        .enumerate()
        .map(|(chunk_index, window)| Chunk {
            chapter_id: chapter.chapter_id.clone(),
            chunk_index,
            text: window.iter().collect(),
            total_chunks,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chapter(text: &str) -> Chapter {
        Chapter::new("ch-test", "Test", text, 1)
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text(&chapter(""), 500).is_empty());
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let chunks = chunk_text(&chapter(&"a".repeat(1000)), 500);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.text.chars().count() == 500));
        assert!(chunks.iter().all(|c| c.total_chunks == 2));
    }

    #[test]
    fn last_chunk_may_be_shorter() {
        let chunks = chunk_text(&chapter(&"b".repeat(1201)), 500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.chars().count(), 201);
        assert_eq!(chunks[2].chunk_index, 2);
    }

    #[test]
    fn multibyte_text_splits_on_character_boundaries() {
        // Each char below is multi-byte; byte-window slicing would panic.
        let text = "señor café 日本語のテキスト über alles".repeat(40);
        let chunks = chunk_text(&chapter(&text), 7);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    proptest! {
        #[test]
        fn chunks_cover_text_exactly(text in ".{0,2000}", size in 1usize..600) {
            let ch = chapter(&text);
            let chunks = chunk_text(&ch, size);

            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            prop_assert_eq!(&rebuilt, &text);

            let char_count = text.chars().count();
            let expected = char_count.div_ceil(size);
            prop_assert_eq!(chunks.len(), if char_count == 0 { 0 } else { expected });

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_index, i);
                prop_assert_eq!(chunk.total_chunks, chunks.len());
            }
        }
    }
}
