//! Text chunking for document ingestion.
//!
//! Character windows with overlap, trimmed back to a sentence boundary when
//! one lands in the second half of the window.

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: i64,
    pub start_offset: usize,
}

pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();

    if total == 0 || chunk_size == 0 {
        return chunks;
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;
    let mut chunk_index = 0i64;

    while start < total {
        let end = (start + chunk_size).min(total);
        let window: String = chars[start..end].iter().collect();

        let final_text = if end < total {
            trim_to_sentence_boundary(&window)
        } else {
            window
        };

        let trimmed = final_text.trim();
        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                text: trimmed.to_string(),
                chunk_index,
                start_offset: start,
            });
            chunk_index += 1;
        }

        start += step;
    }

    chunks
}

/// Cut at the last sentence terminator, but only when it falls past the
/// midpoint; a short first sentence is not worth losing half the window.
fn trim_to_sentence_boundary(window: &str) -> String {
    let midpoint = window.chars().count() / 2;
    let mut last_boundary = None;

    for (position, ch) in window.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let char_position = window[..position].chars().count();
            if char_position >= midpoint {
                last_boundary = Some(position + ch.len_utf8());
            }
        }
    }

    match last_boundary {
        Some(cut) => window[..cut].to_string(),
        None => window.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_into_chunks("", 100, 10).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_into_chunks("hello world", 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let text = "a".repeat(250);
        let chunks = split_into_chunks(&text, 100, 20);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[1].start_offset, 80);
        assert_eq!(chunks[2].start_offset, 160);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
    }

    #[test]
    fn cuts_at_late_sentence_boundary() {
        let text = format!("{}. {}", "x".repeat(70), "y".repeat(200));
        let chunks = split_into_chunks(&text, 100, 0);
        assert!(chunks[0].text.ends_with('.'));
    }

    #[test]
    fn ignores_early_sentence_boundary() {
        let text = format!("Hi. {}", "z".repeat(300));
        let chunks = split_into_chunks(&text, 100, 0);
        // The terminator sits well before the midpoint; keep the window.
        assert_eq!(chunks[0].text.chars().count(), 100);
    }

    #[test]
    fn overlap_larger_than_size_still_advances() {
        let text = "b".repeat(50);
        let chunks = split_into_chunks(&text, 10, 10);
        assert!(chunks.len() <= 50);
        assert!(!chunks.is_empty());
    }
}
