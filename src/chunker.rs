//! Boundary-preferring overlapping text splitter.
//!
//! Splits extracted document text into spans of at most `chunk_size`
//! characters with `overlap` characters carried between consecutive spans.
//! A cut prefers, in order: a paragraph break, a line break, a sentence end,
//! a word gap, and only then a hard character cut.
//!
//! Splitting is deterministic: identical input always yields identical
//! boundaries, which keeps chunk index keys stable across runs.

/// Split `text` into overlapping spans. Spans are trimmed; empty spans are
/// dropped. `overlap` must be smaller than `chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size);

    let chars: Vec<char> = text.chars().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + chunk_size).min(chars.len());

        let cut = if window_end < chars.len() {
            match find_break(&chars[start..window_end]) {
                Some(rel) => start + rel,
                None => window_end,
            }
        } else {
            window_end
        };

        let span: String = chars[start..cut].iter().collect();
        let trimmed = span.trim();
        if !trimmed.is_empty() {
            spans.push(trimmed.to_string());
        }

        if cut >= chars.len() {
            break;
        }

        // Step back by the overlap, but always make forward progress.
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }

    spans
}

/// Find the best cut position inside a full window, scanning from the right.
/// Returns the index just past the separator, or None if the window has no
/// usable boundary.
fn find_break(window: &[char]) -> Option<usize> {
    let len = window.len();

    // Paragraph break
    for i in (0..len.saturating_sub(1)).rev() {
        if window[i] == '\n' && window[i + 1] == '\n' {
            if i > 0 {
                return Some(i + 2);
            }
            break;
        }
    }

    // Line break
    if let Some(i) = window.iter().rposition(|&c| c == '\n') {
        if i > 0 {
            return Some(i + 1);
        }
    }

    // Sentence end
    for i in (0..len.saturating_sub(1)).rev() {
        if window[i] == '.' && window[i + 1] == ' ' {
            if i > 0 {
                return Some(i + 2);
            }
            break;
        }
    }

    // Word gap
    if let Some(i) = window.iter().rposition(|&c| c == ' ') {
        if i > 0 {
            return Some(i + 1);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_span() {
        let spans = split_text("Hello, world!", 1000, 200);
        assert_eq!(spans, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_no_spans() {
        assert!(split_text("", 1000, 200).is_empty());
        assert!(split_text("   \n\n  ", 1000, 200).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma. ".repeat(200);
        let a = split_text(&text, 1000, 200);
        let b = split_text(&text, 1000, 200);
        assert_eq!(a, b);
    }

    #[test]
    fn test_span_length_bounded() {
        let text = "word ".repeat(2000);
        for span in split_text(&text, 1000, 200) {
            assert!(span.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let first = "First paragraph. ".repeat(3);
        let second = "Second paragraph follows here.";
        let text = format!("{}\n\n{}", first.trim(), second);
        let spans = split_text(&text, 60, 10);
        // The first cut lands on the paragraph boundary, not mid-sentence.
        assert!(spans[0].ends_with('.'));
    }

    #[test]
    fn test_overlap_carries_text() {
        let text = "one two three four five six seven eight nine ten ".repeat(50);
        let spans = split_text(&text, 100, 30);
        assert!(spans.len() > 1);
        // Consecutive spans share content from the overlap window.
        let chars: Vec<char> = spans[0].chars().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        assert!(spans[1].contains(tail.trim()));
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(2500);
        let spans = split_text(&text, 1000, 200);
        assert!(spans.len() >= 3);
        assert_eq!(spans[0].len(), 1000);
    }

    #[test]
    fn test_multibyte_safe() {
        let text = "日本語のテキスト。".repeat(300);
        let spans = split_text(&text, 1000, 200);
        assert!(!spans.is_empty());
        for span in spans {
            assert!(span.chars().count() <= 1000);
        }
    }
}
