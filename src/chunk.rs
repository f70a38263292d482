//! Paragraph splitting and oversized-block splitting.
//!
//! Extraction yields paragraph-sized blocks; any block longer than the
//! configured `max_block_chars` is split on a line or whitespace boundary.
//! Lengths are counted in characters, never bytes, so multi-byte text is
//! never cut inside a code point.

/// Split plain text into paragraphs separated by one or more blank lines.
/// Returned paragraphs are trimmed and non-empty.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut paragraphs);

    paragraphs
}

fn flush(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = lines.join("\n").trim().to_string();
    if !paragraph.is_empty() {
        out.push(paragraph);
    }
    lines.clear();
}

/// Split `text` into trimmed pieces of at most `max_chars` characters,
/// preferring the last newline, then the last whitespace, inside each window.
pub fn split_oversized(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if max_chars == 0 || text.chars().count() <= max_chars {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        // Byte offset just past the first `max_chars` characters.
        let window_end = match remaining.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => remaining.len(),
        };

        let split_at = if window_end < remaining.len() {
            let window = &remaining[..window_end];
            window
                .rfind('\n')
                .or_else(|| window.rfind(char::is_whitespace))
                .filter(|&pos| pos > 0)
                .unwrap_or(window_end)
        } else {
            window_end
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let text = "First line\nstill first.\n\n  \nSecond paragraph.\n\n\nThird.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(
            paragraphs,
            vec!["First line\nstill first.", "Second paragraph.", "Third."]
        );
    }

    #[test]
    fn test_empty_text_has_no_paragraphs() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs("\n\n   \n").is_empty());
    }

    #[test]
    fn test_short_text_is_untouched() {
        assert_eq!(split_oversized("  hello world  ", 100), vec!["hello world"]);
    }

    #[test]
    fn test_oversized_splits_on_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let pieces = split_oversized(text, 12);
        assert!(pieces.iter().all(|p| p.chars().count() <= 12));
        assert_eq!(pieces.join(" "), text);
    }

    #[test]
    fn test_oversized_without_whitespace_hard_splits() {
        let text = "x".repeat(25);
        let pieces = split_oversized(&text, 10);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2].len(), 5);
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(15);
        let pieces = split_oversized(&text, 4);
        assert!(pieces.iter().all(|p| p.chars().count() <= 4));
        assert_eq!(pieces.concat(), text);
    }
}
