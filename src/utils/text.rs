//! Text helpers shared by extractors and the LLM post-processor.

use std::sync::OnceLock;

use regex::Regex;

/// Rough token count: whitespace and common punctuation boundaries.
/// Good enough for budgeting LLM input; not a real tokenizer.
pub fn count_tokens_rough(text: &str) -> usize {
    text.split(|c: char| c.is_whitespace() || "()[]{}.,:;+=*/\\\"'<>-".contains(c))
        .filter(|t| !t.is_empty())
        .count()
}

/// Rejoin words hyphenated across line breaks and flatten newlines.
pub fn remove_hyphenation(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\w+)-\s*\n\s*(\w+)").expect("static regex"));
    re.replace_all(text, "$1$2").replace('\n', " ")
}

/// Group lines into blocks of `lines_per_chunk`, dropping lines the
/// filter rejects.
pub fn split_text_by_lines<F>(text: &str, lines_per_chunk: usize, keep: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let lines: Vec<&str> = text.lines().filter(|line| keep(line)).collect();
    lines
        .chunks(lines_per_chunk.max(1))
        .map(|group| group.join("\n"))
        .collect()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens_rough() {
        assert_eq!(count_tokens_rough("one two, three.four"), 4);
        assert_eq!(count_tokens_rough(""), 0);
    }

    #[test]
    fn test_remove_hyphenation() {
        assert_eq!(
            remove_hyphenation("hyphen-\nated word\nhere"),
            "hyphenated word here"
        );
    }

    #[test]
    fn test_split_text_by_lines() {
        let text = "a\n\nb\nc\nd";
        let chunks = split_text_by_lines(text, 2, |line| !line.is_empty());
        assert_eq!(chunks, vec!["a\nb", "c\nd"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("h\u{e9}llo", 2), "h\u{e9}");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
