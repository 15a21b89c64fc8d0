//! Text cleanup applied as the chunker's final pass.

use std::sync::OnceLock;

use regex::Regex;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn dash_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-{2,}").expect("static regex"))
}

/// Clean extracted text: drop non-ASCII characters, collapse
/// whitespace, normalize dash runs and bullet markers, and strip
/// punctuation from the start. Idempotent after one application.
pub fn clean_text(text: &str) -> String {
    let ascii: String = text.chars().filter(char::is_ascii).collect();
    let collapsed = whitespace_re().replace_all(&ascii, " ");
    let dashed = dash_run_re().replace_all(&collapsed, "-");
    dashed
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .trim()
        .to_string()
}
