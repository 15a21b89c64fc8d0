//! Dictionary-based text quality scoring.
//!
//! The score is the fraction of long tokens (more than four characters)
//! found in the language's word list, optionally scaled by a
//! per-language weight. Languages without a loaded word list pass with
//! a score of 1.0, so quality filtering only ever applies where a
//! dictionary exists.

use std::collections::{HashMap, HashSet};
use std::path::Path;

const MIN_TOKEN_CHARS: usize = 4;

/// Word lists keyed by ISO 639-1 language code.
#[derive(Debug, Default)]
pub struct Lexicons {
    words: HashMap<String, HashSet<String>>,
    weights: HashMap<String, f64>,
}

impl Lexicons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<lang>.txt` word lists (one word per line) from a directory.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        let mut lexicons = Self::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "txt") {
                if let Some(lang) = path.file_stem().and_then(|s| s.to_str()) {
                    let content = std::fs::read_to_string(&path)?;
                    lexicons.insert_words(lang, content.lines());
                }
            }
        }
        Ok(lexicons)
    }

    pub fn insert_words<'a>(&mut self, language: &str, words: impl IntoIterator<Item = &'a str>) {
        let set = self.words.entry(language.to_string()).or_default();
        for word in words {
            let word = word.trim().to_lowercase();
            if !word.is_empty() {
                set.insert(word);
            }
        }
    }

    pub fn set_weight(&mut self, language: &str, weight: f64) {
        self.weights.insert(language.to_string(), weight);
    }

    /// Score `text` against the `language` word list.
    pub fn score(&self, text: &str, language: &str) -> f64 {
        let Some(words) = self.words.get(language) else {
            return 1.0;
        };

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() > MIN_TOKEN_CHARS)
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            return 0.0;
        }

        let hits = tokens.iter().filter(|t| words.contains(*t)).count();
        let weight = self.weights.get(language).copied().unwrap_or(1.0);
        weight * hits as f64 / tokens.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn english() -> Lexicons {
        let mut lexicons = Lexicons::new();
        lexicons.insert_words(
            "en",
            ["transformer", "attention", "architecture", "results", "model"],
        );
        lexicons
    }

    #[test]
    fn test_unknown_language_passes() {
        assert_eq!(english().score("xyzzy frobnicate", "fr"), 1.0);
    }

    #[test]
    fn test_no_long_tokens_scores_zero() {
        assert_eq!(english().score("a b c of the", "en"), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        // transformer + attention hit; garbled misses.
        let score = english().score("transformer attention qzwxec mnbvcx", "en");
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_weight_scales_score() {
        let mut lexicons = english();
        lexicons.set_weight("en", 0.5);
        let score = lexicons.score("transformer attention", "en");
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_case_insensitive() {
        let score = english().score("Transformer ATTENTION", "en");
        assert!((score - 1.0).abs() < 1e-9);
    }
}
