//! Language-aware sentence tokenization.

/// Abbreviations that end with a period without ending a sentence.
fn abbreviations(language: &str) -> &'static [&'static str] {
    match language {
        "de" => &[
            "bzw", "ca", "vgl", "abb", "nr", "usw", "dr", "prof", "inkl", "zzgl", "ggf", "evtl",
            "str", "tel",
        ],
        _ => &[
            "etc", "dr", "mr", "mrs", "ms", "prof", "fig", "vs", "approx", "al", "st", "no", "vol",
            "pp", "cf", "resp",
        ],
    }
}

fn is_abbreviation(token: &str, language: &str) -> bool {
    let token = token.trim_end_matches('.').to_lowercase();
    if token.is_empty() {
        return false;
    }
    // Single letters are initials ("J. Smith"), dotted tokens are
    // compound abbreviations ("e.g.", "z.B.", "u.a.").
    if token.chars().count() == 1 || token.contains('.') {
        return true;
    }
    abbreviations(language).contains(&token.as_str())
}

/// Split `text` into sentences, keeping terminal punctuation.
///
/// A period only ends a sentence when the preceding token is not an
/// abbreviation for `language` and the following character starts a
/// new sentence (uppercase letter or digit after whitespace).
pub fn split_sentences(text: &str, language: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '!' || c == '?' || c == '.' {
            let mut end = i + 1;
            // Swallow closing quotes/brackets following the terminator.
            while end < chars.len() && matches!(chars[end], '"' | '\'' | ')' | ']') {
                end += 1;
            }

            let next_starts_sentence = {
                let mut j = end;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                j >= chars.len() || chars[j].is_uppercase() || chars[j].is_ascii_digit()
            };

            let splits = if c == '.' {
                let token: String = chars[start..i]
                    .iter()
                    .collect::<String>()
                    .split_whitespace()
                    .last()
                    .unwrap_or_default()
                    .to_string();
                // "3.14" style decimals never split.
                let decimal = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
                next_starts_sentence && !decimal && !is_abbreviation(&token, language)
            } else {
                next_starts_sentence
            };

            if splits {
                let sentence: String = chars[start..end].iter().collect();
                let sentence = sentence.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }

    let tail: String = chars[start..].iter().collect();
    let tail = tail.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_split() {
        let sentences = split_sentences("First sentence. Second one! Third?", "en");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0], "First sentence.");
        assert_eq!(sentences[2], "Third?");
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let sentences = split_sentences("See Fig. 3 for details. Then continue.", "en");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("See Fig. 3"));
    }

    #[test]
    fn test_initials_do_not_split() {
        let sentences = split_sentences("Written by J. Smith. Published later.", "en");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_decimals_do_not_split() {
        let sentences = split_sentences("The value is 3.14 exactly. Next sentence.", "en");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_german_abbreviations() {
        let sentences = split_sentences("Siehe Abb. 2 im Anhang. Danach weiter.", "de");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn test_no_terminator() {
        let sentences = split_sentences("no punctuation at all", "en");
        assert_eq!(sentences, vec!["no punctuation at all"]);
    }
}
