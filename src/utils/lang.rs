//! Natural-language identification.

use whatlang::Lang;

/// Detect the dominant language of `text` as an ISO 639-1 code.
///
/// Detection falls back to English when the text is too short or the
/// classifier is not confident, matching the pipeline's default
/// language behavior.
pub fn detect_language(text: &str) -> String {
    let Some(info) = whatlang::detect(text) else {
        return "en".to_string();
    };
    if !info.is_reliable() {
        return "en".to_string();
    }
    iso639_1(info.lang()).to_string()
}

fn iso639_1(lang: Lang) -> &'static str {
    match lang {
        Lang::Eng => "en",
        Lang::Deu => "de",
        Lang::Fra => "fr",
        Lang::Spa => "es",
        Lang::Ita => "it",
        Lang::Nld => "nl",
        Lang::Por => "pt",
        Lang::Pol => "pl",
        Lang::Rus => "ru",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Fin => "fi",
        Lang::Tur => "tr",
        Lang::Ces => "cs",
        _ => "en",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        let text = "The quick brown fox jumps over the lazy dog and keeps \
                    running through the quiet English countryside all day.";
        assert_eq!(detect_language(text), "en");
    }

    #[test]
    fn test_detects_german() {
        let text = "Die Kommunalbeh\u{f6}rden haben heute eine neue Verordnung \
                    ver\u{f6}ffentlicht, die alle B\u{fc}rgerinnen und B\u{fc}rger der \
                    Stadt unmittelbar betrifft und erhebliche \u{c4}nderungen bringt.";
        assert_eq!(detect_language(text), "de");
    }

    #[test]
    fn test_short_text_falls_back_to_english() {
        assert_eq!(detect_language("ab"), "en");
    }
}
