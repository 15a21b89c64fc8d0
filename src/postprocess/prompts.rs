//! Prompt templates for the LLM post-processor.
//!
//! Prompts are data, keyed by purpose and language. Unsupported
//! languages fall back to English at the lookup site.

pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "de"];

pub fn summary_prompt(language: &str) -> &'static str {
    match language {
        "de" => {
            "Sie sind Bibliothekar und f\u{fc}hren die Indizierung der Bibliothek durch. \
             F\u{fc}r jeden bereitgestellten Eintrag stehen Ihnen unterschiedliche Informationen \
             zur Verf\u{fc}gung. Schreiben Sie eine kurze Zusammenfassung (bis zu 6-7 S\u{e4}tze) \
             dazu. F\u{fc}gen Sie nur semantische Informationen ein, die f\u{fc}r die Suche in \
             diesem Dokument n\u{fc}tzlich sind. Wenn in den bereitgestellten Informationen eine \
             Zusammenfassung gefunden wird, geben Sie diese zur\u{fc}ck, anstatt eine neue zu \
             schreiben. F\u{fc}gen Sie keine Informationen \u{fc}ber Artikelstruktur, Seitenzahl \
             usw. ein. Schreiben Sie zus\u{e4}tzlich eine Suchbeschreibung von einem Satz in das \
             Feld \"search_description\". Wenn keine Informationen gefunden werden, geben Sie \
             leere Zeichenfolgen zur\u{fc}ck. Geben Sie die Ausgabe als reines JSON ohne \
             zus\u{e4}tzliche Zeichen zur\u{fc}ck, gem\u{e4}\u{df} dem Schema \
             {\"summary\": Zusammenfassung, \"search_description\": Suchbeschreibung}"
        }
        _ => {
            "You are a librarian, performing indexing of the library. For every provided \
             entry, you have different information available. Write a short summary (up to \
             6-7 sentences) for it. Only include semantic information useful to search this \
             document. If an abstract is found in the information provided, return it instead \
             of writing a summary. Do not include information about article structure, number \
             of pages, etc. Additionally write a one-sentence search description into the \
             \"search_description\" field. If no information is found, return empty strings. \
             Return output as raw json without any extra characters, according to schema \
             {\"summary\": summary you extracted, \"search_description\": search description}"
        }
    }
}

pub fn metadata_prompt(language: &str) -> &'static str {
    match language {
        "de" => {
            "Sie sind Bibliothekar und f\u{fc}hren die Indizierung der Bibliothek durch. Ihre \
             Aufgabe besteht darin, Metadaten aus dem Dokument zu extrahieren. Zu den Metadaten \
             geh\u{f6}ren: Titel, Dokumenttyp, beteiligte Personen, im Dokument erw\u{e4}hntes \
             Datum, Sprache des Dokuments. Wenn kein Titel vorhanden ist, erstellen Sie ihn; \
             der Titel sollte aus mindestens 8-10 W\u{f6}rtern bestehen. Nicht vorhandene Felder \
             als leere Zeichenfolgen zur\u{fc}ckgeben. F\u{fc}r Datumsangaben das Format \
             JJJJ-MM-TT verwenden. Die Sprache als ISO-639-1-Code angeben. Wenn zus\u{e4}tzliche \
             Metadaten wie Firmennamen, Teilnehmer, Orte, Preise oder Betr\u{e4}ge vorhanden \
             sind, f\u{fc}gen Sie diese unter \"ai_metadata\" ein, aber halten Sie sie unter 50 \
             W\u{f6}rtern. Geben Sie die Ausgabe als reines JSON ohne zus\u{e4}tzliche Zeichen \
             zur\u{fc}ck, gem\u{e4}\u{df} dem Schema {\"title\": Titel, \"document_type\": \
             Dokumenttyp, \"people\": [Personen], \"mentioned_date\": Datum, \
             \"detected_language\": Sprache, \"ai_metadata\": Zusatzmetadaten}"
        }
        _ => {
            "You are a librarian, performing indexing of the library. Your task is to extract \
             metadata from the document. Metadata includes: title, document type, people \
             involved, a date mentioned in the document, and the document's language. If a \
             title is not present, create it; the title should consist of at least 8-10 words \
             describing the document. Return missing fields as empty strings. Use the format \
             YYYY-MM-DD for dates. Report the language as an ISO 639-1 code. If extra metadata \
             such as company names, participants, locations, prices, or amounts is present, \
             include it as text in the \"ai_metadata\" field, but keep it below 50 words. \
             Return output as raw json without any extra characters, according to schema \
             {\"title\": title, \"document_type\": document type, \"people\": [people], \
             \"mentioned_date\": date, \"detected_language\": language, \
             \"ai_metadata\": extra metadata}"
        }
    }
}

pub fn table_prompt(language: &str) -> &'static str {
    match language {
        "de" => {
            "Sie sind Bibliothekar und f\u{fc}hren eine Indexierung der Bibliothek durch. Sie \
             erhalten eine als HTML kodierte Tabelle. Schreiben Sie eine sehr kurze \
             Zusammenfassung (3-4 S\u{e4}tze) dazu. F\u{fc}gen Sie nur semantische Informationen \
             ein, die zum Auffinden dieser Tabelle n\u{fc}tzlich sind. Wenn keine Informationen \
             gefunden werden, geben Sie eine leere Zeichenfolge zur\u{fc}ck. Geben Sie die \
             Ausgabe als reines JSON ohne zus\u{e4}tzliche Zeichen zur\u{fc}ck, gem\u{e4}\u{df} \
             dem Schema {\"description\": Beschreibung}"
        }
        _ => {
            "You are a librarian, performing indexing of the library. You will be provided \
             with a table encoded as HTML. Write a very short summary (3-4 sentences) for it. \
             Only include semantic information useful to find this table. If no information is \
             found, return an empty string. Return output as raw json without any extra \
             characters, according to schema {\"description\": description you extracted}"
        }
    }
}
