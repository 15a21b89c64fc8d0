//! LLM post-processing: metadata, summaries, table descriptions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::LlmClient;
use crate::models::{ChunkType, Document, Payload, StageError};
use crate::pipeline::{Item, ParallelMode, Stage};
use crate::utils::{count_tokens_rough, truncate_chars};

use super::prompts;

const MAX_TABLE_DESCRIPTIONS: usize = 5;

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    document_type: String,
    #[serde(default)]
    people: Vec<String>,
    #[serde(default)]
    mentioned_date: String,
    #[serde(default)]
    detected_language: String,
    #[serde(default)]
    ai_metadata: String,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    search_description: String,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    #[serde(default)]
    description: String,
}

/// Writes LLM-derived metadata and summaries into the document.
///
/// Only non-empty response fields overwrite metainfo; the summary goes
/// to `abstract` unless one is present and overwriting is disabled.
pub struct LlmPostProcessor {
    model: Arc<LlmClient>,
    describe_tables: bool,
    write_summary: bool,
    write_metadata: bool,
    overwrite_abstract: bool,
    summary_max_chunks: usize,
}

impl LlmPostProcessor {
    pub fn new(model: Arc<LlmClient>) -> Self {
        Self {
            model,
            describe_tables: false,
            write_summary: true,
            write_metadata: true,
            overwrite_abstract: false,
            summary_max_chunks: 5,
        }
    }

    pub fn with_table_descriptions(mut self, enabled: bool) -> Self {
        self.describe_tables = enabled;
        self
    }

    /// Prompt language for the document, falling back to English.
    fn prompt_language(doc: &Document) -> &str {
        let lang = if doc.metainfo.language.is_empty() {
            "en"
        } else {
            doc.metainfo.language.as_str()
        };
        if prompts::SUPPORTED_LANGUAGES.contains(&lang) {
            lang
        } else {
            tracing::warn!(%lang, "no prompts for language, using english");
            "en"
        }
    }

    /// Context shared by the metadata and summary prompts: filename,
    /// known metadata, then document content.
    fn build_inputs(&self, doc: &Document) -> (String, String) {
        let mut header = format!(
            "Filename: {}\n",
            doc.metainfo.file_features.filename
        );
        if !doc.metainfo.title.is_empty() {
            header.push_str(&format!("Title: {}\n", doc.metainfo.title));
        }
        if !doc.metainfo.extra_metainfo.is_empty() {
            header.push_str("Extra metadata: ");
            for (key, value) in &doc.metainfo.extra_metainfo {
                header.push_str(&format!("{key}: {value}\n"));
            }
        }

        // Metadata extraction sees the first two text chunks.
        let mut metadata_input = header.clone();
        metadata_input.push_str("\nDocument content: ");
        for chunk in doc
            .chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Text)
            .take(2)
        {
            metadata_input.push('\n');
            metadata_input.push_str(&chunk.text);
        }

        // The summary additionally sees more text chunks and every
        // visual page description.
        let mut summary_input = header;
        summary_input.push_str("Content: ");
        let mut text_taken = 0;
        for chunk in &doc.chunks {
            match chunk.chunk_type {
                ChunkType::Text if text_taken < self.summary_max_chunks => {
                    summary_input.push_str(&chunk.text);
                    summary_input.push('\n');
                    text_taken += 1;
                }
                ChunkType::VisualPage => {
                    summary_input.push_str(&chunk.text);
                    summary_input.push('\n');
                }
                _ => {}
            }
        }
        (metadata_input, summary_input)
    }

    /// Truncate to roughly 95% of the model's input budget.
    fn fit_budget(&self, input: String) -> String {
        let budget = self.model.max_input_tokens();
        let tokens = count_tokens_rough(&input);
        if tokens <= budget {
            return input;
        }
        let chars = input.chars().count();
        let keep = (0.95 * chars as f64 * budget as f64 / tokens as f64) as usize;
        tracing::warn!(tokens, budget, "llm input too long, truncating");
        truncate_chars(&input, keep).to_string()
    }

    async fn add_table_descriptions(&self, doc: &mut Document, language: &str) {
        let mut described = 0;
        for chunk in &mut doc.chunks {
            if described >= MAX_TABLE_DESCRIPTIONS {
                break;
            }
            if chunk.chunk_type != ChunkType::Table {
                continue;
            }
            let Some(Payload::Html(html)) = &chunk.non_embeddable_content else {
                continue;
            };
            match self
                .model
                .generate_structured::<TableResponse>(
                    prompts::table_prompt(language),
                    html,
                    0.2,
                    None,
                )
                .await
            {
                Ok(response) if !response.description.is_empty() => {
                    chunk.text = response.description;
                    described += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(%e, "table description failed"),
            }
        }
    }

    fn apply_metadata(doc: &mut Document, response: MetadataResponse) {
        let meta = &mut doc.metainfo;
        if !response.title.is_empty() {
            meta.title = response.title;
        }
        if !response.document_type.is_empty() {
            meta.document_type = response.document_type;
        }
        if !response.people.is_empty() {
            meta.authors = response.people;
        }
        // Models sometimes return prose instead of a date; keep only
        // well-formed values.
        if chrono::NaiveDate::parse_from_str(&response.mentioned_date, "%Y-%m-%d").is_ok() {
            meta.mentioned_date = response.mentioned_date;
        }
        if !response.detected_language.is_empty() {
            meta.detected_language = response.detected_language;
        }
        if !response.ai_metadata.is_empty() {
            meta.extra_metainfo
                .insert("ai_metadata".to_string(), response.ai_metadata);
        }
    }
}

#[async_trait]
impl Stage for LlmPostProcessor {
    fn name(&self) -> &'static str {
        "llm_postprocess"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let language = Self::prompt_language(&doc).to_string();

        if self.describe_tables {
            self.add_table_descriptions(&mut doc, &language).await;
        }

        let (metadata_input, summary_input) = self.build_inputs(&doc);

        if self.write_summary && (doc.metainfo.abstract_.is_empty() || self.overwrite_abstract) {
            let response: SummaryResponse = self
                .model
                .generate_structured(
                    prompts::summary_prompt(&language),
                    &self.fit_budget(summary_input),
                    0.4,
                    Some(1000),
                )
                .await?;
            if !response.summary.is_empty() {
                doc.metainfo.abstract_ = response.summary;
            }
            if !response.search_description.is_empty() {
                doc.metainfo.search_description = response.search_description;
            }
        }

        if self.write_metadata {
            let response: MetadataResponse = self
                .model
                .generate_structured(
                    prompts::metadata_prompt(&language),
                    &self.fit_budget(metadata_input),
                    0.2,
                    Some(500),
                )
                .await?;
            Self::apply_metadata(&mut doc, response);
        }
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmConfig;
    use crate::models::{Chunk, FileFeatures, FileRef};

    fn processor() -> LlmPostProcessor {
        let client =
            LlmClient::new(LlmConfig::new("http://localhost:1", "test-model")).unwrap();
        LlmPostProcessor::new(Arc::new(client))
    }

    fn doc() -> Document {
        let mut doc = Document::new(
            FileFeatures::new("report.pdf", FileRef::Memory(Vec::new())),
            "en",
        );
        doc.metainfo.title = "Quarterly Report".to_string();
        doc.chunks = vec![
            Chunk::text("first chunk of text"),
            Chunk::text("second chunk of text"),
            Chunk::text("third chunk of text"),
            Chunk {
                text: "a rendered page showing a bar chart".to_string(),
                chunk_type: ChunkType::VisualPage,
                ..Chunk::default()
            },
        ];
        doc
    }

    #[test]
    fn test_metadata_input_limited_to_two_chunks() {
        let (metadata_input, _) = processor().build_inputs(&doc());
        assert!(metadata_input.contains("first chunk"));
        assert!(metadata_input.contains("second chunk"));
        assert!(!metadata_input.contains("third chunk"));
        assert!(metadata_input.contains("Filename: report.pdf"));
    }

    #[test]
    fn test_summary_input_includes_visual_pages() {
        let (_, summary_input) = processor().build_inputs(&doc());
        assert!(summary_input.contains("third chunk"));
        assert!(summary_input.contains("bar chart"));
    }

    #[test]
    fn test_apply_metadata_skips_empty_fields() {
        let mut document = doc();
        LlmPostProcessor::apply_metadata(
            &mut document,
            MetadataResponse {
                title: String::new(),
                document_type: "report".to_string(),
                people: Vec::new(),
                mentioned_date: "2024-01-01".to_string(),
                detected_language: String::new(),
                ai_metadata: String::new(),
            },
        );
        assert_eq!(document.metainfo.title, "Quarterly Report");
        assert_eq!(document.metainfo.document_type, "report");
        assert_eq!(document.metainfo.mentioned_date, "2024-01-01");
    }

    #[test]
    fn test_prompt_language_fallback() {
        let mut document = doc();
        document.metainfo.language = "fr".to_string();
        assert_eq!(LlmPostProcessor::prompt_language(&document), "en");
        document.metainfo.language = "de".to_string();
        assert_eq!(LlmPostProcessor::prompt_language(&document), "de");
    }
}
