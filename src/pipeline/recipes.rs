//! Recipe registry: file extension to pipeline template.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunking::{ChunkLimits, Lexicons, SimpleChunker, StandardChunker};
use crate::config::{PdfExtractorKind, Settings};
use crate::converters::LibreOfficeConverter;
use crate::extractors::{
    FileInfoExtractor, GrobidTextExtractor, MarkdownExtractor, PartitionTextExtractor,
    RawTextExtractor, TikaExtractor, TikaSpreadsheetExtractor, VisualPageExtractor,
};
use crate::llm::LlmClient;
use crate::models::StageError;
use crate::postprocess::LlmPostProcessor;
use crate::thumbnails::Thumbnailer;

use super::{Pipeline, Stage};

/// Materialized pipelines, one per registered extension.
///
/// Each dispatcher instance builds its recipes once; the LLM and
/// vision-model handles are injected here and shared by every stage
/// that needs them.
pub struct Recipes {
    pipelines: HashMap<&'static str, Pipeline>,
}

impl Recipes {
    pub fn build(
        settings: &Settings,
        text_model: Arc<LlmClient>,
        vision_model: Arc<LlmClient>,
    ) -> Result<Self, StageError> {
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| StageError::External(format!("http client: {e}")))?;

        let lexicons = Arc::new(match &settings.dictionary_dir {
            Some(dir) => Lexicons::load_dir(dir)?,
            None => Lexicons::new(),
        });
        let standard_chunker = || -> Arc<dyn Stage> {
            Arc::new(StandardChunker::new(
                ChunkLimits::default(),
                Arc::clone(&lexicons),
                settings.clean_chunks,
            ))
        };
        let simple_chunker = || -> Arc<dyn Stage> {
            Arc::new(SimpleChunker::new(
                settings.max_chunk_len,
                settings.chunk_overlap,
            ))
        };
        let postprocessor = || -> Arc<dyn Stage> {
            Arc::new(
                LlmPostProcessor::new(Arc::clone(&text_model))
                    .with_table_descriptions(settings.llm_table_descriptions),
            )
        };
        let visual = || -> Arc<dyn Stage> {
            Arc::new(VisualPageExtractor::new(
                Arc::clone(&vision_model),
                settings.visual_max_pages,
                true,
            ))
        };
        let office_meta = || -> Arc<dyn Stage> {
            Arc::new(crate::extractors::OfficeMetaExtractor)
        };
        let thumbnailer = || -> Arc<dyn Stage> { Arc::new(Thumbnailer) };

        let pdf_text: Arc<dyn Stage> = match settings.pdf_extractor {
            PdfExtractorKind::Tika => Arc::new(TikaExtractor::new(
                http.clone(),
                settings.tika_url.clone(),
                settings.tika_ocr_strategy,
                true,
            )),
            PdfExtractorKind::Grobid => Arc::new(GrobidTextExtractor::new(
                http.clone(),
                settings.grobid_url.clone(),
                settings.max_pages,
                true,
            )),
            PdfExtractorKind::Partition => Arc::new(PartitionTextExtractor::new(
                http.clone(),
                settings.partition_url.clone(),
            )),
        };

        let mut pipelines: HashMap<&'static str, Pipeline> = HashMap::new();

        // pdf: probe file facts, extract text and figures, describe the
        // first pages visually, enrich with the LLM, regularize chunks.
        pipelines.insert(
            "pdf",
            Pipeline::new(vec![
                Arc::new(FileInfoExtractor::new(
                    settings.max_pages,
                    settings.ocr_trigger_chars,
                )),
                pdf_text,
                visual(),
                postprocessor(),
                standard_chunker(),
            ]),
        );

        // docx and friends carry their metadata as XML inside the
        // container; pandoc turns the body into markdown.
        for ext in ["docx", "odt"] {
            pipelines.insert(
                ext,
                Pipeline::new(vec![
                    office_meta(),
                    thumbnailer(),
                    Arc::new(MarkdownExtractor::default()),
                    postprocessor(),
                    simple_chunker(),
                ]),
            );
        }

        // doc is not a zip container: convert to docx first, then take
        // the docx path.
        pipelines.insert(
            "doc",
            Pipeline::new(vec![
                thumbnailer(),
                Arc::new(LibreOfficeConverter::new("docx")),
                office_meta(),
                Arc::new(MarkdownExtractor::default()),
                postprocessor(),
                simple_chunker(),
            ]),
        );

        // Presentations render best as PDF pages: convert, extract
        // text, and let the vision model describe the slides.
        for ext in ["ppt", "pptx"] {
            pipelines.insert(
                ext,
                Pipeline::new(vec![
                    office_meta(),
                    Arc::new(LibreOfficeConverter::new("pdf")),
                    Arc::new(TikaExtractor::new(
                        http.clone(),
                        settings.tika_url.clone(),
                        settings.tika_ocr_strategy,
                        false,
                    )),
                    visual(),
                    postprocessor(),
                    standard_chunker(),
                ]),
            );
        }

        // Spreadsheets become markdown wholesale; no chunker, the
        // sheet grouping is already the right granularity.
        for ext in ["xls", "xlsx", "ods"] {
            pipelines.insert(
                ext,
                Pipeline::new(vec![
                    office_meta(),
                    thumbnailer(),
                    Arc::new(TikaSpreadsheetExtractor::new(
                        http.clone(),
                        settings.tika_url.clone(),
                    )),
                    postprocessor(),
                ]),
            );
        }

        pipelines.insert(
            "txt",
            Pipeline::new(vec![
                thumbnailer(),
                Arc::new(RawTextExtractor::default()),
                postprocessor(),
                standard_chunker(),
            ]),
        );

        Ok(Self { pipelines })
    }

    pub fn get(&self, extension: &str) -> Option<&Pipeline> {
        self.pipelines.get(extension)
    }

    pub fn extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self.pipelines.keys().copied().collect();
        extensions.sort_unstable();
        extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmConfig;

    fn recipes() -> Recipes {
        let model =
            Arc::new(LlmClient::new(LlmConfig::new("http://localhost:1", "m")).unwrap());
        Recipes::build(&Settings::default(), Arc::clone(&model), model).unwrap()
    }

    #[test]
    fn test_all_documented_extensions_registered() {
        let recipes = recipes();
        for ext in ["pdf", "doc", "docx", "odt", "ppt", "pptx", "xls", "xlsx", "ods", "txt"] {
            assert!(recipes.get(ext).is_some(), "missing recipe for {ext}");
        }
        assert!(recipes.get("xyz").is_none());
    }

    #[test]
    fn test_extensions_sorted() {
        let extensions = recipes().extensions();
        let mut sorted = extensions.clone();
        sorted.sort_unstable();
        assert_eq!(extensions, sorted);
    }
}
