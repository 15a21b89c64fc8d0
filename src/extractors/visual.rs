//! Visual page extraction: rasterize, describe, record.

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::models::{Chunk, ChunkType, Payload, StageError};
use crate::pdf;
use crate::pipeline::{Item, ParallelMode, Stage};

const RASTER_DPI: u32 = 100;

fn page_prompt(language: &str) -> &'static str {
    match language {
        "de" => {
            "Sie erhalten eine Seite des Dokuments. Fassen Sie den Inhalt in mehreren \
             S\u{e4}tzen zusammen (nicht mehr als 250 W\u{f6}rter)."
        }
        _ => {
            "You will receive a page of the document. Summarize the content in several \
             sentences (no more than 250 words)."
        }
    }
}

/// Rasterizes the first pages of a PDF and asks the vision model to
/// describe each one. Every description becomes a visual-page chunk
/// carrying the page image; the first page also becomes the thumbnail
/// unless suppressed.
pub struct VisualPageExtractor {
    model: Arc<LlmClient>,
    max_pages: u32,
    update_thumbnail: bool,
}

impl VisualPageExtractor {
    pub fn new(model: Arc<LlmClient>, max_pages: u32, update_thumbnail: bool) -> Self {
        Self {
            model,
            max_pages,
            update_thumbnail,
        }
    }
}

#[async_trait]
impl Stage for VisualPageExtractor {
    fn name(&self) -> &'static str {
        "visual_pages"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let path = doc.file_path()?;

        let images = pdf::rasterize_pages(&path, self.max_pages, RASTER_DPI)?;
        if self.update_thumbnail {
            doc.metainfo.thumbnail = images.first().cloned();
        }

        let language = if doc.metainfo.language.is_empty() {
            "en"
        } else {
            doc.metainfo.language.as_str()
        };
        let prompt = page_prompt(language);

        for (index, image) in images.iter().enumerate() {
            let description = match self
                .model
                .describe_image(prompt, image, 0.2, Some(1000))
                .await
            {
                Ok(description) => description,
                Err(e) => {
                    tracing::warn!(page = index + 1, %e, "vision model gave no description");
                    continue;
                }
            };
            doc.chunks.push(Chunk {
                page: Some(index as u32 + 1),
                text: description,
                non_embeddable_content: Some(Payload::Image(image.clone())),
                chunk_type: ChunkType::VisualPage,
                ..Chunk::default()
            });
        }
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_language_selection() {
        assert!(page_prompt("de").contains("Seite"));
        assert!(page_prompt("en").contains("page"));
        // Unsupported languages fall back to English.
        assert!(page_prompt("fr").contains("page"));
    }
}
