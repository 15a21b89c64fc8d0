//! Plain-text extraction.

use async_trait::async_trait;

use crate::models::{Chunk, StageError};
use crate::pipeline::{Item, ParallelMode, Stage};
use crate::utils::split_text_by_lines;

/// Reads a text file and emits line-grouped text chunks.
pub struct RawTextExtractor {
    lines_per_chunk: usize,
}

impl RawTextExtractor {
    pub fn new(lines_per_chunk: usize) -> Self {
        Self { lines_per_chunk }
    }
}

impl Default for RawTextExtractor {
    fn default() -> Self {
        Self::new(12)
    }
}

#[async_trait]
impl Stage for RawTextExtractor {
    fn name(&self) -> &'static str {
        "raw_text"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let bytes = doc.file()?.read()?;
        let text = String::from_utf8_lossy(&bytes);

        for group in split_text_by_lines(&text, self.lines_per_chunk, |line| !line.is_empty()) {
            if group.is_empty() {
                continue;
            }
            doc.chunks.push(Chunk::text(group));
        }
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, FileFeatures, FileRef};

    #[tokio::test]
    async fn test_groups_lines() {
        let content = (0..30).map(|i| format!("line {i}")).collect::<Vec<_>>();
        let doc = Document::new(
            FileFeatures::new(
                "notes.txt",
                FileRef::Memory(content.join("\n").into_bytes()),
            ),
            "en",
        );
        let extractor = RawTextExtractor::new(12);
        let result = extractor
            .process_single(Item::Document(doc))
            .await
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(result.chunks.len(), 3);
        assert!(result.chunks[0].text.starts_with("line 0"));
        assert!(result.chunks[2].text.ends_with("line 29"));
    }
}
