//! File-info stage: scan detection, page counts, OCR fallback.

use async_trait::async_trait;

use crate::models::{FileRef, StageError};
use crate::pdf;
use crate::pipeline::{Item, ParallelMode, Stage};
use crate::utils::{detect_language, remove_hyphenation};

const PROBE_PAGES: u32 = 3;

/// Establishes per-file facts before extraction proper: whether a PDF
/// is scanned, its page count, and the content language. PDFs whose
/// first pages yield almost no text are routed through the external
/// OCR tool and the file reference is replaced with the OCRed copy.
pub struct FileInfoExtractor {
    max_pages: u32,
    /// Minimum characters the first three pages must yield. Empirical:
    /// even sparse native PDFs clear this easily.
    ocr_trigger_chars: usize,
}

impl FileInfoExtractor {
    pub fn new(max_pages: u32, ocr_trigger_chars: usize) -> Self {
        Self {
            max_pages,
            ocr_trigger_chars,
        }
    }
}

fn read_head(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut head = [0u8; 8];
    let mut file = std::fs::File::open(path)?;
    let n = file.read(&mut head)?;
    Ok(head[..n].to_vec())
}

#[async_trait]
impl Stage for FileInfoExtractor {
    fn name(&self) -> &'static str {
        "file_info"
    }

    // lopdf parsing and OCR are CPU-bound.
    fn parallel(&self) -> ParallelMode {
        ParallelMode::Process
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let mut path = doc.file_path()?;

        let head = read_head(&path)?;
        if !pdf::is_pdf(&head) {
            return Err(StageError::Input(format!(
                "{} does not carry a pdf signature",
                doc.metainfo.file_features.filename
            )));
        }

        let parsed = pdf::load(&path)?;
        let mut npages = parsed.get_pages().len() as u32;
        let is_scanned = pdf::scan::is_scanned(&parsed);
        drop(parsed);

        let mut text = pdf::probe_text(&path, PROBE_PAGES).unwrap_or_default();
        if text.chars().count() < self.ocr_trigger_chars {
            tracing::warn!(file = %path.display(), "pdf has no text layer, running ocr");
            if npages > self.max_pages {
                let truncated = path.with_extension("head.pdf");
                pdf::truncate_pages(&path, self.max_pages, &truncated)?;
                path = truncated;
            }
            path = pdf::ocr::ocr_pdf(&path)?;
            text = pdf::probe_text(&path, PROBE_PAGES).unwrap_or_default();
            npages = pdf::page_count(&path)?;
            doc.metainfo.file_features.file = Some(FileRef::Path(path));
        }

        doc.metainfo.file_features.is_scanned = Some(is_scanned);
        doc.metainfo.file_features.npages = Some(npages);
        if !text.trim().is_empty() {
            doc.metainfo.detected_language = detect_language(&remove_hyphenation(&text));
        }
        Ok(doc.into())
    }
}
