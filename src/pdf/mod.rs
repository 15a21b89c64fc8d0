//! PDF object inspection and page-level operations.
//!
//! Object-level work (page counts, embedded image metadata, page
//! truncation, text probes) goes through lopdf. Rasterization shells
//! out to pdftoppm, which is also what the thumbnailer and the visual
//! extractor build on.

pub mod ocr;
pub mod scan;

use std::path::Path;

use crate::models::StageError;
use crate::utils::shell::run_command;

/// `%PDF-` signature probe.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Number of pages in the document.
pub fn page_count(path: &Path) -> Result<u32, StageError> {
    let doc = load(path)?;
    Ok(doc.get_pages().len() as u32)
}

/// Extract text of pages `1..=last_page` (clamped to the document).
pub fn probe_text(path: &Path, last_page: u32) -> Result<String, StageError> {
    let doc = load(path)?;
    let npages = doc.get_pages().len() as u32;
    let pages: Vec<u32> = (1..=last_page.min(npages)).collect();
    if pages.is_empty() {
        return Ok(String::new());
    }
    doc.extract_text(&pages)
        .map_err(|e| StageError::Parse(format!("pdf text extraction failed: {e}")))
}

/// Write a copy of `path` truncated to the first `max_pages` pages.
pub fn truncate_pages(path: &Path, max_pages: u32, out: &Path) -> Result<(), StageError> {
    let mut doc = load(path)?;
    let npages = doc.get_pages().len() as u32;
    if npages > max_pages {
        let excess: Vec<u32> = (max_pages + 1..=npages).collect();
        doc.delete_pages(&excess);
    }
    doc.save(out)
        .map_err(|e| StageError::Io(std::io::Error::other(e)))?;
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<lopdf::Document, StageError> {
    lopdf::Document::load(path).map_err(|e| StageError::Parse(format!("pdf load failed: {e}")))
}

/// Rasterize pages `1..=max_pages` to JPEG via pdftoppm.
pub fn rasterize_pages(path: &Path, max_pages: u32, dpi: u32) -> Result<Vec<Vec<u8>>, StageError> {
    let dir = tempfile::tempdir()?;
    let prefix = dir.path().join("page");
    run_command(
        "pdftoppm",
        &[
            "-jpeg".to_string(),
            "-r".to_string(),
            dpi.to_string(),
            "-f".to_string(),
            "1".to_string(),
            "-l".to_string(),
            max_pages.to_string(),
            path.display().to_string(),
            prefix.display().to_string(),
        ],
    )?;

    let mut files: Vec<std::path::PathBuf> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    files.sort();

    let mut images = Vec::with_capacity(files.len());
    for file in files {
        images.push(std::fs::read(file)?);
    }
    if images.is_empty() {
        return Err(StageError::External(
            "pdftoppm produced no page images".into(),
        ));
    }
    Ok(images)
}

/// Render the first page to PNG at thumbnail resolution.
pub fn first_page_png(path: &Path) -> Result<Vec<u8>, StageError> {
    let dir = tempfile::tempdir()?;
    let prefix = dir.path().join("thumb");
    run_command(
        "pdftoppm",
        &[
            "-png".to_string(),
            "-r".to_string(),
            "72".to_string(),
            "-f".to_string(),
            "1".to_string(),
            "-l".to_string(),
            "1".to_string(),
            path.display().to_string(),
            prefix.display().to_string(),
        ],
    )?;
    let file = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|ext| ext == "png"))
        .ok_or_else(|| StageError::External("pdftoppm produced no thumbnail".into()))?;
    Ok(std::fs::read(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pdf_signature() {
        assert!(is_pdf(b"%PDF-1.7 rest"));
        assert!(!is_pdf(b"PK\x03\x04"));
        assert!(!is_pdf(b""));
    }
}
