//! OCR fallback for PDFs without a text layer.

use std::path::{Path, PathBuf};

use crate::models::StageError;
use crate::utils::shell::run_command;

/// Run the external OCR tool over `path`, writing a text-layered copy
/// next to it. Returns the path of the OCRed output.
pub fn ocr_pdf(path: &Path) -> Result<PathBuf, StageError> {
    let out = path.with_extension("ocr.pdf");
    run_command(
        "ocrmypdf",
        &[
            "--force-ocr".to_string(),
            "--output-type".to_string(),
            "pdf".to_string(),
            path.display().to_string(),
            out.display().to_string(),
        ],
    )?;
    Ok(out)
}
