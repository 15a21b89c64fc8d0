//! Thumbnail generation.
//!
//! PDFs render their first page through pdftoppm; office formats go
//! through a batch LibreOffice PNG conversion. Thumbnailing never
//! fails a document: when nothing can be rendered the thumbnail is
//! simply left unset.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::models::StageError;
use crate::pdf;
use crate::pipeline::{Batch, Failures, Item, ParallelMode, Stage};
use crate::utils::shell::run_command;

pub struct Thumbnailer;

impl Thumbnailer {
    /// Render office-format thumbnails for `paths` in one LibreOffice
    /// call, returning the PNG produced for each input (where any).
    fn libreoffice_pngs(paths: &[PathBuf]) -> Result<Vec<Option<Vec<u8>>>, StageError> {
        let outdir = tempfile::tempdir()?;
        let mut args: Vec<String> = vec![
            "--headless".to_string(),
            "--convert-to".to_string(),
            "png".to_string(),
            "--outdir".to_string(),
            outdir.path().display().to_string(),
        ];
        args.extend(paths.iter().map(|p| p.display().to_string()));
        run_command("libreoffice", &args)?;

        let mut thumbnails = Vec::with_capacity(paths.len());
        for path in paths {
            let png = path
                .file_stem()
                .map(|stem| outdir.path().join(format!("{}.png", stem.to_string_lossy())))
                .filter(|p| p.exists())
                .and_then(|p| std::fs::read(p).ok());
            thumbnails.push(png);
        }
        Ok(thumbnails)
    }
}

#[async_trait]
impl Stage for Thumbnailer {
    fn name(&self) -> &'static str {
        "thumbnailer"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::WholeBatch
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        // Unreachable under WholeBatch mode.
        Ok(item)
    }

    async fn process_whole_batch(&self, batch: Batch) -> (Batch, Failures) {
        let mut docs: Vec<(String, crate::models::Document)> = Vec::new();
        for (key, item) in batch {
            match item.into_document() {
                Ok(doc) => docs.push((key, doc)),
                // Thumbnailing is best-effort even for odd inputs.
                Err(err) => {
                    tracing::warn!(%key, %err, "thumbnailer skipping item");
                    continue;
                }
            }
        }

        // PDFs individually; everything else in one LibreOffice batch.
        let mut office: Vec<(usize, PathBuf)> = Vec::new();
        for (index, (key, doc)) in docs.iter_mut().enumerate() {
            let Ok(path) = doc.file_path() else {
                tracing::debug!(%key, "no path for thumbnail");
                continue;
            };
            let is_pdf = std::fs::read(&path)
                .ok()
                .and_then(|bytes| infer::get(&bytes))
                .is_some_and(|kind| kind.mime_type() == "application/pdf");
            if is_pdf {
                match pdf::first_page_png(&path) {
                    Ok(png) => doc.metainfo.thumbnail = Some(png),
                    Err(e) => tracing::debug!(%key, %e, "pdf thumbnail failed"),
                }
            } else {
                office.push((index, path));
            }
        }

        if !office.is_empty() {
            let paths: Vec<PathBuf> = office.iter().map(|(_, p)| p.clone()).collect();
            let rendered =
                tokio::task::spawn_blocking(move || Thumbnailer::libreoffice_pngs(&paths)).await;
            match rendered {
                Ok(Ok(thumbnails)) => {
                    for ((index, _), thumbnail) in office.into_iter().zip(thumbnails) {
                        if let Some(png) = thumbnail {
                            docs[index].1.metainfo.thumbnail = Some(png);
                        }
                    }
                }
                Ok(Err(e)) => tracing::debug!(%e, "libreoffice thumbnails failed"),
                Err(e) => tracing::debug!(%e, "thumbnail task failed"),
            }
        }

        let successes = docs
            .into_iter()
            .map(|(key, doc)| (key, Item::Document(doc)))
            .collect();
        (successes, Failures::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::models::{Document, FileFeatures, FileRef};
    use crate::pipeline::BatchExecutor;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_thumbnailer_never_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not really a document").unwrap();

        let doc = Document::new(FileFeatures::new("broken.docx", FileRef::Path(path)), "en");
        let stage: Arc<dyn Stage> = Arc::new(Thumbnailer);
        let executor = BatchExecutor::new(&Settings::default());
        let (ok, failed) = executor
            .execute(
                &stage,
                vec![("broken.docx".to_string(), Item::Document(doc))],
            )
            .await;
        assert_eq!(ok.len(), 1);
        assert!(failed.is_empty());
        assert!(ok[0].1.as_document().unwrap().metainfo.thumbnail.is_none());
    }
}
