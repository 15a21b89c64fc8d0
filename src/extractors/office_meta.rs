//! Office container metadata extraction.

use std::io::Read;

use async_trait::async_trait;

use crate::pipeline::{Item, ParallelMode, Stage};
use crate::models::StageError;
use crate::utils::clean_xml;

/// Harvests docProps XML from zip-based office formats (docx, xlsx,
/// pptx, odt and friends) and stores the cleaned XML under
/// `extra_metainfo["office_metainfo"]` for the LLM post-processor.
///
/// Files that are not valid zip containers are passed through
/// unchanged; missing metadata is not an error.
pub struct OfficeMetaExtractor;

#[async_trait]
impl Stage for OfficeMetaExtractor {
    fn name(&self) -> &'static str {
        "office_meta"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let path = doc.file_path()?;

        let file = std::fs::File::open(&path)?;
        let mut archive = match zip::ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(e) => {
                tracing::error!(file = %path.display(), %e, "not a zip container");
                return Ok(doc.into());
            }
        };

        let names: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with("docProps") && name.ends_with("xml"))
            .map(str::to_string)
            .collect();

        let mut cleaned = Vec::new();
        for name in names {
            let mut entry = archive
                .by_name(&name)
                .map_err(|e| StageError::Parse(format!("zip entry {name}: {e}")))?;
            let mut xml = String::new();
            entry.read_to_string(&mut xml)?;
            match clean_xml(&xml) {
                Ok(xml) => cleaned.push(xml),
                Err(e) => tracing::warn!(%name, %e, "skipping unparseable metadata part"),
            }
        }

        if !cleaned.is_empty() {
            doc.metainfo
                .extra_metainfo
                .insert("office_metainfo".to_string(), cleaned.join("\n"));
        }
        Ok(doc.into())
    }
}
