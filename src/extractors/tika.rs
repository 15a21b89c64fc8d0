//! Tika server client: text, metadata, and attachment extraction.

use std::io::Read;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::TikaOcrStrategy;
use crate::models::{Chunk, MetaInfo, StageError};
use crate::pipeline::{Item, ParallelMode, Stage};
use crate::utils::split_text_by_lines;

/// Metadata properties worth mapping, in preference order per field.
const AUTHOR_TAGS: &[&str] = &["dc:creator", "pdf:docinfo:creator"];
const TITLE_TAGS: &[&str] = &["dc:title", "pdf:docinfo:title"];
const DATE_TAGS: &[&str] = &[
    "xmp:CreateDate",
    "xmpMM:History:When",
    "xmp:MetadataDate",
    "dcterms:created",
    "pdf:docinfo:created",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".svg", ".webp", ".emf", ".wmf",
    ".ico", ".jfif", ".heif", ".heic", ".dds", ".pcx", ".eps", ".psd",
];

fn doi_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b10\.\d{4,9}/[-.;()/:\w]+").expect("static regex"))
}

fn keep_markdown_line(line: &str) -> bool {
    !(line.starts_with("![](") || line.starts_with(":::") || line.chars().count() <= 2)
}

/// Extracts text and figures from PDFs through a Tika server: the
/// XHTML body is converted to markdown and split into line-grouped
/// text chunks, tables become locked table chunks, and unpacked inline
/// images become locked figure chunks. Optionally captures the raw
/// Tika metadata.
pub struct TikaExtractor {
    client: reqwest::Client,
    tika_url: String,
    ocr_strategy: TikaOcrStrategy,
    lines_per_chunk: usize,
    save_raw_metadata: bool,
}

impl TikaExtractor {
    pub fn new(
        client: reqwest::Client,
        tika_url: impl Into<String>,
        ocr_strategy: TikaOcrStrategy,
        save_raw_metadata: bool,
    ) -> Self {
        Self {
            client,
            tika_url: tika_url.into(),
            ocr_strategy,
            lines_per_chunk: 15,
            save_raw_metadata,
        }
    }

    async fn fetch_html(&self, bytes: Vec<u8>) -> Result<String, StageError> {
        let response = self
            .client
            .put(format!("{}/tika", self.tika_url))
            .header("Accept", "text/html")
            .header("X-Tika-PDFocrStrategy", self.ocr_strategy.as_header_value())
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::External(format!(
                "tika returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_metadata(&self, bytes: Vec<u8>) -> Result<serde_json::Value, StageError> {
        let response = self
            .client
            .put(format!("{}/meta", self.tika_url))
            .header("Accept", "application/json")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::External(format!(
                "tika meta returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Unpack inline attachments as a zip archive.
    async fn fetch_attachments(&self, bytes: Vec<u8>) -> Result<Vec<(String, Vec<u8>)>, StageError> {
        let response = self
            .client
            .put(format!("{}/unpack/all", self.tika_url))
            .header("Accept", "application/zip")
            .header("X-Tika-PDFextractInlineImages", "true")
            .header("X-Tika-PDFocrStrategy", "auto")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::External(format!(
                "tika unpack returned {}",
                response.status()
            )));
        }
        let archive_bytes = response.bytes().await?;
        let reader = std::io::Cursor::new(archive_bytes.to_vec());
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| StageError::Parse(format!("unpack archive: {e}")))?;

        let mut attachments = Vec::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| StageError::Parse(format!("unpack entry: {e}")))?;
            if !entry.is_file() {
                continue;
            }
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            attachments.push((entry.name().to_string(), content));
        }
        Ok(attachments)
    }

    fn figure_chunks(attachments: Vec<(String, Vec<u8>)>) -> Vec<Chunk> {
        attachments
            .into_iter()
            .filter(|(name, content)| {
                let lower = name.to_lowercase();
                !content.is_empty() && IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
            })
            .map(|(_, content)| Chunk::figure(content))
            .collect()
    }

    fn table_chunks(html: &str) -> Vec<Chunk> {
        let document = scraper::Html::parse_document(html);
        let selector = scraper::Selector::parse("table").expect("static selector");
        document
            .select(&selector)
            .map(|table| Chunk::table(table.html()))
            .collect()
    }

    fn apply_metadata(meta: &mut MetaInfo, tika_meta: &serde_json::Value) {
        if meta.title.is_empty() {
            if let Some(title) = first_string(tika_meta, TITLE_TAGS) {
                meta.title = title;
            }
        }
        if meta.authors.is_empty() {
            if let Some(authors) = first_value(tika_meta, AUTHOR_TAGS) {
                meta.authors = standardize_authors(authors);
            }
        }
        if meta.pub_date.is_empty() {
            if let Some(date) = first_string(tika_meta, DATE_TAGS) {
                meta.pub_date = date;
            }
        }
        if meta.doi.is_empty() {
            let serialized = tika_meta.to_string();
            if let Some(m) = doi_re().find(&serialized) {
                meta.doi = m.as_str().to_string();
            }
        }
    }
}

fn first_value<'v>(meta: &'v serde_json::Value, tags: &[&str]) -> Option<&'v serde_json::Value> {
    tags.iter().find_map(|tag| meta.get(tag))
}

fn first_string(meta: &serde_json::Value, tags: &[&str]) -> Option<String> {
    match first_value(meta, tags)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Array(values) => values
            .iter()
            .find_map(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn standardize_authors(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(values) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        serde_json::Value::String(s) => s
            .split(';')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl Stage for TikaExtractor {
    fn name(&self) -> &'static str {
        "tika"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let bytes = doc.file()?.read()?;

        let html = self.fetch_html(bytes.clone()).await?;
        let tika_meta = self.fetch_metadata(bytes.clone()).await?;

        Self::apply_metadata(&mut doc.metainfo, &tika_meta);
        if self.save_raw_metadata {
            doc.metainfo
                .extra_metainfo
                .insert("pdf_metadata".to_string(), tika_meta.to_string());
        }

        let markdown = html2md::parse_html(&html, false);
        for group in split_text_by_lines(&markdown, self.lines_per_chunk, keep_markdown_line) {
            if group.is_empty() {
                continue;
            }
            doc.chunks.push(Chunk::text(group));
        }
        doc.chunks.extend(Self::table_chunks(&html));

        match self.fetch_attachments(bytes).await {
            Ok(attachments) => doc.chunks.extend(Self::figure_chunks(attachments)),
            // Attachments are additive; a failed unpack does not sink
            // the document.
            Err(e) => tracing::warn!(%e, "tika unpack failed"),
        }
        Ok(doc.into())
    }
}

/// Spreadsheet mode: Tika converts the sheet grid to HTML which is
/// stored as markdown text chunks only, one chunk per line group. No
/// figures, no table locking; the whole sheet is the table.
pub struct TikaSpreadsheetExtractor {
    client: reqwest::Client,
    tika_url: String,
    lines_per_chunk: usize,
}

impl TikaSpreadsheetExtractor {
    pub fn new(client: reqwest::Client, tika_url: impl Into<String>) -> Self {
        Self {
            client,
            tika_url: tika_url.into(),
            lines_per_chunk: 30,
        }
    }
}

#[async_trait]
impl Stage for TikaSpreadsheetExtractor {
    fn name(&self) -> &'static str {
        "tika_spreadsheet"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let bytes = doc.file()?.read()?;

        let response = self
            .client
            .put(format!("{}/tika", self.tika_url))
            .header("Accept", "text/html")
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::External(format!(
                "tika returned {}",
                response.status()
            )));
        }
        let html = response.text().await?;

        let markdown = html2md::parse_html(&html, false);
        for group in
            split_text_by_lines(&markdown, self.lines_per_chunk, |line| !line.is_empty())
        {
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
    use crate::models::FileFeatures;

    #[test]
    fn test_apply_metadata_prefers_existing_fields() {
        let mut meta = MetaInfo::new(FileFeatures::stub("a.pdf"), "en");
        meta.title = "existing title".to_string();
        let tika_meta = serde_json::json!({
            "dc:title": "tika title",
            "dc:creator": "Ada Lovelace; Charles Babbage",
            "xmp:CreateDate": "2021-04-01T10:00:00Z",
        });
        TikaExtractor::apply_metadata(&mut meta, &tika_meta);
        assert_eq!(meta.title, "existing title");
        assert_eq!(meta.authors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(meta.pub_date, "2021-04-01T10:00:00Z");
    }

    #[test]
    fn test_doi_swept_from_metadata() {
        let mut meta = MetaInfo::new(FileFeatures::stub("a.pdf"), "en");
        let tika_meta = serde_json::json!({
            "pdf:docinfo:subject": "See 10.1234/abcd.5678 for details",
        });
        TikaExtractor::apply_metadata(&mut meta, &tika_meta);
        assert_eq!(meta.doi, "10.1234/abcd.5678");
    }

    #[test]
    fn test_table_chunks_locked() {
        let html = "<html><body><p>x</p><table><tr><td>1</td></tr></table></body></html>";
        let chunks = TikaExtractor::table_chunks(html);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].locked);
        assert_eq!(chunks[0].chunk_type, crate::models::ChunkType::Table);
    }

    #[test]
    fn test_figure_chunks_filter_by_extension() {
        let attachments = vec![
            ("image0.png".to_string(), vec![1u8, 2]),
            ("data.bin".to_string(), vec![3u8]),
            ("empty.jpg".to_string(), Vec::new()),
        ];
        let chunks = TikaExtractor::figure_chunks(attachments);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_author_standardization_from_array() {
        let value = serde_json::json!(["A. One", "B. Two"]);
        assert_eq!(standardize_authors(&value), vec!["A. One", "B. Two"]);
    }
}
