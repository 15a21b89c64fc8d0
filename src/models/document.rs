//! Document models for batch extraction results.
//!
//! A [`Document`] is the unit flowing through every pipeline stage:
//! normalized metadata plus an ordered list of content chunks. Stages
//! mutate it in place; the dispatcher owns the batch map.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of content a chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Figure,
    Table,
    Equation,
    VisualPage,
    Other,
}

/// Bounding box as `((xmin, ymin), (xmax, ymax))`.
///
/// All values are relative to page dimensions in [0, 1], with the
/// y-axis pointing up (page origin lower-left). Extractors working
/// with top-origin coordinates must invert before storing.
pub type Coordinates = ((f64, f64), (f64, f64));

/// Union of two bounding boxes.
pub fn union_coordinates(a: Coordinates, b: Coordinates) -> Coordinates {
    (
        (a.0 .0.min(b.0 .0), a.0 .1.min(b.0 .1)),
        (a.1 .0.max(b.1 .0), a.1 .1.max(b.1 .1)),
    )
}

/// Content that is attached to a chunk but never embedded: raw image
/// bytes for figures and visual pages, serialized HTML for tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    #[serde(with = "base64_bytes")]
    Image(Vec<u8>),
    Html(String),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Image(bytes) => bytes.is_empty(),
            Self::Html(html) => html.is_empty(),
        }
    }
}

/// Serialize binary payloads as base64 strings.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Same, for optional fields.
pub(crate) mod base64_bytes_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        bytes
            .as_ref()
            .map(|b| STANDARD.encode(b))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

/// A unit of extracted content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based page number, when known.
    pub page: Option<u32>,
    /// Page-relative bounding box, when known.
    pub coordinates: Option<Coordinates>,
    /// Section label from the source document structure.
    #[serde(default)]
    pub section: String,
    /// Context copied from the preceding text, for overlap-aware embedding.
    #[serde(default)]
    pub prefix: String,
    /// Primary text content.
    #[serde(default)]
    pub text: String,
    /// Context copied from the following text.
    #[serde(default)]
    pub suffix: String,
    /// Figure bytes or table HTML; never embedded.
    pub non_embeddable_content: Option<Payload>,
    /// Locked chunks are never split, merged, or filtered.
    #[serde(default)]
    pub locked: bool,
    pub chunk_type: ChunkType,
}

impl Default for Chunk {
    fn default() -> Self {
        Self {
            page: None,
            coordinates: None,
            section: String::new(),
            prefix: String::new(),
            text: String::new(),
            suffix: String::new(),
            non_embeddable_content: None,
            locked: false,
            chunk_type: ChunkType::Text,
        }
    }
}

impl Chunk {
    /// Create a plain text chunk.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Create a locked table chunk carrying its HTML serialization.
    pub fn table(html: impl Into<String>) -> Self {
        Self {
            non_embeddable_content: Some(Payload::Html(html.into())),
            locked: true,
            chunk_type: ChunkType::Table,
            ..Self::default()
        }
    }

    /// Create a locked figure chunk carrying raw image bytes.
    pub fn figure(bytes: Vec<u8>) -> Self {
        Self {
            non_embeddable_content: Some(Payload::Image(bytes)),
            locked: true,
            chunk_type: ChunkType::Figure,
            ..Self::default()
        }
    }
}

/// Reference to the input file as it moves between stages.
///
/// Process-mode stages require a path: in-memory buffers must be
/// materialized to the dispatcher's temp directory before routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FileRef {
    Path(PathBuf),
    Memory(#[serde(with = "base64_bytes")] Vec<u8>),
}

impl FileRef {
    /// Path of this reference, if it is path-backed.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path.as_path()),
            Self::Memory(_) => None,
        }
    }

    /// Read the full content of the referenced file.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Path(path) => std::fs::read(path),
            Self::Memory(bytes) => Ok(bytes.clone()),
        }
    }

    /// Ensure a path-backed reference, writing in-memory buffers into
    /// `dir` under `name`.
    pub fn materialize(&mut self, dir: &Path, name: &str) -> std::io::Result<PathBuf> {
        match self {
            Self::Path(path) => Ok(path.clone()),
            Self::Memory(bytes) => {
                let path = dir.join(name);
                std::fs::write(&path, bytes)?;
                *self = Self::Path(path.clone());
                Ok(path)
            }
        }
    }
}

/// Per-file facts established before extraction proper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFeatures {
    /// Opaque identifier, unique within a batch.
    pub filename: String,
    /// Where the content lives. Dropped from API responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    /// Scanned-PDF heuristic verdict; None until the detector ran.
    pub is_scanned: Option<bool>,
    /// Cached page count.
    pub npages: Option<u32>,
}

impl FileFeatures {
    pub fn new(filename: impl Into<String>, file: FileRef) -> Self {
        Self {
            filename: filename.into(),
            file: Some(file),
            is_scanned: None,
            npages: None,
        }
    }

    /// Stub features carrying only the filename, used for failed inputs.
    pub fn stub(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            file: None,
            is_scanned: None,
            npages: None,
        }
    }
}

impl Default for FileFeatures {
    fn default() -> Self {
        Self::stub("")
    }
}

/// Normalized document metadata accumulated across stages.
///
/// String fields default to empty; stages only overwrite a field when
/// they have something better than what is already there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaInfo {
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub document_type: String,
    #[serde(rename = "abstract", default)]
    pub abstract_: String,
    #[serde(default)]
    pub search_description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub pub_date: String,
    #[serde(default)]
    pub mentioned_date: String,
    /// Caller-declared language code (ISO 639-1).
    #[serde(default)]
    pub language: String,
    /// Language detected from content, when a detector ran.
    #[serde(default)]
    pub detected_language: String,
    /// Raw image bytes of the document thumbnail; base64 on the wire.
    #[serde(default, with = "base64_bytes_opt")]
    pub thumbnail: Option<Vec<u8>>,
    #[serde(default)]
    pub extra_metainfo: BTreeMap<String, String>,
    #[serde(default)]
    pub file_features: FileFeatures,
}

impl MetaInfo {
    pub fn new(file_features: FileFeatures, language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            file_features,
            ..Default::default()
        }
    }
}

/// A document flowing through a pipeline: metadata plus ordered chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub metainfo: MetaInfo,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl Document {
    /// Initial document for a fresh input: populated file features,
    /// caller-declared language, no chunks yet.
    pub fn new(file_features: FileFeatures, language: impl Into<String>) -> Self {
        Self {
            metainfo: MetaInfo::new(file_features, language),
            chunks: Vec::new(),
        }
    }

    /// Stub returned in place of a failed input: filename only.
    pub fn stub(filename: impl Into<String>) -> Self {
        Self {
            metainfo: MetaInfo::new(FileFeatures::stub(filename), ""),
            chunks: Vec::new(),
        }
    }

    /// The file reference, or an input error if a stage dropped it.
    pub fn file(&self) -> Result<&FileRef, crate::models::StageError> {
        self.metainfo
            .file_features
            .file
            .as_ref()
            .ok_or_else(|| crate::models::StageError::Input("file reference missing".into()))
    }

    /// Path of the backing file, required by stages that shell out.
    pub fn file_path(&self) -> Result<PathBuf, crate::models::StageError> {
        self.file()?
            .as_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                crate::models::StageError::Input(
                    "stage requires a path-backed file reference".into(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_coordinates() {
        let a = ((0.1, 0.2), (0.4, 0.5));
        let b = ((0.3, 0.1), (0.6, 0.4));
        assert_eq!(union_coordinates(a, b), ((0.1, 0.1), (0.6, 0.5)));
    }

    #[test]
    fn test_payload_image_roundtrips_as_base64() {
        let payload = Payload::Image(vec![0x89, 0x50, 0x4e, 0x47]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "image");
        let back: Payload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_metainfo_abstract_field_name() {
        let doc = Document::stub("a.pdf");
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["metainfo"].get("abstract").is_some());
        assert_eq!(json["metainfo"]["file_features"]["filename"], "a.pdf");
    }

    #[test]
    fn test_fileref_materialize() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = FileRef::Memory(b"hello".to_vec());
        let path = file.materialize(dir.path(), "x.txt").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert!(matches!(file, FileRef::Path(_)));
        // A second call is a no-op returning the same path.
        assert_eq!(file.materialize(dir.path(), "y.txt").unwrap(), path);
    }

    #[test]
    fn test_locked_chunk_constructors() {
        let table = Chunk::table("<table></table>");
        assert!(table.locked);
        assert_eq!(table.chunk_type, ChunkType::Table);
        let figure = Chunk::figure(vec![1, 2, 3]);
        assert!(figure.locked);
        assert_eq!(figure.chunk_type, ChunkType::Figure);
    }
}
