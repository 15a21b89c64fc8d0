//! Partitioner-service client (Unstructured-style element API).

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{Chunk, Coordinates, StageError};
use crate::pipeline::{Batch, Item, ParallelMode, Stage};

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: ElementMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ElementMetadata {
    page_number: Option<u32>,
    coordinates: Option<ElementCoordinates>,
    text_as_html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElementCoordinates {
    points: Vec<(f64, f64)>,
    layout_width: f64,
    layout_height: f64,
}

/// Partitions documents into elements through the partitioner service.
/// Text elements become text chunks with normalized bounding boxes;
/// table elements become locked table chunks carrying their HTML.
///
/// Scanned inputs run under the service's hi-res strategy, and only
/// serially: that backend parallelizes internally and a second
/// concurrent request degrades both. Native inputs fan out normally.
pub struct PartitionTextExtractor {
    client: reqwest::Client,
    partition_url: String,
    min_text_len: usize,
}

impl PartitionTextExtractor {
    pub fn new(client: reqwest::Client, partition_url: impl Into<String>) -> Self {
        Self {
            client,
            partition_url: partition_url.into(),
            min_text_len: 20,
        }
    }

    async fn fetch_elements(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        strategy: &str,
    ) -> Result<Vec<Element>, StageError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("strategy", strategy.to_string());
        let response = self
            .client
            .post(format!("{}/general/v0/general", self.partition_url))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::External(format!(
                "partitioner returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    fn chunk_from_element(&self, element: Element) -> Option<Chunk> {
        match element.kind.as_str() {
            "Table" => {
                let html = element.metadata.text_as_html.unwrap_or_default();
                if html.is_empty() {
                    return None;
                }
                let mut chunk = Chunk::table(html);
                chunk.page = element.metadata.page_number;
                chunk.text = element.text;
                Some(chunk)
            }
            "NarrativeText" | "Text" | "Title" | "ListItem" => {
                if element.text.chars().count() < self.min_text_len {
                    return None;
                }
                let mut chunk = Chunk::text(element.text);
                chunk.page = element.metadata.page_number;
                chunk.coordinates = element.metadata.coordinates.and_then(normalize_bbox);
                Some(chunk)
            }
            _ => None,
        }
    }
}

/// Normalize element points to page-relative units, flipping the
/// y-axis from the service's top-origin layout to bottom-origin.
fn normalize_bbox(coords: ElementCoordinates) -> Option<Coordinates> {
    if coords.points.is_empty() || coords.layout_width <= 0.0 || coords.layout_height <= 0.0 {
        return None;
    }
    let xs: Vec<f64> = coords
        .points
        .iter()
        .map(|(x, _)| x / coords.layout_width)
        .collect();
    let ys: Vec<f64> = coords
        .points
        .iter()
        .map(|(_, y)| y / coords.layout_height)
        .collect();
    let xmin = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let xmax = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let ymin = 1.0 - ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let ymax = 1.0 - ys.iter().copied().fold(f64::INFINITY, f64::min);
    Some((
        (xmin.clamp(0.0, 1.0), ymin.clamp(0.0, 1.0)),
        (xmax.clamp(0.0, 1.0), ymax.clamp(0.0, 1.0)),
    ))
}

#[async_trait]
impl Stage for PartitionTextExtractor {
    fn name(&self) -> &'static str {
        "partition"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    fn schedule(&self, batch: &Batch) -> Vec<(ParallelMode, Vec<String>)> {
        let (scanned, native): (Vec<&(String, Item)>, Vec<&(String, Item)>) =
            batch.iter().partition(|(_, item)| {
                item.as_document()
                    .and_then(|doc| doc.metainfo.file_features.is_scanned)
                    .unwrap_or(false)
            });
        tracing::info!(
            scanned = scanned.len(),
            native = native.len(),
            "partition schedule"
        );
        vec![
            (
                ParallelMode::Thread,
                native.into_iter().map(|(k, _)| k.clone()).collect(),
            ),
            (
                ParallelMode::Serial,
                scanned.into_iter().map(|(k, _)| k.clone()).collect(),
            ),
        ]
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let filename = doc.metainfo.file_features.filename.clone();
        let bytes = doc.file()?.read()?;

        let strategy = if doc.metainfo.file_features.is_scanned.unwrap_or(false) {
            "hi_res"
        } else {
            "auto"
        };
        let elements = self.fetch_elements(&filename, bytes, strategy).await?;
        for element in elements {
            if let Some(chunk) = self.chunk_from_element(element) {
                doc.chunks.push(chunk);
            }
        }
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn extractor() -> PartitionTextExtractor {
        PartitionTextExtractor::new(reqwest::Client::new(), "http://localhost:8000")
    }

    #[test]
    fn test_short_text_elements_dropped() {
        let element = Element {
            kind: "Text".to_string(),
            text: "tiny".to_string(),
            metadata: ElementMetadata::default(),
        };
        assert!(extractor().chunk_from_element(element).is_none());
    }

    #[test]
    fn test_table_elements_locked_with_html() {
        let element = Element {
            kind: "Table".to_string(),
            text: "1 2 3".to_string(),
            metadata: ElementMetadata {
                page_number: Some(2),
                coordinates: None,
                text_as_html: Some("<table><tr><td>1</td></tr></table>".to_string()),
            },
        };
        let chunk = extractor().chunk_from_element(element).unwrap();
        assert!(chunk.locked);
        assert_eq!(chunk.chunk_type, crate::models::ChunkType::Table);
        assert_eq!(chunk.page, Some(2));
    }

    #[test]
    fn test_bbox_normalized_and_flipped() {
        let coords = ElementCoordinates {
            points: vec![(61.2, 79.2), (550.8, 79.2), (550.8, 237.6), (61.2, 237.6)],
            layout_width: 612.0,
            layout_height: 792.0,
        };
        let ((xmin, ymin), (xmax, ymax)) = normalize_bbox(coords).unwrap();
        assert!((xmin - 0.1).abs() < 1e-6);
        assert!((xmax - 0.9).abs() < 1e-6);
        assert!((ymin - 0.7).abs() < 1e-6);
        assert!((ymax - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_schedule_splits_scanned_from_native() {
        let mut scanned = Document::stub("scan.pdf");
        scanned.metainfo.file_features.is_scanned = Some(true);
        let native = Document::stub("native.pdf");
        let batch: Batch = vec![
            ("scan.pdf".to_string(), Item::Document(scanned)),
            ("native.pdf".to_string(), Item::Document(native)),
        ];
        let schedule = extractor().schedule(&batch);
        assert_eq!(schedule[0].0, ParallelMode::Thread);
        assert_eq!(schedule[0].1, vec!["native.pdf"]);
        assert_eq!(schedule[1].0, ParallelMode::Serial);
        assert_eq!(schedule[1].1, vec!["scan.pdf"]);
    }
}
