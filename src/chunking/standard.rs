//! The standard chunker: split, filter, merge, clean.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Chunk, ChunkType, Coordinates, StageError};
use crate::pipeline::{Item, ParallelMode, Stage};

use super::{balanced_partition, clean_text, split_sentences, Lexicons};

/// Length targets for chunk regularization, in characters.
///
/// Soft bounds steer splitting and merging; hard bounds are the limits
/// the output must respect.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    pub soft_min: usize,
    pub soft_max: usize,
    pub hard_min: usize,
    pub hard_max: usize,
    pub min_chunk_len: usize,
    pub spellcheck_threshold: f64,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            soft_min: 700,
            soft_max: 1200,
            hard_min: 400,
            hard_max: 1600,
            min_chunk_len: 50,
            spellcheck_threshold: 0.5,
        }
    }
}

/// Length-regularizing chunker.
///
/// Non-locked text chunks are split to fit the hard maximum, filtered
/// for length and dictionary quality, merged up toward the soft
/// minimum, and optionally cleaned. Locked and non-text chunks pass
/// through untouched and keep their relative order at the end of the
/// document.
pub struct StandardChunker {
    limits: ChunkLimits,
    lexicons: Arc<Lexicons>,
    clean: bool,
}

impl StandardChunker {
    pub fn new(limits: ChunkLimits, lexicons: Arc<Lexicons>, clean: bool) -> Self {
        Self {
            limits,
            lexicons,
            clean,
        }
    }

    /// Split one oversized chunk into balanced sub-chunks.
    ///
    /// The parent bounding box is distributed vertically in proportion
    /// to character counts, assuming a vertical column layout. For
    /// multi-column text this is an approximation; coordinates that
    /// crossed column boundaries stay approximate.
    fn split_chunk(&self, chunk: Chunk, language: &str) -> Vec<Chunk> {
        let sentences = split_sentences(&chunk.text, language);
        if sentences.len() <= 1 {
            return self.hard_slice(chunk);
        }
        let lens: Vec<usize> = sentences.iter().map(|s| s.chars().count()).collect();
        let total: usize = lens.iter().sum();

        let k_min = total.div_ceil(self.limits.soft_max).max(1);
        let k_max = total.div_ceil(self.limits.soft_min).max(k_min);
        // Smallest k whose balanced partition stays under the hard
        // maximum, preferring partitions that also avoid undersized
        // parts.
        let mut chosen = None;
        let mut fallback = None;
        for k in k_min..=k_max {
            let parts = balanced_partition(&lens, k);
            let sums: Vec<usize> = parts
                .iter()
                .map(|r| lens[r.clone()].iter().sum::<usize>())
                .collect();
            if sums.iter().any(|&s| s > self.limits.hard_max) {
                continue;
            }
            if fallback.is_none() {
                fallback = Some(parts.clone());
            }
            if sums.iter().all(|&s| s >= self.limits.hard_min) {
                chosen = Some(parts);
                break;
            }
        }
        let parts = chosen
            .or(fallback)
            .unwrap_or_else(|| balanced_partition(&lens, k_max));

        let mut produced = Vec::with_capacity(parts.len());
        let mut consumed = 0usize;
        for range in parts {
            let part_text = sentences[range.clone()].join(" ");
            let part_len: usize = lens[range].iter().sum();
            let coordinates = chunk.coordinates.map(|bbox| {
                vertical_slice(bbox, consumed, part_len, total.max(1))
            });
            consumed += part_len;

            let sub = Chunk {
                text: part_text,
                coordinates,
                ..chunk.clone()
            };
            // A single sentence can still exceed the hard maximum.
            if sub.text.chars().count() > self.limits.hard_max {
                produced.extend(self.hard_slice(sub));
            } else {
                produced.push(sub);
            }
        }
        produced
    }

    /// Character-level fallback split for text without usable sentence
    /// boundaries.
    fn hard_slice(&self, chunk: Chunk) -> Vec<Chunk> {
        let chars: Vec<char> = chunk.text.chars().collect();
        let total = chars.len();
        if total <= self.limits.hard_max {
            return vec![chunk];
        }
        let parts = total.div_ceil(self.limits.soft_max);
        let size = total.div_ceil(parts);
        chars
            .chunks(size)
            .enumerate()
            .map(|(i, piece)| Chunk {
                text: piece.iter().collect::<String>().trim().to_string(),
                coordinates: chunk
                    .coordinates
                    .map(|bbox| vertical_slice(bbox, i * size, piece.len(), total)),
                ..chunk.clone()
            })
            .collect()
    }

    fn keeps(&self, chunk: &Chunk, language: &str) -> bool {
        let len = chunk.text.chars().count();
        if len < self.limits.min_chunk_len {
            return false;
        }
        self.lexicons.score(&chunk.text, language) >= self.limits.spellcheck_threshold
    }

    fn merge(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if let Some(last) = merged.last_mut() {
                let left = last.text.chars().count();
                let right = chunk.text.chars().count();
                if left < self.limits.soft_min
                    && right < self.limits.soft_min
                    && left + 1 + right <= self.limits.hard_max
                {
                    last.text.push(' ');
                    last.text.push_str(&chunk.text);
                    last.suffix = chunk.suffix;
                    if last.page == chunk.page {
                        last.coordinates = match (last.coordinates, chunk.coordinates) {
                            (Some(a), Some(b)) => Some(crate::models::union_coordinates(a, b)),
                            _ => None,
                        };
                    } else {
                        last.page = None;
                        last.coordinates = None;
                    }
                    continue;
                }
            }
            merged.push(chunk);
        }
        merged
    }

    fn rechunk(&self, chunks: Vec<Chunk>, language: &str) -> Vec<Chunk> {
        let (work, passthrough): (Vec<Chunk>, Vec<Chunk>) = chunks
            .into_iter()
            .partition(|c| !c.locked && c.chunk_type == ChunkType::Text);

        // Split oversized.
        let mut split = Vec::with_capacity(work.len());
        for chunk in work {
            if chunk.text.chars().count() > self.limits.soft_max {
                split.extend(self.split_chunk(chunk, language));
            } else {
                split.push(chunk);
            }
        }

        // Quality filter.
        let survivors: Vec<Chunk> = split
            .into_iter()
            .filter(|c| self.keeps(c, language))
            .collect();

        // Merge undersized neighbors.
        let mut merged = self.merge(survivors);

        // Clean.
        if self.clean {
            for chunk in &mut merged {
                chunk.text = clean_text(&chunk.text);
            }
        }

        merged.extend(passthrough);
        merged
    }
}

/// Cut a vertical band out of `bbox` for characters
/// `[consumed, consumed + len)` of `total`, top-down (y-axis up).
fn vertical_slice(bbox: Coordinates, consumed: usize, len: usize, total: usize) -> Coordinates {
    let ((xmin, ymin), (xmax, ymax)) = bbox;
    let height = ymax - ymin;
    let from = consumed as f64 / total as f64;
    let to = (consumed + len) as f64 / total as f64;
    ((xmin, ymax - height * to), (xmax, ymax - height * from))
}

#[async_trait]
impl Stage for StandardChunker {
    fn name(&self) -> &'static str {
        "standard_chunker"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Serial
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        if doc.chunks.is_empty() {
            return Ok(doc.into());
        }
        let language = if doc.metainfo.language.is_empty() {
            "en".to_string()
        } else {
            doc.metainfo.language.clone()
        };
        doc.chunks = self.rechunk(std::mem::take(&mut doc.chunks), &language);
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, FileFeatures, FileRef, Payload};

    fn chunker(clean: bool) -> StandardChunker {
        StandardChunker::new(ChunkLimits::default(), Arc::new(Lexicons::new()), clean)
    }

    fn sentence_block(sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("This is sentence number {i} with a bit of padding text."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(chunker: &StandardChunker, doc: Document) -> Document {
        chunker
            .process_single(Item::Document(doc))
            .await
            .unwrap()
            .into_document()
            .unwrap()
    }

    fn doc_with_chunks(chunks: Vec<Chunk>) -> Document {
        let mut doc = Document::new(
            FileFeatures::new("t.pdf", FileRef::Memory(Vec::new())),
            "en",
        );
        doc.chunks = chunks;
        doc
    }

    #[tokio::test]
    async fn test_empty_document_unchanged() {
        let doc = run(&chunker(false), doc_with_chunks(Vec::new())).await;
        assert!(doc.chunks.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_chunks_are_split_under_hard_max() {
        let text = sentence_block(100);
        assert!(text.len() > 1600);
        let doc = run(&chunker(false), doc_with_chunks(vec![Chunk::text(text)])).await;
        assert!(doc.chunks.len() > 1);
        for chunk in &doc.chunks {
            assert!(chunk.text.chars().count() <= 1600, "chunk too long");
        }
    }

    #[tokio::test]
    async fn test_split_distributes_coordinates_vertically() {
        let mut chunk = Chunk::text(sentence_block(60));
        chunk.page = Some(1);
        chunk.coordinates = Some(((0.1, 0.2), (0.9, 0.8)));
        let doc = run(&chunker(false), doc_with_chunks(vec![chunk])).await;
        assert!(doc.chunks.len() >= 2);
        let first = doc.chunks.first().unwrap().coordinates.unwrap();
        let last = doc.chunks.last().unwrap().coordinates.unwrap();
        // First part sits at the top of the parent box (y-axis up).
        assert!((first.1 .1 - 0.8).abs() < 1e-9);
        assert!((last.0 .1 - 0.2).abs() < 1e-9);
        for chunk in &doc.chunks {
            let ((xmin, ymin), (xmax, ymax)) = chunk.coordinates.unwrap();
            assert!(xmin <= xmax && ymin <= ymax);
            assert!((0.0..=1.0).contains(&ymin) && (0.0..=1.0).contains(&ymax));
        }
    }

    #[tokio::test]
    async fn test_short_chunks_filtered() {
        let short = Chunk::text("too short");
        let exact = Chunk::text("x".repeat(50));
        let below = Chunk::text("y".repeat(49));
        let doc = run(&chunker(false), doc_with_chunks(vec![short, exact, below])).await;
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].text.chars().count(), 50);
    }

    #[tokio::test]
    async fn test_spellcheck_filter_drops_garbled_text() {
        let mut lexicons = Lexicons::new();
        lexicons.insert_words("en", ["transformer", "attention", "network", "layers"]);
        let chunker =
            StandardChunker::new(ChunkLimits::default(), Arc::new(lexicons), false);
        let good = Chunk::text(
            "The transformer network uses attention layers. The attention \
             mechanism connects every transformer position to the network.",
        );
        let garbled = Chunk::text(
            "qwxzy vbnmk asdfgh zxcvbn poiuy lkjhgf qwerty mnbvcx plmokn \
             ijnuhb ygvtfc rdxesz wqazsx edcrfv tgbyhn ujmikl",
        );
        let doc = run(&chunker, doc_with_chunks(vec![good.clone(), garbled])).await;
        assert_eq!(doc.chunks.len(), 1);
        assert!(doc.chunks[0].text.starts_with("The transformer"));
    }

    #[tokio::test]
    async fn test_undersized_neighbors_merge() {
        let a = Chunk::text("a".repeat(300));
        let b = Chunk::text("b".repeat(300));
        let doc = run(&chunker(false), doc_with_chunks(vec![a, b])).await;
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].text.chars().count(), 601);
    }

    #[tokio::test]
    async fn test_merge_respects_hard_max() {
        let a = Chunk::text("a".repeat(690));
        let b = Chunk::text("b".repeat(695));
        let c = Chunk::text("c".repeat(695));
        let doc = run(&chunker(false), doc_with_chunks(vec![a, b, c])).await;
        // a+b merge (1386 <= 1600); c cannot join (would exceed).
        assert_eq!(doc.chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_locked_and_non_text_pass_through_unchanged() {
        let locked = Chunk {
            locked: true,
            text: "tiny".to_string(),
            ..Chunk::default()
        };
        let table = Chunk::table("<table><tr><td>1</td></tr></table>");
        let figure = Chunk::figure(vec![0xde, 0xad]);
        let doc = run(
            &chunker(true),
            doc_with_chunks(vec![locked.clone(), table.clone(), figure.clone()]),
        )
        .await;
        assert_eq!(doc.chunks.len(), 3);
        assert_eq!(doc.chunks[0].text, "tiny");
        assert_eq!(
            doc.chunks[1].non_embeddable_content,
            Some(Payload::Html("<table><tr><td>1</td></tr></table>".into()))
        );
        assert_eq!(
            doc.chunks[2].non_embeddable_content,
            Some(Payload::Image(vec![0xde, 0xad]))
        );
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let text = sentence_block(80);
        let chunker = chunker(true);
        let once = run(&chunker, doc_with_chunks(vec![Chunk::text(text)])).await;
        let twice = run(&chunker, once.clone()).await;
        let texts = |d: &Document| d.chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&once), texts(&twice));
    }
}
