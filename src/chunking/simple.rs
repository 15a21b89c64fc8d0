//! Simple chunker for markdown-origin documents.
//!
//! Consecutive non-locked text chunks are concatenated and re-cut into
//! segments of roughly equal length, with an overlap window copied
//! into the neighbors' prefix/suffix fields. Locked and non-text
//! chunks act as barriers: buffered text is flushed before them and
//! they pass through unchanged.

use async_trait::async_trait;

use crate::models::{Chunk, ChunkType, StageError};
use crate::pipeline::{Item, ParallelMode, Stage};

pub struct SimpleChunker {
    max_chunk_len: usize,
    overlap: usize,
}

impl SimpleChunker {
    pub fn new(max_chunk_len: usize, overlap: usize) -> Self {
        Self {
            max_chunk_len: max_chunk_len.max(1),
            overlap,
        }
    }

    /// Cut `text` into segments of at most `max_chunk_len` characters,
    /// copying `overlap` characters of context across boundaries.
    fn split_text(&self, text: &str, template: &Chunk) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total <= self.max_chunk_len {
            return vec![Chunk {
                text: text.to_string(),
                ..template.clone()
            }];
        }

        let segments = total.div_ceil(self.max_chunk_len);
        let segment_size = total.div_ceil(segments);
        let slice = |from: usize, to: usize| -> String {
            chars[from.min(total)..to.min(total)].iter().collect()
        };

        let mut out = Vec::with_capacity(segments);
        for i in 0..segments {
            let start = i * segment_size;
            let end = ((i + 1) * segment_size).min(total);
            let prefix = if i > 0 {
                slice(start.saturating_sub(self.overlap), start)
            } else {
                String::new()
            };
            let suffix = if end < total {
                slice(end, end + self.overlap)
            } else {
                String::new()
            };
            out.push(Chunk {
                text: slice(start, end),
                prefix,
                suffix,
                ..template.clone()
            });
        }
        out
    }
}

#[async_trait]
impl Stage for SimpleChunker {
    fn name(&self) -> &'static str {
        "simple_chunker"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Serial
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let chunks = std::mem::take(&mut doc.chunks);

        let mut out = Vec::with_capacity(chunks.len());
        let mut buffer = String::new();
        let mut template = Chunk::default();

        for chunk in chunks {
            if chunk.locked || chunk.chunk_type != ChunkType::Text {
                if !buffer.is_empty() {
                    out.extend(self.split_text(&buffer, &template));
                    buffer.clear();
                }
                out.push(chunk);
                continue;
            }
            if chunk.text.is_empty() {
                continue;
            }
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(&chunk.text);
            template = Chunk {
                text: String::new(),
                ..chunk
            };
        }
        if !buffer.is_empty() {
            out.extend(self.split_text(&buffer, &template));
        }

        doc.chunks = out;
        Ok(doc.into())
    }
}
