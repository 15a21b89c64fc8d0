//! Markdown conversion of word-processor documents via pandoc.

use async_trait::async_trait;

use crate::models::{Chunk, StageError};
use crate::pipeline::{Item, ParallelMode, Stage};
use crate::utils::shell::run_command;
use crate::utils::split_text_by_lines;

/// Markdown lines that carry no content worth chunking: extracted
/// image references, fenced div markers, and near-empty lines.
fn keep_line(line: &str) -> bool {
    !(line.starts_with("![](") || line.starts_with(":::") || line.chars().count() <= 2)
}

/// Converts docx/odt files to markdown with pandoc. The markdown body
/// becomes line-grouped text chunks; media extracted during conversion
/// becomes locked figure chunks.
pub struct MarkdownExtractor {
    lines_per_chunk: usize,
}

impl MarkdownExtractor {
    pub fn new(lines_per_chunk: usize) -> Self {
        Self { lines_per_chunk }
    }
}

impl Default for MarkdownExtractor {
    fn default() -> Self {
        Self::new(12)
    }
}

#[async_trait]
impl Stage for MarkdownExtractor {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let path = doc.file_path()?;
        let media_dir = tempfile::tempdir()?;

        let stdout = run_command(
            "pandoc",
            &[
                path.display().to_string(),
                "--to".to_string(),
                "markdown".to_string(),
                "--columns=130".to_string(),
                format!("--extract-media={}", media_dir.path().display()),
            ],
        )?;
        let markdown = String::from_utf8_lossy(&stdout);

        for group in split_text_by_lines(&markdown, self.lines_per_chunk, keep_line) {
            if group.is_empty() {
                continue;
            }
            doc.chunks.push(Chunk::text(group));
        }

        for entry in walk_files(media_dir.path())? {
            let content = std::fs::read(&entry)?;
            if !content.is_empty() {
                doc.chunks.push(Chunk::figure(content));
            }
        }
        Ok(doc.into())
    }
}

fn walk_files(dir: &std::path::Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_line_filters_markdown_noise() {
        assert!(!keep_line("![](media/image1.png)"));
        assert!(!keep_line("::: section"));
        assert!(!keep_line(".."));
        assert!(keep_line("A real paragraph line."));
    }

    #[test]
    fn test_walk_files_recurses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/img.png"), b"png").unwrap();
        std::fs::write(dir.path().join("top.png"), b"png").unwrap();
        let files = walk_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }
}
