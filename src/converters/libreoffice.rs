//! Batch file conversion through the LibreOffice CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::models::{FileRef, ProcessingError, StageError};
use crate::pipeline::{Batch, Failures, Item, ParallelMode, Stage};
use crate::utils::shell::run_command;

/// Converts every file in the batch to `target_format` in one
/// LibreOffice invocation and rewrites each document's file reference
/// to the converted copy. LibreOffice is slow to start but fast to
/// convert, so the whole batch goes through a single process.
pub struct LibreOfficeConverter {
    target_format: String,
}

impl LibreOfficeConverter {
    pub fn new(target_format: impl Into<String>) -> Self {
        Self {
            target_format: target_format.into(),
        }
    }
}

/// Path LibreOffice writes for `input` inside `outdir`.
fn converted_path(input: &Path, outdir: &Path, format: &str) -> Option<PathBuf> {
    let stem = input.file_stem()?;
    Some(outdir.join(format!("{}.{}", stem.to_string_lossy(), format)))
}

#[async_trait]
impl Stage for LibreOfficeConverter {
    fn name(&self) -> &'static str {
        "libreoffice_convert"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::WholeBatch
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        // Unreachable under WholeBatch mode.
        Ok(item)
    }

    async fn process_whole_batch(&self, batch: Batch) -> (Batch, Failures) {
        let mut successes = Batch::new();
        let mut failures = Failures::new();

        // Split out items without a usable path first.
        let mut convertible: Vec<(String, crate::models::Document, PathBuf)> = Vec::new();
        for (key, item) in batch {
            let doc = match item.into_document() {
                Ok(doc) => doc,
                Err(err) => {
                    failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                    continue;
                }
            };
            match doc.file_path() {
                Ok(path) => convertible.push((key, doc, path)),
                Err(err) => {
                    failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                }
            }
        }
        if convertible.is_empty() {
            return (successes, failures);
        }

        let outdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                let err = StageError::Io(e);
                for (key, ..) in convertible {
                    failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                }
                return (successes, failures);
            }
        };

        let mut args: Vec<String> = vec![
            "--headless".to_string(),
            "--convert-to".to_string(),
            self.target_format.clone(),
            "--outdir".to_string(),
            outdir.path().display().to_string(),
        ];
        args.extend(
            convertible
                .iter()
                .map(|(_, _, path)| path.display().to_string()),
        );

        let conversion =
            tokio::task::spawn_blocking(move || run_command("libreoffice", &args)).await;
        let result = match conversion {
            Ok(result) => result,
            Err(e) => Err(crate::utils::ShellError::Io(std::io::Error::other(e))),
        };
        if let Err(e) = result {
            let err: StageError = e.into();
            for (key, ..) in convertible {
                failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
            }
            return (successes, failures);
        }

        for (key, mut doc, path) in convertible {
            let produced = converted_path(&path, outdir.path(), &self.target_format)
                .filter(|p| p.exists());
            let Some(produced) = produced else {
                let err =
                    StageError::External(format!("libreoffice produced no output for {key}"));
                failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                continue;
            };
            // Keep the converted file alive past the scratch dir by
            // moving it next to the original.
            let target = path.with_extension(&self.target_format);
            if let Err(e) = std::fs::copy(&produced, &target) {
                let err = StageError::Io(e);
                failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                continue;
            }
            doc.metainfo.file_features.file = Some(FileRef::Path(target));
            successes.push((key, Item::Document(doc)));
        }
        (successes, failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converted_path_follows_stem() {
        let path = converted_path(Path::new("/tmp/in/report.doc"), Path::new("/tmp/out"), "docx")
            .unwrap();
        assert_eq!(path, Path::new("/tmp/out/report.docx"));
    }
}
