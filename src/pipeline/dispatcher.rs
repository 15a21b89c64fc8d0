//! Dispatcher: top-level batch entry point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::config::Settings;
use crate::llm::LlmClient;
use crate::models::{Document, ErrorKind, FileFeatures, FileRef, ProcessingError};

use super::recipes::Recipes;
use super::{Batch, BatchExecutor, CancelFlag, Failures, Item};

/// One file handed to the dispatcher.
#[derive(Debug)]
pub struct BatchInput {
    /// Caller-visible name; must be unique within the batch.
    pub filename: String,
    pub file: FileRef,
    /// Per-file language override.
    pub language: Option<String>,
    /// Per-file metadata seeded into the document.
    pub extra_metainfo: BTreeMap<String, String>,
}

impl BatchInput {
    pub fn new(filename: impl Into<String>, file: FileRef) -> Self {
        Self {
            filename: filename.into(),
            file,
            language: None,
            extra_metainfo: BTreeMap::new(),
        }
    }
}

/// Batch-level failures. Per-item failures never surface here; they
/// are reported in the result's error list.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("duplicate filename in batch: {0}")]
    DuplicateFilename(String),

    #[error("failed to prepare batch workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("failed to build pipelines: {0}")]
    Setup(String),
}

/// Routes a mixed batch to per-extension pipelines and recombines the
/// results in caller order.
pub struct Dispatcher {
    executor: BatchExecutor,
    recipes: Recipes,
}

impl Dispatcher {
    pub fn new(
        settings: &Settings,
        text_model: Arc<LlmClient>,
        vision_model: Arc<LlmClient>,
    ) -> Result<Self, DispatchError> {
        let recipes = Recipes::build(settings, text_model, vision_model)
            .map_err(|e| DispatchError::Setup(e.to_string()))?;
        tracing::debug!(extensions = ?recipes.extensions(), "pipelines ready");
        Ok(Self {
            executor: BatchExecutor::new(settings),
            recipes,
        })
    }

    /// Handle for cancelling in-flight batches: running workers finish,
    /// unsubmitted items come back with kind `Cancelled`.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.executor.cancel_flag()
    }

    /// Process `inputs`, returning one document per input in input
    /// order (stubs for failures) plus one error per failed input.
    pub async fn extract_batch(
        &self,
        inputs: Vec<BatchInput>,
        default_language: &str,
    ) -> Result<(Vec<Document>, Vec<ProcessingError>), DispatchError> {
        if inputs.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        // Filenames key the batch; ambiguity is a caller bug.
        {
            let mut seen = std::collections::HashSet::new();
            for input in &inputs {
                if !input.filename.is_empty() && !seen.insert(input.filename.as_str()) {
                    return Err(DispatchError::DuplicateFilename(input.filename.clone()));
                }
            }
        }

        // Stages that cross the blocking pool need path-backed refs;
        // the workdir owns every materialized buffer for the batch and
        // is deleted when this call returns.
        let workdir = tempfile::tempdir()?;

        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Batch> = BTreeMap::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let key = if input.filename.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                input.filename.clone()
            };

            let mut file = input.file;
            let scratch_name = format!("{index:04}_{}", sanitize(&key));
            file.materialize(workdir.path(), &scratch_name)?;

            let mut doc = Document::new(
                FileFeatures::new(key.clone(), file),
                input
                    .language
                    .as_deref()
                    .unwrap_or(default_language),
            );
            doc.metainfo.extra_metainfo.extend(input.extra_metainfo);

            let extension = extension_of(&key);
            order.push(key.clone());
            groups
                .entry(extension)
                .or_default()
                .push((key, Item::Document(doc)));
        }

        let mut documents: HashMap<String, Document> = HashMap::new();
        let mut errors: Failures = Failures::new();

        for (extension, batch) in groups {
            let Some(pipeline) = self.recipes.get(&extension) else {
                for (key, _) in batch {
                    errors.insert(
                        key.clone(),
                        ProcessingError::new(
                            ErrorKind::NoPipeline,
                            format!("no pipeline registered for extension '{extension}'"),
                            key,
                        ),
                    );
                }
                continue;
            };
            tracing::info!(%extension, items = batch.len(), "dispatching group");
            let (successes, failures) = pipeline.run(&self.executor, batch).await;
            errors.extend(failures);
            for (key, item) in successes {
                match item.into_document() {
                    Ok(doc) => {
                        documents.insert(key, doc);
                    }
                    Err(err) => {
                        errors.insert(
                            key.clone(),
                            ProcessingError::from_stage_error(&err, key),
                        );
                    }
                }
            }
        }

        // Rebuild in caller order; failed inputs come back as stubs.
        let mut extracted = Vec::with_capacity(order.len());
        let mut sorted_errors = Vec::new();
        for key in order {
            match documents.remove(&key) {
                Some(mut doc) => {
                    // The workdir dies with this call; paths into it
                    // must not leak.
                    doc.metainfo.file_features.file = None;
                    extracted.push(doc);
                }
                None => {
                    extracted.push(Document::stub(&key));
                    match errors.remove(&key) {
                        Some(error) => sorted_errors.push(error),
                        // An input can only go missing through a path
                        // already recorded as an error; guard anyway.
                        None => sorted_errors.push(ProcessingError::new(
                            ErrorKind::Input,
                            "input lost during processing",
                            key,
                        )),
                    }
                }
            }
        }
        Ok((extracted, sorted_errors))
    }
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmConfig;

    fn dispatcher() -> Dispatcher {
        let model =
            Arc::new(LlmClient::new(LlmConfig::new("http://localhost:1", "m")).unwrap());
        Dispatcher::new(&Settings::default(), Arc::clone(&model), model).unwrap()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("noext"), "");
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (extracted, errors) = dispatcher().extract_batch(Vec::new(), "en").await.unwrap();
        assert!(extracted.is_empty());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_filenames_rejected() {
        let inputs = vec![
            BatchInput::new("same.pdf", FileRef::Memory(vec![1])),
            BatchInput::new("same.pdf", FileRef::Memory(vec![2])),
        ];
        let err = dispatcher().extract_batch(inputs, "en").await.unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateFilename(_)));
    }

    #[tokio::test]
    async fn test_unknown_extension_yields_stub_and_error() {
        let inputs = vec![BatchInput::new("missing.xyz", FileRef::Memory(vec![0]))];
        let (extracted, errors) = dispatcher().extract_batch(inputs, "en").await.unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(
            extracted[0].metainfo.file_features.filename,
            "missing.xyz"
        );
        assert!(extracted[0].chunks.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::NoPipeline);
        assert_eq!(errors[0].file, "missing.xyz");
    }

    #[tokio::test]
    async fn test_order_preserved_with_mixed_outcomes() {
        // Unreachable backends make every known-extension input fail,
        // but order and cardinality still hold.
        let inputs = vec![
            BatchInput::new("one.xyz", FileRef::Memory(vec![0])),
            BatchInput::new("two.abc", FileRef::Memory(vec![0])),
            BatchInput::new("three.xyz", FileRef::Memory(vec![0])),
        ];
        let (extracted, errors) = dispatcher().extract_batch(inputs, "en").await.unwrap();
        let names: Vec<&str> = extracted
            .iter()
            .map(|d| d.metainfo.file_features.filename.as_str())
            .collect();
        assert_eq!(names, vec!["one.xyz", "two.abc", "three.xyz"]);
        assert_eq!(errors.len(), 3);
    }

    #[tokio::test]
    async fn test_per_file_language_override() {
        // A txt input fails at the LLM stage (no backend in tests), but
        // the language must have been seeded before that.
        let mut input = BatchInput::new("de.txt", FileRef::Memory(b"Hallo Welt".to_vec()));
        input.language = Some("de".to_string());
        let (extracted, errors) = dispatcher()
            .extract_batch(vec![input], "en")
            .await
            .unwrap();
        assert_eq!(extracted.len(), 1);
        // The llm postprocessor cannot reach a model here, so the input
        // fails and comes back as a stub.
        assert_eq!(errors.len(), 1);
    }
}
