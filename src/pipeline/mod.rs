//! Pipeline engine: stages, the batch executor, recipes, dispatcher.
//!
//! A [`Stage`] is a single transformation with a declared input kind
//! and parallelism mode. The [`executor::BatchExecutor`] runs one stage
//! across a keyed batch; a [`Pipeline`] chains stages for one file
//! type; the [`dispatcher::Dispatcher`] routes a mixed batch to the
//! right pipelines and recombines the results.

#![allow(dead_code)]

pub mod dispatcher;
pub mod executor;
pub mod pipe;
pub mod recipes;

use std::fmt;

use async_trait::async_trait;

use crate::models::{Document, FileRef, MetaInfo, ProcessingError, StageError};

pub use dispatcher::{BatchInput, DispatchError, Dispatcher};
pub use executor::{BatchExecutor, CancelFlag};
pub use pipe::Pipeline;

/// How the executor schedules a stage's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelMode {
    /// One item at a time, insertion order.
    Serial,
    /// Concurrent async tasks; for I/O-bound stages (HTTP calls).
    Thread,
    /// Blocking-pool workers; for CPU-bound or non-thread-safe work.
    /// Items must carry path-backed file references.
    Process,
    /// The whole batch goes through `process_whole_batch` in one call;
    /// for tools that are themselves batch-shaped (LibreOffice).
    WholeBatch,
}

/// Kind tag for the pipeline item sum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Document,
    Meta,
    File,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "Document"),
            Self::Meta => write!(f, "MetaInfo"),
            Self::File => write!(f, "FileRef"),
        }
    }
}

/// The value a stage consumes and produces.
#[derive(Debug, Clone)]
pub enum Item {
    Document(Document),
    Meta(MetaInfo),
    File(FileRef),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Document(_) => ItemKind::Document,
            Self::Meta(_) => ItemKind::Meta,
            Self::File(_) => ItemKind::File,
        }
    }

    /// Unwrap a document item; stages that declared
    /// `operates_on = Document` may rely on the executor's type check.
    pub fn into_document(self) -> Result<Document, StageError> {
        match self {
            Self::Document(doc) => Ok(doc),
            other => Err(StageError::TypeMismatch {
                expected: ItemKind::Document.to_string(),
                got: other.kind().to_string(),
            }),
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }
}

impl From<Document> for Item {
    fn from(doc: Document) -> Self {
        Self::Document(doc)
    }
}

/// A keyed batch of work items, in insertion order. Keys are unique.
pub type Batch = Vec<(String, Item)>;

/// Per-key failures produced while running a stage.
pub type Failures = std::collections::HashMap<String, ProcessingError>;

/// A single pipeline transformation.
///
/// Stages do their own side-effectful I/O and report failure by
/// returning an error; concurrency and error capture belong to the
/// executor. A stage must not touch batch structure, with two narrow
/// exceptions: `WholeBatch` stages and the `schedule` hook below.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name used in logs and error context.
    fn name(&self) -> &'static str;

    /// The item kind this stage accepts.
    fn operates_on(&self) -> ItemKind {
        ItemKind::Document
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Serial
    }

    /// Transform one item. Pure with respect to other items.
    async fn process_single(&self, item: Item) -> Result<Item, StageError>;

    /// Split the batch into sub-batches with forced modes. The default
    /// schedules everything under the stage's declared mode; the
    /// partitioner overrides this to run scanned inputs serially.
    fn schedule(&self, batch: &Batch) -> Vec<(ParallelMode, Vec<String>)> {
        vec![(
            self.parallel(),
            batch.iter().map(|(k, _)| k.clone()).collect(),
        )]
    }

    /// Whole-batch execution for `ParallelMode::WholeBatch` stages.
    /// The returned maps must be disjoint and cover every input key.
    async fn process_whole_batch(&self, batch: Batch) -> (Batch, Failures) {
        // Only reachable if a stage declares WholeBatch without
        // implementing it.
        let failures = batch
            .iter()
            .map(|(key, _)| {
                (
                    key.clone(),
                    ProcessingError::from_stage_error(
                        &StageError::Input(format!(
                            "stage {} declared whole-batch mode without an implementation",
                            self.name()
                        )),
                        key.clone(),
                    ),
                )
            })
            .collect();
        (Vec::new(), failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileFeatures;

    #[test]
    fn test_item_kind_roundtrip() {
        let doc = Item::Document(Document::stub("a.pdf"));
        assert_eq!(doc.kind(), ItemKind::Document);
        assert!(doc.into_document().is_ok());

        let meta = Item::Meta(MetaInfo::new(FileFeatures::stub("a.pdf"), "en"));
        assert_eq!(meta.kind(), ItemKind::Meta);
        let err = meta.into_document().unwrap_err();
        assert!(matches!(err, StageError::TypeMismatch { .. }));
    }
}
