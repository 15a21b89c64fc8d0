//! Pipeline: an ordered list of stages for one file type.

use std::sync::Arc;

use super::{Batch, BatchExecutor, Failures, Stage};

/// Ordered stages applied to every document of one extension group.
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Arc<dyn Stage>>) -> Self {
        Self { steps }
    }

    /// Run all stages left to right. An input that fails at stage N is
    /// excluded from stage N+1; its first error is the one kept.
    pub async fn run(&self, executor: &BatchExecutor, mut batch: Batch) -> (Batch, Failures) {
        let mut errors = Failures::new();
        for step in &self.steps {
            tracing::info!(stage = step.name(), items = batch.len(), "running stage");
            let (successes, failures) = executor.execute(step, batch).await;
            errors.extend(failures);
            batch = successes;
            if batch.is_empty() {
                break;
            }
        }
        (batch, errors)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::Settings;
    use crate::models::{Document, StageError};
    use crate::pipeline::{Item, ParallelMode};

    struct AppendTag(&'static str);

    #[async_trait]
    impl Stage for AppendTag {
        fn name(&self) -> &'static str {
            "append_tag"
        }

        fn parallel(&self) -> ParallelMode {
            ParallelMode::Serial
        }

        async fn process_single(&self, item: Item) -> Result<Item, StageError> {
            let mut doc = item.into_document()?;
            doc.metainfo.title.push_str(self.0);
            Ok(doc.into())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl Stage for RejectAll {
        fn name(&self) -> &'static str {
            "reject_all"
        }

        async fn process_single(&self, _item: Item) -> Result<Item, StageError> {
            Err(StageError::External("down".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_input_skips_later_stages() {
        let pipeline = Pipeline::new(vec![
            Arc::new(AppendTag("a")),
            Arc::new(RejectAll),
            Arc::new(AppendTag("b")),
        ]);
        let executor = BatchExecutor::new(&Settings::default());
        let batch = vec![("f.pdf".to_string(), Item::Document(Document::stub("f.pdf")))];
        let (ok, errors) = pipeline.run(&executor, batch).await;
        assert!(ok.is_empty());
        // Exactly one error, from the stage where the input first failed.
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["f.pdf"].file, "f.pdf");
    }

    #[tokio::test]
    async fn test_stages_thread_state_forward() {
        let pipeline = Pipeline::new(vec![Arc::new(AppendTag("-x")), Arc::new(AppendTag("-y"))]);
        let executor = BatchExecutor::new(&Settings::default());
        let mut doc = Document::stub("f.pdf");
        doc.metainfo.title = "t".to_string();
        let batch = vec![("f.pdf".to_string(), Item::Document(doc))];
        let (ok, errors) = pipeline.run(&executor, batch).await;
        assert!(errors.is_empty());
        assert_eq!(ok[0].1.as_document().unwrap().metainfo.title, "t-x-y");
    }
}
