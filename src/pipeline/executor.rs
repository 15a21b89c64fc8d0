//! Batch executor: runs one stage across a keyed batch.
//!
//! The executor owns concurrency and error capture. Per-item errors
//! become [`ProcessingError`] records in the failures map; nothing a
//! stage returns (or panics with) escapes `execute`. Successes and
//! failures are disjoint and their keys together equal the input keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Settings;
use crate::models::{ProcessingError, StageError};

use super::{Batch, Failures, Item, ParallelMode, Stage};

/// Cooperative cancellation flag shared with the caller.
///
/// Cancelling lets in-flight workers finish; items not yet submitted
/// are failed with kind `Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes a stage's per-item function under its declared mode.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    nproc: usize,
    batch_size: usize,
    cancel: CancelFlag,
}

impl BatchExecutor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            nproc: settings.nproc.max(1),
            batch_size: settings.batch_size.max(1),
            cancel: CancelFlag::default(),
        }
    }

    /// Handle the caller can use to cancel the batch.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run `stage` over `batch`, returning disjoint success and
    /// failure maps whose keys together equal the input keys.
    pub async fn execute(&self, stage: &Arc<dyn Stage>, batch: Batch) -> (Batch, Failures) {
        let mut failures = Failures::new();

        // Type discipline: mismatched items fail without reaching the
        // stage, and without crashing the batch.
        let expected = stage.operates_on();
        let (typed, mismatched): (Batch, Batch) = batch
            .into_iter()
            .partition(|(_, item)| item.kind() == expected);
        for (key, item) in mismatched {
            let err = StageError::TypeMismatch {
                expected: expected.to_string(),
                got: item.kind().to_string(),
            };
            tracing::error!(stage = stage.name(), key = %key, %err, "type mismatch");
            failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
        }

        if typed.is_empty() {
            return (Vec::new(), failures);
        }

        if stage.parallel() == ParallelMode::WholeBatch {
            let (successes, batch_failures) = stage.process_whole_batch(typed).await;
            failures.extend(batch_failures);
            return (successes, failures);
        }

        let order: Vec<String> = typed.iter().map(|(key, _)| key.clone()).collect();
        let mut items: HashMap<String, Item> = typed.into_iter().collect();
        let mut results: HashMap<String, Result<Item, StageError>> = HashMap::new();

        for (mode, keys) in stage.schedule(&order_batch(&order, &items)) {
            let sub: Vec<(String, Item)> = keys
                .into_iter()
                .filter_map(|key| items.remove_entry(&key))
                .collect();
            match mode {
                ParallelMode::Serial => self.run_serial(stage, sub, &mut results).await,
                ParallelMode::Thread | ParallelMode::Process => {
                    self.run_parallel(stage, mode, sub, &mut results).await
                }
                ParallelMode::WholeBatch => {
                    // schedule() must not demand whole-batch handling
                    // for a sub-batch; treat it as serial.
                    self.run_serial(stage, sub, &mut results).await
                }
            }
        }

        let mut successes = Batch::new();
        for key in order {
            match results.remove(&key) {
                Some(Ok(item)) => successes.push((key, item)),
                Some(Err(err)) => {
                    tracing::error!(stage = stage.name(), key = %key, %err, "item failed");
                    failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                }
                // Dropped by the schedule hook or lost to a panicking
                // worker. Surface instead of losing the key.
                None => {
                    let err = StageError::Input("item not returned by stage execution".into());
                    failures.insert(key.clone(), ProcessingError::from_stage_error(&err, key));
                }
            }
        }
        (successes, failures)
    }

    async fn run_serial(
        &self,
        stage: &Arc<dyn Stage>,
        sub: Vec<(String, Item)>,
        results: &mut HashMap<String, Result<Item, StageError>>,
    ) {
        for (key, item) in sub {
            if self.cancel.is_cancelled() {
                results.insert(key, Err(StageError::Cancelled));
                continue;
            }
            let result = stage.process_single(item).await;
            results.insert(key, result);
        }
    }

    /// Run a sub-batch under a concurrency cap.
    ///
    /// Items are submitted in groups of `batch_size`; within a group at
    /// most `nproc` workers run at once. Thread mode spawns async
    /// tasks; process mode pushes the work onto the blocking pool for
    /// CPU-bound or non-thread-safe stages.
    async fn run_parallel(
        &self,
        stage: &Arc<dyn Stage>,
        mode: ParallelMode,
        sub: Vec<(String, Item)>,
        results: &mut HashMap<String, Result<Item, StageError>>,
    ) {
        let mut pending = sub.into_iter();
        loop {
            let group: Vec<(String, Item)> = pending.by_ref().take(self.batch_size).collect();
            if group.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                for (key, _) in group {
                    results.insert(key, Err(StageError::Cancelled));
                }
                continue;
            }

            let mut handles = Vec::with_capacity(group.len().min(self.nproc));
            for (key, item) in group {
                let stage = Arc::clone(stage);
                let handle = match mode {
                    ParallelMode::Process => tokio::task::spawn_blocking(move || {
                        let result =
                            futures::executor::block_on(stage.process_single(item));
                        (key, result)
                    }),
                    _ => tokio::spawn(async move {
                        let result = stage.process_single(item).await;
                        (key, result)
                    }),
                };
                handles.push(handle);

                if handles.len() >= self.nproc {
                    for h in handles.drain(..) {
                        collect_handle(h.await, results);
                    }
                }
            }
            for h in handles {
                collect_handle(h.await, results);
            }
        }
    }
}

fn collect_handle(
    joined: Result<(String, Result<Item, StageError>), tokio::task::JoinError>,
    results: &mut HashMap<String, Result<Item, StageError>>,
) {
    match joined {
        Ok((key, result)) => {
            results.insert(key, result);
        }
        Err(join_err) => {
            // A panicking stage loses its key association; the executor
            // itself keeps going. The dispatcher reconciles missing
            // keys against the input list.
            tracing::error!(%join_err, "stage worker panicked");
        }
    }
}

/// Rebuild an ordered batch view for the schedule hook.
fn order_batch(order: &[String], items: &HashMap<String, Item>) -> Batch {
    order
        .iter()
        .filter_map(|key| items.get(key).map(|item| (key.clone(), item.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::models::Document;

    struct UppercaseTitle {
        mode: ParallelMode,
    }

    #[async_trait]
    impl Stage for UppercaseTitle {
        fn name(&self) -> &'static str {
            "uppercase_title"
        }

        fn parallel(&self) -> ParallelMode {
            self.mode
        }

        async fn process_single(&self, item: Item) -> Result<Item, StageError> {
            let mut doc = item.into_document()?;
            doc.metainfo.title = doc.metainfo.title.to_uppercase();
            Ok(doc.into())
        }
    }

    struct FailOn {
        needle: &'static str,
    }

    #[async_trait]
    impl Stage for FailOn {
        fn name(&self) -> &'static str {
            "fail_on"
        }

        async fn process_single(&self, item: Item) -> Result<Item, StageError> {
            let doc = item.into_document()?;
            if doc.metainfo.file_features.filename.contains(self.needle) {
                return Err(StageError::External("simulated failure".into()));
            }
            Ok(doc.into())
        }
    }

    fn make_batch(names: &[&str]) -> Batch {
        names
            .iter()
            .map(|name| {
                let mut doc = Document::stub(*name);
                doc.metainfo.title = format!("title of {name}");
                (name.to_string(), Item::Document(doc))
            })
            .collect()
    }

    fn executor() -> BatchExecutor {
        let mut settings = crate::config::Settings::default();
        settings.nproc = 2;
        settings.batch_size = 3;
        BatchExecutor::new(&settings)
    }

    #[tokio::test]
    async fn test_serial_success() {
        let stage: Arc<dyn Stage> = Arc::new(UppercaseTitle {
            mode: ParallelMode::Serial,
        });
        let (ok, failed) = executor().execute(&stage, make_batch(&["a.pdf", "b.pdf"])).await;
        assert_eq!(ok.len(), 2);
        assert!(failed.is_empty());
        assert_eq!(
            ok[0].1.as_document().unwrap().metainfo.title,
            "TITLE OF A.PDF"
        );
    }

    #[tokio::test]
    async fn test_thread_mode_processes_all_keys() {
        let stage: Arc<dyn Stage> = Arc::new(UppercaseTitle {
            mode: ParallelMode::Thread,
        });
        let names: Vec<String> = (0..10).map(|i| format!("f{i}.pdf")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (ok, failed) = executor().execute(&stage, make_batch(&refs)).await;
        assert_eq!(ok.len(), 10);
        assert!(failed.is_empty());
        let keys: Vec<&str> = ok.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, refs);
    }

    #[tokio::test]
    async fn test_process_mode_processes_all_keys() {
        let stage: Arc<dyn Stage> = Arc::new(UppercaseTitle {
            mode: ParallelMode::Process,
        });
        let (ok, failed) = executor()
            .execute(&stage, make_batch(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]))
            .await;
        assert_eq!(ok.len(), 4);
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn test_failure_isolated_per_item() {
        let stage: Arc<dyn Stage> = Arc::new(FailOn { needle: "bad" });
        let (ok, failed) = executor()
            .execute(&stage, make_batch(&["good.pdf", "bad.pdf"]))
            .await;
        assert_eq!(ok.len(), 1);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed["bad.pdf"].file, "bad.pdf");
        assert_eq!(failed["bad.pdf"].kind, crate::models::ErrorKind::External);
    }

    #[tokio::test]
    async fn test_type_mismatch_recorded_not_crashed() {
        let stage: Arc<dyn Stage> = Arc::new(UppercaseTitle {
            mode: ParallelMode::Serial,
        });
        let mut batch = make_batch(&["a.pdf"]);
        batch.push((
            "stray".to_string(),
            Item::File(crate::models::FileRef::Memory(vec![1, 2, 3])),
        ));
        let (ok, failed) = executor().execute(&stage, batch).await;
        assert_eq!(ok.len(), 1);
        assert_eq!(failed["stray"].kind, crate::models::ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let stage: Arc<dyn Stage> = Arc::new(UppercaseTitle {
            mode: ParallelMode::Thread,
        });
        let (first, _) = executor().execute(&stage, make_batch(&["x.pdf", "y.pdf"])).await;
        let (second, _) = executor().execute(&stage, make_batch(&["x.pdf", "y.pdf"])).await;
        let titles = |batch: &Batch| {
            let mut t: Vec<String> = batch
                .iter()
                .map(|(_, i)| i.as_document().unwrap().metainfo.title.clone())
                .collect();
            t.sort();
            t
        };
        assert_eq!(titles(&first), titles(&second));
    }

    #[tokio::test]
    async fn test_cancelled_items_reported() {
        let exec = executor();
        exec.cancel_flag().cancel();
        let stage: Arc<dyn Stage> = Arc::new(UppercaseTitle {
            mode: ParallelMode::Serial,
        });
        let (ok, failed) = exec.execute(&stage, make_batch(&["a.pdf"])).await;
        assert!(ok.is_empty());
        assert_eq!(failed["a.pdf"].kind, crate::models::ErrorKind::Cancelled);
    }
}
