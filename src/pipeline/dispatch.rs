//! Bounded, per-document-serialized pipeline dispatch.
//!
//! Each submission becomes one tokio task. The task first takes the
//! document's lock (so two runs of the same document never overlap),
//! then a worker permit, then runs the blocking pipeline on the blocking
//! pool. Completion is delivered through the returned `PipelineTicket`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Semaphore};
use uuid::Uuid;

use super::processor::{DocumentProcessor, PipelineOutcome, ProcessingError};

type DocumentLocks = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

pub struct PipelineQueue {
    processor: Arc<DocumentProcessor>,
    permits: Arc<Semaphore>,
    locks: DocumentLocks,
}

/// Completion handle for one submitted pipeline run.
pub struct PipelineTicket {
    document_id: Uuid,
    receiver: oneshot::Receiver<Result<PipelineOutcome, ProcessingError>>,
}

impl PipelineTicket {
    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<PipelineOutcome, ProcessingError> {
        self.receiver
            .await
            .map_err(|_| ProcessingError::WorkerStopped("completion channel dropped".into()))?
    }
}

impl PipelineQueue {
    pub fn new(processor: Arc<DocumentProcessor>, max_concurrent: usize) -> Self {
        Self {
            processor,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn processor(&self) -> &Arc<DocumentProcessor> {
        &self.processor
    }

    /// Schedule a pipeline run. Must be called from within a tokio runtime.
    pub fn submit(&self, document_id: Uuid) -> PipelineTicket {
        let (sender, receiver) = oneshot::channel();
        let processor = Arc::clone(&self.processor);
        let permits = Arc::clone(&self.permits);
        let locks = Arc::clone(&self.locks);

        tokio::spawn(async move {
            let doc_lock = acquire_lock_entry(&locks, document_id);
            let guard = Arc::clone(&doc_lock).lock_owned().await;

            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    tracing::debug!(document_id = %document_id, "Worker permit acquired");
                    tokio::task::spawn_blocking(move || processor.run_pipeline(&document_id))
                        .await
                        .unwrap_or_else(|e| Err(ProcessingError::WorkerStopped(e.to_string())))
                }
                Err(_) => Err(ProcessingError::WorkerStopped("queue closed".into())),
            };

            drop(guard);
            release_lock_entry(&locks, document_id, doc_lock);

            if sender.send(result).is_err() {
                tracing::debug!(document_id = %document_id, "Pipeline ticket dropped before completion");
            }
        });

        tracing::info!(document_id = %document_id, "Pipeline submitted");
        PipelineTicket {
            document_id,
            receiver,
        }
    }

    /// Documents with a queued or running pipeline.
    pub fn active_documents(&self) -> usize {
        lock_table(&self.locks).len()
    }
}

fn lock_table(
    locks: &DocumentLocks,
) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn acquire_lock_entry(locks: &DocumentLocks, document_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
    Arc::clone(lock_table(locks).entry(document_id).or_default())
}

/// Remove the table entry once no other submission holds it.
fn release_lock_entry(
    locks: &DocumentLocks,
    document_id: Uuid,
    entry: Arc<tokio::sync::Mutex<()>>,
) {
    let mut table = lock_table(locks);
    // table + this task
    if Arc::strong_count(&entry) <= 2 {
        table.remove(&document_id);
    }
}
