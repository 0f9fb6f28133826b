//! Document-processing queue: built-in extract→chunk→embed→persist pipeline
//! (spec §4.2).

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use relayboard_domain::backoff::{self, FailureOutcome};
use relayboard_domain::entities::document_task::ProcessingStage;
use relayboard_domain::entities::project::{CHUNK_OVERLAP_CHARS, TARGET_CHUNK_CHARS};
use relayboard_domain::entities::{DocumentChunk, DocumentTask, JobStatus};
use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::{DocumentRepository, DocumentTaskRepository, EmbeddingService, StorageAdapter, TextExtractor};
use relayboard_domain::value_objects::{ChunkId, DocumentId};

/// Default `max_attempts` for document tasks (spec §3 default, shared with jobs).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default batch size for one document-queue tick.
pub const DEFAULT_BATCH_LIMIT: u32 = 50;

/// Report shape shared with the generic job queue tick (spec §6 response shape).
pub use relayboard_domain::ports::TickReport;

/// Orchestrates the document-processing pipeline (spec §4.2).
#[derive(Clone)]
pub struct DocumentQueueService {
    tasks: Arc<dyn DocumentTaskRepository>,
    documents: Arc<dyn DocumentRepository>,
    storage: Arc<dyn StorageAdapter>,
    extractor: Arc<dyn TextExtractor>,
    embeddings: Arc<dyn EmbeddingService>,
}

impl DocumentQueueService {
    /// Construct a service wiring together the pipeline's collaborators.
    #[must_use]
    pub fn new(
        tasks: Arc<dyn DocumentTaskRepository>,
        documents: Arc<dyn DocumentRepository>,
        storage: Arc<dyn StorageAdapter>,
        extractor: Arc<dyn TextExtractor>,
        embeddings: Arc<dyn EmbeddingService>,
    ) -> Self {
        Self {
            tasks,
            documents,
            storage,
            extractor,
            embeddings,
        }
    }

    /// Enqueue processing for `document_id`, or return the active duplicate
    /// (spec §4.2 dedup key: `document_id` alone).
    pub async fn enqueue(&self, document_id: DocumentId) -> Result<DocumentTask> {
        if let Some(existing) = self.tasks.find_active_for_document(document_id).await? {
            return Ok(existing);
        }
        let task = DocumentTask::new_pending(document_id, DEFAULT_MAX_ATTEMPTS, Utc::now());
        self.tasks.insert(&task).await?;
        Ok(task)
    }

    /// Recover tasks stuck `in_progress` past the threshold (spec §4.7, shared policy).
    pub async fn recover_stuck(&self) -> Result<u32> {
        let now = Utc::now();
        let stuck: Vec<DocumentTask> = self
            .tasks
            .list_in_progress()
            .await?
            .into_iter()
            .filter(|t| t.started_at.is_some_and(|started| backoff::is_stuck(started, now)))
            .collect();

        let count = stuck.len() as u32;
        for mut task in stuck {
            task.status = JobStatus::Pending;
            task.next_retry = Some(now);
            task.error_message = Some(crate::use_cases::job_queue::STUCK_RECOVERY_MESSAGE.to_owned());
            if let Err(e) = self.tasks.update(&task).await {
                error!(task_id = %task.id, error = %e, "failed to persist stuck-task recovery");
            }
        }
        Ok(count)
    }

    async fn mark_completed(&self, task_id: relayboard_domain::value_objects::DocumentTaskId) -> Result<()> {
        let mut task = self.tasks.get(task_id).await?;
        if task.status == JobStatus::Completed {
            return Ok(());
        }
        task.status = JobStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.next_retry = None;
        self.tasks.update(&task).await
    }

    async fn mark_failed_retry(
        &self,
        task_id: relayboard_domain::value_objects::DocumentTaskId,
        error_message: &str,
    ) -> Result<bool> {
        let mut task = self.tasks.get(task_id).await?;
        let now = Utc::now();
        task.attempts += 1;
        task.set_error(error_message);

        let outcome = backoff::decide_outcome(error_message, task.attempts, task.max_attempts);
        let requeued = match outcome {
            FailureOutcome::TerminalFailure => {
                task.status = JobStatus::Failed;
                task.next_retry = None;
                task.completed_at = Some(now);
                false
            }
            FailureOutcome::Requeue => {
                task.status = JobStatus::Pending;
                task.next_retry = Some(backoff::next_retry_at(now, task.attempts));
                true
            }
        };
        self.tasks.update(&task).await?;
        Ok(requeued)
    }

    /// Run the built-in pipeline for a single task (spec §4.2 steps 1-5).
    ///
    /// A task retried after an `Embed`-stage failure resumes there instead
    /// of re-extracting text it already has.
    async fn run_pipeline(&self, task: &mut DocumentTask) -> Result<()> {
        let document = self.documents.get(task.document_id).await?;

        if task.stage == ProcessingStage::Extract {
            let bytes = self.storage.read(&document.storage_id).await.map_err(|e| {
                if matches!(e, Error::NotFound { .. }) {
                    Error::invalid_argument("File not found in storage")
                } else {
                    e
                }
            })?;
            let text = self.extractor.extract(&bytes, &document.mime_type).await?;
            self.documents.save_extracted_text(document.id, &text).await?;
            task.stage = ProcessingStage::Embed;
            self.tasks.update(task).await?;
        }

        let document = self.documents.get(task.document_id).await?;
        let text = document
            .extracted_text
            .as_deref()
            .ok_or_else(|| Error::internal("document has no extracted text after extract stage"))?;

        let chunks = split_into_chunks(text);
        let mut persisted = Vec::with_capacity(chunks.len());
        for (index, content) in chunks.into_iter().enumerate() {
            let embedding = self.embeddings.embed(&content).await.unwrap_or(None);
            persisted.push(DocumentChunk {
                id: ChunkId::new(),
                document_id: document.id,
                chunk_index: index as u32,
                content,
                embedding,
            });
        }
        self.documents.replace_chunks(document.id, &persisted).await?;
        Ok(())
    }

    /// Run one processing tick over pending document tasks (spec §4.2, §4.1 shape).
    pub async fn process_queue(&self) -> Result<TickReport> {
        let mut report = TickReport {
            items_recovered: self.recover_stuck().await?,
            ..Default::default()
        };

        let pending = self.tasks.claim_pending(DEFAULT_BATCH_LIMIT, Utc::now()).await?;

        for mut task in pending {
            report.items_processed += 1;

            match self.run_pipeline(&mut task).await {
                Ok(()) => {
                    if let Err(e) = self.mark_completed(task.id).await {
                        error!(task_id = %task.id, error = %e, "bookkeeping error recording document task completion");
                    }
                    report.items_succeeded += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    report.errors.push(message.chars().take(100).collect());
                    match self.mark_failed_retry(task.id, &message).await {
                        Ok(true) => report.items_requeued += 1,
                        Ok(false) => {
                            report.items_failed += 1;
                            report.items_max_retries += 1;
                        }
                        Err(bookkeeping_err) => {
                            error!(task_id = %task.id, error = %bookkeeping_err, "bookkeeping error recording document task failure");
                            report.items_failed += 1;
                        }
                    }
                }
            }
        }

        report.finalize();
        info!(
            processed = report.items_processed,
            succeeded = report.items_succeeded,
            requeued = report.items_requeued,
            recovered = report.items_recovered,
            status = report.status,
            "document queue tick complete"
        );
        Ok(report)
    }
}

/// Split `text` into overlapping chunks, preferring sentence/word breaks
/// near the ideal length (spec §4.2 step 4).
fn split_into_chunks(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let ideal_end = (start + TARGET_CHUNK_CHARS).min(len);
        let end = if ideal_end >= len {
            len
        } else {
            find_break_near(&chars, ideal_end).unwrap_or(ideal_end)
        };

        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_owned());
        }

        if end >= len {
            break;
        }
        start = end.saturating_sub(CHUNK_OVERLAP_CHARS);
        if start >= end {
            start = end;
        }
    }

    chunks
}

/// Search backwards from `ideal` for a sentence or word boundary, within a
/// small window, so chunk boundaries don't split mid-word.
fn find_break_near(chars: &[char], ideal: usize) -> Option<usize> {
    const WINDOW: usize = 80;
    let floor = ideal.saturating_sub(WINDOW);

    for i in (floor..ideal).rev() {
        if matches!(chars[i], '.' | '!' | '?') {
            return Some(i + 1);
        }
    }
    for i in (floor..ideal).rev() {
        if chars[i].is_whitespace() {
            return Some(i + 1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use relayboard_domain::entities::Document;
    use relayboard_domain::value_objects::{DocumentTaskId, ProjectId};

    use super::*;

    struct FakeTaskRepo {
        tasks: Mutex<Vec<DocumentTask>>,
    }

    impl FakeTaskRepo {
        fn new(tasks: Vec<DocumentTask>) -> Self {
            Self { tasks: Mutex::new(tasks) }
        }

        fn snapshot(&self, id: DocumentTaskId) -> DocumentTask {
            self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl DocumentTaskRepository for FakeTaskRepo {
        async fn find_active_for_document(&self, document_id: DocumentId) -> Result<Option<DocumentTask>> {
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.document_id == document_id && matches!(t.status, JobStatus::Pending | JobStatus::InProgress))
                .cloned())
        }

        async fn insert(&self, task: &DocumentTask) -> Result<()> {
            self.tasks.lock().unwrap().push(task.clone());
            Ok(())
        }

        async fn get(&self, id: DocumentTaskId) -> Result<DocumentTask> {
            self.tasks
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("document task {id}")))
        }

        async fn claim_pending(&self, limit: u32, now: chrono::DateTime<Utc>) -> Result<Vec<DocumentTask>> {
            let mut guard = self.tasks.lock().unwrap();
            let mut claimed = Vec::new();
            for task in guard.iter_mut() {
                if claimed.len() as u32 >= limit {
                    break;
                }
                if task.status == JobStatus::Pending && task.next_retry.is_some_and(|t| t <= now) {
                    task.status = JobStatus::InProgress;
                    task.started_at = Some(now);
                    claimed.push(task.clone());
                }
            }
            Ok(claimed)
        }

        async fn update(&self, task: &DocumentTask) -> Result<()> {
            let mut guard = self.tasks.lock().unwrap();
            if let Some(slot) = guard.iter_mut().find(|t| t.id == task.id) {
                *slot = task.clone();
            }
            Ok(())
        }

        async fn list_in_progress(&self) -> Result<Vec<DocumentTask>> {
            Ok(self.tasks.lock().unwrap().iter().filter(|t| t.status == JobStatus::InProgress).cloned().collect())
        }
    }

    struct FakeDocumentRepo {
        documents: Mutex<Vec<Document>>,
        chunks: Mutex<Vec<(DocumentId, Vec<DocumentChunk>)>>,
    }

    #[async_trait]
    impl DocumentRepository for FakeDocumentRepo {
        async fn get(&self, id: DocumentId) -> Result<Document> {
            self.documents
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("document {id}")))
        }

        async fn save_extracted_text(&self, id: DocumentId, text: &str) -> Result<()> {
            let mut guard = self.documents.lock().unwrap();
            if let Some(doc) = guard.iter_mut().find(|d| d.id == id) {
                doc.extracted_text = Some(text.to_owned());
            }
            Ok(())
        }

        async fn replace_chunks(&self, document_id: DocumentId, chunks: &[DocumentChunk]) -> Result<()> {
            self.chunks.lock().unwrap().push((document_id, chunks.to_vec()));
            Ok(())
        }

        async fn list_pending_embedding(&self, _limit: u32) -> Result<Vec<Document>> {
            unimplemented!("not exercised by this test")
        }
    }

    struct FakeStorage {
        missing: bool,
    }

    #[async_trait]
    impl StorageAdapter for FakeStorage {
        async fn read(&self, storage_id: &str) -> Result<Vec<u8>> {
            if self.missing {
                return Err(Error::not_found(format!("blob {storage_id}")));
            }
            Ok(b"hello world".to_vec())
        }
        async fn save(&self, _bytes: &[u8], _filename: &str, _project_id: &str) -> Result<String> {
            unimplemented!("not exercised by this test")
        }
        async fn delete(&self, _storage_id: &str) -> Result<()> {
            unimplemented!("not exercised by this test")
        }
        async fn exists(&self, _storage_id: &str) -> Result<bool> {
            unimplemented!("not exercised by this test")
        }
    }

    struct FakeExtractor;

    #[async_trait]
    impl TextExtractor for FakeExtractor {
        async fn extract(&self, bytes: &[u8], _mime_type: &str) -> Result<String> {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    struct FakeEmbeddings;

    #[async_trait]
    impl EmbeddingService for FakeEmbeddings {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
            Ok(Some(vec![0.1, 0.2]))
        }
        async fn chunk_text(&self, _text: &str) -> Result<Vec<String>> {
            unimplemented!("not exercised by this test")
        }
    }

    fn pending_document(storage_id: &str) -> (Document, DocumentTask) {
        let document = Document {
            id: DocumentId::new(),
            project_id: ProjectId::new(),
            filename: "report.txt".into(),
            mime_type: "text/plain".into(),
            storage_id: storage_id.to_owned(),
            extracted_text: None,
            created_at: Utc::now(),
            has_search_vector: false,
        };
        let task = DocumentTask::new_pending(document.id, DEFAULT_MAX_ATTEMPTS, Utc::now());
        (document, task)
    }

    #[tokio::test]
    async fn process_queue_runs_extract_chunk_embed_and_marks_completed() {
        let (document, task) = pending_document("blob-1");
        let task_id = task.id;
        let tasks = Arc::new(FakeTaskRepo::new(vec![task]));
        let documents = Arc::new(FakeDocumentRepo {
            documents: Mutex::new(vec![document]),
            chunks: Mutex::new(Vec::new()),
        });
        let svc = DocumentQueueService::new(
            tasks.clone(),
            documents.clone(),
            Arc::new(FakeStorage { missing: false }),
            Arc::new(FakeExtractor),
            Arc::new(FakeEmbeddings),
        );

        let report = svc.process_queue().await.unwrap();

        assert_eq!(report.items_succeeded, 1);
        assert_eq!(report.items_processed, 1);
        assert_eq!(tasks.snapshot(task_id).status, JobStatus::Completed);
        assert_eq!(documents.chunks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_blob_fails_terminally_without_retry() {
        let (document, task) = pending_document("missing-blob");
        let task_id = task.id;
        let tasks = Arc::new(FakeTaskRepo::new(vec![task]));
        let documents = Arc::new(FakeDocumentRepo {
            documents: Mutex::new(vec![document]),
            chunks: Mutex::new(Vec::new()),
        });
        let svc = DocumentQueueService::new(
            tasks.clone(),
            documents,
            Arc::new(FakeStorage { missing: true }),
            Arc::new(FakeExtractor),
            Arc::new(FakeEmbeddings),
        );

        let report = svc.process_queue().await.unwrap();

        assert_eq!(report.items_failed, 1);
        assert_eq!(report.items_requeued, 0);
        let stored = tasks.snapshot(task_id);
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn extract_stage_advances_to_embed_and_retry_skips_re_extraction() {
        let (document, task) = pending_document("blob-1");
        let task_id = task.id;
        let tasks = Arc::new(FakeTaskRepo::new(vec![task]));
        let documents = Arc::new(FakeDocumentRepo {
            documents: Mutex::new(vec![document]),
            chunks: Mutex::new(Vec::new()),
        });
        let svc = DocumentQueueService::new(
            tasks.clone(),
            documents.clone(),
            Arc::new(FakeStorage { missing: false }),
            Arc::new(FakeExtractor),
            Arc::new(FakeEmbeddings),
        );

        svc.process_queue().await.unwrap();

        let after_first_run = tasks.snapshot(task_id);
        assert_eq!(after_first_run.status, JobStatus::Completed);

        // A task re-run after reaching Embed must not call the extractor
        // again; storage is flipped to always-missing to prove extract is
        // skipped on the stage-resumed path.
        let mut retried = after_first_run;
        retried.status = JobStatus::Pending;
        retried.next_retry = Some(Utc::now());
        retried.stage = ProcessingStage::Embed;
        tasks.tasks.lock().unwrap()[0] = retried;

        let failing_storage = Arc::new(FakeStorage { missing: true });
        let svc = DocumentQueueService::new(tasks.clone(), documents, failing_storage, Arc::new(FakeExtractor), Arc::new(FakeEmbeddings));
        let report = svc.process_queue().await.unwrap();

        assert_eq!(report.items_succeeded, 1);
        assert_eq!(tasks.snapshot(task_id).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn enqueue_returns_existing_active_task_for_the_same_document() {
        let tasks = Arc::new(FakeTaskRepo::new(Vec::new()));
        let documents = Arc::new(FakeDocumentRepo {
            documents: Mutex::new(Vec::new()),
            chunks: Mutex::new(Vec::new()),
        });
        let svc = DocumentQueueService::new(
            tasks.clone(),
            documents,
            Arc::new(FakeStorage { missing: false }),
            Arc::new(FakeExtractor),
            Arc::new(FakeEmbeddings),
        );

        let document_id = DocumentId::new();
        let first = svc.enqueue(document_id).await.unwrap();
        let second = svc.enqueue(document_id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(tasks.tasks.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_into_chunks("").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_into_chunks("a short document");
        assert_eq!(chunks, vec!["a short document".to_owned()]);
    }

    #[test]
    fn long_text_is_split_with_overlap() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = sentence.repeat(100);
        let chunks = split_into_chunks(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= TARGET_CHUNK_CHARS + 80);
        }
    }
}
