//! Document-processing queue ports and external collaborators (spec §4.2, §6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{Document, DocumentChunk, DocumentTask};
use crate::error::Result;
use crate::value_objects::{DocumentId, DocumentTaskId};

/// Persistence port for the document-processing queue (spec §4.2).
///
/// Mirrors [`crate::ports::job_queue::JobRepository`]'s claim-barrier shape,
/// but dedup keys solely on `document_id`.
#[async_trait]
pub trait DocumentTaskRepository: Send + Sync {
    /// Find an existing task for `document_id` whose status is pending or
    /// in_progress (spec §4.2 dedup key).
    async fn find_active_for_document(&self, document_id: DocumentId) -> Result<Option<DocumentTask>>;

    /// Persist a newly created task.
    async fn insert(&self, task: &DocumentTask) -> Result<()>;

    /// Fetch a task by id.
    async fn get(&self, id: DocumentTaskId) -> Result<DocumentTask>;

    /// Atomically claim up to `limit` pending tasks eligible at `now`,
    /// transitioning each to `in_progress` as part of the claim.
    async fn claim_pending(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<DocumentTask>>;

    /// Persist a task whose lifecycle fields have been mutated.
    async fn update(&self, task: &DocumentTask) -> Result<()>;

    /// Fetch every task currently `in_progress`, for stuck-recovery scanning.
    async fn list_in_progress(&self) -> Result<Vec<DocumentTask>>;
}

/// Persistence port for documents and their chunks.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, id: DocumentId) -> Result<Document>;

    /// Persist extracted text and flip `has_search_vector` on.
    async fn save_extracted_text(&self, id: DocumentId, text: &str) -> Result<()>;

    /// Replace all chunks for a document with a freshly computed set
    /// (spec §4.2 step 5: failed embeddings persist as chunks without vectors).
    async fn replace_chunks(&self, document_id: DocumentId, chunks: &[DocumentChunk]) -> Result<()>;

    /// List documents with extracted text but no chunks yet, for the
    /// periodic/admin embedding-generation handler (spec §4.1 table).
    async fn list_pending_embedding(&self, limit: u32) -> Result<Vec<Document>>;
}

/// Raw-bytes storage for uploaded documents (spec §6 "Storage adapter").
///
/// A missing file must raise a distinguishable not-found error — the core
/// depends on this to classify "File not found in storage" as non-retryable.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the raw bytes stored under `storage_id`.
    async fn read(&self, storage_id: &str) -> Result<Vec<u8>>;
    /// Save `bytes` under a new storage id, returning it.
    async fn save(&self, bytes: &[u8], filename: &str, project_id: &str) -> Result<String>;
    /// Delete the bytes stored under `storage_id`.
    async fn delete(&self, storage_id: &str) -> Result<()>;
    /// Whether `storage_id` currently exists.
    async fn exists(&self, storage_id: &str) -> Result<bool>;
}

/// Plain-text extraction from raw document bytes (spec §6 "Text extractor").
///
/// An unsupported MIME type must raise a specific, distinguishable error so
/// it can be classified as non-retryable (spec §4.2).
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from `bytes` of the given `mime_type`.
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String>;
}

/// Vector embedding generation (spec §6 "Embedding service").
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed `text`, returning `None` on a non-fatal failure (the chunk is
    /// still persisted, without a vector, per spec §4.2 step 5).
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>>;

    /// Split `text` into chunk strings; used when the embedding service
    /// itself owns chunk-boundary heuristics rather than the local splitter.
    async fn chunk_text(&self, text: &str) -> Result<Vec<String>>;
}
