//! Postgres-backed document-processing queue ports (spec §4.2).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use relayboard_domain::entities::{Document, DocumentChunk, DocumentTask, JobStatus, ProcessingStage};
use relayboard_domain::error::Result;
use relayboard_domain::ports::{DocumentRepository, DocumentTaskRepository};
use relayboard_domain::value_objects::{DocumentId, DocumentTaskId, ProjectId};

use crate::error::from_sqlx;

/// Concrete `document_tasks` table persistence.
pub struct PgDocumentTaskRepository {
    pool: PgPool,
}

impl PgDocumentTaskRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    document_id: Uuid,
    stage: String,
    status: String,
    attempts: i32,
    max_attempts: i32,
    next_retry: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRow> for DocumentTask {
    fn from(row: TaskRow) -> Self {
        DocumentTask {
            id: DocumentTaskId::from_uuid(row.id),
            document_id: DocumentId::from_uuid(row.document_id),
            stage: ProcessingStage::from_str(&row.stage).unwrap_or(ProcessingStage::Extract),
            status: JobStatus::from_str(&row.status).unwrap_or(JobStatus::Pending),
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            next_retry: row.next_retry,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[async_trait]
impl DocumentTaskRepository for PgDocumentTaskRepository {
    async fn find_active_for_document(&self, document_id: DocumentId) -> Result<Option<DocumentTask>> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM document_tasks WHERE document_id = $1 AND status IN ('pending', 'in_progress') LIMIT 1",
        )
        .bind(document_id.inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| from_sqlx("finding active document task", e))?;
        Ok(row.map(DocumentTask::from))
    }

    async fn insert(&self, task: &DocumentTask) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO document_tasks (
                id, document_id, stage, status, attempts, max_attempts,
                next_retry, error_message, created_at, started_at, completed_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            ",
        )
        .bind(task.id.inner())
        .bind(task.document_id.inner())
        .bind(task.stage.to_string())
        .bind(task.status.to_string())
        .bind(task.attempts as i32)
        .bind(task.max_attempts as i32)
        .bind(task.next_retry)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("inserting document task", e))?;
        Ok(())
    }

    async fn get(&self, id: DocumentTaskId) -> Result<DocumentTask> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM document_tasks WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching document task", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("document task {id}")))?;
        Ok(row.into())
    }

    async fn claim_pending(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<DocumentTask>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r"
            UPDATE document_tasks
            SET status = 'in_progress', started_at = $1
            WHERE id IN (
                SELECT id FROM document_tasks
                WHERE status = 'pending' AND next_retry <= $1
                ORDER BY created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            ",
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("claiming pending document tasks", e))?;
        Ok(rows.into_iter().map(DocumentTask::from).collect())
    }

    async fn update(&self, task: &DocumentTask) -> Result<()> {
        sqlx::query(
            r"
            UPDATE document_tasks SET
                stage = $2, status = $3, attempts = $4, next_retry = $5,
                error_message = $6, started_at = $7, completed_at = $8
            WHERE id = $1
            ",
        )
        .bind(task.id.inner())
        .bind(task.stage.to_string())
        .bind(task.status.to_string())
        .bind(task.attempts as i32)
        .bind(task.next_retry)
        .bind(&task.error_message)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("updating document task", e))?;
        Ok(())
    }

    async fn list_in_progress(&self) -> Result<Vec<DocumentTask>> {
        let rows = sqlx::query_as::<_, TaskRow>("SELECT * FROM document_tasks WHERE status = 'in_progress'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("listing in-progress document tasks", e))?;
        Ok(rows.into_iter().map(DocumentTask::from).collect())
    }
}

/// Concrete `documents` / `document_chunks` table persistence.
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    project_id: Uuid,
    filename: String,
    mime_type: String,
    storage_id: String,
    extracted_text: Option<String>,
    created_at: DateTime<Utc>,
    has_search_vector: bool,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: DocumentId::from_uuid(row.id),
            project_id: ProjectId::from_uuid(row.project_id),
            filename: row.filename,
            mime_type: row.mime_type,
            storage_id: row.storage_id,
            extracted_text: row.extracted_text,
            created_at: row.created_at,
            has_search_vector: row.has_search_vector,
        }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn get(&self, id: DocumentId) -> Result<Document> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching document", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("document {id}")))?;
        Ok(row.into())
    }

    async fn save_extracted_text(&self, id: DocumentId, text: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET extracted_text = $2, has_search_vector = true WHERE id = $1")
            .bind(id.inner())
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx("saving extracted text", e))?;
        Ok(())
    }

    async fn replace_chunks(&self, document_id: DocumentId, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| from_sqlx("starting chunk replace transaction", e))?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id.inner())
            .execute(&mut *tx)
            .await
            .map_err(|e| from_sqlx("deleting old chunks", e))?;
        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().map(|v| pgvector_literal(v));
            sqlx::query(
                "INSERT INTO document_chunks (id, document_id, chunk_index, content, embedding) VALUES ($1,$2,$3,$4,$5::vector)",
            )
            .bind(chunk.id.inner())
            .bind(document_id.inner())
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.content)
            .bind(embedding)
            .execute(&mut *tx)
            .await
            .map_err(|e| from_sqlx("inserting chunk", e))?;
        }
        tx.commit().await.map_err(|e| from_sqlx("committing chunk replace transaction", e))?;
        Ok(())
    }

    async fn list_pending_embedding(&self, limit: u32) -> Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r"
            SELECT d.* FROM documents d
            WHERE d.extracted_text IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM document_chunks c WHERE c.document_id = d.id)
            ORDER BY d.created_at ASC
            LIMIT $1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("listing documents pending embedding", e))?;
        Ok(rows.into_iter().map(Document::from).collect())
    }
}

/// Render a vector as the textual literal `pgvector`'s input parser expects.
pub(crate) fn pgvector_literal(values: &[f32]) -> String {
    let joined = values.iter().map(f32::to_string).collect::<Vec<_>>().join(",");
    format!("[{joined}]")
}
