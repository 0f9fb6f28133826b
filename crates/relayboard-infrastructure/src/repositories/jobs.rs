//! Postgres-backed [`JobRepository`] (spec §4.1, §5 claim barrier).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use relayboard_domain::entities::{Job, JobStatus, JobType};
use relayboard_domain::error::Result;
use relayboard_domain::ports::{JobDedupKey, JobRepository};
use relayboard_domain::value_objects::{EntityRef, JobId};

use crate::error::from_sqlx;

/// Concrete `jobs` table persistence.
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    status: String,
    entity_type: Option<String>,
    entity_id: Option<String>,
    payload: Json,
    result: Option<Json>,
    error_message: Option<String>,
    error_context: Option<Json>,
    priority: i32,
    attempts: i32,
    max_attempts: i32,
    next_retry: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    created_by: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: JobId::from_uuid(row.id),
            job_type: JobType::from_key(&row.job_type),
            status: JobStatus::from_str(&row.status).unwrap_or(JobStatus::Pending),
            entity: row.entity_type.zip(row.entity_id).map(|(entity_type, entity_id)| EntityRef {
                entity_type,
                entity_id,
            }),
            payload: row.payload,
            result: row.result,
            error_message: row.error_message,
            error_context: row.error_context,
            priority: row.priority,
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            next_retry: row.next_retry,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_attempt: row.last_attempt,
            created_by: row.created_by,
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn find_active_duplicate(&self, key: &JobDedupKey) -> Result<Option<Job>> {
        let (entity_type, entity_id) = match &key.entity {
            Some(e) => (Some(e.entity_type.as_str()), Some(e.entity_id.as_str())),
            None => (None, None),
        };
        let row = sqlx::query_as::<_, JobRow>(
            r"
            SELECT * FROM jobs
            WHERE job_type = $1
              AND entity_type IS NOT DISTINCT FROM $2
              AND entity_id IS NOT DISTINCT FROM $3
              AND status IN ('pending', 'in_progress')
            LIMIT 1
            ",
        )
        .bind(key.job_type.as_key())
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| from_sqlx("finding active duplicate job", e))?;
        Ok(row.map(Job::from))
    }

    async fn insert(&self, job: &Job) -> Result<()> {
        let (entity_type, entity_id) = match &job.entity {
            Some(e) => (Some(e.entity_type.as_str()), Some(e.entity_id.as_str())),
            None => (None, None),
        };
        sqlx::query(
            r"
            INSERT INTO jobs (
                id, job_type, status, entity_type, entity_id, payload, result,
                error_message, error_context, priority, attempts, max_attempts,
                next_retry, created_at, started_at, completed_at, last_attempt, created_by
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            ",
        )
        .bind(job.id.inner())
        .bind(job.job_type.as_key())
        .bind(job.status.to_string())
        .bind(entity_type)
        .bind(entity_id)
        .bind(&job.payload)
        .bind(&job.result)
        .bind(&job.error_message)
        .bind(&job.error_context)
        .bind(job.priority)
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.next_retry)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_attempt)
        .bind(&job.created_by)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("inserting job", e))?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching job", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("job {id}")))?;
        Ok(row.into())
    }

    async fn claim_pending(&self, job_type: Option<&JobType>, limit: u32, now: DateTime<Utc>) -> Result<Vec<Job>> {
        // A single conditional UPDATE ... RETURNING is the atomic claim
        // barrier (spec §5): a row another ticker already claimed no
        // longer matches `status = 'pending'` by the time this runs.
        let rows = sqlx::query_as::<_, JobRow>(
            r"
            UPDATE jobs
            SET status = 'in_progress', started_at = $1
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending'
                  AND next_retry <= $1
                  AND ($2::text IS NULL OR job_type = $2)
                ORDER BY priority DESC, created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            ",
        )
        .bind(now)
        .bind(job_type.map(JobType::as_key))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("claiming pending jobs", e))?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r"
            UPDATE jobs SET
                status = $2, result = $3, error_message = $4, error_context = $5,
                attempts = $6, next_retry = $7, started_at = $8, completed_at = $9,
                last_attempt = $10
            WHERE id = $1
            ",
        )
        .bind(job.id.inner())
        .bind(job.status.to_string())
        .bind(&job.result)
        .bind(&job.error_message)
        .bind(&job.error_context)
        .bind(job.attempts as i32)
        .bind(job.next_retry)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_attempt)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("updating job", e))?;
        Ok(())
    }

    async fn delete_if_pending(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND status = 'pending'")
            .bind(id.inner())
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx("cancelling job", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_in_progress(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE status = 'in_progress'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("listing in-progress jobs", e))?;
        Ok(rows.into_iter().map(Job::from).collect())
    }
}
