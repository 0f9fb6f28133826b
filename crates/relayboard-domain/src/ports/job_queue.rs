//! Generic job queue repository and handler registry ports (spec §4.1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use crate::entities::{Job, JobType};
use crate::error::Result;
use crate::value_objects::{EntityRef, JobId};

/// Filter for matching jobs on `(job_type, entity_type, entity_id)`.
///
/// Each field is matched *only when supplied* (spec §4.1 enqueue semantics):
/// a `None` filter field matches rows whose corresponding column is also
/// null, not "any value".
#[derive(Debug, Clone)]
pub struct JobDedupKey {
    /// Job type to match, required.
    pub job_type: JobType,
    /// Entity reference to match, if the caller supplied one.
    pub entity: Option<EntityRef>,
}

impl JobDedupKey {
    /// Construct a dedup key for the given job type and optional entity.
    #[must_use]
    pub fn new(job_type: JobType, entity: Option<EntityRef>) -> Self {
        Self { job_type, entity }
    }
}

/// Persistence port for the generic job queue (spec §4.1).
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Find an existing job matching `key` whose status is pending or
    /// in_progress, per the deduplication rule in spec §4.1.
    async fn find_active_duplicate(&self, key: &JobDedupKey) -> Result<Option<Job>>;

    /// Persist a newly created job.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Job>;

    /// Atomically claim up to `limit` pending jobs eligible at `now`
    /// (`next_retry <= now`), optionally filtered by type, ordered by
    /// `priority` DESC then `created_at` ASC, transitioning each to
    /// `in_progress` as part of the same claim (spec §4.1, §5 claim barrier).
    ///
    /// This is the atomic "conditional UPDATE returning rows" operation
    /// spec §5 requires to avoid a read-then-claim race between tickers.
    async fn claim_pending(
        &self,
        job_type: Option<&JobType>,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>>;

    /// Persist a job whose lifecycle fields have been mutated by the
    /// dispatcher (markCompleted / markFailedRetry / manualRetry / recoverStuck).
    async fn update(&self, job: &Job) -> Result<()>;

    /// Delete a job, but only if its current status is `pending`. Returns
    /// whether a row was removed (spec §4.1 `cancel`).
    async fn delete_if_pending(&self, id: JobId) -> Result<bool>;

    /// Fetch every job currently `in_progress`, for stuck-recovery scanning.
    async fn list_in_progress(&self) -> Result<Vec<Job>>;
}

/// Outcome of invoking a handler (spec §4.1 handler registry contract).
pub type HandlerResult = Result<Option<Json>>;

/// A typed handler registered for one or more job types (spec §4.1).
///
/// Handlers receive the job read-only and must not mutate lifecycle
/// fields themselves; the dispatcher owns `status`/`attempts`/timestamps.
/// Handlers should be idempotent: at-least-once delivery means a crash
/// between the handler's own commit and `markCompleted` causes a retry.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run the handler body for `job`, returning an optional result map.
    async fn handle(&self, job: &Job) -> HandlerResult;
}

/// Outcome of a single `processQueue` tick (spec §4.1 step 4-5).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TickReport {
    /// Overall status: `success`, `partial`, or `error`.
    pub status: &'static str,
    /// Jobs claimed and attempted this tick.
    pub items_processed: u32,
    /// Jobs that completed successfully.
    pub items_succeeded: u32,
    /// Jobs terminally failed this tick.
    pub items_failed: u32,
    /// Jobs requeued for retry this tick.
    pub items_requeued: u32,
    /// Jobs that hit `max_attempts` and failed terminally.
    pub items_max_retries: u32,
    /// Stuck jobs recovered to pending at the start of this tick.
    pub items_recovered: u32,
    /// Per-job error messages, each capped to 100 chars.
    pub errors: Vec<String>,
    /// When the tick completed.
    pub timestamp: DateTime<Utc>,
}

impl TickReport {
    /// Finalize `status` from the accumulated counts (spec §4.1 step 5).
    pub fn finalize(&mut self) {
        self.status = if self.items_failed == 0 && self.items_max_retries == 0 {
            "success"
        } else if self.items_succeeded > 0 || self.items_requeued > 0 {
            "partial"
        } else {
            "error"
        };
    }
}
