//! Generic job queue service: enqueue, dispatch, retry, and manual controls
//! (spec §4.1).

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;
use tracing::{error, info};

use relayboard_domain::backoff::{self, FailureOutcome};
use relayboard_domain::entities::{Job, JobStatus, JobType};
use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::{JobDedupKey, JobRepository, TickReport};
use relayboard_domain::value_objects::{EntityRef, JobId};

use super::handler_registry::HandlerRegistry;

/// Default `max_attempts` for a job that doesn't specify one (spec §3).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default batch size for a single processing tick (spec §4.1 step 2).
pub const DEFAULT_BATCH_LIMIT: u32 = 50;

/// Error message stamped on jobs recovered from a stuck state (spec §4.7).
pub const STUCK_RECOVERY_MESSAGE: &str = "recovered: exceeded stuck-job threshold";

/// Caller-supplied parameters for [`JobQueueService::enqueue`].
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    /// What kind of work to perform.
    pub job_type: JobType,
    /// Subject entity, if any.
    pub entity: Option<EntityRef>,
    /// Opaque input payload.
    pub payload: Json,
    /// Scheduling priority; higher runs first.
    pub priority: i32,
    /// Attempts allowed before terminal failure.
    pub max_attempts: u32,
    /// Identifier of whoever/whatever is enqueueing this job.
    pub created_by: Option<String>,
    /// Whether to coalesce with an existing pending/in_progress duplicate.
    pub deduplicate: bool,
}

impl EnqueueRequest {
    /// Construct a request with spec-default priority/max_attempts/dedup.
    #[must_use]
    pub fn new(job_type: JobType, entity: Option<EntityRef>, payload: Json) -> Self {
        Self {
            job_type,
            entity,
            payload,
            priority: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_by: None,
            deduplicate: true,
        }
    }
}

/// Orchestrates the generic job queue's full lifecycle (spec §4.1).
#[derive(Clone)]
pub struct JobQueueService {
    repo: Arc<dyn JobRepository>,
    handlers: Arc<HandlerRegistry>,
}

impl JobQueueService {
    /// Construct a service over `repo`, dispatching through `handlers`.
    #[must_use]
    pub fn new(repo: Arc<dyn JobRepository>, handlers: Arc<HandlerRegistry>) -> Self {
        Self { repo, handlers }
    }

    /// Create a job, or return the existing active duplicate (spec §4.1 `enqueue`).
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<Job> {
        if req.deduplicate {
            let key = JobDedupKey::new(req.job_type.clone(), req.entity.clone());
            if let Some(existing) = self.repo.find_active_duplicate(&key).await? {
                return Ok(existing);
            }
        }

        let now = Utc::now();
        let job = Job::new_pending(
            req.job_type,
            req.entity,
            req.payload,
            req.priority,
            req.max_attempts,
            req.created_by,
            now,
        );
        self.repo.insert(&job).await?;
        Ok(job)
    }

    /// Return pending jobs eligible for dispatch now (spec §4.1 `getPending`).
    pub async fn get_pending(&self, job_type: Option<&JobType>, limit: u32) -> Result<Vec<Job>> {
        self.repo.claim_pending(job_type, limit, Utc::now()).await
    }

    /// Move a job back to pending (spec §4.1 `manualRetry`).
    pub async fn manual_retry(&self, job_id: JobId, reset_attempts: bool) -> Result<Job> {
        let mut job = self.repo.get(job_id).await?;
        job.status = JobStatus::Pending;
        job.next_retry = Some(Utc::now());
        job.error_message = None;
        job.error_context = None;
        job.completed_at = None;
        if reset_attempts {
            job.attempts = 0;
        }
        self.repo.update(&job).await?;
        Ok(job)
    }

    /// Delete a job if and only if it is still pending (spec §4.1 `cancel`).
    pub async fn cancel(&self, job_id: JobId) -> Result<bool> {
        self.repo.delete_if_pending(job_id).await
    }

    /// Recover jobs stuck `in_progress` past the threshold (spec §4.7).
    pub async fn recover_stuck(&self) -> Result<u32> {
        let now = Utc::now();
        let stuck: Vec<Job> = self
            .repo
            .list_in_progress()
            .await?
            .into_iter()
            .filter(|job| job.started_at.is_some_and(|started| backoff::is_stuck(started, now)))
            .collect();

        let count = stuck.len() as u32;
        for mut job in stuck {
            job.status = JobStatus::Pending;
            job.next_retry = Some(now);
            job.error_message = Some(STUCK_RECOVERY_MESSAGE.to_owned());
            if let Err(e) = self.repo.update(&job).await {
                error!(job_id = %job.id, error = %e, "failed to persist stuck-job recovery");
            }
        }
        Ok(count)
    }

    async fn mark_completed(&self, job_id: JobId, result: Option<Json>) -> Result<()> {
        let mut job = self.repo.get(job_id).await?;
        // Idempotent: a job already completed is left untouched (spec §8).
        if job.status == JobStatus::Completed {
            return Ok(());
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.result = result;
        job.next_retry = None;
        self.repo.update(&job).await
    }

    /// Fail `job_id` permanently without consulting [`backoff::classify`]
    /// (spec §4.1: "Missing handler is a permanent failure").
    async fn mark_failed_terminal(&self, job_id: JobId, error_message: &str) -> Result<()> {
        let mut job = self.repo.get(job_id).await?;
        let now = Utc::now();
        job.attempts += 1;
        job.last_attempt = Some(now);
        job.error_message = Some(relayboard_domain::entities::job::truncate_error_message(error_message));
        job.status = JobStatus::Failed;
        job.next_retry = None;
        job.completed_at = Some(now);
        self.repo.update(&job).await
    }

    async fn mark_failed_retry(&self, job_id: JobId, error_message: &str, error_context: Option<Json>) -> Result<bool> {
        let mut job = self.repo.get(job_id).await?;
        let now = Utc::now();
        job.attempts += 1;
        job.last_attempt = Some(now);
        job.error_message = Some(relayboard_domain::entities::job::truncate_error_message(error_message));
        if error_context.is_some() {
            job.error_context = error_context;
        }

        let outcome = backoff::decide_outcome(error_message, job.attempts, job.max_attempts);
        let requeued = match outcome {
            FailureOutcome::TerminalFailure => {
                job.status = JobStatus::Failed;
                job.next_retry = None;
                job.completed_at = Some(now);
                false
            }
            FailureOutcome::Requeue => {
                job.status = JobStatus::Pending;
                job.next_retry = Some(backoff::next_retry_at(now, job.attempts));
                true
            }
        };
        self.repo.update(&job).await?;
        Ok(requeued)
    }

    /// Run one processing tick (spec §4.1 "Processing tick (core algorithm)").
    pub async fn process_queue(&self, job_type: Option<&JobType>) -> Result<TickReport> {
        let mut report = TickReport {
            items_recovered: self.recover_stuck().await?,
            ..Default::default()
        };

        // claim_pending is the atomic claim barrier (spec §5): it commits
        // status=in_progress/started_at for each returned row as part of the
        // same conditional UPDATE, so no separate bookkeeping write is needed
        // before dispatch.
        let pending = self.repo.claim_pending(job_type, DEFAULT_BATCH_LIMIT, Utc::now()).await?;

        for job in pending {
            report.items_processed += 1;

            let Some(handler) = self.handlers.get(&job.job_type) else {
                let msg = format!("no handler registered for job type {}", job.job_type);
                report.errors.push(truncate_100(&msg));
                if let Err(e) = self.mark_failed_terminal(job.id, &msg).await {
                    error!(job_id = %job.id, error = %e, "bookkeeping error recording missing-handler failure");
                }
                report.items_failed += 1;
                report.items_max_retries += 1;
                continue;
            };

            match handler.handle(&job).await {
                Ok(result) => {
                    if let Err(e) = self.mark_completed(job.id, result).await {
                        error!(job_id = %job.id, error = %e, "bookkeeping error recording completion");
                    }
                    report.items_succeeded += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    report.errors.push(truncate_100(&message));
                    match self.mark_failed_retry(job.id, &message, failure_context(&e)).await {
                        Ok(true) => {
                            report.items_requeued += 1;
                        }
                        Ok(false) => {
                            report.items_failed += 1;
                            report.items_max_retries += 1;
                        }
                        Err(bookkeeping_err) => {
                            error!(job_id = %job.id, error = %bookkeeping_err, "bookkeeping error recording failure");
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
            failed = report.items_failed,
            requeued = report.items_requeued,
            recovered = report.items_recovered,
            status = report.status,
            "job queue tick complete"
        );
        Ok(report)
    }
}

fn truncate_100(message: &str) -> String {
    message.chars().take(100).collect()
}

fn failure_context(error: &Error) -> Option<Json> {
    Some(serde_json::json!({ "kind": error_kind(error) }))
}

fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::NotFound { .. } => "not_found",
        Error::InvalidArgument { .. } => "invalid_argument",
        Error::Configuration { .. } => "configuration",
        Error::Unauthorized { .. } => "unauthorized",
        Error::Duplicate { .. } => "duplicate",
        Error::Database { .. } => "database",
        Error::Network { .. } => "network",
        Error::Internal { .. } => "internal",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use relayboard_domain::ports::HandlerResult;

    use super::*;

    struct FakeJobRepo {
        jobs: Mutex<Vec<Job>>,
    }

    impl FakeJobRepo {
        fn new(jobs: Vec<Job>) -> Self {
            Self { jobs: Mutex::new(jobs) }
        }

        fn snapshot(&self, id: JobId) -> Job {
            self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned().unwrap()
        }
    }

    #[async_trait]
    impl JobRepository for FakeJobRepo {
        async fn find_active_duplicate(&self, key: &JobDedupKey) -> Result<Option<Job>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| {
                    j.job_type == key.job_type
                        && j.entity == key.entity
                        && matches!(j.status, JobStatus::Pending | JobStatus::InProgress)
                })
                .cloned())
        }

        async fn insert(&self, job: &Job) -> Result<()> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }

        async fn get(&self, id: JobId) -> Result<Job> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("job {id}")))
        }

        async fn claim_pending(&self, job_type: Option<&JobType>, limit: u32, now: chrono::DateTime<Utc>) -> Result<Vec<Job>> {
            let mut guard = self.jobs.lock().unwrap();
            let mut claimed = Vec::new();
            for job in guard.iter_mut() {
                if claimed.len() as u32 >= limit {
                    break;
                }
                if job.status != JobStatus::Pending {
                    continue;
                }
                if job.next_retry.is_some_and(|nr| nr > now) {
                    continue;
                }
                if let Some(jt) = job_type {
                    if job.job_type != *jt {
                        continue;
                    }
                }
                job.status = JobStatus::InProgress;
                job.started_at = Some(now);
                claimed.push(job.clone());
            }
            Ok(claimed)
        }

        async fn update(&self, job: &Job) -> Result<()> {
            let mut guard = self.jobs.lock().unwrap();
            if let Some(slot) = guard.iter_mut().find(|j| j.id == job.id) {
                *slot = job.clone();
            }
            Ok(())
        }

        async fn delete_if_pending(&self, id: JobId) -> Result<bool> {
            let mut guard = self.jobs.lock().unwrap();
            let Some(pos) = guard.iter().position(|j| j.id == id && j.status == JobStatus::Pending) else {
                return Ok(false);
            };
            guard.remove(pos);
            Ok(true)
        }

        async fn list_in_progress(&self) -> Result<Vec<Job>> {
            Ok(self.jobs.lock().unwrap().iter().filter(|j| j.status == JobStatus::InProgress).cloned().collect())
        }
    }

    struct FakeHandler {
        outcome: std::sync::Mutex<std::collections::VecDeque<HandlerResult>>,
    }

    impl FakeHandler {
        fn once(result: HandlerResult) -> Self {
            Self { outcome: std::sync::Mutex::new(std::collections::VecDeque::from([result])) }
        }
    }

    #[async_trait]
    impl relayboard_domain::ports::JobHandler for FakeHandler {
        async fn handle(&self, _job: &Job) -> HandlerResult {
            self.outcome.lock().unwrap().pop_front().unwrap_or_else(|| Ok(None))
        }
    }

    fn pending_job(job_type: JobType) -> Job {
        Job::new_pending(job_type, None, serde_json::json!({}), 0, DEFAULT_MAX_ATTEMPTS, None, Utc::now())
    }

    #[tokio::test]
    async fn enqueue_with_dedup_returns_existing_active_job() {
        let repo = Arc::new(FakeJobRepo::new(Vec::new()));
        let svc = JobQueueService::new(repo.clone(), Arc::new(HandlerRegistry::new()));

        let first = svc
            .enqueue(EnqueueRequest::new(JobType::BulkImport, None, serde_json::json!({})))
            .await
            .unwrap();
        let second = svc
            .enqueue(EnqueueRequest::new(JobType::BulkImport, None, serde_json::json!({"rows": []})))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enqueue_without_dedup_always_creates_a_new_job() {
        let repo = Arc::new(FakeJobRepo::new(Vec::new()));
        let svc = JobQueueService::new(repo.clone(), Arc::new(HandlerRegistry::new()));

        let mut req = EnqueueRequest::new(JobType::BulkImport, None, serde_json::json!({}));
        req.deduplicate = false;
        svc.enqueue(req.clone()).await.unwrap();
        svc.enqueue(req).await.unwrap();

        assert_eq!(repo.jobs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn re_enqueueing_after_completion_creates_a_fresh_row() {
        let repo = Arc::new(FakeJobRepo::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(JobType::JiraRefresh, Arc::new(FakeHandler::once(Ok(Some(serde_json::json!({"done": true}))))));
        let svc = JobQueueService::new(repo.clone(), Arc::new(registry));

        let first = svc.enqueue(EnqueueRequest::new(JobType::JiraRefresh, None, serde_json::json!({}))).await.unwrap();
        let duplicate = svc.enqueue(EnqueueRequest::new(JobType::JiraRefresh, None, serde_json::json!({}))).await.unwrap();
        assert_eq!(first.id, duplicate.id);
        assert_eq!(repo.jobs.lock().unwrap().len(), 1);

        let report = svc.process_queue(Some(&JobType::JiraRefresh)).await.unwrap();
        assert_eq!(report.items_succeeded, 1);
        assert_eq!(repo.snapshot(first.id).status, JobStatus::Completed);

        let after_completion = svc.enqueue(EnqueueRequest::new(JobType::JiraRefresh, None, serde_json::json!({}))).await.unwrap();
        assert_ne!(after_completion.id, first.id);
        assert_eq!(repo.jobs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn recover_stuck_resets_only_jobs_past_threshold() {
        let now = Utc::now();
        let mut stale = pending_job(JobType::EmbeddingGeneration);
        stale.status = JobStatus::InProgress;
        stale.started_at = Some(now - Duration::minutes(45));

        let mut fresh = pending_job(JobType::EmbeddingGeneration);
        fresh.status = JobStatus::InProgress;
        fresh.started_at = Some(now - Duration::minutes(5));

        let stale_id = stale.id;
        let fresh_id = fresh.id;
        let repo = Arc::new(FakeJobRepo::new(vec![stale, fresh]));
        let svc = JobQueueService::new(repo.clone(), Arc::new(HandlerRegistry::new()));

        let recovered = svc.recover_stuck().await.unwrap();
        assert_eq!(recovered, 1);

        let stale_after = repo.snapshot(stale_id);
        assert_eq!(stale_after.status, JobStatus::Pending);
        assert_eq!(stale_after.error_message.as_deref(), Some(STUCK_RECOVERY_MESSAGE));

        let fresh_after = repo.snapshot(fresh_id);
        assert_eq!(fresh_after.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent() {
        let mut job = pending_job(JobType::BulkImport);
        job.status = JobStatus::Completed;
        job.result = Some(serde_json::json!({ "first": true }));
        let id = job.id;
        let repo = Arc::new(FakeJobRepo::new(vec![job]));
        let svc = JobQueueService::new(repo.clone(), Arc::new(HandlerRegistry::new()));

        svc.mark_completed(id, Some(serde_json::json!({ "second": true }))).await.unwrap();

        let after = repo.snapshot(id);
        assert_eq!(after.result, Some(serde_json::json!({ "first": true })));
    }

    #[tokio::test]
    async fn cancel_only_deletes_pending_jobs() {
        let mut in_progress = pending_job(JobType::BulkImport);
        in_progress.status = JobStatus::InProgress;
        let in_progress_id = in_progress.id;
        let pending = pending_job(JobType::BulkImport);
        let pending_id = pending.id;

        let repo = Arc::new(FakeJobRepo::new(vec![in_progress, pending]));
        let svc = JobQueueService::new(repo.clone(), Arc::new(HandlerRegistry::new()));

        assert!(!svc.cancel(in_progress_id).await.unwrap());
        assert!(svc.cancel(pending_id).await.unwrap());
        assert_eq!(repo.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn process_queue_completes_succeeding_job_and_requeues_retryable_failure() {
        let ok_job = pending_job(JobType::BulkImport);
        let ok_id = ok_job.id;
        let mut fail_job = pending_job(JobType::EmbeddingGeneration);
        fail_job.max_attempts = 5;
        let fail_id = fail_job.id;

        let repo = Arc::new(FakeJobRepo::new(vec![ok_job, fail_job]));
        let mut registry = HandlerRegistry::new();
        registry.register(JobType::BulkImport, Arc::new(FakeHandler::once(Ok(Some(serde_json::json!({"ok": true}))))));
        registry.register(
            JobType::EmbeddingGeneration,
            Arc::new(FakeHandler::once(Err(Error::network("connection timeout")))),
        );
        let svc = JobQueueService::new(repo.clone(), Arc::new(registry));

        let report = svc.process_queue(None).await.unwrap();
        assert_eq!(report.items_processed, 2);
        assert_eq!(report.items_succeeded, 1);
        assert_eq!(report.items_requeued, 1);

        let ok_after = repo.snapshot(ok_id);
        assert_eq!(ok_after.status, JobStatus::Completed);
        assert_eq!(ok_after.result, Some(serde_json::json!({"ok": true})));

        let fail_after = repo.snapshot(fail_id);
        assert_eq!(fail_after.status, JobStatus::Pending);
        assert_eq!(fail_after.attempts, 1);
        assert!(fail_after.next_retry.is_some());
    }

    #[tokio::test]
    async fn process_queue_fails_terminally_with_no_registered_handler() {
        let job = pending_job(JobType::DirectoryGroupSync);
        let id = job.id;
        let repo = Arc::new(FakeJobRepo::new(vec![job]));
        let svc = JobQueueService::new(repo.clone(), Arc::new(HandlerRegistry::new()));

        let report = svc.process_queue(None).await.unwrap();
        assert_eq!(report.items_failed, 1);
        assert_eq!(report.status, "error");

        let after = repo.snapshot(id);
        assert!(after.error_message.as_deref().unwrap().contains("no handler registered"));
        assert_eq!(after.status, JobStatus::Failed);
        assert!(after.next_retry.is_none());
    }
}
