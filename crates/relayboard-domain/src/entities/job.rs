//! Generic job entity (spec §3 "Job", §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value_objects::{EntityRef, JobId};

/// The type of work a job performs. `Custom` covers job types registered
/// at runtime by callers outside the built-in handler table (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Refresh stale cached statuses for external links (spec §4.1 table).
    JiraRefresh,
    /// Validate and materialize bulk-imported rows into projects.
    BulkImport,
    /// Walk a board's items and upsert local contact records.
    BoardSyncContacts,
    /// Walk a board's items and upsert local organization records.
    BoardSyncOrganizations,
    /// Generate embeddings for documents that have text but no chunks yet.
    EmbeddingGeneration,
    /// Reconcile a team's members against a directory group.
    DirectoryGroupSync,
    /// Push a single dirty entity to the external board.
    SyncEgress,
    /// A caller-defined job type not in the built-in table.
    Custom(String),
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl JobType {
    /// Canonical string form stored in the database / used for dedup keys.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::JiraRefresh => "jira_refresh".to_owned(),
            Self::BulkImport => "bulk_import".to_owned(),
            Self::BoardSyncContacts => "board_sync_contacts".to_owned(),
            Self::BoardSyncOrganizations => "board_sync_organizations".to_owned(),
            Self::EmbeddingGeneration => "embedding_generation".to_owned(),
            Self::DirectoryGroupSync => "directory_group_sync".to_owned(),
            Self::SyncEgress => "sync_egress".to_owned(),
            Self::Custom(label) => format!("custom:{label}"),
        }
    }

    /// Parse the canonical string form back into a `JobType`.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "jira_refresh" => Self::JiraRefresh,
            "bulk_import" => Self::BulkImport,
            "board_sync_contacts" => Self::BoardSyncContacts,
            "board_sync_organizations" => Self::BoardSyncOrganizations,
            "embedding_generation" => Self::EmbeddingGeneration,
            "directory_group_sync" => Self::DirectoryGroupSync,
            "sync_egress" => Self::SyncEgress,
            other => match other.strip_prefix("custom:") {
                Some(label) => Self::Custom(label.to_owned()),
                None => Self::Custom(other.to_owned()),
            },
        }
    }
}

/// Lifecycle status of a job (spec §3 invariant (a)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be picked up (or waiting out a back-off delay).
    Pending,
    /// Currently claimed and running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Terminated permanently (non-retryable error or retries exhausted).
    Failed,
}

/// A unit of durable background work (spec §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// What kind of work this job performs.
    pub job_type: JobType,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Subject entity this job operates on, if any.
    pub entity: Option<EntityRef>,
    /// Opaque structured input payload.
    pub payload: Json,
    /// Opaque structured result, set on success.
    pub result: Option<Json>,
    /// Error message truncated to 500 chars, set on failure/retry.
    pub error_message: Option<String>,
    /// Structured error context attached alongside `error_message`.
    pub error_context: Option<Json>,
    /// Higher runs first.
    pub priority: i32,
    /// Number of attempts made so far.
    pub attempts: u32,
    /// Maximum attempts before terminal failure.
    pub max_attempts: u32,
    /// Instant at/after which this job may be picked again. `None` once
    /// the job reaches a terminal state (spec §3 invariant (e)).
    pub next_retry: Option<DateTime<Utc>>,
    /// When the job was created (does not change on re-enqueue).
    pub created_at: DateTime<Utc>,
    /// When the job was first picked up, if ever.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state, if ever.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the last attempt (success or failure) occurred.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Identifier of whoever/whatever created the job.
    pub created_by: Option<String>,
}

/// Error message max length before truncation (spec §3).
pub const ERROR_MESSAGE_MAX_LEN: usize = 500;

/// Truncate an error message to the spec's 500-character limit.
#[must_use]
pub fn truncate_error_message(message: &str) -> String {
    if message.chars().count() <= ERROR_MESSAGE_MAX_LEN {
        message.to_owned()
    } else {
        message.chars().take(ERROR_MESSAGE_MAX_LEN).collect()
    }
}

impl Job {
    /// Construct a new pending job, immediately eligible (`next_retry = now`).
    #[must_use]
    pub fn new_pending(
        job_type: JobType,
        entity: Option<EntityRef>,
        payload: Json,
        priority: i32,
        max_attempts: u32,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            entity,
            payload,
            result: None,
            error_message: None,
            error_context: None,
            priority,
            attempts: 0,
            max_attempts,
            next_retry: Some(now),
            created_at: now,
            started_at: None,
            completed_at: None,
            last_attempt: None,
            created_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trips_through_key() {
        for jt in [
            JobType::JiraRefresh,
            JobType::BulkImport,
            JobType::BoardSyncContacts,
            JobType::BoardSyncOrganizations,
            JobType::EmbeddingGeneration,
            JobType::DirectoryGroupSync,
            JobType::SyncEgress,
            JobType::Custom("widget_refresh".to_owned()),
        ] {
            let key = jt.as_key();
            assert_eq!(JobType::from_key(&key).as_key(), key);
        }
    }

    #[test]
    fn truncates_long_error_messages() {
        let long = "x".repeat(600);
        assert_eq!(truncate_error_message(&long).len(), ERROR_MESSAGE_MAX_LEN);
    }

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_error_message("short"), "short");
    }
}
