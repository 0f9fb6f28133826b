//! Document-processing queue entity (spec §3 "DocumentTask", §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::job::{truncate_error_message, JobStatus};
use crate::value_objects::{DocumentId, DocumentTaskId};

/// Which half of the pipeline a task is in. A task resumes at `Embed` on
/// retry rather than re-extracting text it already has (spec §4.2 steps
/// 1-3 vs. 4-5).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingStage {
    /// Read bytes via the storage adapter and extract text (steps 1-3).
    Extract,
    /// Chunk the extracted text and embed/persist each chunk (steps 4-5).
    Embed,
}

impl ProcessingStage {
    /// The stage that follows this one, if any (spec §4.2 pipeline order).
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Extract => Some(Self::Embed),
            Self::Embed => None,
        }
    }
}

/// A unit of document-processing work (spec §3 "DocumentTask").
///
/// Kept as a separate entity from [`super::job::Job`] rather than folded
/// into the generic queue, per the spec's own note that the two serve
/// different operational concerns (document pipeline stages vs. arbitrary
/// background work) even though their retry/back-off mechanics are shared
/// via [`crate::backoff`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTask {
    /// Unique identifier.
    pub id: DocumentTaskId,
    /// The document this task processes.
    pub document_id: DocumentId,
    /// Current pipeline stage.
    pub stage: ProcessingStage,
    /// Current lifecycle status (shared enum with the generic job queue).
    pub status: JobStatus,
    /// Number of attempts made so far at the current stage.
    pub attempts: u32,
    /// Maximum attempts before terminal failure.
    pub max_attempts: u32,
    /// Instant at/after which this task may be picked again.
    pub next_retry: Option<DateTime<Utc>>,
    /// Error message truncated to 500 chars, set on failure/retry.
    pub error_message: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was first picked up, if ever.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state, if ever.
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentTask {
    /// Construct a new pending task at the `Extract` stage.
    #[must_use]
    pub fn new_pending(document_id: DocumentId, max_attempts: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: DocumentTaskId::new(),
            document_id,
            stage: ProcessingStage::Extract,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts,
            next_retry: Some(now),
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Record a failure, truncating the message per spec §3.
    pub fn set_error(&mut self, message: &str) {
        self.error_message = Some(truncate_error_message(message));
    }
}
