//! Strong-typed identifiers and small value objects shared across entities.

use crate::define_id;

define_id!(JobId, "Unique identifier for a background job.");
define_id!(DocumentTaskId, "Unique identifier for a document-processing task.");
define_id!(ConflictId, "Unique identifier for a sync conflict.");
define_id!(RuleId, "Unique identifier for an auto-resolution rule.");
define_id!(TagId, "Unique identifier for a tag.");
define_id!(ContactId, "Unique identifier for a contact.");
define_id!(OrganizationId, "Unique identifier for an organization (CRM entity, not tenant).");
define_id!(ProjectId, "Unique identifier for a project.");
define_id!(DocumentId, "Unique identifier for a document.");
define_id!(ChunkId, "Unique identifier for a document chunk.");

/// Which entity type a sync conflict / entity reference is about.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    /// A contact record.
    Contact,
    /// An organization record.
    Organization,
}

/// A reference to the subject of a job, if any (spec §3 `Job.entity_type`/`entity_id`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntityRef {
    /// The kind of entity this job operates on (free-form label; not
    /// restricted to `EntityKind` since jobs can reference documents,
    /// projects, teams, etc).
    pub entity_type: String,
    /// The identifier of the referenced entity, as an opaque string.
    pub entity_id: String,
}
