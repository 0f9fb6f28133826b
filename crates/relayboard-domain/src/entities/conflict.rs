//! Sync conflicts and auto-resolution rules (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value_objects::{ConflictId, RuleId};

/// Which entity family a conflict or rule applies to.
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
pub enum ConflictEntityType {
    /// A contact record.
    Contact,
    /// An organization record.
    Organization,
}

/// Which side a resolution preferred/applied.
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
pub enum ResolutionType {
    /// Push the local snapshot to the board.
    KeepLocal,
    /// Pull the board snapshot into the local record.
    KeepExternal,
    /// Apply a per-field selection supplied by the caller.
    Merge,
}

/// Which side an [`AutoResolutionRule`] prefers.
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
pub enum PreferredSource {
    /// Prefer the local value.
    Local,
    /// Prefer the external (board) value.
    External,
}

/// A detected divergence between the local record and the board, awaiting
/// resolution (spec §3 "SyncConflict", §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique identifier.
    pub id: ConflictId,
    /// Which entity family this conflict is about.
    pub entity_type: ConflictEntityType,
    /// Opaque identifier of the specific entity, as a string (cross-type).
    pub entity_id: String,
    /// Snapshot of the local record at the moment the conflict was detected.
    pub npd_data: Json,
    /// Snapshot of the board's data at the moment of detection.
    pub external_data: Json,
    /// Names of the fields that diverged.
    pub conflict_fields: Vec<String>,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
    /// When the conflict was resolved, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
    /// How the conflict was resolved, if it has been.
    pub resolution_type: Option<ResolutionType>,
    /// Identifier of whoever resolved it (admin user or a rule-driven actor).
    pub resolved_by_id: Option<String>,
}

impl SyncConflict {
    /// Whether this conflict has already been resolved (spec §4.5 idempotence).
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Construct a freshly detected, unresolved conflict.
    #[must_use]
    pub fn new_detected(
        entity_type: ConflictEntityType,
        entity_id: String,
        npd_data: Json,
        external_data: Json,
        conflict_fields: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            entity_type,
            entity_id,
            npd_data,
            external_data,
            conflict_fields,
            detected_at: now,
            resolved_at: None,
            resolution_type: None,
            resolved_by_id: None,
        }
    }
}

/// A policy that resolves conflicts on a given field without human input
/// (spec §3 "AutoResolutionRule", §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResolutionRule {
    /// Unique identifier.
    pub id: RuleId,
    /// Human-readable label.
    pub name: String,
    /// Which entity family this rule applies to.
    pub entity_type: ConflictEntityType,
    /// Which field this rule resolves when it conflicts.
    pub field_name: String,
    /// Which side wins when this rule matches.
    pub preferred_source: PreferredSource,
    /// Whether the rule is currently active.
    pub is_enabled: bool,
    /// Evaluation order; lower values are evaluated first (spec §4.5).
    pub priority: i32,
    /// Identifier of the admin who created the rule.
    pub created_by_id: Option<String>,
}
