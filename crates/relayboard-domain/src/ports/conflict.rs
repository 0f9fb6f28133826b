//! Conflict and auto-resolution-rule persistence ports (spec §4.5).

use async_trait::async_trait;

use crate::entities::{AutoResolutionRule, ConflictEntityType, SyncConflict};
use crate::error::Result;
use crate::value_objects::ConflictId;

/// Persistence port for sync conflicts.
#[async_trait]
pub trait ConflictRepository: Send + Sync {
    /// Persist a newly detected conflict.
    async fn insert(&self, conflict: &SyncConflict) -> Result<()>;
    /// Fetch a conflict by id.
    async fn get(&self, id: ConflictId) -> Result<SyncConflict>;
    /// List unresolved conflicts, optionally filtered by entity type.
    async fn list_unresolved(&self, entity_type: Option<ConflictEntityType>) -> Result<Vec<SyncConflict>>;
    /// Persist a conflict whose resolution fields have been mutated.
    async fn update(&self, conflict: &SyncConflict) -> Result<()>;
}

/// Persistence port for auto-resolution rules.
#[async_trait]
pub trait AutoResolutionRuleRepository: Send + Sync {
    /// List enabled rules for `entity_type`, ordered by `priority` ascending
    /// (spec §4.5: lower priority value wins, evaluated first).
    async fn list_enabled_for_entity(&self, entity_type: ConflictEntityType) -> Result<Vec<AutoResolutionRule>>;
    /// List every rule regardless of `is_enabled`, for admin management
    /// (spec §6 "CRUD auto-resolution rules").
    async fn list_all(&self) -> Result<Vec<AutoResolutionRule>>;
    /// Persist a newly defined rule.
    async fn insert(&self, rule: &AutoResolutionRule) -> Result<()>;
    /// Persist a mutated rule (e.g. toggling `is_enabled` or re-prioritizing).
    async fn update(&self, rule: &AutoResolutionRule) -> Result<()>;
    /// Remove a rule.
    async fn delete(&self, id: crate::value_objects::RuleId) -> Result<()>;
}
