//! Conflict detection and resolution, including rule-based auto-resolution
//! (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;
use tracing::warn;

use relayboard_domain::entities::conflict::{ConflictEntityType, PreferredSource, ResolutionType};
use relayboard_domain::entities::sync_entity::SyncStatus;
use relayboard_domain::entities::{Contact, Organization, SyncConflict};
use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::{AutoResolutionRuleRepository, ConflictRepository, ContactRepository, OrganizationRepository};
use relayboard_domain::value_objects::{ConflictId, ContactId, OrganizationId};

use super::sync_egress::SyncEgressService;

/// Fields every resolution is permitted to write, per entity type
/// (spec §4.5 "Field-whitelist (security-critical)").
///
/// Identity (`id`), framework-internal (`_sa_instance_state`), and audit
/// timestamp fields (`created_at`, `updated_at`) are never in this set —
/// attempts to write them are silently skipped, not errored.
fn whitelisted_fields(entity_type: ConflictEntityType) -> &'static [&'static str] {
    match entity_type {
        ConflictEntityType::Contact => &["name", "email", "phone", "status"],
        ConflictEntityType::Organization => &["name", "status"],
    }
}

/// Caller-supplied per-field choice for a `merge` resolution.
pub type MergeSelections = HashMap<String, MergeSide>;

/// Which side a single field should take in a `merge` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    /// Take the local value.
    Local,
    /// Take the external (board) value.
    External,
}

/// Caller-supplied resolution intent (spec §4.5 "Resolution types").
#[derive(Debug, Clone)]
pub enum ResolutionRequest {
    /// Apply the local snapshot to the board and mark synced.
    KeepLocal,
    /// Apply the external snapshot's conflicting fields to the local record.
    KeepExternal,
    /// Apply a per-field selection.
    Merge(MergeSelections),
}

/// The set of field→value changes a resolution applies to the local entity,
/// already filtered through the whitelist.
pub type AppliedChanges = HashMap<String, Json>;

/// Outcome of resolving one conflict.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// The conflict as it stands after resolution.
    pub conflict: SyncConflict,
    /// Field changes to apply to the local entity (empty if no-op/idempotent).
    pub applied_changes: AppliedChanges,
    /// Whether an egress re-push should be triggered.
    pub triggers_egress: bool,
}

/// Resolves conflicts, enforcing the field whitelist and evaluating
/// auto-resolution rules before a conflict is ever opened (spec §4.5).
#[derive(Clone)]
pub struct ConflictService {
    conflicts: Arc<dyn ConflictRepository>,
    rules: Arc<dyn AutoResolutionRuleRepository>,
    contacts: Arc<dyn ContactRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    egress: Arc<SyncEgressService>,
}

impl ConflictService {
    /// Construct the service over its repositories, plus the entity
    /// repositories and egress service a resolution applies changes through.
    #[must_use]
    pub fn new(
        conflicts: Arc<dyn ConflictRepository>,
        rules: Arc<dyn AutoResolutionRuleRepository>,
        contacts: Arc<dyn ContactRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        egress: Arc<SyncEgressService>,
    ) -> Self {
        Self {
            conflicts,
            rules,
            contacts,
            organizations,
            egress,
        }
    }

    /// Evaluate enabled auto-resolution rules against a freshly-detected
    /// divergence; return the fields still unresolved and the changes the
    /// matching rules already decided (spec §4.5 "Auto-resolution").
    ///
    /// If the returned unresolved-field list is empty, no conflict record
    /// should be created — the caller applies `resolved_changes` directly.
    pub async fn auto_resolve(
        &self,
        entity_type: ConflictEntityType,
        conflict_fields: &[String],
        npd_data: &Json,
        external_data: &Json,
    ) -> Result<(Vec<String>, AppliedChanges)> {
        let mut rules = self.rules.list_enabled_for_entity(entity_type).await?;
        rules.sort_by_key(|r| r.priority);

        let whitelist = whitelisted_fields(entity_type);
        let mut resolved = AppliedChanges::new();
        let mut unresolved = Vec::new();

        for field in conflict_fields {
            if !whitelist.contains(&field.as_str()) {
                continue;
            }
            let matching_rule = rules.iter().find(|r| r.field_name == *field);
            match matching_rule {
                Some(rule) => {
                    let source = match rule.preferred_source {
                        PreferredSource::Local => npd_data,
                        PreferredSource::External => external_data,
                    };
                    if let Some(value) = unwrap_field_value(source, field) {
                        resolved.insert(field.clone(), value);
                    }
                }
                None => unresolved.push(field.clone()),
            }
        }

        Ok((unresolved, resolved))
    }

    /// Resolve a conflict. Idempotent on an already-resolved conflict
    /// (spec §4.5 "Idempotence", spec §8).
    pub async fn resolve(
        &self,
        conflict_id: ConflictId,
        request: ResolutionRequest,
        resolved_by_id: Option<String>,
    ) -> Result<ResolutionOutcome> {
        let mut conflict = self.conflicts.get(conflict_id).await?;
        if conflict.is_resolved() {
            return Ok(ResolutionOutcome {
                conflict,
                applied_changes: AppliedChanges::new(),
                triggers_egress: false,
            });
        }

        let whitelist = whitelisted_fields(conflict.entity_type);
        let (resolution_type, applied_changes, triggers_egress) = match request {
            ResolutionRequest::KeepLocal => (ResolutionType::KeepLocal, AppliedChanges::new(), true),
            ResolutionRequest::KeepExternal => {
                let mut changes = AppliedChanges::new();
                for field in &conflict.conflict_fields {
                    if !whitelist.contains(&field.as_str()) {
                        continue;
                    }
                    if let Some(value) = unwrap_field_value(&conflict.external_data, field) {
                        changes.insert(field.clone(), value);
                    }
                }
                (ResolutionType::KeepExternal, changes, false)
            }
            ResolutionRequest::Merge(selections) => {
                let mut changes = AppliedChanges::new();
                for field in &conflict.conflict_fields {
                    if !whitelist.contains(&field.as_str()) {
                        continue;
                    }
                    let side = selections
                        .get(field)
                        .ok_or_else(|| Error::invalid_argument("merge_selections required"))?;
                    let source = match side {
                        MergeSide::Local => &conflict.npd_data,
                        MergeSide::External => &conflict.external_data,
                    };
                    if let Some(value) = unwrap_field_value(source, field) {
                        changes.insert(field.clone(), value);
                    }
                }
                (ResolutionType::Merge, changes, true)
            }
        };

        conflict.resolved_at = Some(Utc::now());
        conflict.resolution_type = Some(resolution_type);
        conflict.resolved_by_id = resolved_by_id;
        self.conflicts.update(&conflict).await?;

        self.apply_to_entity(&conflict, &applied_changes, triggers_egress).await?;

        Ok(ResolutionOutcome {
            conflict,
            applied_changes,
            triggers_egress,
        })
    }

    /// Write a resolution's changes back to the underlying Contact/
    /// Organization and, when the resolution calls for it, re-push to the
    /// board (spec §4.5: `keep_local`/`merge` re-push even when, as with
    /// `keep_local`, there are no local field changes to apply; `keep_external`
    /// settles the entity as `SYNCED` directly since it now matches the
    /// board already).
    async fn apply_to_entity(&self, conflict: &SyncConflict, applied_changes: &AppliedChanges, triggers_egress: bool) -> Result<()> {
        match conflict.entity_type {
            ConflictEntityType::Contact => {
                let id: ContactId = conflict
                    .entity_id
                    .parse()
                    .map_err(|_| Error::internal("conflict entity_id is not a valid contact id"))?;
                let mut contact = self.contacts.get(id).await?;
                for (field, value) in applied_changes {
                    apply_field_to_contact(&mut contact, field, value);
                }
                if triggers_egress {
                    self.contacts.upsert(&contact).await?;
                    self.egress.push_contact(&contact).await;
                } else if !applied_changes.is_empty() {
                    contact.sync.sync_status = SyncStatus::Synced;
                    contact.sync.external_last_synced_at = Some(Utc::now());
                    self.contacts.upsert(&contact).await?;
                }
            }
            ConflictEntityType::Organization => {
                let id: OrganizationId = conflict
                    .entity_id
                    .parse()
                    .map_err(|_| Error::internal("conflict entity_id is not a valid organization id"))?;
                let mut organization = self.organizations.get(id).await?;
                for (field, value) in applied_changes {
                    apply_field_to_organization(&mut organization, field, value);
                }
                if triggers_egress {
                    self.organizations.upsert(&organization).await?;
                    self.egress.push_organization(&organization).await;
                } else if !applied_changes.is_empty() {
                    organization.sync.sync_status = SyncStatus::Synced;
                    organization.sync.external_last_synced_at = Some(Utc::now());
                    self.organizations.upsert(&organization).await?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a batch of conflicts with one resolution type each.
    /// `merge` is rejected: it requires per-conflict field selections
    /// (spec §4.5 "Bulk resolution"). Failures are collected per-id, not
    /// fatal to the rest of the batch.
    pub async fn resolve_bulk(
        &self,
        conflict_ids: &[ConflictId],
        resolution: BulkResolutionType,
        resolved_by_id: Option<String>,
    ) -> BulkResolutionSummary {
        let mut summary = BulkResolutionSummary {
            total: conflict_ids.len() as u32,
            ..Default::default()
        };

        for &id in conflict_ids {
            let request = match resolution {
                BulkResolutionType::KeepLocal => ResolutionRequest::KeepLocal,
                BulkResolutionType::KeepExternal => ResolutionRequest::KeepExternal,
            };
            match self.resolve(id, request, resolved_by_id.clone()).await {
                Ok(_) => {
                    summary.succeeded += 1;
                    summary.results.push((id, Ok(())));
                }
                Err(e) => {
                    warn!(conflict_id = %id, error = %e, "bulk resolution failed for conflict");
                    summary.failed += 1;
                    summary.results.push((id, Err(e.to_string())));
                }
            }
        }

        summary
    }
}

/// Resolution types accepted by `resolve_bulk` (merge excluded; spec §4.5).
#[derive(Debug, Clone, Copy)]
pub enum BulkResolutionType {
    /// Apply the local snapshot.
    KeepLocal,
    /// Apply the external snapshot.
    KeepExternal,
}

/// Outcome of [`ConflictService::resolve_bulk`] (spec §4.5
/// `(total, succeeded, failed, results[])`).
#[derive(Debug, Clone, Default)]
pub struct BulkResolutionSummary {
    /// Number of conflict ids requested.
    pub total: u32,
    /// Number resolved successfully.
    pub succeeded: u32,
    /// Number that failed.
    pub failed: u32,
    /// Per-id outcome.
    pub results: Vec<(ConflictId, std::result::Result<(), String>)>,
}

/// Write a single whitelisted field's resolved value onto a contact.
/// Unknown fields (already filtered out by the whitelist upstream) are
/// silently ignored.
pub(crate) fn apply_field_to_contact(contact: &mut Contact, field: &str, value: &Json) {
    match field {
        "name" => {
            if let Some(v) = value.as_str() {
                contact.name = v.to_owned();
            }
        }
        "email" => contact.email = value.as_str().map(ToOwned::to_owned),
        "phone" => contact.phone = value.as_str().map(ToOwned::to_owned),
        "status" => contact.status = value.as_str().map(ToOwned::to_owned),
        _ => {}
    }
}

/// Write a single whitelisted field's resolved value onto an organization.
pub(crate) fn apply_field_to_organization(organization: &mut Organization, field: &str, value: &Json) {
    match field {
        "name" => {
            if let Some(v) = value.as_str() {
                organization.name = v.to_owned();
            }
        }
        "status" => organization.status = value.as_str().map(ToOwned::to_owned),
        _ => {}
    }
}

/// Extract the scalar value for `field` from a JSON snapshot, unwrapping
/// composite board values (e.g. email as `{email, text}`) to their scalar
/// representation (spec §4.5 "Value unwrapping").
fn unwrap_field_value(data: &Json, field: &str) -> Option<Json> {
    let value = data.get(field)?;
    match value {
        Json::Object(map) => map
            .get("email")
            .or_else(|| map.get("phone"))
            .or_else(|| map.get("label"))
            .cloned()
            .or_else(|| Some(value.clone())),
        other => Some(other.clone()),
    }
}
