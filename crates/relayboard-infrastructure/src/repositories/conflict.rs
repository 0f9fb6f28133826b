//! Postgres-backed conflict and auto-resolution-rule repositories (spec §4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use relayboard_domain::entities::{AutoResolutionRule, ConflictEntityType, PreferredSource, ResolutionType, SyncConflict};
use relayboard_domain::error::Result;
use relayboard_domain::ports::{AutoResolutionRuleRepository, ConflictRepository};
use relayboard_domain::value_objects::{ConflictId, RuleId};

use crate::error::from_sqlx;

/// Concrete `sync_conflicts` table persistence.
pub struct PgConflictRepository {
    pool: PgPool,
}

impl PgConflictRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConflictRow {
    id: Uuid,
    entity_type: String,
    entity_id: String,
    npd_data: Json,
    external_data: Json,
    conflict_fields: Vec<String>,
    detected_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution_type: Option<String>,
    resolved_by_id: Option<String>,
}

impl From<ConflictRow> for SyncConflict {
    fn from(row: ConflictRow) -> Self {
        SyncConflict {
            id: ConflictId::from_uuid(row.id),
            entity_type: ConflictEntityType::from_str(&row.entity_type).unwrap_or(ConflictEntityType::Contact),
            entity_id: row.entity_id,
            npd_data: row.npd_data,
            external_data: row.external_data,
            conflict_fields: row.conflict_fields,
            detected_at: row.detected_at,
            resolved_at: row.resolved_at,
            resolution_type: row.resolution_type.and_then(|s| ResolutionType::from_str(&s).ok()),
            resolved_by_id: row.resolved_by_id,
        }
    }
}

#[async_trait]
impl ConflictRepository for PgConflictRepository {
    async fn insert(&self, conflict: &SyncConflict) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO sync_conflicts (
                id, entity_type, entity_id, npd_data, external_data, conflict_fields,
                detected_at, resolved_at, resolution_type, resolved_by_id
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            ",
        )
        .bind(conflict.id.inner())
        .bind(conflict.entity_type.to_string())
        .bind(&conflict.entity_id)
        .bind(&conflict.npd_data)
        .bind(&conflict.external_data)
        .bind(&conflict.conflict_fields)
        .bind(conflict.detected_at)
        .bind(conflict.resolved_at)
        .bind(conflict.resolution_type.map(|r| r.to_string()))
        .bind(&conflict.resolved_by_id)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("inserting conflict", e))?;
        Ok(())
    }

    async fn get(&self, id: ConflictId) -> Result<SyncConflict> {
        let row = sqlx::query_as::<_, ConflictRow>("SELECT * FROM sync_conflicts WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching conflict", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("conflict {id}")))?;
        Ok(row.into())
    }

    async fn list_unresolved(&self, entity_type: Option<ConflictEntityType>) -> Result<Vec<SyncConflict>> {
        let rows = sqlx::query_as::<_, ConflictRow>(
            r"
            SELECT * FROM sync_conflicts
            WHERE resolved_at IS NULL AND ($1::text IS NULL OR entity_type = $1)
            ORDER BY detected_at ASC
            ",
        )
        .bind(entity_type.map(|e| e.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("listing unresolved conflicts", e))?;
        Ok(rows.into_iter().map(SyncConflict::from).collect())
    }

    async fn update(&self, conflict: &SyncConflict) -> Result<()> {
        sqlx::query(
            r"
            UPDATE sync_conflicts SET
                resolved_at = $2, resolution_type = $3, resolved_by_id = $4
            WHERE id = $1
            ",
        )
        .bind(conflict.id.inner())
        .bind(conflict.resolved_at)
        .bind(conflict.resolution_type.map(|r| r.to_string()))
        .bind(&conflict.resolved_by_id)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("updating conflict", e))?;
        Ok(())
    }
}

/// Concrete `auto_resolution_rules` table persistence.
pub struct PgAutoResolutionRuleRepository {
    pool: PgPool,
}

impl PgAutoResolutionRuleRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    entity_type: String,
    field_name: String,
    preferred_source: String,
    is_enabled: bool,
    priority: i32,
    created_by_id: Option<String>,
}

impl From<RuleRow> for AutoResolutionRule {
    fn from(row: RuleRow) -> Self {
        AutoResolutionRule {
            id: RuleId::from_uuid(row.id),
            name: row.name,
            entity_type: ConflictEntityType::from_str(&row.entity_type).unwrap_or(ConflictEntityType::Contact),
            field_name: row.field_name,
            preferred_source: PreferredSource::from_str(&row.preferred_source).unwrap_or(PreferredSource::Local),
            is_enabled: row.is_enabled,
            priority: row.priority,
            created_by_id: row.created_by_id,
        }
    }
}

#[async_trait]
impl AutoResolutionRuleRepository for PgAutoResolutionRuleRepository {
    async fn list_enabled_for_entity(&self, entity_type: ConflictEntityType) -> Result<Vec<AutoResolutionRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT * FROM auto_resolution_rules WHERE entity_type = $1 AND is_enabled ORDER BY priority ASC",
        )
        .bind(entity_type.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("listing enabled auto-resolution rules", e))?;
        Ok(rows.into_iter().map(AutoResolutionRule::from).collect())
    }

    async fn list_all(&self) -> Result<Vec<AutoResolutionRule>> {
        let rows = sqlx::query_as::<_, RuleRow>("SELECT * FROM auto_resolution_rules ORDER BY entity_type, priority ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("listing auto-resolution rules", e))?;
        Ok(rows.into_iter().map(AutoResolutionRule::from).collect())
    }

    async fn insert(&self, rule: &AutoResolutionRule) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO auto_resolution_rules (
                id, name, entity_type, field_name, preferred_source, is_enabled, priority, created_by_id
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            ",
        )
        .bind(rule.id.inner())
        .bind(&rule.name)
        .bind(rule.entity_type.to_string())
        .bind(&rule.field_name)
        .bind(rule.preferred_source.to_string())
        .bind(rule.is_enabled)
        .bind(rule.priority)
        .bind(&rule.created_by_id)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("inserting auto-resolution rule", e))?;
        Ok(())
    }

    async fn update(&self, rule: &AutoResolutionRule) -> Result<()> {
        sqlx::query(
            r"
            UPDATE auto_resolution_rules SET
                name = $2, entity_type = $3, field_name = $4, preferred_source = $5,
                is_enabled = $6, priority = $7
            WHERE id = $1
            ",
        )
        .bind(rule.id.inner())
        .bind(&rule.name)
        .bind(rule.entity_type.to_string())
        .bind(&rule.field_name)
        .bind(rule.preferred_source.to_string())
        .bind(rule.is_enabled)
        .bind(rule.priority)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("updating auto-resolution rule", e))?;
        Ok(())
    }

    async fn delete(&self, id: RuleId) -> Result<()> {
        sqlx::query("DELETE FROM auto_resolution_rules WHERE id = $1")
            .bind(id.inner())
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx("deleting auto-resolution rule", e))?;
        Ok(())
    }
}
