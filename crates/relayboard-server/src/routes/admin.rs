//! Admin endpoints: list/retry/cancel jobs, resolve conflicts, manage
//! auto-resolution rules and tag synonyms (spec §6, "not specified further").

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value as Json_};
use uuid::Uuid;

use relayboard_application::use_cases::conflict_service::{BulkResolutionType, MergeSide, ResolutionRequest};
use relayboard_domain::entities::{AutoResolutionRule, ConflictEntityType, JobType, PreferredSource};
use relayboard_domain::ports::{AutoResolutionRuleRepository, ConflictRepository};
use relayboard_domain::value_objects::{ConflictId, JobId, RuleId, TagId};

use crate::transport::axum_http::AppState;
use crate::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    job_type: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// `GET /admin/jobs?job_type=&limit=`
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Json_>, ApiError> {
    let job_type = query.job_type.as_deref().map(JobType::from_key);
    let jobs = state.jobs.get_pending(job_type.as_ref(), query.limit).await?;
    Ok(Json(json!({ "jobs": jobs })))
}

#[derive(Debug, Deserialize)]
pub struct RetryQuery {
    #[serde(default)]
    reset_attempts: bool,
}

/// `POST /admin/jobs/{id}/retry?reset_attempts=`
pub async fn retry_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RetryQuery>,
) -> Result<Json<Json_>, ApiError> {
    let job = state.jobs.manual_retry(JobId::from_uuid(id), query.reset_attempts).await?;
    Ok(Json(json!({ "job": job })))
}

/// `POST /admin/jobs/{id}/cancel`
pub async fn cancel_job(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Json_>, ApiError> {
    let cancelled = state.jobs.cancel(JobId::from_uuid(id)).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

#[derive(Debug, Deserialize)]
pub struct ListConflictsQuery {
    entity_type: Option<String>,
}

/// `GET /admin/conflicts?entity_type=`
pub async fn list_conflicts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListConflictsQuery>,
) -> Result<Json<Json_>, ApiError> {
    let entity_type = query.entity_type.as_deref().and_then(|s| match s {
        "contact" => Some(ConflictEntityType::Contact),
        "organization" => Some(ConflictEntityType::Organization),
        _ => None,
    });
    let conflicts = state.conflict_repo.list_unresolved(entity_type).await?;
    Ok(Json(json!({ "conflicts": conflicts })))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ResolveRequestBody {
    KeepLocal,
    KeepExternal,
    Merge { merge_selections: std::collections::HashMap<String, MergeSideBody> },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSideBody {
    Local,
    External,
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    #[serde(flatten)]
    request: ResolveRequestBody,
    resolved_by_id: Option<String>,
}

/// `POST /admin/conflicts/{id}/resolve`
pub async fn resolve_conflict(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Json_>, ApiError> {
    let request = match body.request {
        ResolveRequestBody::KeepLocal => ResolutionRequest::KeepLocal,
        ResolveRequestBody::KeepExternal => ResolutionRequest::KeepExternal,
        ResolveRequestBody::Merge { merge_selections } => ResolutionRequest::Merge(
            merge_selections
                .into_iter()
                .map(|(field, side)| {
                    (
                        field,
                        match side {
                            MergeSideBody::Local => MergeSide::Local,
                            MergeSideBody::External => MergeSide::External,
                        },
                    )
                })
                .collect(),
        ),
    };
    let outcome = state.conflicts.resolve(ConflictId::from_uuid(id), request, body.resolved_by_id).await?;
    Ok(Json(json!({
        "conflict": outcome.conflict,
        "applied_changes": outcome.applied_changes,
        "triggers_egress": outcome.triggers_egress,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBulkBody {
    conflict_ids: Vec<Uuid>,
    resolution: BulkResolutionKind,
    resolved_by_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkResolutionKind {
    KeepLocal,
    KeepExternal,
}

/// `POST /admin/conflicts/resolve-bulk`
pub async fn resolve_conflicts_bulk(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResolveBulkBody>,
) -> Json<Json_> {
    let ids: Vec<ConflictId> = body.conflict_ids.into_iter().map(ConflictId::from_uuid).collect();
    let resolution = match body.resolution {
        BulkResolutionKind::KeepLocal => BulkResolutionType::KeepLocal,
        BulkResolutionKind::KeepExternal => BulkResolutionType::KeepExternal,
    };
    let summary = state.conflicts.resolve_bulk(&ids, resolution, body.resolved_by_id).await;
    Json(json!({
        "total": summary.total,
        "succeeded": summary.succeeded,
        "failed": summary.failed,
        "results": summary.results.iter().map(|(id, result)| {
            json!({ "conflict_id": id, "ok": result.is_ok(), "error": result.as_ref().err() })
        }).collect::<Vec<_>>(),
    }))
}

/// `GET /admin/rules?entity_type=`
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListConflictsQuery>,
) -> Result<Json<Json_>, ApiError> {
    let rules = match query.entity_type.as_deref() {
        Some("contact") => state.rule_repo.list_enabled_for_entity(ConflictEntityType::Contact).await?,
        Some("organization") => state.rule_repo.list_enabled_for_entity(ConflictEntityType::Organization).await?,
        _ => state.rule_repo.list_all().await?,
    };
    Ok(Json(json!({ "rules": rules })))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleBody {
    name: String,
    entity_type: String,
    field_name: String,
    preferred_source: String,
    #[serde(default = "default_true")]
    is_enabled: bool,
    #[serde(default)]
    priority: i32,
    created_by_id: Option<String>,
}

fn default_true() -> bool {
    true
}

/// `POST /admin/rules`
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRuleBody>,
) -> Result<Json<Json_>, ApiError> {
    let entity_type = parse_entity_type(&body.entity_type)?;
    let preferred_source = parse_preferred_source(&body.preferred_source)?;
    let rule = AutoResolutionRule {
        id: RuleId::new(),
        name: body.name,
        entity_type,
        field_name: body.field_name,
        preferred_source,
        is_enabled: body.is_enabled,
        priority: body.priority,
        created_by_id: body.created_by_id,
    };
    state.rule_repo.insert(&rule).await?;
    Ok(Json(json!({ "rule": rule })))
}

/// `DELETE /admin/rules/{id}`
pub async fn delete_rule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<Json_>, ApiError> {
    state.rule_repo.delete(RuleId::from_uuid(id)).await?;
    Ok(Json(json!({ "deleted": true })))
}

fn parse_entity_type(s: &str) -> Result<ConflictEntityType, ApiError> {
    match s {
        "contact" => Ok(ConflictEntityType::Contact),
        "organization" => Ok(ConflictEntityType::Organization),
        other => Err(ApiError(relayboard_domain::Error::invalid_argument(format!(
            "unknown entity_type: {other}"
        )))),
    }
}

fn parse_preferred_source(s: &str) -> Result<PreferredSource, ApiError> {
    match s {
        "local" => Ok(PreferredSource::Local),
        "external" => Ok(PreferredSource::External),
        other => Err(ApiError(relayboard_domain::Error::invalid_argument(format!(
            "unknown preferred_source: {other}"
        )))),
    }
}

/// `GET /admin/tags/{id}/synonyms`
pub async fn list_synonyms(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Json_>, ApiError> {
    let synonyms = state.tags.get_synonyms(TagId::from_uuid(id)).await?;
    Ok(Json(json!({ "synonyms": synonyms })))
}

#[derive(Debug, Deserialize)]
pub struct MergeTagsBody {
    source: Uuid,
    target: Uuid,
}

/// `POST /admin/tags/merge`
pub async fn merge_tags(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MergeTagsBody>,
) -> Result<Json<Json_>, ApiError> {
    let moved = state.tags.merge_tags(TagId::from_uuid(body.source), TagId::from_uuid(body.target)).await?;
    Ok(Json(json!({ "projects_moved": moved })))
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    query: String,
    #[serde(default)]
    statuses: Option<Vec<String>>,
    #[serde(default)]
    organization_id: Option<Uuid>,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    start_date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    start_date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    tag_ids: Vec<Uuid>,
    #[serde(default)]
    include_documents: bool,
    #[serde(default)]
    expand_synonyms: bool,
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

/// `POST /admin/search`: hybrid project search (spec §4.6).
pub async fn search_projects(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<Json_>, ApiError> {
    use relayboard_application::use_cases::hybrid_search::SearchRequest;
    use relayboard_domain::ports::{SearchFilters, SortBy};
    use relayboard_domain::value_objects::OrganizationId;

    let sort_by = match body.sort_by.as_deref() {
        Some("name") => SortBy::Name,
        Some("start_date") => SortBy::StartDate,
        Some("updated_at") => SortBy::UpdatedAt,
        _ => SortBy::Relevance,
    };

    let request = SearchRequest {
        query: body.query,
        filters: SearchFilters {
            statuses: body.statuses,
            organization_id: body.organization_id.map(OrganizationId::from_uuid),
            owner_id: body.owner_id,
            start_date_from: body.start_date_from,
            start_date_to: body.start_date_to,
            tag_ids: body.tag_ids.into_iter().map(TagId::from_uuid).collect(),
        },
        include_documents: body.include_documents,
        expand_synonyms: body.expand_synonyms,
        sort_by,
        limit: body.limit,
        offset: body.offset,
    };

    let response = state.search.search(request).await?;
    Ok(Json(json!({ "projects": response.projects, "synonym_metadata": response.synonym_metadata })))
}
