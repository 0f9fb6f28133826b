//! Cron/tick endpoints invoked by an outside scheduler (spec §6).

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use relayboard_domain::entities::JobType;
use relayboard_domain::ports::TickReport;
use serde::Deserialize;
use serde_json::json;

use crate::transport::axum_http::AppState;

/// Rejects requests whose `Authorization: Bearer <token>` does not match
/// `state.cron_token` (spec §6 "bearer-token authenticated").
pub async fn require_cron_token(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.cron_token => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "missing or invalid cron token" }))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct JobTickQuery {
    job_type: Option<String>,
}

fn tick_response(report: TickReport) -> Json<serde_json::Value> {
    Json(json!({
        "status": report.status,
        "items_processed": report.items_processed,
        "items_succeeded": report.items_succeeded,
        "items_failed": report.items_failed,
        "items_requeued": report.items_requeued,
        "items_max_retries": report.items_max_retries,
        "items_recovered": report.items_recovered,
        "errors": report.errors,
        "timestamp": report.timestamp,
    }))
}

fn empty_tick_response(items_processed: u32, items_succeeded: u32) -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "items_processed": items_processed,
        "items_succeeded": items_succeeded,
        "items_failed": 0,
        "items_requeued": 0,
        "items_max_retries": 0,
        "items_recovered": 0,
        "errors": Vec::<String>::new(),
        "timestamp": Utc::now(),
    }))
}

/// `GET /cron/jobs?job_type=…`: run one generic job-queue tick.
pub async fn run_job_tick(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobTickQuery>,
) -> Result<Json<serde_json::Value>, crate::ApiError> {
    let job_type = query.job_type.as_deref().map(JobType::from_key);
    let report = state.jobs.process_queue(job_type.as_ref()).await?;
    Ok(tick_response(report))
}

/// `GET /cron/document-queue`: one document-task tick.
pub async fn run_document_tick(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, crate::ApiError> {
    let report = state.documents.process_queue().await?;
    Ok(tick_response(report))
}

#[derive(Debug, Deserialize)]
pub struct SyncTickQuery {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// `GET /cron/sync-queue`: process one egress-retry tick (spec §4.3).
pub async fn run_sync_tick(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SyncTickQuery>,
) -> Result<Json<serde_json::Value>, crate::ApiError> {
    let (contacts, organizations) = state.egress.process_retry_queue(query.limit).await?;
    Ok(empty_tick_response(contacts + organizations, contacts + organizations))
}

/// `GET /cron/jira-refresh`: specialized periodic task (spec §4.1 "Handlers
/// specified by this system"), driven through the generic job queue so it
/// shares the same claim/retry/back-off machinery as any other job type.
pub async fn run_jira_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, crate::ApiError> {
    let report = state.jobs.process_queue(Some(&JobType::from_key("jira_refresh"))).await?;
    Ok(tick_response(report))
}

/// `GET /cron/email-monitor`: specialized periodic task, routed through the
/// generic job queue.
pub async fn run_email_monitor(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, crate::ApiError> {
    let report = state.jobs.process_queue(Some(&JobType::from_key("email_monitor"))).await?;
    Ok(tick_response(report))
}

/// `GET /cron/team-sync`: specialized periodic task, routed through the
/// generic job queue.
pub async fn run_team_sync(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, crate::ApiError> {
    let report = state.jobs.process_queue(Some(&JobType::from_key("team_sync"))).await?;
    Ok(tick_response(report))
}
