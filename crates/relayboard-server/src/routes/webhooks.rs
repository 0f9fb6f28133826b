//! Inbound board webhook ingress (spec §4.4).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::{json, Value as Json_};
use tracing::warn;

use relayboard_application::use_cases::sync_ingress::{BoardKind, IngressEvent, IngressEventKind, IngressOutcome};
use relayboard_domain::ports::WebhookVerifier;

use crate::transport::axum_http::AppState;

/// Event payloads are capped at 1 MiB (spec §4.4 step 1).
const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ChallengePayload {
    challenge: String,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    board_id: String,
    event: String,
    item_id: String,
    #[serde(default)]
    item_data: Option<Json_>,
}

/// `POST /webhooks/<board>`. The path segment identifies which external
/// board *system* delivered the call; the entity board (contacts vs.
/// organizations) is resolved from the payload's own board identifier
/// against configured board ids (spec §4.4 step 4).
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    Path(_board_system): Path<String>,
    request: Request<Body>,
) -> Response {
    if let Some(declared_len) = content_length(&request) {
        if declared_len > MAX_PAYLOAD_BYTES {
            return too_large();
        }
    }

    let signature = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_owned());

    let body = match axum::body::to_bytes(request.into_body(), MAX_PAYLOAD_BYTES).await {
        Ok(body) => body,
        Err(_) => return too_large(),
    };

    if let Ok(challenge) = serde_json::from_slice::<ChallengePayload>(&body) {
        return Json(json!({ "challenge": challenge.challenge })).into_response();
    }

    let verified = match &signature {
        Some(sig) => state.webhook_verifier.verify(&body, sig),
        None => {
            warn!("webhook event arrived without a signature header");
            state.webhook_verifier.verify(&body, "")
        }
    };
    if !verified {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid webhook signature" }))).into_response();
    }

    let payload: EventPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("malformed webhook body: {e}") })))
                .into_response();
        }
    };

    let board = if Some(&payload.board_id) == state.board_targets.contacts_board.as_ref() {
        Some(BoardKind::Contacts)
    } else if Some(&payload.board_id) == state.board_targets.organizations_board.as_ref() {
        Some(BoardKind::Organizations)
    } else {
        None
    };

    let Some(board) = board else {
        warn!(board_id = %payload.board_id, "webhook event for an unrecognized board; ignoring");
        return Json(json!({ "status": "ignored", "event_type": payload.event, "board_type": "unknown" }))
            .into_response();
    };

    let kind = match payload.event.as_str() {
        "create" => IngressEventKind::Create,
        "update" => IngressEventKind::Update,
        "delete" => IngressEventKind::Delete,
        other => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("unknown event type: {other}") })))
                .into_response();
        }
    };

    let event = IngressEvent { board, kind, item_id: payload.item_id, item_data: payload.item_data };

    match state.ingress.dispatch(&event).await {
        Ok(outcome) => {
            let sync_result = match outcome {
                IngressOutcome::Created => "created",
                IngressOutcome::Updated => "updated",
                IngressOutcome::Unlinked => "unlinked",
                IngressOutcome::ConflictOpened => "conflict_opened",
                IngressOutcome::Skipped => "skipped",
            };
            Json(json!({
                "status": "ok",
                "event_type": event_kind_label(event.kind),
                "board_type": board_kind_label(board),
                "sync_result": sync_result,
            }))
            .into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn content_length(request: &Request<Body>) -> Option<usize> {
    request.headers().get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn too_large() -> Response {
    (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({ "error": "payload too large" }))).into_response()
}

fn event_kind_label(kind: IngressEventKind) -> &'static str {
    match kind {
        IngressEventKind::Create => "create",
        IngressEventKind::Update => "update",
        IngressEventKind::Delete => "delete",
    }
}

fn board_kind_label(kind: BoardKind) -> &'static str {
    match kind {
        BoardKind::Contacts => "contacts",
        BoardKind::Organizations => "organizations",
    }
}
