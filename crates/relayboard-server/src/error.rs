//! Maps [`relayboard_domain::Error`] onto HTTP responses (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use relayboard_domain::Error;
use serde_json::json;

/// Newtype so we can impl `IntoResponse` for the domain's error type from
/// this crate (orphan rules forbid implementing it directly upstream).
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidArgument { .. } | Error::Configuration { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Duplicate { .. } => StatusCode::CONFLICT,
            Error::Database { .. } | Error::Network { .. } | Error::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
