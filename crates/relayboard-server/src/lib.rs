//! HTTP transport for relayboard: cron tick endpoints, the webhook ingress
//! endpoint, and admin endpoints (spec §6).

pub mod error;
pub mod routes;
pub mod transport;

pub use error::ApiError;
pub use transport::axum_http::{build_router, AppState};
