//! Wire-level concerns: the axum router and its shared state.

pub mod axum_http;
