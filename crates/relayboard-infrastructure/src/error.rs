//! Infrastructure-layer conversions into [`relayboard_domain::Error`].
//!
//! These conversions live here, not in the domain crate, so the domain
//! stays free of sqlx/reqwest dependencies.

use relayboard_domain::Error;

/// Convert a sqlx error, mapping "row not found" to [`Error::NotFound`] so
/// callers can match on it without depending on sqlx themselves.
pub fn from_sqlx(context: &str, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::RowNotFound => Error::not_found(context.to_owned()),
        other => Error::database_with_source(context.to_owned(), other),
    }
}

/// Convert a reqwest error into a network error, classifying timeouts so
/// the back-off machinery's `classify()` sees a retryable message.
pub fn from_reqwest(context: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::network(format!("{context}: timeout"));
    }
    Error::network_with_source(context.to_owned(), err)
}
