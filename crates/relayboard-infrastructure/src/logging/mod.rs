//! Structured logging setup (tracing + tracing-subscriber, JSON in
//! production, pretty in development).

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG` (default `info`) for the filter. `json` selects JSON
/// output (for log aggregation); otherwise uses a human-readable format.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt().with_env_filter(filter).json().with_current_span(true).init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}
