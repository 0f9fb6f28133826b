//! Error handling types shared by every layer.

use thiserror::Error;

/// Result type alias for operations that can fail.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for relayboard.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found.
        resource: String,
    },

    /// Invalid argument supplied to an operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Configuration is missing or invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Caller is not authorized to perform the operation.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of the authorization failure.
        message: String,
    },

    /// A uniqueness or other integrity constraint was violated.
    #[error("Duplicate: {message}")]
    Duplicate {
        /// Description of the conflicting resource.
        message: String,
    },

    /// Database-related error.
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error.
        message: String,
        /// Optional source error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transport-level error talking to an external collaborator
    /// (board API, embedding service, storage backend). Classified as
    /// retryable transient failure by the back-off machinery unless the
    /// message indicates otherwise (see `backoff::classify`).
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
        /// Optional source error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal/unclassified error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unauthorized error.
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Create a duplicate error.
    pub fn duplicate<S: Into<String>>(message: S) -> Self {
        Self::Duplicate {
            message: message.into(),
        }
    }

    /// Create a database error with source.
    pub fn database_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a database error without a source.
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error without a source.
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// Note: conversions from external-crate error types (sqlx, reqwest, ...) are
// implemented in the infrastructure layer, not here, to keep the domain free
// of infrastructure dependencies.
