//! Error types and utilities for Palaver

use thiserror::Error;

/// Boxed error used as the `source` of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for Palaver operations
pub type Result<T> = std::result::Result<T, PalaverError>;

/// Main error type for Palaver operations
#[derive(Error, Debug)]
pub enum PalaverError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// Rejected user input, e.g. a memory bound outside its range
    #[error("Validation error: {message}")]
    Validation {
        /// What went wrong.
        message: String,
        /// Offending field, when the input targets one.
        field: Option<String>,
    },

    /// An expected lookup found nothing (forget/replace targets)
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// Inference service or messaging gateway failure, including timeouts
    #[error("Service error: {message}")]
    Service {
        /// What went wrong.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// Storage backend failure
    #[error("Persistence error: {message}")]
    Persistence {
        /// What went wrong.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PalaverError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source
    pub fn config_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a new validation error with field name
    pub fn validation_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a validation error for a numeric value outside `[min, max]`
    pub fn out_of_range(field: &str, value: impl std::fmt::Display, min: u32, max: u32) -> Self {
        Self::validation_field(
            format!("{field} must be between {min} and {max}, got {value}"),
            field,
        )
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create a new service error
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new service error with source
    pub fn service_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Service {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new persistence error with source
    pub fn persistence_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is an expected "nothing matched" outcome
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the caller supplied invalid input
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
