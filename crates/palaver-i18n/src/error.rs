//! Error types for internationalization operations

use thiserror::Error;

/// Errors that can occur during internationalization operations
#[derive(Error, Debug)]
pub enum I18nError {
    /// Failed to parse a language identifier
    #[error("Invalid language identifier: {0}")]
    InvalidLanguageId(String),

    /// An embedded Fluent resource failed to parse or register
    #[error("Failed to load Fluent resource for {locale}: {errors:?}")]
    FluentParse {
        /// Locale code.
        locale: String,
        /// Parser or registration errors.
        errors: Vec<String>,
    },

    /// Message not found in any bundle
    #[error("Message not found: {key}")]
    MessageNotFound {
        /// Message id.
        key: String,
    },

    /// Failed to format a message
    #[error("Failed to format message '{key}': {errors:?}")]
    MessageFormat {
        /// Message id.
        key: String,
        /// Resolver errors.
        errors: Vec<String>,
    },
}

impl From<I18nError> for palaver_common::PalaverError {
    fn from(err: I18nError) -> Self {
        Self::config_with_source("Message catalogue error", err)
    }
}

/// Result type for i18n operations
pub type I18nResult<T> = Result<T, I18nError>;
