//! Application-wide error types using thiserror.

use palaver_common::PalaverError;
use palaver_config::ConfigError;
use palaver_i18n::I18nError;

/// Main application error type.
#[derive(thiserror::Error, Debug)]
pub enum BotError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store, engine or service error.
    #[error(transparent)]
    Palaver(#[from] PalaverError),

    /// Message catalogue error.
    #[error("Localization error: {0}")]
    I18n(#[from] I18nError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The Bot API answered `ok: false`.
    #[error("Telegram API error in {method}: {description}")]
    Telegram {
        /// Bot API method.
        method: String,
        /// Description returned by Telegram.
        description: String,
    },
}

impl From<BotError> for PalaverError {
    fn from(err: BotError) -> Self {
        match err {
            BotError::Palaver(inner) => inner,
            other => Self::service_with_source("Telegram gateway failure", other),
        }
    }
}

/// Result type for the bot application.
pub type BotResult<T> = Result<T, BotError>;
