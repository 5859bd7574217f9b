//! Locale management and utilities

use crate::error::{I18nError, I18nResult};
use serde::{Deserialize, Serialize};
use unic_langid::LanguageIdentifier;

/// Supported locales
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    /// English (United States)
    English,
    /// Russian
    #[default]
    Russian,
}

impl Locale {
    /// Get the language code for this locale
    pub const fn code(self) -> &'static str {
        match self {
            Self::English => "en-US",
            Self::Russian => "ru",
        }
    }

    /// Parse a locale from a language code such as `ru`, `en` or `en-GB`
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next()?.trim().to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::English),
            "ru" => Some(Self::Russian),
            _ => None,
        }
    }

    /// Convert to Fluent LanguageIdentifier
    pub fn to_language_identifier(self) -> I18nResult<LanguageIdentifier> {
        self.code()
            .parse()
            .map_err(|_| I18nError::InvalidLanguageId(self.code().to_string()))
    }

    /// Get all supported locales
    pub const fn all() -> [Self; 2] {
        [Self::English, Self::Russian]
    }

    /// Embedded Fluent source for this locale
    pub(crate) const fn source(self) -> &'static str {
        match self {
            Self::English => include_str!("../locales/en-US/palaver.ftl"),
            Self::Russian => include_str!("../locales/ru/palaver.ftl"),
        }
    }
}
