//! Message catalogue with per-locale Fluent bundles.

use crate::error::{I18nError, I18nResult};
use crate::Locale;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Every message id the application formats. Each locale must define all of
/// them.
pub const MESSAGE_IDS: &[&str] = &[
    "listening",
    "inference-failed",
    "storage-failed",
    "start",
    "help",
    "memory-cleared",
    "memory-status",
    "memory-set",
    "memory-invalid",
    "forget-needs-reply",
    "forget-done",
    "forget-not-found",
    "replace-needs-reply",
    "replace-done",
    "replace-not-found",
    "system-usage",
    "system-added",
    "personality-usage",
    "personality-set",
    "set-usage",
    "setting-updated",
    "setting-invalid",
    "settings-reset",
    "settings-summary",
    "history-empty",
    "history-header",
    "stats",
    "stats-empty",
    "draw-usage",
    "draw-cooldown",
    "draw-failed",
    "draw-caption",
    "admin-only",
    "not-authorized",
    "unknown-command",
    "broadcast-usage",
    "broadcast-started",
    "broadcast-progress",
    "broadcast-report",
    "broadcast-header-normal",
    "broadcast-header-important",
    "broadcast-header-maintenance",
    "broadcast-signature",
];

/// Formats user-facing texts for every supported locale.
pub struct Messages {
    bundles: HashMap<Locale, FluentBundle<FluentResource>>,
    fallback: Locale,
}

impl std::fmt::Debug for Messages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messages")
            .field("locales", &self.bundles.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Messages {
    /// Parses the embedded catalogues. `fallback` answers for unsupported
    /// language codes and for ids missing from a locale.
    pub fn new(fallback: Locale) -> I18nResult<Self> {
        let mut bundles = HashMap::new();
        for locale in Locale::all() {
            bundles.insert(locale, Self::build_bundle(locale)?);
        }
        debug!(?fallback, "Message catalogue loaded");
        Ok(Self { bundles, fallback })
    }

    fn build_bundle(locale: Locale) -> I18nResult<FluentBundle<FluentResource>> {
        let resource = FluentResource::try_new(locale.source().to_string()).map_err(|(_, errors)| {
            I18nError::FluentParse {
                locale: locale.code().to_string(),
                errors: errors.iter().map(|e| format!("{e:?}")).collect(),
            }
        })?;

        let mut bundle = FluentBundle::new_concurrent(vec![locale.to_language_identifier()?]);
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| I18nError::FluentParse {
                locale: locale.code().to_string(),
                errors: errors.iter().map(|e| format!("{e:?}")).collect(),
            })?;
        Ok(bundle)
    }

    /// Locale used when a language code is not supported.
    pub const fn fallback(&self) -> Locale {
        self.fallback
    }

    /// Maps a settings language code onto a supported locale.
    pub fn locale_for(&self, code: &str) -> Locale {
        Locale::from_code(code).unwrap_or(self.fallback)
    }

    /// Whether `locale` defines `id`.
    pub fn has_message(&self, locale: Locale, id: &str) -> bool {
        self.bundles
            .get(&locale)
            .is_some_and(|bundle| bundle.has_message(id))
    }

    /// Formats `id` in exactly `locale`.
    pub fn format(&self, locale: Locale, id: &str, args: Option<&FluentArgs<'_>>) -> I18nResult<String> {
        let not_found = || I18nError::MessageNotFound { key: id.to_string() };
        let bundle = self.bundles.get(&locale).ok_or_else(not_found)?;
        let pattern = bundle
            .get_message(id)
            .and_then(|message| message.value())
            .ok_or_else(not_found)?;

        let mut errors = Vec::new();
        let formatted = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            return Err(I18nError::MessageFormat {
                key: id.to_string(),
                errors: errors.iter().map(|e| format!("{e:?}")).collect(),
            });
        }
        Ok(formatted.into_owned())
    }

    /// Formats `id`, falling back to the fallback locale and finally to the
    /// id itself. Never fails.
    pub fn get(&self, locale: Locale, id: &str, args: Option<&FluentArgs<'_>>) -> String {
        match self.format(locale, id, args) {
            Ok(text) => text,
            Err(err) => {
                warn!(?locale, id, error = %err, "Falling back for message");
                self.format(self.fallback, id, args)
                    .unwrap_or_else(|_| id.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluent_args;

    #[test]
    fn test_catalogue_loads() {
        let messages = Messages::new(Locale::Russian).unwrap();
        assert!(messages.has_message(Locale::English, "listening"));
        assert!(!messages.has_message(Locale::English, "no-such-id"));
    }

    #[test]
    fn test_unknown_code_uses_fallback() {
        let messages = Messages::new(Locale::English).unwrap();
        assert_eq!(messages.locale_for("ru"), Locale::Russian);
        assert_eq!(messages.locale_for("xx"), Locale::English);
    }

    #[test]
    fn test_arguments_are_substituted() {
        let messages = Messages::new(Locale::English).unwrap();
        let args = fluent_args!["limit" => 300_u32];
        let text = messages.get(Locale::English, "memory-set", args.as_ref());
        assert!(text.contains("300"), "{text}");
    }

    #[test]
    fn test_missing_id_returns_id() {
        let messages = Messages::new(Locale::English).unwrap();
        assert_eq!(messages.get(Locale::Russian, "no-such-id", None), "no-such-id");
    }
}
