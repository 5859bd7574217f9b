//! Configuration schema definitions using serde.
//!
//! Every section carries `#[serde(default)]`, so a file only needs to name the
//! values it changes.

use crate::loader::ConfigError;
use palaver_common::{FreedomLevel, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Palaver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram Bot API configuration.
    pub telegram: TelegramConfig,
    /// Text and image generation service configuration.
    pub inference: InferenceConfig,
    /// Conversational memory bounds and context windows.
    pub memory: MemoryConfig,
    /// Prompt building blocks.
    pub prompt: PromptConfig,
    /// Broadcast pacing.
    pub broadcast: BroadcastConfig,
    /// Durable storage.
    pub storage: StorageConfig,
    /// Logging output.
    pub logging: LogSettings,
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub token: String,
    /// Username the bot answers to in groups, without the at sign.
    pub bot_username: String,
    /// Users allowed to run administrative commands.
    pub admin_ids: Vec<i64>,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_seconds: u64,
    /// Bot API root.
    pub api_base: String,
}

/// Generation service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Pool of API keys; one is picked at random per request.
    pub api_keys: Vec<String>,
    /// REST API root.
    pub base_url: String,
    /// Model used when a settings record does not name one.
    pub default_model: String,
    /// Model used for `/draw`.
    pub image_model: String,
    /// Upper bound on a single generation call.
    pub timeout_seconds: u64,
}

/// Memory bounds and how much of it reaches the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Smallest accepted `max_memory`.
    pub min: u32,
    /// `max_memory` of a freshly materialised settings record.
    pub default: u32,
    /// Largest accepted `max_memory`.
    pub max: u32,
    /// Exchanges included in group prompts.
    pub group_context_window: usize,
    /// Exchanges included in private prompts.
    pub private_context_window: usize,
}

impl MemoryConfig {
    /// Whether `value` is an acceptable `max_memory`.
    pub const fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// The five behavioural templates, one per freedom level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreedomTemplates {
    /// Template for [`FreedomLevel::Sanitized`].
    pub sanitized: String,
    /// Template for [`FreedomLevel::Open`].
    pub open: String,
    /// Template for [`FreedomLevel::Casual`].
    pub casual: String,
    /// Template for [`FreedomLevel::Unfiltered`].
    pub unfiltered: String,
    /// Template for [`FreedomLevel::Extreme`].
    pub extreme: String,
}

impl FreedomTemplates {
    /// Template text for a level.
    pub fn for_level(&self, level: FreedomLevel) -> &str {
        match level {
            FreedomLevel::Sanitized => &self.sanitized,
            FreedomLevel::Open => &self.open,
            FreedomLevel::Casual => &self.casual,
            FreedomLevel::Unfiltered => &self.unfiltered,
            FreedomLevel::Extreme => &self.extreme,
        }
    }
}

/// Prompt building blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Response language of a freshly materialised settings record.
    pub default_language: String,
    /// Human-readable names for language codes, used in the base instruction.
    pub language_names: BTreeMap<String, String>,
    /// Base instruction; `{language}` is replaced by the language name.
    pub base_template: String,
    /// Header placed above the freedom template.
    pub freedom_header: String,
    /// Behavioural templates.
    pub freedom: FreedomTemplates,
    /// Persona directive; `{personality}` is replaced by the personality.
    pub persona_template: String,
    /// Header above the history window in groups.
    pub group_history_header: String,
    /// Header above the history window in private chats.
    pub private_history_header: String,
    /// Speaker label for the user in private history.
    pub user_label: String,
    /// Speaker label for the bot in private history.
    pub assistant_label: String,
    /// Prefix of the final user turn.
    pub incoming_label: String,
}

impl PromptConfig {
    /// Display name for a language code, falling back to the code itself.
    pub fn language_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.language_names.get(code).map_or(code, String::as_str)
    }
}

/// Broadcast pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Pause between consecutive deliveries.
    pub delay_ms: u64,
    /// A progress update is emitted after this many attempted deliveries.
    pub progress_every: usize,
}

/// Durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of the sled database.
    pub path: PathBuf,
    /// Entries kept in the in-process record cache.
    pub cache_capacity: u64,
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive, e.g. `info` or `palaver_engine=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Optional log file, rotated daily.
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Converts to the options understood by the logging bootstrap.
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.level.clone(),
            json_format: self.json,
            file_path: self.file.clone(),
            ..LoggingConfig::default()
        }
    }
}

impl Config {
    /// Validates structural consistency. Credentials are not required here so
    /// that tests and tooling can work with partial files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let memory = &self.memory;
        if memory.min == 0 {
            return Err(ConfigError::Validation("memory.min must be positive".to_string()));
        }
        if !(memory.min <= memory.default && memory.default <= memory.max) {
            return Err(ConfigError::Validation(format!(
                "memory bounds must satisfy min <= default <= max, got {} / {} / {}",
                memory.min, memory.default, memory.max
            )));
        }
        if memory.group_context_window == 0 || memory.private_context_window == 0 {
            return Err(ConfigError::Validation(
                "memory context windows must be positive".to_string(),
            ));
        }
        if self.broadcast.progress_every == 0 {
            return Err(ConfigError::Validation(
                "broadcast.progress_every must be positive".to_string(),
            ));
        }
        if self.inference.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "inference.timeout_seconds must be positive".to_string(),
            ));
        }
        if self.inference.default_model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "inference.default_model must not be empty".to_string(),
            ));
        }
        if self.prompt.default_language.trim().is_empty() {
            return Err(ConfigError::Validation(
                "prompt.default_language must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates everything the running bot needs, including credentials.
    pub fn validate_for_runtime(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.telegram.token.trim().is_empty() {
            return Err(ConfigError::MissingConfig("telegram.token".to_string()));
        }
        if self.telegram.bot_username.trim().is_empty() {
            return Err(ConfigError::MissingConfig("telegram.bot_username".to_string()));
        }
        if self.inference.api_keys.iter().all(|key| key.trim().is_empty()) {
            return Err(ConfigError::MissingConfig("inference.api_keys".to_string()));
        }
        Ok(())
    }

    /// Whether `user_id` may run administrative commands.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.telegram.admin_ids.contains(&user_id)
    }
}
