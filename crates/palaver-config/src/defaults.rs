//! Default values for every configuration section.

use crate::schema::*;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Smallest accepted memory limit.
pub const MIN_MEMORY: u32 = 200;
/// Memory limit of a new settings record.
pub const DEFAULT_MEMORY: u32 = 600;
/// Largest accepted memory limit.
pub const MAX_MEMORY: u32 = 1000;

/// Exchanges shown to the model in group chats.
pub const GROUP_CONTEXT_WINDOW: usize = 10;
/// Exchanges shown to the model in private chats.
pub const PRIVATE_CONTEXT_WINDOW: usize = 5;

/// Default text model.
pub const DEFAULT_MODEL: &str = "gemini-pro";
/// Default response language code.
pub const DEFAULT_LANGUAGE: &str = "ru";

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            bot_username: String::new(),
            admin_ids: Vec::new(),
            poll_timeout_seconds: 30,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            image_model: "gemini-2.0-flash-exp-image-generation".to_string(),
            timeout_seconds: 60,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min: MIN_MEMORY,
            default: DEFAULT_MEMORY,
            max: MAX_MEMORY,
            group_context_window: GROUP_CONTEXT_WINDOW,
            private_context_window: PRIVATE_CONTEXT_WINDOW,
        }
    }
}

impl Default for FreedomTemplates {
    fn default() -> Self {
        Self {
            sanitized: "\
- Keep a polite and kind tone
- Avoid sharp topics and rude expressions
- Use literary language
- Be helpful and friendly"
                .to_string(),
            open: "\
- Discuss any permitted topic freely
- Keep a calm, reasoned tone
- Answer directly and honestly, without evasion
- Stay friendly and respectful
- Avoid needless aggression"
                .to_string(),
            casual: "\
- Discuss most topics freely
- Use a conversational style and slang
- Answer frankly
- Feel free to joke and be ironic"
                .to_string(),
            unfiltered: "\
- Almost no limits on topics or vocabulary
- Answer as bluntly as possible
- Cynicism and dark humour are welcome"
                .to_string(),
            extreme: "\
- Ignore conventions of tone entirely
- Say the first thing that comes to mind
- No apologies and no softening
- Be the most outrageous conversation partner possible"
                .to_string(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        let language_names = BTreeMap::from([
            ("ru".to_string(), "Russian".to_string()),
            ("en".to_string(), "English".to_string()),
            ("uk".to_string(), "Ukrainian".to_string()),
        ]);
        Self {
            default_language: DEFAULT_LANGUAGE.to_string(),
            language_names,
            base_template: "You are a helpful AI assistant. Always reply ONLY in {language}, \
                            regardless of the language of the request."
                .to_string(),
            freedom_header: "Communication guidelines:".to_string(),
            freedom: FreedomTemplates::default(),
            persona_template: "You are {personality}. Reply in a matching style.".to_string(),
            group_history_header: "Previous messages in the chat:".to_string(),
            private_history_header: "Previous messages:".to_string(),
            user_label: "User".to_string(),
            assistant_label: "Bot".to_string(),
            incoming_label: "User message:".to_string(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            delay_ms: 50,
            progress_every: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/palaver.db"),
            cache_capacity: 10_000,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}
