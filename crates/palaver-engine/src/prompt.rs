//! Layered prompt composition.
//!
//! A prompt is built from up to six sections, in this order: the language
//! instruction, the freedom-level template, the persona directive, the
//! entity's system instructions, the recent history window and finally the
//! incoming message. Empty sections are left out. Composition is a pure
//! function of its inputs.

use palaver_common::SpeakerRole;
use palaver_config::{MemoryConfig, PromptConfig};
use palaver_store::{Exchange, MemoryRecord, SettingsRecord};

/// Builds prompts from settings, memory and the incoming text.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    config: PromptConfig,
    group_window: usize,
    private_window: usize,
}

impl PromptComposer {
    /// Creates a composer with explicit history windows.
    pub const fn new(config: PromptConfig, group_window: usize, private_window: usize) -> Self {
        Self {
            config,
            group_window,
            private_window,
        }
    }

    /// Creates a composer with the windows from the memory configuration.
    pub fn from_config(prompt: &PromptConfig, memory: &MemoryConfig) -> Self {
        Self::new(
            prompt.clone(),
            memory.group_context_window,
            memory.private_context_window,
        )
    }

    /// Number of exchanges included for the given conversation shape.
    pub const fn window(&self, is_group: bool) -> usize {
        if is_group {
            self.group_window
        } else {
            self.private_window
        }
    }

    /// Composes the prompt for one incoming message.
    pub fn compose(
        &self,
        settings: &SettingsRecord,
        memory: &MemoryRecord,
        is_group: bool,
        incoming: &str,
    ) -> String {
        let config = &self.config;
        let mut sections: Vec<String> = Vec::with_capacity(6);

        let language = config.language_name(&settings.language);
        sections.push(config.base_template.replace("{language}", language));

        let template = config.freedom.for_level(settings.freedom_level).trim();
        if !template.is_empty() {
            sections.push(format!("{}\n{template}", config.freedom_header));
        }

        if settings.roleplay_mode {
            sections.push(
                config
                    .persona_template
                    .replace("{personality}", &settings.personality),
            );
        }

        let instructions: Vec<&str> = settings
            .system_instructions
            .iter()
            .map(String::as_str)
            .filter(|instruction| !instruction.is_empty())
            .collect();
        if !instructions.is_empty() {
            sections.push(instructions.join("\n"));
        }

        let window: Vec<&Exchange> = memory.recent(self.window(is_group)).collect();
        if !window.is_empty() {
            let header = if is_group {
                &config.group_history_header
            } else {
                &config.private_history_header
            };
            let mut history = header.clone();
            for exchange in window {
                history.push('\n');
                history.push_str(self.speaker_label(exchange, is_group));
                history.push_str(": ");
                history.push_str(&exchange.text);
            }
            sections.push(history);
        }

        sections.push(format!("{} {incoming}", config.incoming_label));

        sections
            .into_iter()
            .filter(|section| !section.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn speaker_label<'a>(&'a self, exchange: &'a Exchange, is_group: bool) -> &'a str {
        let role_label = match exchange.role {
            SpeakerRole::User => &self.config.user_label,
            SpeakerRole::Assistant => &self.config.assistant_label,
        };
        if is_group {
            exchange.author.as_deref().unwrap_or(role_label)
        } else {
            role_label
        }
    }
}
