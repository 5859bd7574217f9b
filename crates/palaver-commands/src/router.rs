//! Executes slash commands against the stores and services.
//!
//! In groups with `admin_only_settings` on, commands that change settings or
//! memory need a chat administrator. Switching `admin_only_settings` itself
//! always does. `/broadcast` is reserved for the configured bot
//! administrators.

use crate::command::{Command, ParsedCommand};
use crate::cooldown::CooldownManager;
use palaver_common::{format_timestamp, strip_mention, truncate_string, EntityId, PalaverError, SpeakerRole};
use palaver_config::Config;
use palaver_engine::{
    BroadcastDispatcher, BroadcastRequest, IncomingMessage, InferenceService, MessagingGateway,
    ReplyContext, UsageTracker,
};
use palaver_i18n::{fluent_args, FluentArgs, Locale, Messages};
use palaver_store::{on_off, MemoryStore, SettingUpdate, SettingsRecord, SettingsStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

/// Wait between two images from the same user.
pub const DEFAULT_DRAW_COOLDOWN: Duration = Duration::from_secs(30);

/// Exchanges shown by `/history`.
pub const HISTORY_LENGTH: usize = 5;

/// Characters kept per exchange in `/history`.
pub const HISTORY_PREVIEW_CHARS: usize = 100;

/// What to send back for a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// A text message.
    Text(String),
    /// An image with an optional caption.
    Photo {
        /// Encoded image.
        image: Vec<u8>,
        /// Caption shown under it.
        caption: Option<String>,
    },
    /// Nothing to send.
    None,
}

/// Shared services the router calls into.
pub struct RouterServices {
    /// Memory store; settings are reached through it.
    pub memory: MemoryStore,
    /// Image generation.
    pub inference: Arc<dyn InferenceService>,
    /// Chat admin checks and broadcast progress.
    pub gateway: Arc<dyn MessagingGateway>,
    /// Broadcast fan-out.
    pub broadcasts: Arc<BroadcastDispatcher>,
    /// Message catalogue.
    pub messages: Arc<Messages>,
    /// Usage statistics.
    pub usage: Arc<UsageTracker>,
}

/// Router behaviour taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    /// Username commands may be addressed to.
    pub bot_username: String,
    /// Users allowed to broadcast.
    pub admin_ids: HashSet<i64>,
    /// Per-user wait between images.
    pub draw_cooldown: Duration,
    /// History label for user exchanges without an author.
    pub user_label: String,
    /// History label for bot exchanges without an author.
    pub assistant_label: String,
}

impl RouterOptions {
    /// Extracts the options from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bot_username: config.telegram.bot_username.clone(),
            admin_ids: config.telegram.admin_ids.iter().copied().collect(),
            draw_cooldown: DEFAULT_DRAW_COOLDOWN,
            user_label: config.prompt.user_label.clone(),
            assistant_label: config.prompt.assistant_label.clone(),
        }
    }
}

/// Per-invocation state shared by the handlers.
struct Invocation<'a> {
    message: &'a IncomingMessage,
    entity: EntityId,
    settings: SettingsRecord,
    locale: Locale,
    args: &'a str,
}

/// Dispatches recognised commands.
pub struct CommandRouter {
    services: RouterServices,
    options: RouterOptions,
    cooldowns: CooldownManager,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("options", &self.options)
            .field("cooldowns", &self.cooldowns.len())
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    /// Creates a router.
    pub fn new(services: RouterServices, options: RouterOptions) -> Self {
        Self {
            services,
            options,
            cooldowns: CooldownManager::new(),
        }
    }

    fn settings(&self) -> &SettingsStore {
        self.services.memory.settings()
    }

    fn text(&self, locale: Locale, id: &str, args: Option<FluentArgs<'_>>) -> CommandReply {
        CommandReply::Text(self.services.messages.get(locale, id, args.as_ref()))
    }

    /// Records the update in the usage statistics and runs the command it
    /// carries. `None` means the message is not a command and belongs to
    /// the conversation.
    pub async fn route(&self, message: &IncomingMessage) -> Option<CommandReply> {
        let parsed = ParsedCommand::parse(&message.text, &self.options.bot_username);
        self.services.usage.record(
            &message.sender,
            message.chat_type,
            parsed.as_ref().map(|parsed| parsed.command.name()),
        );
        let parsed = parsed?;
        let entity = message.entity()?;
        Some(self.execute(message, entity, &parsed).await)
    }

    /// Runs an already parsed command.
    #[instrument(skip_all, fields(command = %parsed.command, chat = %message.chat_id, user = %message.sender.id))]
    pub async fn execute(&self, message: &IncomingMessage, entity: EntityId, parsed: &ParsedCommand) -> CommandReply {
        let settings = self.settings().resolve(entity).await;
        let locale = self.services.messages.locale_for(&settings.language);
        let inv = Invocation {
            message,
            entity,
            settings,
            locale,
            args: &parsed.args,
        };

        if parsed.command.is_mutating(inv.args) && !self.may_change_settings(&inv, &parsed.command).await {
            return self.text(locale, "admin-only", None);
        }

        match &parsed.command {
            Command::Start => self.text(
                locale,
                "start",
                fluent_args!["name" => message.sender.first_name.as_str()],
            ),
            Command::Help => self.text(locale, "help", None),
            Command::Clear => {
                self.services.memory.clear(entity).await;
                self.text(locale, "memory-cleared", None)
            }
            Command::Memory => self.memory(&inv).await,
            Command::Forget => self.forget(&inv).await,
            Command::Replace => self.replace(&inv).await,
            Command::System => self.system(&inv).await,
            Command::Personality => self.personality(&inv).await,
            Command::Set => self.set(&inv).await,
            Command::ResetSettings => match self.settings().reset(entity).await {
                Ok(_) => self.text(locale, "settings-reset", None),
                Err(err) => self.storage_failed(&inv, &err),
            },
            Command::Settings => self.summary(&inv),
            Command::History => self.history(&inv).await,
            Command::Stats => self.stats(&inv),
            Command::Draw => self.draw(&inv).await,
            Command::Broadcast => self.broadcast(&inv).await,
            Command::Unknown(name) => {
                if entity.is_group() {
                    CommandReply::None
                } else {
                    self.text(locale, "unknown-command", fluent_args!["command" => format!("/{name}")])
                }
            }
        }
    }

    async fn may_change_settings(&self, inv: &Invocation<'_>, command: &Command) -> bool {
        if !inv.entity.is_group() {
            return true;
        }
        let toggles_gate = *command == Command::Set
            && inv.args.split_whitespace().next() == Some("admin_only_settings");
        if !inv.settings.admin_only_settings && !toggles_gate {
            return true;
        }

        let message = inv.message;
        match self
            .services
            .gateway
            .is_chat_admin(message.chat_id, message.sender.id)
            .await
        {
            Ok(is_admin) => is_admin,
            Err(err) => {
                warn!(error = %err, "Could not check chat administrators, denying");
                false
            }
        }
    }

    fn storage_failed(&self, inv: &Invocation<'_>, err: &PalaverError) -> CommandReply {
        error!(entity = %inv.entity, error = %err, "Failed to store settings");
        self.text(inv.locale, "storage-failed", None)
    }

    async fn memory(&self, inv: &Invocation<'_>) -> CommandReply {
        let limits = *self.settings().limits();
        if inv.args.is_empty() {
            return self.text(
                inv.locale,
                "memory-status",
                fluent_args![
                    "current" => inv.settings.max_memory,
                    "min" => limits.min,
                    "max" => limits.max,
                ],
            );
        }

        match self.services.memory.set_limit(inv.entity, inv.args).await {
            Ok(record) => self.text(inv.locale, "memory-set", fluent_args!["limit" => record.max_memory]),
            Err(err) if err.is_validation() => self.text(
                inv.locale,
                "memory-invalid",
                fluent_args!["min" => limits.min, "max" => limits.max],
            ),
            Err(err) => self.storage_failed(inv, &err),
        }
    }

    /// Texts a replied-to message may be stored under. Group replies carry
    /// an address prefix the bot added, group prompts lose the bot mention.
    fn stored_texts(&self, reply: &ReplyContext, is_group: bool) -> Vec<String> {
        let mut candidates = vec![reply.text.clone()];
        if is_group {
            let stripped = if reply.from_bot {
                reply.text.split_once(", ").map(|(_, rest)| rest.to_string())
            } else {
                Some(strip_mention(&reply.text, &self.options.bot_username))
            };
            if let Some(stripped) = stripped.filter(|s| !s.is_empty() && *s != reply.text) {
                candidates.push(stripped);
            }
        }
        candidates
    }

    async fn forget(&self, inv: &Invocation<'_>) -> CommandReply {
        let Some(reply) = &inv.message.reply_to else {
            return self.text(inv.locale, "forget-needs-reply", None);
        };
        for text in self.stored_texts(reply, inv.entity.is_group()) {
            match self.services.memory.remove_by_text(inv.entity, &text).await {
                Ok(()) => return self.text(inv.locale, "forget-done", None),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return self.storage_failed(inv, &err),
            }
        }
        self.text(inv.locale, "forget-not-found", None)
    }

    async fn replace(&self, inv: &Invocation<'_>) -> CommandReply {
        let Some(reply) = inv.message.reply_to.as_ref().filter(|_| !inv.args.is_empty()) else {
            return self.text(inv.locale, "replace-needs-reply", None);
        };
        for text in self.stored_texts(reply, inv.entity.is_group()) {
            match self
                .services
                .memory
                .replace_by_text(inv.entity, &text, inv.args)
                .await
            {
                Ok(()) => return self.text(inv.locale, "replace-done", None),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return self.storage_failed(inv, &err),
            }
        }
        self.text(inv.locale, "replace-not-found", None)
    }

    async fn system(&self, inv: &Invocation<'_>) -> CommandReply {
        if inv.args.is_empty() {
            return self.text(inv.locale, "system-usage", None);
        }
        let instruction = inv.args.to_string();
        match self
            .settings()
            .update(inv.entity, move |record| record.system_instructions.push(instruction))
            .await
        {
            Ok(record) => self.text(
                inv.locale,
                "system-added",
                fluent_args!["count" => record.system_instructions.len()],
            ),
            Err(err) => self.storage_failed(inv, &err),
        }
    }

    async fn personality(&self, inv: &Invocation<'_>) -> CommandReply {
        if inv.args.is_empty() {
            return self.text(inv.locale, "personality-usage", None);
        }
        let personality = inv.args.to_string();
        match self
            .settings()
            .update(inv.entity, move |record| {
                record.personality = personality;
                record.roleplay_mode = true;
            })
            .await
        {
            Ok(record) => self.text(
                inv.locale,
                "personality-set",
                fluent_args!["personality" => record.personality],
            ),
            Err(err) => self.storage_failed(inv, &err),
        }
    }

    async fn set(&self, inv: &Invocation<'_>) -> CommandReply {
        let Some((field, value)) = inv.args.split_once(char::is_whitespace) else {
            return self.text(
                inv.locale,
                "set-usage",
                fluent_args!["fields" => SettingUpdate::FIELDS.join(", ")],
            );
        };

        let update = match SettingUpdate::parse(field, value, self.settings().limits()) {
            Ok(update) => update,
            Err(err) => {
                let reason = match err {
                    PalaverError::Validation { message, .. } => message,
                    other => other.to_string(),
                };
                return self.text(inv.locale, "setting-invalid", fluent_args!["reason" => reason]);
            }
        };

        let field = update.field();
        let shown = update.value_display();
        let result = match update {
            // Lowering the limit must trim what is already stored.
            SettingUpdate::MaxMemory(_) => self.services.memory.set_limit(inv.entity, value).await,
            update => self.settings().apply(inv.entity, update).await,
        };
        match result {
            Ok(_) => self.text(
                inv.locale,
                "setting-updated",
                fluent_args!["field" => field, "value" => shown],
            ),
            Err(err) => self.storage_failed(inv, &err),
        }
    }

    fn summary(&self, inv: &Invocation<'_>) -> CommandReply {
        let record = &inv.settings;
        let instructions = if record.system_instructions.is_empty() {
            "-".to_string()
        } else {
            record.system_instructions.join("; ")
        };
        self.text(
            inv.locale,
            "settings-summary",
            fluent_args![
                "roleplay" => on_off(record.roleplay_mode),
                "personality" => record.personality.as_str(),
                "freedom" => record.freedom_level.as_str(),
                "temperature" => record.temperature.to_string(),
                "model" => record.current_model.as_str(),
                "memory" => record.max_memory,
                "language" => record.language.as_str(),
                "instructions" => instructions,
                "broadcasts" => on_off(!record.disable_broadcasts),
                "tech" => on_off(!record.disable_tech_notifications),
                "admin_only" => on_off(record.admin_only_settings),
            ],
        )
    }

    async fn history(&self, inv: &Invocation<'_>) -> CommandReply {
        let (_, memory) = self.services.memory.resolve(inv.entity).await;
        if memory.is_empty() {
            return self.text(inv.locale, "history-empty", None);
        }

        let lines: Vec<String> = memory
            .recent(HISTORY_LENGTH)
            .map(|exchange| {
                let label = exchange.author.as_deref().unwrap_or(match exchange.role {
                    SpeakerRole::User => self.options.user_label.as_str(),
                    SpeakerRole::Assistant => self.options.assistant_label.as_str(),
                });
                format!("{label}: {}", truncate_string(&exchange.text, HISTORY_PREVIEW_CHARS))
            })
            .collect();
        let header = self.services.messages.get(
            inv.locale,
            "history-header",
            fluent_args!["count" => lines.len()].as_ref(),
        );
        CommandReply::Text(format!("{header}\n\n{}", lines.join("\n")))
    }

    fn stats(&self, inv: &Invocation<'_>) -> CommandReply {
        let Some(stats) = self.services.usage.get(inv.message.sender.id) else {
            return self.text(inv.locale, "stats-empty", None);
        };
        let commands = stats.commands_summary();
        self.text(
            inv.locale,
            "stats",
            fluent_args![
                "first_seen" => format_timestamp(stats.first_seen),
                "last_active" => format_timestamp(stats.last_active),
                "total" => stats.total_messages,
                "commands" => if commands.is_empty() { "-".to_string() } else { commands },
            ],
        )
    }

    async fn draw(&self, inv: &Invocation<'_>) -> CommandReply {
        if inv.args.is_empty() {
            return self.text(inv.locale, "draw-usage", None);
        }
        let user = inv.message.sender.id;
        let name = Command::Draw.name();
        self.cooldowns.cleanup_expired(self.options.draw_cooldown);
        if let Err(err) = self.cooldowns.check(name, user, self.options.draw_cooldown) {
            return self.text(
                inv.locale,
                "draw-cooldown",
                fluent_args!["seconds" => err.remaining_seconds()],
            );
        }

        match self.services.inference.generate_image(inv.args).await {
            Ok(image) => {
                self.cooldowns.apply(name, user);
                let caption = self.services.messages.get(
                    inv.locale,
                    "draw-caption",
                    fluent_args!["description" => inv.args].as_ref(),
                );
                CommandReply::Photo {
                    image,
                    caption: Some(caption),
                }
            }
            Err(err) => {
                warn!(error = %err, "Image generation failed");
                self.text(inv.locale, "draw-failed", None)
            }
        }
    }

    async fn broadcast(&self, inv: &Invocation<'_>) -> CommandReply {
        let sender = &inv.message.sender;
        if !self.options.admin_ids.contains(&sender.id.0) {
            warn!(user = %sender.id, "Unauthorised broadcast attempt");
            return self.text(inv.locale, "not-authorized", None);
        }
        let Some(request) = BroadcastRequest::parse(inv.args, sender.display_name()) else {
            return self.text(inv.locale, "broadcast-usage", None);
        };
        let total = match self.settings().list_users().await {
            Ok(users) => users.len(),
            Err(err) => return self.storage_failed(inv, &err),
        };
        info!(category = %request.category, total, "Starting broadcast");

        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let run = Arc::clone(&self.services.broadcasts).spawn(request, Some(progress_tx));
        let broadcasts = Arc::clone(&self.services.broadcasts);
        let gateway = Arc::clone(&self.services.gateway);
        let chat = inv.message.chat_id;
        let locale = inv.locale;
        tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let text = broadcasts.describe_progress(progress, locale);
                if let Err(err) = gateway.send_text(chat, &text).await {
                    warn!(error = %err, "Failed to post broadcast progress");
                }
            }
            let summary = match run.await {
                Ok(Ok(report)) => broadcasts.summarize(&report, locale),
                Ok(Err(err)) => {
                    error!(error = %err, "Broadcast aborted");
                    return;
                }
                Err(err) => {
                    error!(error = %err, "Broadcast task panicked");
                    return;
                }
            };
            if let Err(err) = gateway.send_text(chat, &summary).await {
                warn!(error = %err, "Failed to post broadcast report");
            }
        });

        self.text(inv.locale, "broadcast-started", fluent_args!["total" => total])
    }
}
