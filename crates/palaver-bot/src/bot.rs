//! Wiring and the long-polling update loop.

use crate::error::BotResult;
use crate::telegram::{TelegramGateway, Update};
use palaver_commands::{CommandReply, CommandRouter, RouterOptions, RouterServices};
use palaver_config::Config;
use palaver_engine::{
    BroadcastDispatcher, GeminiClient, IncomingMessage, InferenceService, MessagingGateway,
    PromptComposer, SessionCoordinator, UsageTracker,
};
use palaver_i18n::{Locale, Messages};
use palaver_store::{MemoryStore, SettingsDefaults, SettingsStore, SledBackend, StorageBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Pause after a failed `getUpdates` call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How long in-flight updates may run after Ctrl-C before storage is flushed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Handles one incoming message: commands first, conversation otherwise.
pub struct UpdateHandler {
    router: CommandRouter,
    coordinator: SessionCoordinator,
    gateway: Arc<dyn MessagingGateway>,
}

impl std::fmt::Debug for UpdateHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateHandler")
            .field("router", &self.router)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl UpdateHandler {
    /// Creates a handler.
    pub fn new(router: CommandRouter, coordinator: SessionCoordinator, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            router,
            coordinator,
            gateway,
        }
    }

    /// Routes `message` and delivers whatever it produced. Failures are
    /// logged; nothing propagates to the loop.
    pub async fn handle(&self, message: IncomingMessage) {
        let chat = message.chat_id;
        let reply = match self.router.route(&message).await {
            Some(reply) => reply,
            None => match self.coordinator.handle(&message).await.text() {
                Some(text) => CommandReply::Text(text.to_string()),
                None => CommandReply::None,
            },
        };

        let delivered = match reply {
            CommandReply::Text(text) => self.gateway.send_text(chat, &text).await,
            CommandReply::Photo { image, caption } => self.gateway.send_photo(chat, image, caption).await,
            CommandReply::None => return,
        };
        if let Err(err) = delivered {
            warn!(%chat, error = %err, "Failed to deliver reply");
        }
    }
}

/// The assembled application.
pub struct PalaverBot {
    telegram: Arc<TelegramGateway>,
    handler: Arc<UpdateHandler>,
    settings: SettingsStore,
}

impl std::fmt::Debug for PalaverBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PalaverBot")
            .field("telegram", &self.telegram)
            .finish_non_exhaustive()
    }
}

impl PalaverBot {
    /// Opens storage and builds every component from `config`.
    pub fn build(config: &Config) -> BotResult<Self> {
        let backend: Arc<dyn StorageBackend> = Arc::new(SledBackend::open(&config.storage.path)?);
        info!(path = %config.storage.path.display(), "Storage opened");
        let inference: Arc<dyn InferenceService> = Arc::new(GeminiClient::new(&config.inference)?);
        let telegram = Arc::new(TelegramGateway::new(&config.telegram)?);
        Self::assemble(config, backend, inference, telegram)
    }

    /// Builds the application around already constructed collaborators.
    pub fn assemble(
        config: &Config,
        backend: Arc<dyn StorageBackend>,
        inference: Arc<dyn InferenceService>,
        telegram: Arc<TelegramGateway>,
    ) -> BotResult<Self> {
        let cache_capacity = config.storage.cache_capacity;
        let settings = SettingsStore::new(
            Arc::clone(&backend),
            SettingsDefaults::from_config(config),
            config.memory,
            cache_capacity,
        );
        let memory = MemoryStore::new(backend, settings.clone(), cache_capacity);

        let fallback = Locale::from_code(&config.prompt.default_language).unwrap_or_default();
        let messages = Arc::new(Messages::new(fallback)?);
        let gateway: Arc<dyn MessagingGateway> = telegram.clone();

        let coordinator = SessionCoordinator::new(
            memory.clone(),
            PromptComposer::from_config(&config.prompt, &config.memory),
            Arc::clone(&inference),
            Arc::clone(&messages),
            config.telegram.bot_username.clone(),
            Duration::from_secs(config.inference.timeout_seconds),
        );
        let broadcasts = Arc::new(BroadcastDispatcher::new(
            settings.clone(),
            Arc::clone(&gateway),
            Arc::clone(&messages),
            &config.broadcast,
        ));
        let router = CommandRouter::new(
            RouterServices {
                memory,
                inference,
                gateway: Arc::clone(&gateway),
                broadcasts,
                messages,
                usage: Arc::new(UsageTracker::new()),
            },
            RouterOptions::from_config(config),
        );

        Ok(Self {
            telegram,
            handler: Arc::new(UpdateHandler::new(router, coordinator, gateway)),
            settings,
        })
    }

    /// Polls until Ctrl-C, lets in-flight updates finish, then flushes
    /// storage.
    pub async fn run(self) -> BotResult<()> {
        info!(bot = %self.telegram.bot_username(), "Polling for updates");
        let mut offset = 0_i64;
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
                polled = self.telegram.get_updates(offset) => match polled {
                    Ok(updates) => offset = self.dispatch(updates, offset, &mut tasks),
                    Err(err) => {
                        warn!(error = %err, "Polling failed, retrying");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                    }
                },
            }
        }

        let abandoned = drain_tasks(&mut tasks, SHUTDOWN_GRACE).await;
        if abandoned > 0 {
            warn!(abandoned, "Updates still running at shutdown were cancelled");
        }
        self.shutdown().await
    }

    /// Spawns one task per update and returns the next offset.
    fn dispatch(&self, updates: Vec<Update>, mut offset: i64, tasks: &mut JoinSet<()>) -> i64 {
        // Reap finished handlers so the set only holds running ones.
        while tasks.try_join_next().is_some() {}

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.into_incoming(self.telegram.bot_username()) else {
                continue;
            };
            debug!(chat = %message.chat_id, "Update received");
            let handler = Arc::clone(&self.handler);
            tasks.spawn(async move { handler.handle(message).await });
        }
        offset
    }

    // Both stores share one backend; a single flush covers them.
    async fn shutdown(&self) -> BotResult<()> {
        self.settings.flush().await?;
        info!("Storage flushed");
        Ok(())
    }
}

/// Waits up to `grace` for `tasks` to finish, then aborts the rest.
/// Returns how many were aborted.
async fn drain_tasks(tasks: &mut JoinSet<()>, grace: Duration) -> usize {
    if !tasks.is_empty() {
        info!(in_flight = tasks.len(), "Waiting for in-flight updates");
    }
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Update task failed");
            }
        }
    })
    .await;
    if drained.is_ok() {
        return 0;
    }
    let abandoned = tasks.len();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    abandoned
}
