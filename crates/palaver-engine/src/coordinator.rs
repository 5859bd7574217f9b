//! Per-message session state machine.
//!
//! ```text
//! Received -> Resolved -> Composed -> Dispatched -> Recorded -> Done
//!                                         \
//!                                          -> ErrorTerminal
//! ```
//!
//! Group messages that neither mention the bot nor reply to it are dropped
//! before any store access. A failed or timed-out generation leaves memory
//! untouched and answers with an apology; nothing is retried.

use crate::gateway::IncomingMessage;
use crate::inference::{GenerationRequest, InferenceService};
use crate::prompt::PromptComposer;
use palaver_common::{contains_mention, strip_mention, EntityId};
use palaver_i18n::Messages;
use palaver_store::{Exchange, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not addressed to the bot; nothing was done.
    Ignored,
    /// Text to send back to the chat.
    Reply(String),
    /// Generation failed; the text is the apology to send.
    Failed(String),
}

impl Outcome {
    /// Text to deliver, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Ignored => None,
            Self::Reply(text) | Self::Failed(text) => Some(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Received,
    Resolved,
    Composed,
    Dispatched,
    Recorded,
    Done,
    ErrorTerminal,
}

/// Drives a message through resolution, composition, inference and
/// recording.
pub struct SessionCoordinator {
    memory: MemoryStore,
    composer: PromptComposer,
    inference: Arc<dyn InferenceService>,
    messages: Arc<Messages>,
    bot_username: String,
    timeout: Duration,
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("bot_username", &self.bot_username)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SessionCoordinator {
    /// Creates a coordinator.
    pub fn new(
        memory: MemoryStore,
        composer: PromptComposer,
        inference: Arc<dyn InferenceService>,
        messages: Arc<Messages>,
        bot_username: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            memory,
            composer,
            inference,
            messages,
            bot_username: bot_username.into(),
            timeout,
        }
    }

    /// Whether the bot should answer `message`. Private messages always
    /// activate; group messages need a mention or a reply to the bot.
    pub fn is_activated(&self, message: &IncomingMessage) -> bool {
        if !message.chat_type.is_group() {
            return true;
        }
        contains_mention(&message.text, &self.bot_username) || message.is_reply_to_bot()
    }

    fn transition(entity: EntityId, state: SessionState) {
        debug!(%entity, ?state, "Session transition");
    }

    /// Handles one conversational message.
    #[instrument(skip_all, fields(chat = %message.chat_id, user = %message.sender.id))]
    pub async fn handle(&self, message: &IncomingMessage) -> Outcome {
        let Some(entity) = message.entity() else {
            return Outcome::Ignored;
        };
        if !self.is_activated(message) {
            return Outcome::Ignored;
        }
        Self::transition(entity, SessionState::Received);

        let is_group = entity.is_group();
        let text = if is_group {
            strip_mention(&message.text, &self.bot_username)
        } else {
            message.text.trim().to_string()
        };

        let (settings, memory) = self.memory.resolve(entity).await;
        Self::transition(entity, SessionState::Resolved);
        let locale = self.messages.locale_for(&settings.language);

        if text.is_empty() {
            Self::transition(entity, SessionState::Done);
            return Outcome::Reply(self.messages.get(locale, "listening", None));
        }

        let prompt = self.composer.compose(&settings, &memory, is_group, &text);
        Self::transition(entity, SessionState::Composed);

        let request = GenerationRequest::for_settings(prompt, &settings);
        let reply = match tokio::time::timeout(self.timeout, self.inference.generate(&request)).await {
            Ok(Ok(reply)) if !reply.trim().is_empty() => reply,
            Ok(Ok(_)) => {
                warn!(%entity, "Inference returned an empty reply");
                return self.fail(entity, locale);
            }
            Ok(Err(err)) => {
                error!(%entity, error = %err, "Inference failed");
                return self.fail(entity, locale);
            }
            Err(_) => {
                error!(%entity, timeout = ?self.timeout, "Inference timed out");
                return self.fail(entity, locale);
            }
        };
        Self::transition(entity, SessionState::Dispatched);

        let (user_author, bot_author) = if is_group {
            (
                Some(message.sender.display_name().to_string()),
                Some(self.bot_username.clone()),
            )
        } else {
            (None, None)
        };
        self.memory
            .append_round(
                entity,
                Exchange::user(text, user_author),
                Exchange::assistant(reply.clone(), bot_author),
            )
            .await;
        Self::transition(entity, SessionState::Recorded);

        let reply = if is_group {
            format!("{}, {reply}", message.sender.mention())
        } else {
            reply
        };
        Self::transition(entity, SessionState::Done);
        Outcome::Reply(reply)
    }

    fn fail(&self, entity: EntityId, locale: palaver_i18n::Locale) -> Outcome {
        Self::transition(entity, SessionState::ErrorTerminal);
        Outcome::Failed(self.messages.get(locale, "inference-failed", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ReplyContext;
    use crate::inference::MockInferenceService;
    use palaver_common::test_utils::chat_fixtures::{
        test_group_id, test_sender, test_user_id, BOT_USERNAME,
    };
    use palaver_common::{ChatId, ChatType, PalaverError};
    use palaver_config::{MemoryConfig, PromptConfig};
    use palaver_i18n::Locale;
    use palaver_store::{
        MemoryBackend, RecordKind, SettingsDefaults, SettingsStore, StorageBackend,
    };

    struct Harness {
        backend: Arc<MemoryBackend>,
        coordinator: SessionCoordinator,
    }

    fn harness(inference: MockInferenceService, timeout: Duration) -> Harness {
        let backend = Arc::new(MemoryBackend::new());
        let shared: Arc<dyn StorageBackend> = backend.clone();
        let settings = SettingsStore::new(
            Arc::clone(&shared),
            SettingsDefaults::default(),
            MemoryConfig::default(),
            64,
        );
        let memory = MemoryStore::new(shared, settings, 64);
        let composer = PromptComposer::from_config(&PromptConfig::default(), &MemoryConfig::default());
        let messages = Arc::new(Messages::new(Locale::Russian).unwrap());
        let coordinator = SessionCoordinator::new(
            memory,
            composer,
            Arc::new(inference),
            messages,
            BOT_USERNAME,
            timeout,
        );
        Harness {
            backend,
            coordinator,
        }
    }

    fn group_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: test_group_id(),
            chat_type: ChatType::Supergroup,
            sender: test_sender(),
            text: text.to_string(),
            reply_to: None,
        }
    }

    fn private_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId::from(test_user_id()),
            chat_type: ChatType::Private,
            sender: test_sender(),
            text: text.to_string(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn test_unaddressed_group_message_touches_nothing() {
        let mut inference = MockInferenceService::new();
        inference.expect_generate().never();
        let h = harness(inference, Duration::from_secs(5));

        let outcome = h.coordinator.handle(&group_message("just chatting among humans")).await;

        assert_eq!(outcome, Outcome::Ignored);
        assert_eq!(h.backend.count(RecordKind::Settings), 0);
        assert_eq!(h.backend.count(RecordKind::Memory), 0);
    }

    #[tokio::test]
    async fn test_mention_only_gets_listening_prompt() {
        let mut inference = MockInferenceService::new();
        inference.expect_generate().never();
        let h = harness(inference, Duration::from_secs(5));

        let outcome = h.coordinator.handle(&group_message("@Palaver_Bot")).await;

        assert_eq!(
            outcome,
            Outcome::Reply("Да-да, я вас слушаю! Задайте свой вопрос.".to_string())
        );
        assert_eq!(h.backend.count(RecordKind::Memory), 0);
    }

    #[tokio::test]
    async fn test_group_reply_is_recorded_with_authors() {
        let mut inference = MockInferenceService::new();
        inference
            .expect_generate()
            .withf(|request| request.prompt.ends_with("what is rust?"))
            .times(1)
            .returning(|_| Ok("a programming language".to_string()));
        let h = harness(inference, Duration::from_secs(5));

        let outcome = h.coordinator.handle(&group_message("@palaver_bot what is rust?")).await;
        assert_eq!(outcome, Outcome::Reply("@alice, a programming language".to_string()));

        let entity = EntityId::Group(test_group_id());
        let (_, memory) = h.coordinator.memory.resolve(entity).await;
        let recorded: Vec<(Option<&str>, &str)> = memory
            .iter()
            .map(|e| (e.author.as_deref(), e.text.as_str()))
            .collect();
        assert_eq!(
            recorded,
            vec![
                (Some("alice"), "what is rust?"),
                (Some(BOT_USERNAME), "a programming language"),
            ]
        );
    }

    #[tokio::test]
    async fn test_reply_to_bot_activates_without_mention() {
        let mut inference = MockInferenceService::new();
        inference
            .expect_generate()
            .times(1)
            .returning(|_| Ok("sure".to_string()));
        let h = harness(inference, Duration::from_secs(5));

        let mut message = group_message("go on");
        message.reply_to = Some(ReplyContext {
            from_bot: true,
            text: "earlier answer".to_string(),
        });
        assert!(matches!(h.coordinator.handle(&message).await, Outcome::Reply(_)));
    }

    #[tokio::test]
    async fn test_inference_failure_leaves_memory_untouched() {
        let mut inference = MockInferenceService::new();
        inference
            .expect_generate()
            .times(1)
            .returning(|_| Err(PalaverError::service("quota exceeded")));
        let h = harness(inference, Duration::from_secs(5));

        let outcome = h.coordinator.handle(&private_message("hello")).await;

        assert!(matches!(outcome, Outcome::Failed(_)));
        let (_, memory) = h.coordinator.memory.resolve(EntityId::User(test_user_id())).await;
        assert!(memory.is_empty());
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl InferenceService for Stalled {
        async fn generate(&self, _request: &GenerationRequest) -> palaver_common::Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }

        async fn generate_image(&self, _description: &str) -> palaver_common::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_apology() {
        let mut h = harness(MockInferenceService::new(), Duration::from_secs(30));
        h.coordinator.inference = Arc::new(Stalled);

        let outcome = h.coordinator.handle(&private_message("hello")).await;

        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(h.backend.count(RecordKind::Memory), 0);
    }

    #[tokio::test]
    async fn test_empty_generation_is_a_failure() {
        let mut inference = MockInferenceService::new();
        inference
            .expect_generate()
            .returning(|_| Ok("   ".to_string()));
        let h = harness(inference, Duration::from_secs(5));

        let outcome = h.coordinator.handle(&private_message("hello")).await;
        assert!(matches!(outcome, Outcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_private_reply_is_not_prefixed() {
        let mut inference = MockInferenceService::new();
        inference
            .expect_generate()
            .returning(|_| Ok("hi there".to_string()));
        let h = harness(inference, Duration::from_secs(5));

        let outcome = h.coordinator.handle(&private_message("hello")).await;
        assert_eq!(outcome.text(), Some("hi there"));

        let (_, memory) = h.coordinator.memory.resolve(EntityId::User(test_user_id())).await;
        assert_eq!(memory.len(), 2);
        assert!(memory.iter().all(|e| e.author.is_none()));
    }
}
