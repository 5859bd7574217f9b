//! End-to-end handling of updates with in-process collaborators.

use async_trait::async_trait;
use palaver_bot::{PalaverBot, TelegramGateway, UpdateHandler};
use palaver_commands::{CommandRouter, RouterOptions, RouterServices};
use palaver_common::{ChatId, ChatType, PalaverError, Result, Sender, UserId};
use palaver_config::Config;
use palaver_engine::{
    BroadcastDispatcher, GenerationRequest, IncomingMessage, InferenceService, MessagingGateway,
    PromptComposer, ReplyContext, SessionCoordinator, UsageTracker,
};
use palaver_i18n::{Locale, Messages};
use palaver_store::{MemoryBackend, MemoryStore, SettingsDefaults, SettingsStore, SledBackend, StorageBackend};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BOT: &str = "palaver_bot";

#[derive(Default)]
struct RecordingGateway {
    texts: Mutex<Vec<(ChatId, String)>>,
    photos: Mutex<Vec<(ChatId, usize, Option<String>)>>,
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        self.texts.lock().unwrap().push((chat, text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, chat: ChatId, image: Vec<u8>, caption: Option<String>) -> Result<()> {
        self.photos.lock().unwrap().push((chat, image.len(), caption));
        Ok(())
    }

    async fn is_chat_admin(&self, _chat: ChatId, _user: UserId) -> Result<bool> {
        Ok(false)
    }
}

/// Echoes the last prompt line back, or fails when asked to.
struct EchoInference {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl InferenceService for EchoInference {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let last = request.prompt.lines().last().unwrap_or_default().to_string();
        if last.contains("explode") {
            return Err(PalaverError::service("upstream unavailable"));
        }
        Ok(format!("echo: {last}"))
    }

    async fn generate_image(&self, _description: &str) -> Result<Vec<u8>> {
        Ok(vec![1, 2, 3])
    }
}

struct Harness {
    handler: UpdateHandler,
    gateway: Arc<RecordingGateway>,
    inference: Arc<EchoInference>,
    memory: MemoryStore,
}

fn harness() -> Harness {
    let mut config = Config::default();
    config.telegram.bot_username = BOT.to_string();
    config.prompt.default_language = "en".to_string();

    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let settings = SettingsStore::new(
        Arc::clone(&backend),
        SettingsDefaults {
            language: "en".to_string(),
            ..SettingsDefaults::from_config(&config)
        },
        config.memory,
        128,
    );
    let memory = MemoryStore::new(backend, settings.clone(), 128);
    let messages = Arc::new(Messages::new(Locale::English).unwrap());
    let gateway = Arc::new(RecordingGateway::default());
    let inference = Arc::new(EchoInference {
        prompts: Mutex::new(Vec::new()),
    });

    let coordinator = SessionCoordinator::new(
        memory.clone(),
        PromptComposer::from_config(&config.prompt, &config.memory),
        inference.clone(),
        Arc::clone(&messages),
        BOT,
        Duration::from_secs(5),
    );
    let broadcasts = Arc::new(BroadcastDispatcher::new(
        settings,
        gateway.clone(),
        Arc::clone(&messages),
        &config.broadcast,
    ));
    let router = CommandRouter::new(
        RouterServices {
            memory: memory.clone(),
            inference: inference.clone(),
            gateway: gateway.clone(),
            broadcasts,
            messages,
            usage: Arc::new(UsageTracker::new()),
        },
        RouterOptions::from_config(&config),
    );

    Harness {
        handler: UpdateHandler::new(router, coordinator, gateway.clone()),
        gateway,
        inference,
        memory,
    }
}

fn message(chat_type: ChatType, text: &str) -> IncomingMessage {
    let chat_id = if chat_type.is_group() { ChatId(-1001) } else { ChatId(7) };
    IncomingMessage {
        chat_id,
        chat_type,
        sender: Sender {
            id: UserId(7),
            username: Some("masha".to_string()),
            first_name: "Masha".to_string(),
        },
        text: text.to_string(),
        reply_to: None,
    }
}

#[tokio::test]
async fn test_private_conversation_is_remembered() {
    let h = harness();
    h.handler.handle(message(ChatType::Private, "what is rust")).await;
    h.handler.handle(message(ChatType::Private, "and cargo?")).await;

    let texts = h.gateway.texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], (ChatId(7), "echo: User message: what is rust".to_string()));

    // The second prompt carries the first round as history.
    let prompts = h.inference.prompts.lock().unwrap().clone();
    assert!(prompts[1].contains("User: what is rust"), "{}", prompts[1]);

    let message = message(ChatType::Private, "");
    let (_, memory) = h.memory.resolve(message.entity().unwrap()).await;
    assert_eq!(memory.len(), 4);
}

#[tokio::test]
async fn test_group_needs_mention() {
    let h = harness();
    h.handler.handle(message(ChatType::Supergroup, "just talking among ourselves")).await;
    assert!(h.gateway.texts.lock().unwrap().is_empty());
    assert!(h.inference.prompts.lock().unwrap().is_empty());

    h.handler
        .handle(message(ChatType::Supergroup, "@palaver_bot tell a joke"))
        .await;
    let texts = h.gateway.texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, ChatId(-1001));
    assert!(texts[0].1.starts_with("@masha, echo:"), "{}", texts[0].1);

    let mut reply = message(ChatType::Supergroup, "another one");
    reply.reply_to = Some(ReplyContext {
        from_bot: true,
        text: texts[0].1.clone(),
    });
    h.handler.handle(reply).await;
    assert_eq!(h.gateway.texts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_generation_apologises_without_recording() {
    let h = harness();
    h.handler.handle(message(ChatType::Private, "please explode")).await;

    let texts = h.gateway.texts.lock().unwrap().clone();
    assert_eq!(
        texts[0].1,
        "Sorry, something went wrong while generating a reply. Please try again."
    );
    let (_, memory) = h.memory.resolve(message(ChatType::Private, "").entity().unwrap()).await;
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_commands_bypass_the_conversation() {
    let h = harness();
    h.handler.handle(message(ChatType::Private, "/memory")).await;
    h.handler.handle(message(ChatType::Private, "/draw a fox")).await;

    assert!(h.inference.prompts.lock().unwrap().is_empty());
    let texts = h.gateway.texts.lock().unwrap().clone();
    assert!(texts[0].1.starts_with("Current memory limit: 600"), "{}", texts[0].1);
    let photos = h.gateway.photos.lock().unwrap().clone();
    assert_eq!(photos, vec![(ChatId(7), 3, Some("a fox".to_string()))]);
}

#[tokio::test]
async fn test_assemble_over_sled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.telegram.token = "123:abc".to_string();
    config.telegram.bot_username = BOT.to_string();
    config.storage.path = dir.path().join("palaver.db");

    let backend = Arc::new(SledBackend::open(&config.storage.path).unwrap());
    let telegram = Arc::new(TelegramGateway::new(&config.telegram).unwrap());
    let inference = Arc::new(EchoInference {
        prompts: Mutex::new(Vec::new()),
    });
    let bot = PalaverBot::assemble(&config, backend, inference, telegram);
    assert!(bot.is_ok());
}
