//! `/broadcast` from an administrator through to the report in their chat.

use async_trait::async_trait;
use palaver_common::{ChatId, ChatType, EntityId, Result, Sender, UserId};
use palaver_commands::{CommandReply, CommandRouter, RouterOptions, RouterServices, DEFAULT_DRAW_COOLDOWN};
use palaver_config::{BroadcastConfig, MemoryConfig};
use palaver_engine::{
    BroadcastDispatcher, GenerationRequest, IncomingMessage, InferenceService, MessagingGateway,
    UsageTracker,
};
use palaver_i18n::{Locale, Messages};
use palaver_store::{MemoryBackend, MemoryStore, SettingsDefaults, SettingsStore, StorageBackend};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ADMIN: i64 = 42;

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl RecordingGateway {
    fn texts_for(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == chat)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat, text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, _chat: ChatId, _image: Vec<u8>, _caption: Option<String>) -> Result<()> {
        Ok(())
    }

    async fn is_chat_admin(&self, _chat: ChatId, _user: UserId) -> Result<bool> {
        Ok(true)
    }
}

struct NoInference;

#[async_trait]
impl InferenceService for NoInference {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        Ok(String::new())
    }

    async fn generate_image(&self, _description: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

fn admin_message(text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: ChatId(ADMIN),
        chat_type: ChatType::Private,
        sender: Sender {
            id: UserId(ADMIN),
            username: Some("owner".to_string()),
            first_name: "Owner".to_string(),
        },
        text: text.to_string(),
        reply_to: None,
    }
}

#[tokio::test]
async fn test_broadcast_reports_back_to_admin() {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let settings = SettingsStore::new(
        Arc::clone(&backend),
        SettingsDefaults {
            language: "en".to_string(),
            ..SettingsDefaults::default()
        },
        MemoryConfig::default(),
        128,
    );
    for id in 100..125 {
        settings
            .update(EntityId::User(UserId(id)), |record| {
                record.disable_broadcasts = id % 5 == 0;
            })
            .await
            .unwrap();
    }

    let gateway = Arc::new(RecordingGateway::default());
    let messages = Arc::new(Messages::new(Locale::English).unwrap());
    let broadcasts = Arc::new(BroadcastDispatcher::new(
        settings.clone(),
        gateway.clone(),
        Arc::clone(&messages),
        &BroadcastConfig {
            delay_ms: 0,
            progress_every: 10,
        },
    ));
    let router = CommandRouter::new(
        RouterServices {
            memory: MemoryStore::new(backend, settings, 128),
            inference: Arc::new(NoInference),
            gateway: gateway.clone(),
            broadcasts,
            messages,
            usage: Arc::new(UsageTracker::new()),
        },
        RouterOptions {
            bot_username: "palaver_bot".to_string(),
            admin_ids: HashSet::from([ADMIN]),
            draw_cooldown: DEFAULT_DRAW_COOLDOWN,
            user_label: "User".to_string(),
            assistant_label: "Bot".to_string(),
        },
    );

    // The admin's own record is created while routing, so 26 users in total.
    let reply = router.route(&admin_message("/broadcast we are back online")).await;
    assert_eq!(
        reply,
        Some(CommandReply::Text("Broadcast started for 26 users.".to_string()))
    );

    let admin_chat = ChatId(ADMIN);
    let report = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(report) = gateway
                .texts_for(admin_chat)
                .into_iter()
                .find(|text| text.starts_with("Broadcast finished"))
            {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("broadcast report was not posted");

    assert!(report.contains("Delivered: 21"), "{report}");
    assert!(report.contains("Skipped: 5"), "{report}");
    assert!(report.contains("Failed: 0"), "{report}");
    assert!(report.contains("Total: 26"), "{report}");

    let admin_texts = gateway.texts_for(admin_chat);
    // Keys list in byte order: 100..=124, then 42.
    assert!(admin_texts.contains(
        &"Broadcast progress: 10 delivered, 0 failed, 3 skipped, 13 of 26 remaining.".to_string()
    ));
    assert!(admin_texts.contains(
        &"Broadcast progress: 20 delivered, 0 failed, 5 skipped, 1 of 26 remaining.".to_string()
    ));
    assert!(admin_texts
        .iter()
        .any(|text| text.starts_with("Announcement\n\nwe are back online")));
}
