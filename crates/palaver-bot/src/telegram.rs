//! Telegram Bot API over plain HTTPS.
//!
//! Long-polls `getUpdates` and implements [`MessagingGateway`] with
//! `sendMessage`, `sendPhoto` and `getChatMember`.

use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use palaver_common::{ChatId, ChatType, Result, Sender, UserId};
use palaver_config::TelegramConfig;
use palaver_engine::{IncomingMessage, MessagingGateway, ReplyContext};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

/// Longest text Telegram accepts in one message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One entry of a `getUpdates` result.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id used as the polling offset.
    pub update_id: i64,
    /// New message, when the update is one.
    pub message: Option<Message>,
}

/// A Bot API message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Chat it was posted in.
    pub chat: Chat,
    /// Author; absent for channel posts.
    pub from: Option<User>,
    /// Text body.
    pub text: Option<String>,
    /// Caption of a media message.
    pub caption: Option<String>,
    /// The message this one replies to.
    pub reply_to_message: Option<Box<Message>>,
}

/// A Bot API chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub kind: String,
}

/// A Bot API user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// Whether the account is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Username without the at sign.
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

impl Message {
    fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    fn is_from_bot(&self, bot_username: &str) -> bool {
        self.from.as_ref().is_some_and(|user| {
            user.is_bot
                && user
                    .username
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(bot_username))
        })
    }
}

impl Update {
    /// Converts a text update into an [`IncomingMessage`]. Anything else
    /// (edits, service messages, media without caption, unknown chat kinds)
    /// yields `None`.
    pub fn into_incoming(self, bot_username: &str) -> Option<IncomingMessage> {
        let message = self.message?;
        let text = message.body()?.to_string();
        let from = message.from.as_ref()?;
        if from.is_bot {
            return None;
        }
        let chat_type = message.chat.kind.parse::<ChatType>().ok()?;

        let reply_to = message.reply_to_message.as_deref().map(|reply| ReplyContext {
            from_bot: reply.is_from_bot(bot_username),
            text: reply.body().unwrap_or_default().to_string(),
        });

        Some(IncomingMessage {
            chat_id: ChatId(message.chat.id),
            chat_type,
            sender: Sender {
                id: UserId(from.id),
                username: from.username.clone(),
                first_name: from.first_name.clone(),
            },
            text,
            reply_to,
        })
    }
}

/// Splits `text` into pieces of at most `max_chars` characters, preferring
/// to break after a newline.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut parts = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max_chars {
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(index, _)| index);
        let end = rest[..hard_end]
            .rfind('\n')
            .filter(|&index| index > 0)
            .map_or(hard_end, |index| index + 1);
        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() || parts.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

/// HTTP client for one bot token.
pub struct TelegramGateway {
    client: Client,
    api_base: String,
    token: String,
    bot_username: String,
    poll_timeout: u64,
}

impl std::fmt::Debug for TelegramGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramGateway")
            .field("api_base", &self.api_base)
            .field("bot_username", &self.bot_username)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramGateway {
    /// Creates a gateway from configuration.
    pub fn new(config: &TelegramConfig) -> BotResult<Self> {
        // Long polls must outlive the server-side wait.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_seconds + 15))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            bot_username: config.bot_username.clone(),
            poll_timeout: config.poll_timeout_seconds,
        })
    }

    /// Username the bot answers to.
    pub fn bot_username(&self) -> &str {
        &self.bot_username
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn unwrap_response<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> BotResult<T> {
        let body: ApiResponse<T> = response.json().await?;
        match body {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(BotError::Telegram {
                method: method.to_string(),
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> BotResult<T> {
        let response = self.client.post(self.api_url(method)).json(body).send().await?;
        Self::unwrap_response(method, response).await
    }

    /// Waits for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> BotResult<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": self.poll_timeout,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    async fn send_chunk(&self, chat: ChatId, text: &str) -> BotResult<()> {
        let _: serde_json::Value = self
            .call("sendMessage", &json!({ "chat_id": chat.0, "text": text }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            self.send_chunk(chat, &chunk).await?;
        }
        debug!("Message sent");
        Ok(())
    }

    #[instrument(skip(self, image, caption), fields(bytes = image.len()))]
    async fn send_photo(&self, chat: ChatId, image: Vec<u8>, caption: Option<String>) -> Result<()> {
        let part = Part::bytes(image)
            .file_name("image.png")
            .mime_str("image/png")
            .map_err(BotError::from)?;
        let mut form = Form::new()
            .text("chat_id", chat.0.to_string())
            .part("photo", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption);
        }

        let response = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(BotError::from)?;
        let _: serde_json::Value = Self::unwrap_response("sendPhoto", response).await?;
        Ok(())
    }

    async fn is_chat_admin(&self, chat: ChatId, user: UserId) -> Result<bool> {
        let member: ChatMember = self
            .call("getChatMember", &json!({ "chat_id": chat.0, "user_id": user.0 }))
            .await?;
        debug!(%chat, %user, status = %member.status, "Chat member status");
        Ok(matches!(member.status.as_str(), "creator" | "administrator"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "palaver_bot";

    fn parse_update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_private_text_update() {
        let update = parse_update(
            r#"{"update_id": 10, "message": {
                "message_id": 1,
                "chat": {"id": 777, "type": "private"},
                "from": {"id": 777, "is_bot": false, "first_name": "Ivan", "username": "ivan"},
                "text": "hello"
            }}"#,
        );
        let incoming = update.into_incoming(BOT).unwrap();
        assert_eq!(incoming.chat_id, ChatId(777));
        assert_eq!(incoming.chat_type, ChatType::Private);
        assert_eq!(incoming.sender.username.as_deref(), Some("ivan"));
        assert_eq!(incoming.text, "hello");
        assert!(incoming.reply_to.is_none());
    }

    #[test]
    fn test_group_reply_to_bot() {
        let update = parse_update(
            r#"{"update_id": 11, "message": {
                "chat": {"id": -100123, "type": "supergroup", "title": "Chat"},
                "from": {"id": 5, "is_bot": false, "first_name": "Olga"},
                "text": "and then?",
                "reply_to_message": {
                    "chat": {"id": -100123, "type": "supergroup"},
                    "from": {"id": 99, "is_bot": true, "first_name": "Palaver", "username": "Palaver_Bot"},
                    "text": "@olga, once upon a time"
                }
            }}"#,
        );
        let incoming = update.into_incoming(BOT).unwrap();
        assert_eq!(incoming.chat_type, ChatType::Supergroup);
        assert!(incoming.is_reply_to_bot());
        assert_eq!(incoming.reply_to.unwrap().text, "@olga, once upon a time");
        assert_eq!(incoming.sender.display_name(), "Olga");
    }

    #[test]
    fn test_non_text_updates_are_skipped() {
        let sticker = parse_update(
            r#"{"update_id": 12, "message": {
                "chat": {"id": 1, "type": "private"},
                "from": {"id": 1, "is_bot": false, "first_name": "A"},
                "sticker": {"file_id": "x"}
            }}"#,
        );
        assert!(sticker.into_incoming(BOT).is_none());

        let edited = parse_update(r#"{"update_id": 13, "edited_message": {}}"#);
        assert!(edited.into_incoming(BOT).is_none());

        let from_bot = parse_update(
            r#"{"update_id": 14, "message": {
                "chat": {"id": 1, "type": "group"},
                "from": {"id": 2, "is_bot": true, "first_name": "Other"},
                "text": "beep"
            }}"#,
        );
        assert!(from_bot.into_incoming(BOT).is_none());
    }

    #[test]
    fn test_api_error_response() {
        let body: ApiResponse<Vec<Update>> =
            serde_json::from_str(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#).unwrap();
        assert!(!body.ok);
        assert_eq!(body.description.as_deref(), Some("Unauthorized"));
        assert!(body.result.is_none());
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message("short", 10), vec!["short"]);
        assert_eq!(split_message("", 10), vec![""]);
        assert_eq!(split_message("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(split_message("ab\ncdef\ngh", 6), vec!["ab\n", "cdef\n", "gh"]);

        let cyrillic = "привет".repeat(1000);
        let parts = split_message(&cyrillic, MAX_MESSAGE_CHARS);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(parts.concat(), cyrillic);
    }

    #[test]
    fn test_api_url() {
        let gateway = TelegramGateway::new(&TelegramConfig {
            token: "123:abc".to_string(),
            bot_username: BOT.to_string(),
            ..TelegramConfig::default()
        })
        .unwrap();
        assert_eq!(
            gateway.api_url("getUpdates"),
            "https://api.telegram.org/bot123:abc/getUpdates"
        );
    }
}
