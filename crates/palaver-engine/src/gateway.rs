//! Contract of the messaging platform and the shape of incoming updates.

use async_trait::async_trait;
use palaver_common::{ChatId, ChatType, EntityId, Result, Sender, UserId};

/// The message an incoming message replies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    /// Whether the replied-to message was written by this bot.
    pub from_bot: bool,
    /// Text of the replied-to message.
    pub text: String,
}

/// A text message delivered to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the message was posted in.
    pub chat_id: ChatId,
    /// Kind of that chat.
    pub chat_type: ChatType,
    /// Author.
    pub sender: Sender,
    /// Message text.
    pub text: String,
    /// The message this one replies to, if any.
    pub reply_to: Option<ReplyContext>,
}

impl IncomingMessage {
    /// Entity whose settings and memory apply. `None` for channels.
    pub const fn entity(&self) -> Option<EntityId> {
        EntityId::for_chat(self.chat_type, self.chat_id, self.sender.id)
    }

    /// Whether this message replies to one of the bot's messages.
    pub fn is_reply_to_bot(&self) -> bool {
        self.reply_to.as_ref().is_some_and(|reply| reply.from_bot)
    }
}

/// Outbound side of the messaging platform.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Sends a text message.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()>;

    /// Sends an image with an optional caption.
    async fn send_photo(&self, chat: ChatId, image: Vec<u8>, caption: Option<String>) -> Result<()>;

    /// Whether `user` administers `chat`.
    async fn is_chat_admin(&self, chat: ChatId, user: UserId) -> Result<bool>;
}
