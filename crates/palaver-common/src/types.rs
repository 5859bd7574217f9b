//! Common type definitions and newtype wrappers for domain modeling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Telegram user ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A Telegram chat ID. Group and supergroup ids are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<UserId> for ChatId {
    /// A private chat shares its id with the user on the other side.
    fn from(user: UserId) -> Self {
        Self(user.0)
    }
}

/// Kind of chat an update arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one conversation with the bot.
    Private,
    /// Basic group.
    Group,
    /// Supergroup.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl ChatType {
    /// Whether several humans share this chat.
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }

    /// Wire name as used by the Bot API.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            "supergroup" => Ok(Self::Supergroup),
            "channel" => Ok(Self::Channel),
            other => Err(format!("unknown chat type '{other}'")),
        }
    }
}

/// The unit of settings and memory scoping: a user or a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityId {
    /// A private conversation, keyed by the user.
    User(UserId),
    /// A group conversation, keyed by the chat.
    Group(ChatId),
}

impl EntityId {
    /// Resolves the entity an update belongs to. Channels have none.
    pub const fn for_chat(chat_type: ChatType, chat_id: ChatId, user_id: UserId) -> Option<Self> {
        match chat_type {
            ChatType::Private => Some(Self::User(user_id)),
            ChatType::Group | ChatType::Supergroup => Some(Self::Group(chat_id)),
            ChatType::Channel => None,
        }
    }

    /// Key under which the entity's records are persisted.
    pub fn storage_key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Group(id) => format!("group:{id}"),
        }
    }

    /// Inverse of [`EntityId::storage_key`].
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let (kind, id) = key.split_once(':')?;
        let id: i64 = id.parse().ok()?;
        match kind {
            "user" => Some(Self::User(UserId(id))),
            "group" => Some(Self::Group(ChatId(id))),
            _ => None,
        }
    }

    /// Whether this entity is a group chat.
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Chat that replies for this entity are delivered to.
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::User(id) => ChatId::from(*id),
            Self::Group(id) => *id,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Which side of the conversation produced an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// A human participant.
    User,
    /// The bot.
    Assistant,
}

/// Behavioural template layered into prompts, from most to least restrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FreedomLevel {
    /// Polite, avoids sharp topics.
    Sanitized,
    /// Calm and direct on any permitted topic.
    #[default]
    Open,
    /// Colloquial, jokes and slang.
    Casual,
    /// Few limits on topics and vocabulary.
    Unfiltered,
    /// No register limits at all.
    Extreme,
}

impl FreedomLevel {
    /// All levels in ascending order of permissiveness.
    pub const ALL: [Self; 5] = [
        Self::Sanitized,
        Self::Open,
        Self::Casual,
        Self::Unfiltered,
        Self::Extreme,
    ];

    /// Stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sanitized => "sanitized",
            Self::Open => "open",
            Self::Casual => "casual",
            Self::Unfiltered => "unfiltered",
            Self::Extreme => "extreme",
        }
    }

    /// Parses a level name, falling back to the default level for anything
    /// unrecognised.
    pub fn parse_lossy(value: &str) -> Self {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(value))
            .unwrap_or_default()
    }
}

impl fmt::Display for FreedomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FreedomLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FreedomLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse_lossy(&raw))
    }
}

/// The human who sent an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Telegram user id.
    pub id: UserId,
    /// `@username` without the at sign, when the user has one.
    pub username: Option<String>,
    /// First name, always present on Telegram accounts.
    pub first_name: String,
}

impl Sender {
    /// Name used to attribute group exchanges.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }

    /// How the bot addresses the sender in a group reply.
    pub fn mention(&self) -> String {
        match &self.username {
            Some(username) => format!("@{username}"),
            None => self.first_name.clone(),
        }
    }
}
