//! Test utilities and shared fixtures for the Palaver workspace.
//!
//! Enabled for this crate's own tests and, through the `testing` feature, for
//! the unit and integration tests of every other crate.

use crate::{ChatId, ChatType, EntityId, Sender, UserId};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize test logging once per test run.
static INIT: Once = Once::new();

/// Initialize logging for tests. Safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = fmt().with_test_writer().with_env_filter(filter).try_init();
    });
}

/// Test fixture for a fixed timestamp.
pub fn mock_timestamp(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .unwrap()
}

/// Chat and user fixtures.
pub mod chat_fixtures {
    use super::*;

    /// Username the bot answers to in fixtures.
    pub const BOT_USERNAME: &str = "palaver_bot";

    /// A test user id.
    pub const fn test_user_id() -> UserId {
        UserId(5_740_604_900)
    }

    /// A test supergroup id.
    pub const fn test_group_id() -> ChatId {
        ChatId(-1_001_987_654_321)
    }

    /// A sender with a username.
    pub fn test_sender() -> Sender {
        Sender {
            id: test_user_id(),
            username: Some("alice".to_string()),
            first_name: "Alice".to_string(),
        }
    }

    /// The private entity of [`test_user_id`].
    pub const fn private_entity() -> EntityId {
        EntityId::User(test_user_id())
    }

    /// The group entity of [`test_group_id`].
    pub const fn group_entity() -> EntityId {
        EntityId::Group(test_group_id())
    }

    /// Chat type matching an entity.
    pub const fn chat_type_of(entity: EntityId) -> ChatType {
        match entity {
            EntityId::User(_) => ChatType::Private,
            EntityId::Group(_) => ChatType::Supergroup,
        }
    }

    /// `count` distinct user ids.
    pub fn test_user_ids(count: usize) -> Vec<UserId> {
        (0..count)
            .map(|i| UserId(100_000_000 + i64::try_from(i).unwrap_or(i64::MAX)))
            .collect()
    }
}

/// Property-based testing strategies.
#[cfg(feature = "proptest")]
pub mod property_testing {
    use crate::{EntityId, UserId, ChatId};
    use proptest::prelude::*;

    /// Strategy for user or group entities.
    pub fn entity_strategy() -> impl Strategy<Value = EntityId> {
        prop_oneof![
            (1i64..=9_999_999_999).prop_map(|id| EntityId::User(UserId(id))),
            (-1_009_999_999_999i64..=-1).prop_map(|id| EntityId::Group(ChatId(id))),
        ]
    }

    /// Strategy for short message texts.
    pub fn message_text_strategy() -> impl Strategy<Value = String> {
        r"[a-zA-Z0-9 ,.!?]{1,40}".prop_map(|s| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_init_logging_multiple_calls() {
        init_test_logging();
        init_test_logging();
    }

    #[test]
    fn test_mock_timestamp() {
        let timestamp = mock_timestamp(2024, 1, 1, 12, 0, 0);
        assert_eq!(timestamp.year(), 2024);
        assert_eq!(timestamp.hour(), 12);
    }

    #[test]
    fn test_fixture_entities_differ() {
        assert_ne!(chat_fixtures::private_entity(), chat_fixtures::group_entity());
        assert_eq!(chat_fixtures::test_user_ids(3).len(), 3);
    }
}
