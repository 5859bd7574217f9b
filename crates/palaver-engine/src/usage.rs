//! Process-lifetime usage statistics per user.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_common::{ChatType, Sender, UserId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// What the bot knows about one user's activity since startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    /// First update seen from the user.
    pub first_seen: DateTime<Utc>,
    /// Most recent update.
    pub last_active: DateTime<Utc>,
    /// Username or first name at the last update.
    pub username: String,
    /// Updates received.
    pub total_messages: u64,
    /// Invocation count per command name.
    pub commands: BTreeMap<String, u64>,
    /// Kinds of chat the user wrote from.
    pub chat_types: BTreeSet<ChatType>,
}

impl UsageStats {
    fn new(sender: &Sender, now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_active: now,
            username: sender.display_name().to_string(),
            total_messages: 0,
            commands: BTreeMap::new(),
            chat_types: BTreeSet::new(),
        }
    }

    /// Commands rendered as `name: count` pairs, most used first.
    pub fn commands_summary(&self) -> String {
        let mut commands: Vec<(&String, &u64)> = self.commands.iter().collect();
        commands.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        commands
            .into_iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Concurrent map of [`UsageStats`]. Entries are never evicted.
#[derive(Debug, Default)]
pub struct UsageTracker {
    stats: DashMap<UserId, UsageStats>,
}

impl UsageTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one update, optionally naming the command it invoked.
    pub fn record(&self, sender: &Sender, chat_type: ChatType, command: Option<&str>) {
        let now = Utc::now();
        let mut entry = self
            .stats
            .entry(sender.id)
            .or_insert_with(|| UsageStats::new(sender, now));
        let stats = entry.value_mut();
        stats.total_messages += 1;
        stats.last_active = now;
        stats.username = sender.display_name().to_string();
        stats.chat_types.insert(chat_type);
        if let Some(command) = command {
            *stats.commands.entry(command.to_string()).or_insert(0) += 1;
        }
    }

    /// Snapshot of a user's statistics.
    pub fn get(&self, user: UserId) -> Option<UsageStats> {
        self.stats.get(&user).map(|entry| entry.value().clone())
    }

    /// Number of users seen.
    pub fn user_count(&self) -> usize {
        self.stats.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_common::test_utils::chat_fixtures::test_sender;

    #[test]
    fn test_record_accumulates() {
        let tracker = UsageTracker::new();
        let sender = test_sender();

        tracker.record(&sender, ChatType::Private, None);
        tracker.record(&sender, ChatType::Supergroup, Some("memory"));
        tracker.record(&sender, ChatType::Private, Some("memory"));
        tracker.record(&sender, ChatType::Private, Some("help"));

        let stats = tracker.get(sender.id).unwrap();
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.commands.get("memory"), Some(&2));
        assert_eq!(stats.chat_types.len(), 2);
        assert!(stats.first_seen <= stats.last_active);
        assert_eq!(stats.commands_summary(), "memory: 2, help: 1");
        assert_eq!(tracker.user_count(), 1);
    }
}
