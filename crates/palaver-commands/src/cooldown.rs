//! Cooldown system for rate limiting command usage

use dashmap::DashMap;
use palaver_common::UserId;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during cooldown operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CooldownError {
    /// The user ran the command too recently.
    #[error("User {user_id} is on cooldown for command '{command}' (remaining: {remaining_seconds}s)")]
    UserOnCooldown {
        /// User being throttled.
        user_id: UserId,
        /// Command name.
        command: String,
        /// Whole seconds left, rounded up.
        remaining_seconds: u64,
    },
}

impl CooldownError {
    /// Seconds until the command may run again.
    pub const fn remaining_seconds(&self) -> u64 {
        match self {
            Self::UserOnCooldown {
                remaining_seconds, ..
            } => *remaining_seconds,
        }
    }
}

/// Per-user cooldown: (command name, user)
type CooldownKey = (String, UserId);

/// Manager for handling command cooldowns
#[derive(Debug, Default)]
pub struct CooldownManager {
    cooldowns: DashMap<CooldownKey, Instant>,
}

impl CooldownManager {
    /// Create a new cooldown manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a command is on cooldown for `user_id`
    pub fn check(&self, command: &str, user_id: UserId, duration: Duration) -> Result<(), CooldownError> {
        let key = (command.to_string(), user_id);
        let Some(last_used) = self.cooldowns.get(&key) else {
            return Ok(());
        };
        let elapsed = last_used.elapsed();
        if elapsed >= duration {
            return Ok(());
        }

        let remaining = duration - elapsed;
        Err(CooldownError::UserOnCooldown {
            user_id,
            command: command.to_string(),
            remaining_seconds: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
        })
    }

    /// Start the cooldown after a successful execution
    pub fn apply(&self, command: &str, user_id: UserId) {
        debug!(command, %user_id, "Applying cooldown");
        self.cooldowns.insert((command.to_string(), user_id), Instant::now());
    }

    /// Drop entries older than `max_age`
    pub fn cleanup_expired(&self, max_age: Duration) {
        let before = self.cooldowns.len();
        self.cooldowns.retain(|_, last_used| last_used.elapsed() < max_age);
        let removed = before.saturating_sub(self.cooldowns.len());
        if removed > 0 {
            debug!(removed, "Cleaned up expired cooldowns");
        }
    }

    /// Number of tracked cooldowns
    pub fn len(&self) -> usize {
        self.cooldowns.len()
    }

    /// Whether no cooldowns are tracked
    pub fn is_empty(&self) -> bool {
        self.cooldowns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_common::test_utils::chat_fixtures::test_user_id;

    #[test]
    fn test_cooldown_lifecycle() {
        let manager = CooldownManager::new();
        let user = test_user_id();
        let duration = Duration::from_secs(30);

        assert!(manager.check("draw", user, duration).is_ok());
        manager.apply("draw", user);

        let err = manager.check("draw", user, duration).unwrap_err();
        assert!(err.remaining_seconds() > 0 && err.remaining_seconds() <= 30);
        assert!(manager.check("draw", UserId(1), duration).is_ok());
        assert!(manager.check("other", user, duration).is_ok());
        assert!(manager.check("draw", user, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_cleanup_expired() {
        let manager = CooldownManager::new();
        manager.apply("draw", test_user_id());
        assert_eq!(manager.len(), 1);

        manager.cleanup_expired(Duration::from_secs(3600));
        assert_eq!(manager.len(), 1);

        manager.cleanup_expired(Duration::ZERO);
        assert!(manager.is_empty());
    }
}
