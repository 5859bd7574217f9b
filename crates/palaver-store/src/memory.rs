//! Bounded conversational memory.
//!
//! Every mutation appends first and then evicts from the front until the
//! record fits the entity's `max_memory`, so `len <= max_memory` holds after
//! each operation. Private and group conversations share this algorithm;
//! they differ only in whether exchanges carry an author.

use crate::backend::{RecordKind, StorageBackend};
use crate::cache::RecordCache;
use crate::settings::{parse_memory_limit, SettingsRecord, SettingsStore};
use chrono::{DateTime, Utc};
use palaver_common::{EntityId, PalaverError, Result, SpeakerRole};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One utterance in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Who spoke.
    pub role: SpeakerRole,
    /// What was said.
    pub text: String,
    /// Display name of the speaker; set in group conversations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// When it was recorded.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    /// A user utterance.
    pub fn user(text: impl Into<String>, author: Option<String>) -> Self {
        Self {
            role: SpeakerRole::User,
            text: text.into(),
            author,
            timestamp: Utc::now(),
        }
    }

    /// A bot utterance.
    pub fn assistant(text: impl Into<String>, author: Option<String>) -> Self {
        Self {
            role: SpeakerRole::Assistant,
            text: text.into(),
            author,
            timestamp: Utc::now(),
        }
    }
}

/// Ordered exchanges of one entity, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryRecord {
    exchanges: VecDeque<Exchange>,
}

impl MemoryRecord {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `exchange` and evicts the oldest entries beyond `limit`.
    /// Returns how many were evicted.
    pub fn push_bounded(&mut self, exchange: Exchange, limit: u32) -> usize {
        self.exchanges.push_back(exchange);
        self.trim_to(limit)
    }

    /// Evicts the oldest entries until at most `limit` remain.
    pub fn trim_to(&mut self, limit: u32) -> usize {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let excess = self.exchanges.len().saturating_sub(limit);
        self.exchanges.drain(..excess);
        excess
    }

    /// Removes the first exchange whose text equals `text`.
    pub fn remove_first(&mut self, text: &str) -> bool {
        match self.exchanges.iter().position(|e| e.text == text) {
            Some(index) => {
                self.exchanges.remove(index);
                true
            }
            None => false,
        }
    }

    /// Rewrites the first exchange whose text equals `old`.
    pub fn replace_first(&mut self, old: &str, new: &str) -> bool {
        match self.exchanges.iter_mut().find(|e| e.text == old) {
            Some(exchange) => {
                exchange.text = new.to_string();
                true
            }
            None => false,
        }
    }

    /// Number of stored exchanges.
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// All exchanges, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Exchange> + ExactSizeIterator {
        self.exchanges.iter()
    }

    /// The newest `n` exchanges, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter().skip(self.exchanges.len().saturating_sub(n))
    }

    /// Drops every exchange.
    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}

/// Resolves and mutates [`MemoryRecord`]s, bounded by each entity's
/// settings.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    records: Arc<RecordCache<MemoryRecord>>,
    settings: SettingsStore,
}

impl MemoryStore {
    /// Creates a store over `backend`, reading limits through `settings`.
    pub fn new(backend: Arc<dyn StorageBackend>, settings: SettingsStore, cache_capacity: u64) -> Self {
        Self {
            records: Arc::new(RecordCache::new(backend, RecordKind::Memory, cache_capacity)),
            settings,
        }
    }

    /// The settings store limits are read from.
    pub const fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Settings and memory of `entity`.
    pub async fn resolve(&self, entity: EntityId) -> (SettingsRecord, MemoryRecord) {
        let settings = self.settings.resolve(entity).await;
        let memory = self.load(entity).await;
        (settings, memory)
    }

    async fn load(&self, entity: EntityId) -> MemoryRecord {
        match self.records.load(&entity.storage_key()).await {
            Ok(record) => record.unwrap_or_default(),
            Err(err) => {
                error!(%entity, error = %err, "Failed to load memory, starting empty");
                MemoryRecord::new()
            }
        }
    }

    // Failed writes stay in the cache; the conversation carries on.
    async fn persist(&self, entity: EntityId, record: &MemoryRecord) {
        if let Err(err) = self.records.store(&entity.storage_key(), record).await {
            warn!(%entity, error = %err, "Memory kept in process only");
        }
    }

    /// Appends one exchange.
    pub async fn append(&self, entity: EntityId, exchange: Exchange) {
        let (settings, mut memory) = self.resolve(entity).await;
        let evicted = memory.push_bounded(exchange, settings.max_memory);
        if evicted > 0 {
            debug!(%entity, evicted, "Evicted oldest exchanges");
        }
        self.persist(entity, &memory).await;
    }

    /// Appends a user exchange followed by the reply to it, in one
    /// read-modify-write.
    pub async fn append_round(&self, entity: EntityId, user: Exchange, assistant: Exchange) {
        let (settings, mut memory) = self.resolve(entity).await;
        let evicted = memory.push_bounded(user, settings.max_memory)
            + memory.push_bounded(assistant, settings.max_memory);
        if evicted > 0 {
            debug!(%entity, evicted, "Evicted oldest exchanges");
        }
        self.persist(entity, &memory).await;
    }

    /// Removes the first exchange with exactly this text.
    pub async fn remove_by_text(&self, entity: EntityId, text: &str) -> Result<()> {
        let mut memory = self.load(entity).await;
        if !memory.remove_first(text) {
            return Err(PalaverError::not_found(format!("no exchange with that text in {entity}")));
        }
        self.persist(entity, &memory).await;
        Ok(())
    }

    /// Rewrites the first exchange with exactly the text `old`.
    pub async fn replace_by_text(&self, entity: EntityId, old: &str, new: &str) -> Result<()> {
        let mut memory = self.load(entity).await;
        if !memory.replace_first(old, new) {
            return Err(PalaverError::not_found(format!("no exchange with that text in {entity}")));
        }
        self.persist(entity, &memory).await;
        Ok(())
    }

    /// Empties the memory.
    pub async fn clear(&self, entity: EntityId) {
        self.persist(entity, &MemoryRecord::new()).await;
        info!(%entity, "Memory cleared");
    }

    /// Validates and stores a new limit, trimming memory to fit it.
    pub async fn set_limit(&self, entity: EntityId, limit: &str) -> Result<SettingsRecord> {
        let limit = parse_memory_limit(limit, self.settings.limits())?;
        let settings = self
            .settings
            .update(entity, |record| record.max_memory = limit)
            .await?;

        let mut memory = self.load(entity).await;
        let evicted = memory.trim_to(limit);
        if evicted > 0 {
            self.persist(entity, &memory).await;
        }
        info!(%entity, limit, evicted, "Memory limit changed");
        Ok(settings)
    }
}
