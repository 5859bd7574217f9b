//! Per-entity behavioural settings.

use crate::backend::{RecordKind, StorageBackend};
use crate::cache::RecordCache;
use palaver_common::{EntityId, FreedomLevel, PalaverError, Result, UserId};
use palaver_config::{Config, MemoryConfig, DEFAULT_LANGUAGE, DEFAULT_MEMORY, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Behavioural configuration of one entity.
///
/// Missing fields deserialize to their defaults and unknown fields are
/// ignored, so records written by older or newer builds stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    /// Whether the persona directive is added to prompts.
    pub roleplay_mode: bool,
    /// Persona used in roleplay mode.
    pub personality: String,
    /// Behavioural template.
    pub freedom_level: FreedomLevel,
    /// Reserved.
    pub google_search: bool,
    /// Sampling temperature passed to the model.
    pub temperature: f32,
    /// Model identifier.
    pub current_model: String,
    /// Upper bound on stored exchanges.
    pub max_memory: u32,
    /// Extra instructions appended to every prompt, in insertion order.
    pub system_instructions: Vec<String>,
    /// Opt-out of normal broadcasts.
    pub disable_broadcasts: bool,
    /// Opt-out of maintenance broadcasts.
    pub disable_tech_notifications: bool,
    /// Groups only: restrict setting changes to chat administrators.
    pub admin_only_settings: bool,
    /// Response language code.
    pub language: String,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            roleplay_mode: false,
            personality: "default".to_string(),
            freedom_level: FreedomLevel::default(),
            google_search: false,
            temperature: 0.9,
            current_model: DEFAULT_MODEL.to_string(),
            max_memory: DEFAULT_MEMORY,
            system_instructions: Vec::new(),
            disable_broadcasts: false,
            disable_tech_notifications: false,
            admin_only_settings: false,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Configured values a freshly materialised record starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDefaults {
    /// Model identifier.
    pub model: String,
    /// Response language code.
    pub language: String,
    /// Memory limit.
    pub max_memory: u32,
}

impl SettingsDefaults {
    /// Extracts the defaults from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.inference.default_model.clone(),
            language: config.prompt.default_language.clone(),
            max_memory: config.memory.default,
        }
    }

    /// A default record carrying these values.
    pub fn record(&self) -> SettingsRecord {
        SettingsRecord {
            current_model: self.model.clone(),
            language: self.language.clone(),
            max_memory: self.max_memory,
            ..SettingsRecord::default()
        }
    }
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            max_memory: DEFAULT_MEMORY,
        }
    }
}

/// A single validated change to a [`SettingsRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettingUpdate {
    /// `roleplay_mode`
    RoleplayMode(bool),
    /// `personality`
    Personality(String),
    /// `freedom_level`
    FreedomLevel(FreedomLevel),
    /// `google_search`
    GoogleSearch(bool),
    /// `temperature`
    Temperature(f32),
    /// `current_model`
    CurrentModel(String),
    /// `max_memory`
    MaxMemory(u32),
    /// `disable_broadcasts`
    DisableBroadcasts(bool),
    /// `disable_tech_notifications`
    DisableTechNotifications(bool),
    /// `admin_only_settings`
    AdminOnlySettings(bool),
    /// `language`
    Language(String),
}

impl SettingUpdate {
    /// Field names accepted by [`SettingUpdate::parse`].
    pub const FIELDS: [&'static str; 11] = [
        "roleplay_mode",
        "personality",
        "freedom_level",
        "google_search",
        "temperature",
        "current_model",
        "max_memory",
        "disable_broadcasts",
        "disable_tech_notifications",
        "admin_only_settings",
        "language",
    ];

    /// Validates raw user input for `field`.
    ///
    /// An unknown freedom level is not an error; it resolves to the default
    /// level.
    pub fn parse(field: &str, value: &str, limits: &MemoryConfig) -> Result<Self> {
        let value = value.trim();
        let update = match field {
            "roleplay_mode" => Self::RoleplayMode(parse_bool(field, value)?),
            "personality" => Self::Personality(non_empty(field, value)?),
            "freedom_level" => Self::FreedomLevel(FreedomLevel::parse_lossy(value)),
            "google_search" => Self::GoogleSearch(parse_bool(field, value)?),
            "temperature" => {
                let temperature: f32 = value.parse().map_err(|_| {
                    PalaverError::validation_field(format!("'{value}' is not a number"), field)
                })?;
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(PalaverError::validation_field(
                        format!("temperature must be between 0 and 2, got {value}"),
                        field,
                    ));
                }
                Self::Temperature(temperature)
            }
            "current_model" => Self::CurrentModel(non_empty(field, value)?),
            "max_memory" => Self::MaxMemory(parse_memory_limit(value, limits)?),
            "disable_broadcasts" => Self::DisableBroadcasts(parse_bool(field, value)?),
            "disable_tech_notifications" => {
                Self::DisableTechNotifications(parse_bool(field, value)?)
            }
            "admin_only_settings" => Self::AdminOnlySettings(parse_bool(field, value)?),
            "language" => Self::Language(non_empty(field, value)?.to_ascii_lowercase()),
            other => {
                return Err(PalaverError::validation_field(
                    format!("unknown setting '{other}'"),
                    other,
                ))
            }
        };
        Ok(update)
    }

    /// Name of the field this update targets.
    pub const fn field(&self) -> &'static str {
        match self {
            Self::RoleplayMode(_) => "roleplay_mode",
            Self::Personality(_) => "personality",
            Self::FreedomLevel(_) => "freedom_level",
            Self::GoogleSearch(_) => "google_search",
            Self::Temperature(_) => "temperature",
            Self::CurrentModel(_) => "current_model",
            Self::MaxMemory(_) => "max_memory",
            Self::DisableBroadcasts(_) => "disable_broadcasts",
            Self::DisableTechNotifications(_) => "disable_tech_notifications",
            Self::AdminOnlySettings(_) => "admin_only_settings",
            Self::Language(_) => "language",
        }
    }

    /// The new value, rendered for display.
    pub fn value_display(&self) -> String {
        match self {
            Self::RoleplayMode(v)
            | Self::GoogleSearch(v)
            | Self::DisableBroadcasts(v)
            | Self::DisableTechNotifications(v)
            | Self::AdminOnlySettings(v) => on_off(*v).to_string(),
            Self::Personality(v) | Self::CurrentModel(v) | Self::Language(v) => v.clone(),
            Self::FreedomLevel(v) => v.to_string(),
            Self::Temperature(v) => v.to_string(),
            Self::MaxMemory(v) => v.to_string(),
        }
    }

    /// Writes the change into `record`.
    pub fn apply(self, record: &mut SettingsRecord) {
        match self {
            Self::RoleplayMode(v) => record.roleplay_mode = v,
            Self::Personality(v) => record.personality = v,
            Self::FreedomLevel(v) => record.freedom_level = v,
            Self::GoogleSearch(v) => record.google_search = v,
            Self::Temperature(v) => record.temperature = v,
            Self::CurrentModel(v) => record.current_model = v,
            Self::MaxMemory(v) => record.max_memory = v,
            Self::DisableBroadcasts(v) => record.disable_broadcasts = v,
            Self::DisableTechNotifications(v) => record.disable_tech_notifications = v,
            Self::AdminOnlySettings(v) => record.admin_only_settings = v,
            Self::Language(v) => record.language = v,
        }
    }
}

/// `on`/`off` rendering of a flag.
pub const fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Parses and range-checks a memory limit.
pub fn parse_memory_limit(value: &str, limits: &MemoryConfig) -> Result<u32> {
    let value = value.trim();
    let limit: u32 = value.parse().map_err(|_| {
        PalaverError::validation_field(format!("'{value}' is not a whole number"), "max_memory")
    })?;
    if !limits.contains(limit) {
        return Err(PalaverError::out_of_range("max_memory", limit, limits.min, limits.max));
    }
    Ok(limit)
}

fn parse_bool(field: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(PalaverError::validation_field(
            format!("'{value}' is not on/off"),
            field,
        )),
    }
}

fn non_empty(field: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        Err(PalaverError::validation_field(format!("{field} must not be empty"), field))
    } else {
        Ok(value.to_string())
    }
}

/// Resolves and persists [`SettingsRecord`]s.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    records: Arc<RecordCache<SettingsRecord>>,
    defaults: SettingsDefaults,
    limits: MemoryConfig,
}

impl SettingsStore {
    /// Creates a store over `backend`.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        defaults: SettingsDefaults,
        limits: MemoryConfig,
        cache_capacity: u64,
    ) -> Self {
        Self {
            records: Arc::new(RecordCache::new(backend, RecordKind::Settings, cache_capacity)),
            defaults,
            limits,
        }
    }

    /// Memory bounds enforced on `max_memory`.
    pub const fn limits(&self) -> &MemoryConfig {
        &self.limits
    }

    /// A record with configured defaults.
    pub fn default_record(&self) -> SettingsRecord {
        self.defaults.record()
    }

    /// Returns the stored record, materialising and persisting the default
    /// one on first access. Storage failures are logged and answered with
    /// defaults.
    pub async fn resolve(&self, entity: EntityId) -> SettingsRecord {
        let key = entity.storage_key();
        match self.records.load(&key).await {
            Ok(Some(mut record)) => {
                record.max_memory = record.max_memory.clamp(self.limits.min, self.limits.max);
                record
            }
            Ok(None) => {
                let record = self.default_record();
                debug!(%entity, "Materialising default settings");
                if let Err(err) = self.records.store(&key, &record).await {
                    error!(%entity, error = %err, "Failed to persist default settings");
                }
                record
            }
            Err(err) => {
                error!(%entity, error = %err, "Failed to load settings, using defaults");
                self.default_record()
            }
        }
    }

    /// Upserts the record. Last writer wins.
    pub async fn save(&self, entity: EntityId, record: &SettingsRecord) -> Result<()> {
        self.records.store(&entity.storage_key(), record).await
    }

    /// Resolves, mutates and saves in one round trip.
    pub async fn update<F>(&self, entity: EntityId, mutate: F) -> Result<SettingsRecord>
    where
        F: FnOnce(&mut SettingsRecord) + Send,
    {
        let mut record = self.resolve(entity).await;
        mutate(&mut record);
        self.save(entity, &record).await?;
        Ok(record)
    }

    /// Applies a validated change.
    pub async fn apply(&self, entity: EntityId, update: SettingUpdate) -> Result<SettingsRecord> {
        debug!(%entity, field = update.field(), "Applying setting");
        self.update(entity, move |record| update.apply(record)).await
    }

    /// Restores the defaults.
    pub async fn reset(&self, entity: EntityId) -> Result<SettingsRecord> {
        let record = self.default_record();
        self.save(entity, &record).await?;
        info!(%entity, "Settings reset to defaults");
        Ok(record)
    }

    /// Every user that has a settings record.
    pub async fn list_users(&self) -> Result<Vec<(UserId, SettingsRecord)>> {
        let records = self.records.list().await?;
        Ok(records
            .into_iter()
            .filter_map(|(key, record)| match EntityId::from_storage_key(&key)? {
                EntityId::User(user) => Some((user, record)),
                EntityId::Group(_) => None,
            })
            .collect())
    }

    /// Flushes the backend.
    pub async fn flush(&self) -> Result<()> {
        self.records.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use palaver_common::test_utils::chat_fixtures::{group_entity, private_entity};

    fn store_with(backend: Arc<MemoryBackend>) -> SettingsStore {
        SettingsStore::new(backend, SettingsDefaults::default(), MemoryConfig::default(), 64)
    }

    #[test]
    fn test_unknown_freedom_level_resolves_to_default() {
        let update = SettingUpdate::parse("freedom_level", "chaotic-neutral", &MemoryConfig::default()).unwrap();
        assert_eq!(update, SettingUpdate::FreedomLevel(FreedomLevel::Open));

        let record: SettingsRecord =
            serde_json::from_str(r#"{"freedom_level":"chaotic-neutral"}"#).unwrap();
        assert_eq!(record.freedom_level, FreedomLevel::Open);
    }

    #[test]
    fn test_memory_limit_bounds() {
        let limits = MemoryConfig::default();
        assert_eq!(SettingUpdate::parse("max_memory", "200", &limits).unwrap(), SettingUpdate::MaxMemory(200));
        assert_eq!(SettingUpdate::parse("max_memory", "1000", &limits).unwrap(), SettingUpdate::MaxMemory(1000));

        let err = SettingUpdate::parse("max_memory", "50", &limits).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("between 200 and 1000"));
        assert!(SettingUpdate::parse("max_memory", "1001", &limits).is_err());
        assert!(SettingUpdate::parse("max_memory", "lots", &limits).is_err());
    }

    #[test]
    fn test_flags_and_temperature() {
        let limits = MemoryConfig::default();
        assert_eq!(
            SettingUpdate::parse("disable_broadcasts", "ON", &limits).unwrap(),
            SettingUpdate::DisableBroadcasts(true)
        );
        assert_eq!(
            SettingUpdate::parse("roleplay_mode", "no", &limits).unwrap(),
            SettingUpdate::RoleplayMode(false)
        );
        assert!(SettingUpdate::parse("roleplay_mode", "maybe", &limits).is_err());
        assert!(SettingUpdate::parse("temperature", "2.5", &limits).is_err());
        assert_eq!(
            SettingUpdate::parse("temperature", "0.4", &limits).unwrap().value_display(),
            "0.4"
        );
        assert!(SettingUpdate::parse("colour", "blue", &limits).unwrap_err().is_validation());
        assert!(SettingUpdate::parse("personality", "  ", &limits).is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let record: SettingsRecord =
            serde_json::from_str(r#"{"personality":"pirate","future_field":1}"#).unwrap();
        assert_eq!(record.personality, "pirate");
        assert_eq!(record.max_memory, DEFAULT_MEMORY);
        assert!(record.system_instructions.is_empty());
    }

    #[tokio::test]
    async fn test_first_resolve_materialises_defaults() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());

        let record = store.resolve(private_entity()).await;
        assert_eq!(record, SettingsRecord::default());
        assert_eq!(backend.count(RecordKind::Settings), 1);

        let stored = backend
            .get(RecordKind::Settings, &private_entity().storage_key())
            .await
            .unwrap()
            .unwrap();
        let stored: SettingsRecord = serde_json::from_slice(&stored).unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_update_and_reset() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        let entity = group_entity();

        let update = SettingUpdate::parse("admin_only_settings", "on", store.limits()).unwrap();
        let record = store.apply(entity, update).await.unwrap();
        assert!(record.admin_only_settings);
        assert!(store.resolve(entity).await.admin_only_settings);

        store.reset(entity).await.unwrap();
        assert!(!store.resolve(entity).await.admin_only_settings);
    }

    #[tokio::test]
    async fn test_list_users_excludes_groups() {
        let store = store_with(Arc::new(MemoryBackend::new()));
        store.resolve(private_entity()).await;
        store.resolve(group_entity()).await;

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(EntityId::User(users[0].0), private_entity());
    }
}
