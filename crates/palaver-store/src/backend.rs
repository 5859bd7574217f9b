//! Durable key-value storage behind the record caches.
//!
//! Keys are entity storage keys (`user:42`, `group:-100...`), values are
//! serialized records. Each [`RecordKind`] lives in its own keyspace.

use async_trait::async_trait;
use dashmap::DashMap;
use palaver_common::{PalaverError, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The kinds of record persisted per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Behavioural settings.
    Settings,
    /// Conversational memory.
    Memory,
}

impl RecordKind {
    /// Name of the keyspace holding this kind.
    pub const fn tree_name(self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tree_name())
    }
}

/// Persistence contract. Implementations must be safe to share between
/// tasks; no ordering is promised between concurrent writes to one key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads one record.
    async fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>>;

    /// Inserts or replaces one record.
    async fn put(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<()>;

    /// Enumerates every record of a kind.
    async fn list(&self, kind: RecordKind) -> Result<Vec<(String, Vec<u8>)>>;

    /// Forces buffered writes to durable storage.
    async fn flush(&self) -> Result<()>;
}

/// Embedded sled database with one tree per [`RecordKind`].
#[derive(Debug, Clone)]
pub struct SledBackend {
    db: Arc<sled::Db>,
    settings: sled::Tree,
    memory: sled::Tree,
}

impl SledBackend {
    /// Opens (or creates) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening database at {}", path.display());

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024)
            .flush_every_ms(Some(1000))
            .open()
            .map_err(|e| {
                PalaverError::persistence_with_source(
                    format!("Failed to open database at {}", path.display()),
                    e,
                )
            })?;

        let open_tree = |kind: RecordKind| {
            db.open_tree(kind.tree_name()).map_err(|e| {
                PalaverError::persistence_with_source(format!("Failed to open tree '{kind}'"), e)
            })
        };
        let settings = open_tree(RecordKind::Settings)?;
        let memory = open_tree(RecordKind::Memory)?;

        Ok(Self {
            db: Arc::new(db),
            settings,
            memory,
        })
    }

    const fn tree(&self, kind: RecordKind) -> &sled::Tree {
        match kind {
            RecordKind::Settings => &self.settings,
            RecordKind::Memory => &self.memory,
        }
    }

    /// Runs a sled operation on the blocking pool.
    async fn blocking<T, F>(&self, kind: RecordKind, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&sled::Tree) -> Result<T> + Send + 'static,
    {
        let tree = self.tree(kind).clone();
        tokio::task::spawn_blocking(move || op(&tree))
            .await
            .map_err(|e| PalaverError::persistence_with_source(format!("Storage task for {kind} failed"), e))?
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(kind, move |tree| {
            let value = tree.get(key.as_bytes()).map_err(|e| {
                PalaverError::persistence_with_source(format!("Failed to read {kind} record {key}"), e)
            })?;
            Ok(value.map(|ivec| ivec.to_vec()))
        })
        .await
    }

    async fn put(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<()> {
        let owned = key.to_string();
        self.blocking(kind, move |tree| {
            tree.insert(owned.as_bytes(), value).map_err(|e| {
                PalaverError::persistence_with_source(format!("Failed to write {kind} record {owned}"), e)
            })?;
            Ok(())
        })
        .await?;
        debug!(%kind, key, "Record written");
        Ok(())
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<(String, Vec<u8>)>> {
        self.blocking(kind, move |tree| {
            tree.iter()
                .map(|entry| {
                    let (key, value) = entry.map_err(|e| {
                        PalaverError::persistence_with_source(format!("Failed to scan {kind} records"), e)
                    })?;
                    Ok((String::from_utf8_lossy(&key).into_owned(), value.to_vec()))
                })
                .collect()
        })
        .await
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| PalaverError::persistence_with_source("Failed to flush database", e))?;
        Ok(())
    }
}

/// Process-local backend, used by tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<(RecordKind, String), Vec<u8>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of `kind`.
    pub fn count(&self, kind: RecordKind) -> usize {
        self.records.iter().filter(|entry| entry.key().0 == kind).count()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, kind: RecordKind, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .records
            .get(&(kind, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, kind: RecordKind, key: &str, value: Vec<u8>) -> Result<()> {
        self.records.insert((kind, key.to_string()), value);
        Ok(())
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<(String, Vec<u8>)>> {
        let mut records: Vec<(String, Vec<u8>)> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
