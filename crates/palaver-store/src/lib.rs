//! # Palaver Store
//!
//! Session state for Palaver: one [`SettingsRecord`] and one bounded
//! [`MemoryRecord`] per conversation entity.
//!
//! Records are serialized as JSON into a [`StorageBackend`] and served
//! through a write-through [`RecordCache`]. Concurrent writers to the same
//! entity follow last-writer-wins semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod cache;
pub mod memory;
pub mod settings;

pub use backend::{MemoryBackend, RecordKind, SledBackend, StorageBackend};
pub use cache::{CacheMetrics, RecordCache};
pub use memory::{Exchange, MemoryRecord, MemoryStore};
pub use settings::{on_off, SettingUpdate, SettingsDefaults, SettingsRecord, SettingsStore};
