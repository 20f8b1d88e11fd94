//! Persistence layer.
//!
//! Durable state lives in a key-value store with JSON values. The SQLite
//! [`Database`] is the production store, [`MemoryStore`] backs tests, and
//! [`DebouncedWriter`] coalesces rapid writes into one write per window.

mod config;
pub mod database;
mod debounce;
mod memory;

pub use config::{Config, GoalsConfig, PersistenceConfig, TickerConfig, TimerConfig};
pub use database::{Database, SessionRecord};
pub use debounce::DebouncedWriter;
pub use memory::MemoryStore;

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ConfigError, PersistenceError};

/// String-keyed store of JSON values.
pub trait KvStore {
    fn kv_get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn kv_set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Read and decode a JSON value. `Ok(None)` when the key is absent.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, crate::error::CoreError> {
    match store.kv_get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value immediately.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string(value).map_err(|source| PersistenceError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.kv_set(key, &json)
}

/// Returns the data directory.
///
/// `NOOK_DATA_DIR` wins when set. Otherwise `~/.config/nook[-dev]/`, with
/// the `-dev` suffix selected by `NOOK_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("NOOK_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("NOOK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("nook-dev")
            } else {
                base_dir.join("nook")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Field-by-field reader for persisted records.
///
/// A field that is present but fails to decode is remembered and reads as
/// absent, so one bad field never discards the rest of the record.
pub(crate) struct FieldReader<'a> {
    obj: &'a Map<String, Value>,
    defaulted: Vec<String>,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(obj: &'a Map<String, Value>) -> Self {
        Self {
            obj,
            defaulted: Vec::new(),
        }
    }

    /// `None` when the key is absent, null, or fails to decode.
    pub(crate) fn read<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let raw = self.obj.get(key)?;
        if raw.is_null() {
            return None;
        }
        match T::deserialize(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(field = key, error = %e, "unreadable persisted field");
                self.defaulted.push(key.to_string());
                None
            }
        }
    }

    /// Raw value of a present, non-null field.
    pub(crate) fn raw(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    /// Note a field that was present but had to be defaulted.
    pub(crate) fn mark_defaulted(&mut self, key: &str) {
        self.defaulted.push(key.to_string());
    }

    pub(crate) fn into_defaulted(self) -> Vec<String> {
        self.defaulted
    }
}
