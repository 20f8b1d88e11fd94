//! Write coalescing for the key-value store.
//!
//! Staged values replace earlier staged values for the same key. The first
//! stage after a flush opens a window; nothing is written until it closes, so
//! a burst of mutations turns into one write per key. Failed writes stay
//! staged and are retried when the next window closes.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::KvStore;
use crate::error::PersistenceError;

/// Default coalescing window in milliseconds.
pub const DEFAULT_WINDOW_MS: i64 = 500;

#[derive(Debug, Clone)]
pub struct DebouncedWriter {
    window_ms: i64,
    pending: BTreeMap<String, String>,
    due_at_ms: Option<i64>,
}

impl Default for DebouncedWriter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS)
    }
}

impl DebouncedWriter {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms: window_ms.max(0),
            pending: BTreeMap::new(),
            due_at_ms: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Encoded value staged under `key` and not yet written.
    pub fn pending(&self, key: &str) -> Option<&str> {
        self.pending.get(key).map(String::as_str)
    }

    pub fn due_at_ms(&self) -> Option<i64> {
        self.due_at_ms
    }

    /// Encode `value` and stage it under `key`.
    pub fn stage<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        now_ms: i64,
    ) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(value).map_err(|source| PersistenceError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.pending.insert(key.to_string(), json);
        if self.due_at_ms.is_none() {
            self.due_at_ms = Some(now_ms.saturating_add(self.window_ms));
        }
        Ok(())
    }

    /// Write everything staged if the window has closed.
    ///
    /// Returns the number of keys written.
    pub fn flush_due(&mut self, store: &dyn KvStore, now_ms: i64) -> Result<usize, PersistenceError> {
        match self.due_at_ms {
            Some(due) if now_ms >= due => self.write_all(store, now_ms),
            _ => Ok(0),
        }
    }

    /// Write everything staged regardless of the window.
    pub fn flush(&mut self, store: &dyn KvStore, now_ms: i64) -> Result<usize, PersistenceError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        self.write_all(store, now_ms)
    }

    fn write_all(&mut self, store: &dyn KvStore, now_ms: i64) -> Result<usize, PersistenceError> {
        let mut written = 0;
        let mut first_error = None;
        let pending = std::mem::take(&mut self.pending);
        for (key, value) in pending {
            // Stop at the first failure; the rest stay staged.
            if first_error.is_some() {
                self.pending.insert(key, value);
                continue;
            }
            match store.kv_set(&key, &value) {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "persistence write failed, retrying next window");
                    self.pending.insert(key, value);
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => {
                self.due_at_ms = Some(now_ms.saturating_add(self.window_ms));
                Err(e)
            }
            None => {
                debug!(written, "persisted staged state");
                self.due_at_ms = None;
                Ok(written)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn coalesces_within_window() {
        let store = MemoryStore::new();
        let mut writer = DebouncedWriter::new(300);
        writer.stage("k", &1, 0).unwrap();
        writer.stage("k", &2, 100).unwrap();
        writer.stage("k", &3, 200).unwrap();
        assert_eq!(writer.flush_due(&store, 250).unwrap(), 0);
        assert_eq!(writer.flush_due(&store, 300).unwrap(), 1);
        assert_eq!(store.kv_get("k").unwrap().as_deref(), Some("3"));
        assert_eq!(store.write_count(), 1);
        assert!(!writer.has_pending());
        assert_eq!(writer.pending("k"), None);
    }

    #[test]
    fn failed_write_is_retried_next_window() {
        let store = MemoryStore::new();
        let mut writer = DebouncedWriter::new(300);
        writer.stage("k", "v", 0).unwrap();
        store.set_fail_writes(true);
        assert!(writer.flush_due(&store, 300).is_err());
        assert_eq!(writer.pending("k"), Some("\"v\""));
        assert_eq!(writer.due_at_ms(), Some(600));

        store.set_fail_writes(false);
        assert_eq!(writer.flush_due(&store, 599).unwrap(), 0);
        assert_eq!(writer.flush_due(&store, 600).unwrap(), 1);
        assert_eq!(store.kv_get("k").unwrap().as_deref(), Some("\"v\""));
    }

    #[test]
    fn flush_ignores_window() {
        let store = MemoryStore::new();
        let mut writer = DebouncedWriter::new(10_000);
        writer.stage("a", &true, 0).unwrap();
        writer.stage("b", &false, 0).unwrap();
        assert_eq!(writer.flush(&store, 1).unwrap(), 2);
        assert_eq!(writer.flush(&store, 2).unwrap(), 0);
    }
}
