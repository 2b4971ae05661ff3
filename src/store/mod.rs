//! Persistence of the poll cursor (last block scanned per watch).
use async_trait::async_trait;
use std::{collections::HashMap, sync::Mutex};

/// Minimal persistence interface. Progress markers only, no transaction data.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last height scanned for `key`, if any.
    async fn load_cursor(&self, key: &str) -> anyhow::Result<Option<u64>>;

    /// Record `height` as scanned for `key`.
    async fn save_cursor(&self, key: &str, height: u64) -> anyhow::Result<()>;
}

/// Process-local store; forgets everything on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cursors: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self, key: &str) -> anyhow::Result<Option<u64>> {
        let map = self
            .cursors
            .lock()
            .map_err(|_| anyhow::anyhow!("cursor map poisoned"))?;
        Ok(map.get(key).copied())
    }

    async fn save_cursor(&self, key: &str, height: u64) -> anyhow::Result<()> {
        let mut map = self
            .cursors
            .lock()
            .map_err(|_| anyhow::anyhow!("cursor map poisoned"))?;
        let slot = map.entry(key.to_owned()).or_insert(height);
        *slot = (*slot).max(height);
        Ok(())
    }
}

#[cfg(feature = "store-sqlite")]
pub mod sqlite_store;
#[cfg(feature = "store-sqlite")]
pub use sqlite_store::SqliteStore;
