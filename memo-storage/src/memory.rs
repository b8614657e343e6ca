//! Process-local store for tests and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use memo_core::{StoreConfig, StoreError, StoreResult};

use crate::traits::Store;

/// In-memory [`Store`] with the same lifecycle rules as the LMDB store.
///
/// Entries survive `close` and a later `connect`, which lets tests model a
/// process restart against the same backing data.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    connected: AtomicBool,
    schema_ready: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, regardless of connection state.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored bytes for `key`, bypassing the lifecycle checks.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().ok()?.get(key).cloned()
    }

    /// Store raw bytes for `key`, bypassing the lifecycle checks.
    ///
    /// Lets tests seed entries the engine never wrote, such as corrupt ones.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), value.into());
        }
    }

    fn check_ready(&self) -> StoreResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(StoreError::NotConnected);
        }
        if !self.schema_ready.load(Ordering::Acquire) {
            return Err(StoreError::Schema {
                reason: "in-memory namespace is not provisioned; call ensure_schema()"
                    .to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn connect(&self, config: &StoreConfig) -> StoreResult<()> {
        config.validate().map_err(|e| StoreError::Unavailable {
            reason: e.to_string(),
        })?;
        if !self.connected.swap(true, Ordering::AcqRel) {
            tracing::debug!(collection = %config.collection, "in-memory store connected");
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(StoreError::NotConnected);
        }
        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_ready()?;
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.check_ready()?;
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.connected.store(false, Ordering::Release);
        self.schema_ready.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
