//! The store contract the memo engine reads from and writes to.

use async_trait::async_trait;
use memo_core::{StoreConfig, StoreResult};

/// Durable key-value backend for cache entries.
///
/// Keys are derived cache keys; values are opaque encoded results. The
/// engine performs at most one `get` and one `put` per request and never
/// deletes. Implementations must be safe to share between tasks.
///
/// # Lifecycle
///
/// `connect` opens the backend and `ensure_schema` provisions the namespace
/// entries live in. Until both succeed, `get` and `put` fail with
/// [`StoreError::NotConnected`](memo_core::StoreError::NotConnected) or
/// [`StoreError::Schema`](memo_core::StoreError::Schema). `close` releases
/// the backend; a closed store can be connected again.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open the backend described by `config`.
    async fn connect(&self, config: &StoreConfig) -> StoreResult<()>;

    /// Create the entry namespace if it does not exist yet.
    ///
    /// Idempotent: repeated calls after the first success do nothing.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Read the value stored under `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or overwrite the value stored under `key`.
    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Release the backend.
    async fn close(&self) -> StoreResult<()>;

    /// Whether `connect` has succeeded and `close` has not been called since.
    fn is_connected(&self) -> bool;
}
