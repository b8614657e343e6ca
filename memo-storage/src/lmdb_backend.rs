//! LMDB-backed store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to persist cache entries in
//! a memory-mapped environment on disk. The environment lives in
//! `path/database`; entries live in a named LMDB database called the
//! collection.
//!
//! # Key Encoding
//!
//! LMDB rejects keys longer than 511 bytes. Cache keys up to
//! [`MAX_INLINE_KEY_LEN`] bytes are stored verbatim behind a `k` tag; longer
//! keys are stored as `h` followed by their SHA-256 digest. Every record
//! carries the full cache key, which is compared on read, so a digest
//! collision reads as a miss rather than returning another key's value.
//!
//! # Record Layout
//!
//! `[stored_at_ms: i64 LE][key_len: u32 LE][key bytes][value bytes]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use a read transaction, writes a
//! write transaction committed before `put` returns.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use memo_core::{StoreConfig, StoreError, StoreResult};
use sha2::{Digest, Sha256};

use crate::traits::Store;

/// Longest cache key stored without hashing.
pub const MAX_INLINE_KEY_LEN: usize = 510;

const INLINE_TAG: u8 = b'k';
const HASHED_TAG: u8 = b'h';
const HEADER_LEN: usize = 12;
const MAX_DBS: u32 = 8;

/// A decoded record as it sits in the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

struct Connection {
    env: Env,
    collection: String,
    /// Set once `ensure_schema` has opened or created the collection.
    db: Option<Database<Bytes, Bytes>>,
}

/// Persistent [`Store`] on LMDB.
///
/// # Example
///
/// ```ignore
/// use memo_core::StoreConfig;
/// use memo_storage::{LmdbStore, Store};
///
/// let store = LmdbStore::new();
/// store.connect(&StoreConfig::at("/var/lib/memo")).await?;
/// store.ensure_schema().await?;
///
/// store.put("sum_[2,3]", b"5").await?;
/// assert_eq!(store.get("sum_[2,3]").await?, Some(b"5".to_vec()));
/// ```
pub struct LmdbStore {
    conn: RwLock<Option<Connection>>,
}

impl Default for LmdbStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LmdbStore {
    /// Create an unconnected store.
    pub fn new() -> Self {
        Self {
            conn: RwLock::new(None),
        }
    }

    /// Read the full record stored under `key`, including when it was written.
    pub fn get_entry(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        let (env, db) = self.handles()?;
        let rtxn = env.read_txn().map_err(unavailable)?;

        let Some(bytes) = db.get(&rtxn, &storage_key(key)).map_err(unavailable)? else {
            return Ok(None);
        };

        let entry = decode_record(bytes)?;
        if entry.key != key {
            tracing::debug!(
                key = %key,
                stored_key = %entry.key,
                "hashed key collision, treating as absent"
            );
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Number of entries in the collection.
    pub fn entry_count(&self) -> StoreResult<u64> {
        let (env, db) = self.handles()?;
        let rtxn = env.read_txn().map_err(unavailable)?;
        db.len(&rtxn).map_err(unavailable)
    }

    fn write_record(&self, storage_key: &[u8], record: &[u8]) -> StoreResult<()> {
        let (env, db) = self.handles()?;

        let mut wtxn = env.write_txn().map_err(unavailable)?;
        db.put(&mut wtxn, storage_key, record)
            .map_err(unavailable)?;
        wtxn.commit().map_err(unavailable)?;

        Ok(())
    }

    /// Clone the environment and collection handles out of the lock.
    fn handles(&self) -> StoreResult<(Env, Database<Bytes, Bytes>)> {
        let guard = self.conn.read().map_err(|_| StoreError::LockPoisoned)?;
        let conn = guard.as_ref().ok_or(StoreError::NotConnected)?;
        let db = conn.db.ok_or_else(|| StoreError::Schema {
            reason: format!(
                "collection '{}' is not provisioned; call ensure_schema()",
                conn.collection
            ),
        })?;
        Ok((conn.env.clone(), db))
    }
}

#[async_trait]
impl Store for LmdbStore {
    async fn connect(&self, config: &StoreConfig) -> StoreResult<()> {
        config.validate().map_err(|e| StoreError::Unavailable {
            reason: e.to_string(),
        })?;

        let mut conn = self.conn.write().map_err(|_| StoreError::LockPoisoned)?;
        if conn.is_some() {
            tracing::debug!("LMDB store already connected");
            return Ok(());
        }

        let dir = config.env_dir();
        if !dir.exists() {
            tracing::warn!(
                path = %dir.display(),
                database = %config.database,
                "store database does not exist, it will be created"
            );
            std::fs::create_dir_all(&dir)?;
        }

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size_bytes())
                .max_dbs(MAX_DBS)
                .open(&dir)
        }
        .map_err(unavailable)?;

        tracing::info!(
            path = %dir.display(),
            collection = %config.collection,
            map_size_mb = config.map_size_mb,
            "LMDB store connected"
        );

        *conn = Some(Connection {
            env,
            collection: config.collection.clone(),
            db: None,
        });
        Ok(())
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let mut guard = self.conn.write().map_err(|_| StoreError::LockPoisoned)?;
        let conn = guard.as_mut().ok_or(StoreError::NotConnected)?;
        if conn.db.is_some() {
            return Ok(());
        }

        let mut wtxn = conn.env.write_txn().map_err(schema)?;
        let existing: Option<Database<Bytes, Bytes>> = conn
            .env
            .open_database(&wtxn, Some(conn.collection.as_str()))
            .map_err(schema)?;

        let db = match existing {
            Some(db) => {
                tracing::debug!(collection = %conn.collection, "opened existing collection");
                db
            }
            None => {
                let db: Database<Bytes, Bytes> = conn
                    .env
                    .create_database(&mut wtxn, Some(conn.collection.as_str()))
                    .map_err(schema)?;
                tracing::info!(collection = %conn.collection, "created collection");
                db
            }
        };
        wtxn.commit().map_err(schema)?;

        conn.db = Some(db);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let record = encode_record(key, value, Utc::now())?;
        self.write_record(&storage_key(key), &record)
    }

    async fn close(&self) -> StoreResult<()> {
        let mut conn = self.conn.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(closed) = conn.take() {
            tracing::info!(collection = %closed.collection, "LMDB store closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.read().map(|conn| conn.is_some()).unwrap_or(false)
    }
}

fn unavailable(e: heed::Error) -> StoreError {
    StoreError::Unavailable {
        reason: e.to_string(),
    }
}

fn schema(e: heed::Error) -> StoreError {
    StoreError::Schema {
        reason: e.to_string(),
    }
}

/// Map a cache key to the LMDB key it is stored under.
pub(crate) fn storage_key(key: &str) -> Vec<u8> {
    let bytes = key.as_bytes();
    if bytes.len() <= MAX_INLINE_KEY_LEN {
        let mut out = Vec::with_capacity(1 + bytes.len());
        out.push(INLINE_TAG);
        out.extend_from_slice(bytes);
        return out;
    }

    let digest = Sha256::digest(bytes);
    tracing::trace!(
        key_len = bytes.len(),
        digest = %hex::encode(&digest),
        "hashing long cache key"
    );
    let mut out = Vec::with_capacity(1 + digest.len());
    out.push(HASHED_TAG);
    out.extend_from_slice(&digest);
    out
}

pub(crate) fn encode_record(
    key: &str,
    value: &[u8],
    stored_at: DateTime<Utc>,
) -> StoreResult<Vec<u8>> {
    let key_len = u32::try_from(key.len()).map_err(|_| StoreError::Unavailable {
        reason: format!("cache key of {} bytes is too long to store", key.len()),
    })?;

    let mut record = Vec::with_capacity(HEADER_LEN + key.len() + value.len());
    record.extend_from_slice(&stored_at.timestamp_millis().to_le_bytes());
    record.extend_from_slice(&key_len.to_le_bytes());
    record.extend_from_slice(key.as_bytes());
    record.extend_from_slice(value);
    Ok(record)
}

pub(crate) fn decode_record(bytes: &[u8]) -> StoreResult<StoredEntry> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        reason: reason.to_string(),
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt("record shorter than header"));
    }

    let timestamp_bytes: [u8; 8] = bytes[0..8]
        .try_into()
        .map_err(|_| corrupt("invalid timestamp"))?;
    let len_bytes: [u8; 4] = bytes[8..HEADER_LEN]
        .try_into()
        .map_err(|_| corrupt("invalid key length"))?;

    let key_end = HEADER_LEN + u32::from_le_bytes(len_bytes) as usize;
    if key_end > bytes.len() {
        return Err(corrupt("key length exceeds record"));
    }

    let key = std::str::from_utf8(&bytes[HEADER_LEN..key_end])
        .map_err(|_| corrupt("stored key is not UTF-8"))?;
    let stored_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
        .ok_or_else(|| corrupt("timestamp out of range"))?;

    Ok(StoredEntry {
        key: key.to_string(),
        value: bytes[key_end..].to_vec(),
        stored_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (LmdbStore, StoreConfig, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig {
            map_size_mb: 10,
            ..StoreConfig::at(temp_dir.path())
        };
        let store = LmdbStore::new();
        store.connect(&config).await.expect("connect should succeed");
        store
            .ensure_schema()
            .await
            .expect("ensure_schema should succeed");
        (store, config, temp_dir)
    }

    #[tokio::test]
    async fn test_unconnected_store_rejects_access() {
        let store = LmdbStore::new();
        assert!(!store.is_connected());
        assert!(matches!(store.get("k").await, Err(StoreError::NotConnected)));
        assert!(matches!(
            store.put("k", b"v").await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(
            store.ensure_schema().await,
            Err(StoreError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_access_before_schema_is_schema_error() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::new();
        store
            .connect(&StoreConfig::at(temp_dir.path()))
            .await
            .expect("connect should succeed");

        assert!(store.is_connected());
        assert!(matches!(store.get("k").await, Err(StoreError::Schema { .. })));
    }

    #[tokio::test]
    async fn test_connect_creates_missing_directory() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig {
            database: "fresh".to_string(),
            ..StoreConfig::at(temp_dir.path().join("nested"))
        };
        assert!(!config.env_dir().exists());

        let store = LmdbStore::new();
        store.connect(&config).await.expect("connect should succeed");
        assert!(config.env_dir().is_dir());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig {
            map_size_mb: 0,
            ..StoreConfig::at(temp_dir.path())
        };
        let store = LmdbStore::new();
        assert!(matches!(
            store.connect(&config).await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _config, _temp_dir) = create_test_store().await;

        store.put("sum_[2,3]", b"5").await.expect("put should succeed");
        let value = store.get("sum_[2,3]").await.expect("get should succeed");
        assert_eq!(value, Some(b"5".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _config, _temp_dir) = create_test_store().await;
        let value = store.get("missing_[]").await.expect("get should succeed");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (store, _config, _temp_dir) = create_test_store().await;

        store.put("k", b"first").await.expect("put should succeed");
        store.put("k", b"second").await.expect("put should succeed");

        assert_eq!(
            store.get("k").await.expect("get should succeed"),
            Some(b"second".to_vec())
        );
        assert_eq!(store.entry_count().expect("count should succeed"), 1);
    }

    #[tokio::test]
    async fn test_stored_at_is_recorded() {
        let (store, _config, _temp_dir) = create_test_store().await;
        let before = Utc::now();

        store.put("k", b"v").await.expect("put should succeed");
        let entry = store
            .get_entry("k")
            .expect("get_entry should succeed")
            .expect("entry should exist");

        assert_eq!(entry.key, "k");
        assert!((entry.stored_at - before).num_seconds().abs() < 1);
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let (store, config, _temp_dir) = create_test_store().await;
        store.put("sum_[2,3]", b"5").await.expect("put should succeed");
        store.close().await.expect("close should succeed");
        assert!(!store.is_connected());
        assert!(matches!(store.get("sum_[2,3]").await, Err(StoreError::NotConnected)));

        let reopened = LmdbStore::new();
        reopened
            .connect(&config)
            .await
            .expect("reconnect should succeed");
        reopened
            .ensure_schema()
            .await
            .expect("ensure_schema should succeed");

        assert_eq!(
            reopened.get("sum_[2,3]").await.expect("get should succeed"),
            Some(b"5".to_vec())
        );
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let (store, _config, _temp_dir) = create_test_store().await;
        store.put("k", b"v").await.expect("put should succeed");

        store
            .ensure_schema()
            .await
            .expect("second ensure_schema should succeed");
        store
            .ensure_schema()
            .await
            .expect("third ensure_schema should succeed");

        assert_eq!(store.entry_count().expect("count should succeed"), 1);
        assert!(store.get("k").await.expect("get should succeed").is_some());
    }

    #[tokio::test]
    async fn test_long_keys_are_hashed() {
        let (store, _config, _temp_dir) = create_test_store().await;

        let base = "x".repeat(2_000);
        let first = format!("{base}a");
        let second = format!("{base}b");

        store.put(&first, b"1").await.expect("put should succeed");
        store.put(&second, b"2").await.expect("put should succeed");

        assert_eq!(
            store.get(&first).await.expect("get should succeed"),
            Some(b"1".to_vec())
        );
        assert_eq!(
            store.get(&second).await.expect("get should succeed"),
            Some(b"2".to_vec())
        );
        assert_eq!(store.entry_count().expect("count should succeed"), 2);
    }

    #[tokio::test]
    async fn test_boundary_key_length() {
        let (store, _config, _temp_dir) = create_test_store().await;

        let inline = "k".repeat(MAX_INLINE_KEY_LEN);
        let hashed = "k".repeat(MAX_INLINE_KEY_LEN + 1);
        assert_eq!(storage_key(&inline).len(), MAX_INLINE_KEY_LEN + 1);
        assert_eq!(storage_key(&hashed).len(), 33);

        store.put(&inline, b"inline").await.expect("put should succeed");
        store.put(&hashed, b"hashed").await.expect("put should succeed");
        assert_eq!(
            store.get(&inline).await.expect("get should succeed"),
            Some(b"inline".to_vec())
        );
        assert_eq!(
            store.get(&hashed).await.expect("get should succeed"),
            Some(b"hashed".to_vec())
        );
    }

    #[tokio::test]
    async fn test_stored_key_mismatch_reads_as_absent() {
        let (store, _config, _temp_dir) = create_test_store().await;

        // A record under one key's slot that claims to belong to another key.
        let record = encode_record("other", b"v", Utc::now()).expect("encode should succeed");
        store
            .write_record(&storage_key("mine"), &record)
            .expect("write should succeed");

        assert!(store.get("mine").await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_truncated_record_is_corrupt() {
        let (store, _config, _temp_dir) = create_test_store().await;
        store
            .write_record(&storage_key("k"), &[1, 2, 3])
            .expect("write should succeed");

        assert!(matches!(store.get("k").await, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_record_layout() {
        let stored_at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let record = encode_record("ab", b"xyz", stored_at).unwrap();

        assert_eq!(&record[0..8], &1_700_000_000_123i64.to_le_bytes());
        assert_eq!(&record[8..12], &2u32.to_le_bytes());
        assert_eq!(&record[12..14], b"ab");
        assert_eq!(&record[14..], b"xyz");

        let entry = decode_record(&record).unwrap();
        assert_eq!(entry.key, "ab");
        assert_eq!(entry.value, b"xyz");
        assert_eq!(entry.stored_at, stored_at);
    }

    #[test]
    fn test_decode_rejects_overlong_key_length() {
        let mut record = encode_record("ab", b"", Utc::now()).unwrap();
        record[8..12].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            decode_record(&record),
            Err(StoreError::Corrupt { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: distinct cache keys never share a storage key.
        #[test]
        fn prop_storage_keys_are_distinct(a in ".{0,600}", b in ".{0,600}") {
            prop_assume!(a != b);
            prop_assert_ne!(storage_key(&a), storage_key(&b));
        }

        /// Property: storage keys always fit within the LMDB key limit.
        #[test]
        fn prop_storage_key_fits_lmdb(key in ".{0,1200}") {
            prop_assert!(storage_key(&key).len() <= 511);
        }
    }
}
