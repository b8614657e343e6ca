//! MEMO Test Utilities
//!
//! Shared test infrastructure for the memo workspace:
//! - Proptest generators for identifiers and JSON argument trees
//! - Instrumented store doubles that count or fail store calls

// Re-export the stores tests build on
pub use memo_storage::{InMemoryStore, Store};

// Re-export core types for convenience
pub use memo_core::{
    CacheKey, CodecError, FetchPolicy, JsonKeyCodec, JsonValueCodec, KeyCodec, MemoError,
    StoreConfig, StoreError, StoreResult, ValueCodec,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// Store wrapper that counts every call reaching the inner store.
///
/// Used to assert how often the engine touches storage, including "never".
#[derive(Debug, Default)]
pub struct CountingStore<S = InMemoryStore> {
    inner: S,
    connects: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl<S: Store> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            connects: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Total `get` plus `put` calls.
    pub fn accesses(&self) -> usize {
        self.gets() + self.puts()
    }
}

#[async_trait]
impl<S: Store> Store for CountingStore<S> {
    async fn connect(&self, config: &StoreConfig) -> StoreResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(config).await
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        self.inner.ensure_schema().await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

/// Store wrapper whose reads, writes or connects can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyStore<S = InMemoryStore> {
    inner: S,
    fail_connect: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<S: Store> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_connect: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn injected(operation: &str) -> StoreError {
        StoreError::Unavailable {
            reason: format!("injected {operation} failure"),
        }
    }
}

#[async_trait]
impl<S: Store> Store for FlakyStore<S> {
    async fn connect(&self, config: &StoreConfig) -> StoreResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Self::injected("connect"));
        }
        self.inner.connect(config).await
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        self.inner.ensure_schema().await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("read"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::injected("write"));
        }
        self.inner.put(key, value).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;
    use serde_json::{Map, Number, Value};

    /// Identifiers as callers write them: short, mostly ASCII, may contain `_`.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_.:-]{0,24}"
    }

    /// Non-zero finite floats. Zero is excluded because `0.0 == -0.0` while
    /// the two render differently.
    pub fn arb_float() -> impl Strategy<Value = f64> {
        (-1.0e12f64..1.0e12f64).prop_filter("non-zero", |f| *f != 0.0)
    }

    /// JSON scalars.
    pub fn arb_json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| Value::Number(n.into())),
            any::<u64>().prop_map(|n| Value::Number(n.into())),
            arb_float().prop_filter_map("finite", |f| Number::from_f64(f).map(Value::Number)),
            ".{0,16}".prop_map(Value::String),
        ]
    }

    /// Arbitrary JSON trees up to a few levels deep.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        arb_json_leaf().prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{0,6}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    /// An argument sequence, as passed to a cached operation.
    pub fn arb_args() -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(arb_json_value(), 0..4)
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    async fn ready<S: Store>(store: &S) {
        store.connect(&StoreConfig::default()).await.unwrap();
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_counting_store_counts() {
        let store = CountingStore::new(InMemoryStore::new());
        ready(&store).await;

        store.put("k", b"v").await.unwrap();
        store.get("k").await.unwrap();
        store.get("other").await.unwrap();

        assert_eq!(store.connects(), 1);
        assert_eq!(store.gets(), 2);
        assert_eq!(store.puts(), 1);
        assert_eq!(store.accesses(), 3);
    }

    #[tokio::test]
    async fn test_flaky_store_injects_failures() {
        let store = FlakyStore::new(InMemoryStore::new());
        ready(&store).await;

        store.fail_writes(true);
        assert!(matches!(
            store.put("k", b"v").await,
            Err(StoreError::Unavailable { .. })
        ));
        store.fail_writes(false);
        store.put("k", b"v").await.unwrap();

        store.fail_reads(true);
        assert!(store.get("k").await.is_err());
        store.fail_reads(false);
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_flaky_store_connect_failure() {
        let store = FlakyStore::new(InMemoryStore::new());
        store.fail_connect(true);
        assert!(store.connect(&StoreConfig::default()).await.is_err());
        assert!(!store.is_connected());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_json_values_serialize(value in arb_json_value()) {
            prop_assert!(serde_json::to_string(&value).is_ok());
        }

        #[test]
        fn prop_identifiers_are_non_empty(id in arb_identifier()) {
            prop_assert!(!id.is_empty());
        }
    }
}
