//! The memoization engine.
//!
//! [`MemoEngine::cache`] answers one request by walking a fixed sequence of
//! steps, each awaited before the next:
//!
//! 1. Preconditions: the engine is connected and the policy is known.
//! 2. Key derivation from the identifier and arguments.
//! 3. Store probe, for policies that read the store.
//! 4. Join or lead an in-flight request for the same key, if coalescing.
//!    A new leader reads the store again if a flight completed since step 3.
//! 5. Invoke the operation.
//! 6. Encode and write the result, for policies that persist.
//!
//! Steps 3 and 6 degrade instead of failing: a store or codec problem is
//! logged and treated as a miss (on read) or skipped (on write). The cache
//! never turns a successful operation into an error.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memo_core::{
    CacheKey, CodecError, EngineConfig, FetchPolicy, JsonKeyCodec, JsonValueCodec, KeyCodec,
    MemoConfig, MemoError, MemoResult, StoreConfig, StoreResult, ValueCodec,
};
use memo_storage::{LmdbStore, Store};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::options::CacheOptions;
use crate::read::{CacheRead, CacheSource};
use crate::single_flight::{FlightGuard, InFlight, Join};
use crate::stats::{EngineStats, StatsCounters};

/// Function-result cache over a [`Store`].
///
/// # Type Parameters
///
/// - `S`: the backing store, shared through `Arc`
/// - `K`: derives cache keys from identifiers and arguments
/// - `V`: encodes results for storage
///
/// # Example
///
/// ```ignore
/// let engine = MemoEngine::new(Arc::new(LmdbStore::new()), EngineConfig::default());
/// engine.connect(&StoreConfig::at("/var/lib/memo")).await?;
///
/// let total = engine
///     .cache(CacheOptions::new("sum"), (2, 3), |(a, b)| async move {
///         Ok::<_, std::io::Error>(a + b)
///     })
///     .await?;
/// ```
pub struct MemoEngine<S, K = JsonKeyCodec, V = JsonValueCodec> {
    store: Arc<S>,
    key_codec: K,
    value_codec: V,
    config: EngineConfig,
    connected: AtomicBool,
    in_flight: InFlight,
    stats: StatsCounters,
}

impl<S: Store> MemoEngine<S> {
    /// Engine with the default JSON key and value codecs.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_codecs(store, JsonKeyCodec, JsonValueCodec, config)
    }
}

impl MemoEngine<LmdbStore> {
    /// Build an LMDB-backed engine from a full config and connect it.
    pub async fn open(config: &MemoConfig) -> StoreResult<Self> {
        let engine = Self::new(Arc::new(LmdbStore::new()), config.engine.clone());
        engine.connect(&config.store).await?;
        Ok(engine)
    }
}

impl<S, K, V> MemoEngine<S, K, V>
where
    S: Store,
    K: KeyCodec,
    V: ValueCodec,
{
    pub fn with_codecs(store: Arc<S>, key_codec: K, value_codec: V, config: EngineConfig) -> Self {
        Self {
            store,
            key_codec,
            value_codec,
            config,
            connected: AtomicBool::new(false),
            in_flight: InFlight::new(),
            stats: StatsCounters::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// The key a request for `identifier` with `args` would use.
    pub fn derive_key<A>(&self, identifier: &str, args: &A) -> Result<CacheKey, CodecError>
    where
        A: Serialize + ?Sized,
    {
        self.key_codec.derive_key(identifier, args)
    }

    /// Connect the store and provision its schema.
    ///
    /// A no-op when already connected. On failure the engine stays
    /// disconnected and the store error is returned.
    pub async fn connect(&self, config: &StoreConfig) -> StoreResult<()> {
        if self.is_connected() {
            tracing::debug!("memo engine already connected");
            return Ok(());
        }

        let bootstrap = async {
            self.store.connect(config).await?;
            self.store.ensure_schema().await
        };
        if let Err(e) = bootstrap.await {
            tracing::error!(
                error = %e,
                path = %config.path.display(),
                collection = %config.collection,
                "failed to connect memo store"
            );
            return Err(e);
        }

        self.connected.store(true, Ordering::Release);
        tracing::info!(
            collection = %config.collection,
            default_policy = %self.config.default_policy,
            single_flight = self.config.single_flight,
            "memo engine connected"
        );
        Ok(())
    }

    /// Disconnect and close the store. Later requests fail with
    /// [`MemoError::StoreNotInitialized`] until `connect` is called again.
    pub async fn close(&self) -> StoreResult<()> {
        self.connected.store(false, Ordering::Release);
        self.store.close().await?;
        tracing::info!("memo engine closed");
        Ok(())
    }

    /// Answer a request, returning only the value.
    ///
    /// See [`cache_detailed`](Self::cache_detailed) for the full contract.
    pub async fn cache<A, T, E, F, Fut>(
        &self,
        options: CacheOptions,
        args: A,
        operation: F,
    ) -> MemoResult<T, E>
    where
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: fmt::Display,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_detailed(options, args, operation)
            .await
            .map(CacheRead::into_value)
    }

    /// Answer a request, reporting where the value came from.
    ///
    /// The operation is invoked at most once, with `args`, and its error is
    /// returned unchanged as [`MemoError::Operation`]. Other errors are
    /// raised before any store access or invocation.
    pub async fn cache_detailed<A, T, E, F, Fut>(
        &self,
        options: CacheOptions,
        args: A,
        operation: F,
    ) -> MemoResult<CacheRead<T>, E>
    where
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: fmt::Display,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.is_connected() {
            return Err(MemoError::StoreNotInitialized);
        }

        let policy = options.resolve_policy(self.config.default_policy)?;
        let key = self
            .key_codec
            .derive_key(options.identifier(), &args)
            .map_err(|e| argument_error(options.identifier(), e))?;

        let completions = self.in_flight.completions();
        if policy.reads_store() {
            if let Some((value, _)) = self.probe::<T>(&key).await {
                self.stats.hit();
                tracing::debug!(key = %key, policy = %policy, "cache hit");
                return Ok(CacheRead::new(value, CacheSource::Store, key));
            }
            self.stats.miss();
            tracing::debug!(key = %key, policy = %policy, "cache miss");
        }

        let mut guard = None;
        if self.coalesces(policy) {
            match self.in_flight.join(key.as_str()) {
                Join::Leader(leader) => {
                    // A flight completed since the probe; this key may have been written.
                    if policy.reads_store() && self.in_flight.completions() != completions {
                        if let Some((value, bytes)) = self.probe::<T>(&key).await {
                            self.stats.hit();
                            tracing::debug!(key = %key, "cache hit after concurrent write");
                            leader.complete(Arc::from(bytes));
                            return Ok(CacheRead::new(value, CacheSource::Store, key));
                        }
                    }
                    guard = Some(leader);
                }
                Join::Follower(follower) => {
                    tracing::debug!(key = %key, "joining in-flight request");
                    if let Some(value) = self.follow::<T>(&key, follower.wait().await) {
                        self.stats.coalesced();
                        return Ok(CacheRead::new(value, CacheSource::Coalesced, key));
                    }
                    tracing::debug!(key = %key, "in-flight request had no result, invoking");
                }
            }
        }

        self.stats.invocation();
        let value = match operation(args).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %key, policy = %policy, error = %e, "operation failed");
                return Err(MemoError::Operation(e));
            }
        };

        if policy.writes_store() {
            match self.value_codec.encode(&value) {
                Ok(bytes) => self.write_back(&key, bytes, guard).await,
                Err(e) => {
                    self.stats.encode_failure();
                    tracing::warn!(key = %key, error = %e, "result not cached");
                }
            }
        }

        Ok(CacheRead::new(value, CacheSource::Invoked, key))
    }

    fn coalesces(&self, policy: FetchPolicy) -> bool {
        self.config.single_flight && policy.writes_store()
    }

    /// Read and decode a stored entry, keeping the raw bytes. Any failure is
    /// a miss.
    async fn probe<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<(T, Vec<u8>)> {
        let bytes = match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                self.stats.read_failure();
                tracing::warn!(key = %key, error = %e, "store read failed, treating as miss");
                return None;
            }
        };

        match self.value_codec.decode(&bytes) {
            Ok(value) => Some((value, bytes)),
            Err(e) => {
                self.stats.decode_failure();
                tracing::warn!(key = %key, error = %e, "stored entry is unreadable, treating as miss");
                None
            }
        }
    }

    /// Decode a result shared by the leader of an in-flight request.
    fn follow<T: DeserializeOwned>(&self, key: &CacheKey, shared: Option<Arc<[u8]>>) -> Option<T> {
        let bytes = shared?;
        match self.value_codec.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                self.stats.decode_failure();
                tracing::warn!(key = %key, error = %e, "shared result is unreadable");
                None
            }
        }
    }

    /// Persist an encoded result, then hand it to any followers.
    async fn write_back(&self, key: &CacheKey, bytes: Vec<u8>, guard: Option<FlightGuard>) {
        match self.store.put(key.as_str(), &bytes).await {
            Ok(()) => {
                self.stats.write();
                tracing::debug!(key = %key, bytes = bytes.len(), "result cached");
            }
            Err(e) => {
                self.stats.write_failure();
                tracing::warn!(key = %key, error = %e, "store write failed, result not cached");
            }
        }

        if let Some(guard) = guard {
            guard.complete(Arc::from(bytes));
        }
    }
}

fn argument_error<E>(identifier: &str, e: CodecError) -> MemoError<E> {
    match e {
        CodecError::UnserializableArgument { identifier, reason } => {
            MemoError::UnserializableArgument { identifier, reason }
        }
        other => MemoError::UnserializableArgument {
            identifier: identifier.to_string(),
            reason: other.to_string(),
        },
    }
}

impl<S, K, V> fmt::Debug for MemoEngine<S, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoEngine")
            .field("config", &self.config)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
