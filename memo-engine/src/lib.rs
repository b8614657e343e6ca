//! MEMO Engine - function-result memoization over a persistent store.
//!
//! Callers wrap an async operation with an identifier and a fetch policy;
//! the engine decides whether to serve a stored result, invoke the
//! operation, or both, and persists new results for later calls.
//!
//! ```ignore
//! use memo_engine::{CacheOptions, FetchPolicy, MemoConfig, MemoEngine};
//!
//! let engine = MemoEngine::open(&MemoConfig::from_env()?).await?;
//! let user = engine
//!     .cache(
//!         CacheOptions::new("user").with_policy(FetchPolicy::CacheAndNetwork),
//!         (user_id,),
//!         |(id,)| async move { client.fetch_user(id).await },
//!     )
//!     .await?;
//! ```

pub mod engine;
pub mod options;
pub mod read;
mod single_flight;
pub mod stats;
pub mod telemetry;

pub use engine::MemoEngine;
pub use options::{CacheOptions, RequestedPolicy};
pub use read::{CacheRead, CacheSource};
pub use stats::EngineStats;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};

// Re-export the types every caller needs alongside the engine
pub use memo_core::{
    CacheKey, EngineConfig, FetchPolicy, MemoConfig, MemoError, MemoResult, StoreConfig,
};
pub use memo_storage::{InMemoryStore, LmdbStore, Store};
