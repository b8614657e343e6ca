//! MEMO Core - shared types for the function-result cache.
//!
//! Fetch policies, key and value codecs, the error taxonomy and
//! configuration. Every other memo crate depends on this one; it has no
//! async or storage code of its own.

pub mod config;
pub mod error;
mod finite;
pub mod key;
pub mod policy;
pub mod value;

pub use config::{
    EngineConfig, MemoConfig, StoreConfig, DEFAULT_COLLECTION, DEFAULT_DATABASE,
    DEFAULT_MAP_SIZE_MB, DEFAULT_STORE_PATH,
};
pub use error::{
    CodecError, ConfigError, MemoError, MemoResult, PolicyError, StoreError, StoreResult,
};
pub use key::{CacheKey, JsonKeyCodec, KeyCodec, KEY_SEPARATOR};
pub use policy::FetchPolicy;
pub use value::{JsonValueCodec, ValueCodec};
