//! The detailed result of a cache request.

use std::fmt;

use memo_core::CacheKey;

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSource {
    /// Decoded from a stored entry; the operation was not invoked.
    Store,
    /// Produced by invoking the operation for this request.
    Invoked,
    /// Shared from a concurrent identical request that invoked the operation.
    Coalesced,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Invoked => "invoked",
            Self::Coalesced => "coalesced",
        }
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value returned by the engine together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    source: CacheSource,
    key: CacheKey,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, source: CacheSource, key: CacheKey) -> Self {
        Self { value, source, key }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consume the wrapper and return the value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn source(&self) -> CacheSource {
        self.source
    }

    /// The cache key the request was resolved under.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// True when the value was served from the store.
    pub fn was_cache_hit(&self) -> bool {
        self.source == CacheSource::Store
    }

    /// True when this request invoked the operation itself.
    pub fn was_invoked(&self) -> bool {
        self.source == CacheSource::Invoked
    }
}
