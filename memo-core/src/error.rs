//! Error types for memo operations

use thiserror::Error;

/// Store layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store is not connected")]
    NotConnected,

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Schema provisioning failed: {reason}")]
    Schema { reason: String },

    #[error("Corrupt store record: {reason}")]
    Corrupt { reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key and value serialization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Argument for '{identifier}' cannot be serialized: {reason}")]
    UnserializableArgument { identifier: String, reason: String },

    #[error("Result cannot be serialized: {reason}")]
    UnserializableResult { reason: String },

    #[error("Stored value cannot be decoded: {reason}")]
    Undecodable { reason: String },
}

/// Fetch policy parsing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Unknown fetch policy: {value}")]
    Unknown { value: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Errors surfaced to callers of `MemoEngine::cache`.
///
/// Store failures and result-encoding failures never appear here: they
/// degrade to "treat as absent" inside the engine. `E` is the wrapped
/// operation's own error type and is returned unchanged.
#[derive(Debug, Error)]
pub enum MemoError<E> {
    #[error("Store is not initialized; call connect() first")]
    StoreNotInitialized,

    #[error("Invalid fetch policy: {value}")]
    InvalidPolicy { value: String },

    #[error("Argument for '{identifier}' cannot be serialized: {reason}")]
    UnserializableArgument { identifier: String, reason: String },

    #[error("Operation failed: {0}")]
    Operation(E),
}

impl<E> MemoError<E> {
    /// Returns true if the wrapped operation itself failed.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Extract the operation's own error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<PolicyError> for MemoError<E> {
    fn from(e: PolicyError) -> Self {
        match e {
            PolicyError::Unknown { value } => Self::InvalidPolicy { value },
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for engine requests.
pub type MemoResult<T, E> = Result<T, MemoError<E>>;

// =============================================================================
// TESTS
// =============================================================================
