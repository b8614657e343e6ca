//! Fetch policies.
//!
//! A policy decides two things per request: whether the store is consulted
//! before the operation runs, and whether the operation's result is written
//! back. There are exactly three policies and no hidden states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Strategy governing store reads and writes around an operation call.
///
/// | Policy            | Reads store first | Persists result |
/// |-------------------|-------------------|-----------------|
/// | `CacheAndNetwork` | yes               | on miss         |
/// | `NetworkAndCache` | no                | always          |
/// | `NetworkOnly`     | no                | never           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Serve a stored result when present; otherwise invoke and persist.
    #[default]
    CacheAndNetwork,
    /// Always invoke, then overwrite the stored result.
    NetworkAndCache,
    /// Always invoke, never touch the store.
    NetworkOnly,
}

impl FetchPolicy {
    /// All recognised policies.
    pub const ALL: [FetchPolicy; 3] = [
        FetchPolicy::CacheAndNetwork,
        FetchPolicy::NetworkAndCache,
        FetchPolicy::NetworkOnly,
    ];

    /// Whether the store is probed before invoking the operation.
    pub fn reads_store(&self) -> bool {
        matches!(self, Self::CacheAndNetwork)
    }

    /// Whether the operation's result is written to the store.
    pub fn writes_store(&self) -> bool {
        !matches!(self, Self::NetworkOnly)
    }

    /// The policy's wire name, as used in config files and environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheAndNetwork => "cache-and-network",
            Self::NetworkAndCache => "network-and-cache",
            Self::NetworkOnly => "network-only",
        }
    }
}

impl fmt::Display for FetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == s)
            .ok_or_else(|| PolicyError::Unknown {
                value: s.to_string(),
            })
    }
}
