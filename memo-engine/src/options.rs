//! Per-request cache options.

use memo_core::{FetchPolicy, PolicyError};

/// A fetch policy as the caller supplied it.
///
/// Dynamic callers (config files, RPC payloads) pass policies by wire name;
/// those are only validated when the request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedPolicy {
    Known(FetchPolicy),
    Named(String),
}

impl RequestedPolicy {
    /// Resolve to a concrete policy, rejecting unknown names.
    pub fn resolve(&self) -> Result<FetchPolicy, PolicyError> {
        match self {
            Self::Known(policy) => Ok(*policy),
            Self::Named(name) => name.parse(),
        }
    }
}

impl From<FetchPolicy> for RequestedPolicy {
    fn from(policy: FetchPolicy) -> Self {
        Self::Known(policy)
    }
}

/// Identifier and policy for one `cache` call.
///
/// # Example
///
/// ```ignore
/// let options = CacheOptions::new("sum").with_policy(FetchPolicy::NetworkAndCache);
/// let total = engine.cache(options, (2, 3), |(a, b)| async move { add(a, b).await }).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    identifier: String,
    policy: Option<RequestedPolicy>,
}

impl CacheOptions {
    /// Options for `identifier`, using the engine's default policy.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = Some(RequestedPolicy::Known(policy));
        self
    }

    /// Set the policy by wire name, e.g. `"network-only"`.
    pub fn with_policy_name(mut self, name: impl Into<String>) -> Self {
        self.policy = Some(RequestedPolicy::Named(name.into()));
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn policy(&self) -> Option<&RequestedPolicy> {
        self.policy.as_ref()
    }

    /// The effective policy, falling back to `default` when none was set.
    pub fn resolve_policy(&self, default: FetchPolicy) -> Result<FetchPolicy, PolicyError> {
        self.policy
            .as_ref()
            .map_or(Ok(default), RequestedPolicy::resolve)
    }
}

impl From<&str> for CacheOptions {
    fn from(identifier: &str) -> Self {
        Self::new(identifier)
    }
}

impl From<String> for CacheOptions {
    fn from(identifier: String) -> Self {
        Self::new(identifier)
    }
}
