//! Tracing subscriber setup.
//!
//! The engine and stores emit `tracing` events; nothing is printed until an
//! application installs a subscriber. [`init_tracing`] installs one with an
//! env-style filter and either human-readable or JSON output.

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `MEMO_LOG` is unset.
pub const DEFAULT_FILTER: &str = "memo_engine=info,memo_storage=info,warn";

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Invalid log format '{value}' (expected 'human' or 'json')")]
    InvalidFormat { value: String },

    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" | "text" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            _ => Err(TelemetryError::InvalidFormat {
                value: s.to_string(),
            }),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `memo_engine=debug,info`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// Read `MEMO_LOG` and `MEMO_LOG_FORMAT`, defaulting what is unset.
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, TelemetryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(filter) = lookup("MEMO_LOG").filter(|f| !f.trim().is_empty()) {
            config.filter = filter;
        }
        if let Some(format) = lookup("MEMO_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        Ok(config)
    }
}

/// Install the global tracing subscriber.
///
/// Fails instead of panicking when the filter does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(&config.filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: config.filter.clone(),
            reason: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Human => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    installed.map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(
        filter = %config.filter,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}
