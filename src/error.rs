//! Error types for configuration, task registration and reporting.
//!
//! Request failures against the target are not errors here: they are
//! recorded as statistics by [`crate::stats::Stats`].

use thiserror::Error;

/// Errors raised while resolving the run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No target host from CLI, environment or config file
    #[error("No target host configured; pass --host, set TARGET_HOST or add [target] host to the config file")]
    MissingHost,

    /// Target host is not a parseable URL
    #[error("Invalid target host '{host}': {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },

    /// Target host uses something other than http or https
    #[error("Unsupported scheme '{0}' in target host; expected http or https")]
    UnsupportedScheme(String),

    /// Target host carries a query string or fragment
    #[error("Target host '{0}' must not carry a query string or fragment")]
    HostHasQuery(String),

    /// A setting is out of range
    #[error("Invalid setting '{name}': {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// Config file sets both stop conditions
    #[error("Config file sets both run_time_seconds and iterations; pick one")]
    ConflictingStopConditions,
}

/// Errors raised while registering tasks
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task '{0}' is already registered")]
    Duplicate(String),

    #[error("Task '{0}' must have a non-zero weight")]
    ZeroWeight(String),

    #[error("No tasks registered")]
    Empty,
}

/// Errors raised while writing a report file
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a load test before or while it starts
#[derive(Error, Debug)]
pub enum LoadTestError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
