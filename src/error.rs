//! Error types for the forwarding pipeline.

use std::time::Duration;

/// Configuration problems. Any of these stops the process before a run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the source side. Fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("credentials rejected: {0}")]
    Unauthorized(String),
}

/// A single send attempt failed. The variant decides what the retry policy does next.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The remote side asked us to wait this long before trying again.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent error: {0}")]
    Permanent(String),
}

/// Errors that abort a run. Everything else is folded into the run summary.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to open session: {0}")]
    Connect(#[source] FetchError),

    #[error("failed to fetch source messages: {0}")]
    Fetch(#[source] FetchError),

    #[error("run panicked while dispatching")]
    Panicked,
}
