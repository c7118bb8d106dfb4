//! Error types for the checker controller.

use cairn_config::ConfigError;
use thiserror::Error;

/// Checker controller errors.
///
/// Region checks never fail: "nothing to do" is an empty result. Errors only
/// come from construction, rule administration and pause-control lookup.
#[derive(Error, Debug)]
pub enum CheckerError {
    /// No checker is registered under the given name.
    #[error("checker not found: {0}")]
    CheckerNotFound(String),

    /// The cluster's configuration cannot drive the controller.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A placement or label rule was rejected.
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// The limit counter could not be registered with the metrics registry.
    #[error("metrics registration failed: {0}")]
    MetricsRegistration(#[from] prometheus::Error),
}

/// Result type for checker operations.
pub type Result<T> = std::result::Result<T, CheckerError>;
