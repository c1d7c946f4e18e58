//! Configuration errors.

use thiserror::Error;

use super::file::ConfigFileError;

/// An invalid viewer configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Screen scales empty, out of range or not strictly descending
    #[error("Invalid screen scales: {0}")]
    InvalidScreenScales(String),

    /// A thread pool configured with zero threads
    #[error("{0} must be at least 1")]
    ZeroThreads(&'static str),

    /// A cache ceiling of zero would evict every tile
    #[error("Cache ceiling {0} must be positive")]
    ZeroCeiling(&'static str),

    /// Dataset without timepoints, views or levels
    #[error("Dataset layout is empty: {0}")]
    EmptyLayout(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The configuration file could not be read or written
    #[error(transparent)]
    File(#[from] ConfigFileError),
}
