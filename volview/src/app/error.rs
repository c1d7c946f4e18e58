//! Application error types.

use std::fmt;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::render::RenderError;

/// Errors that can occur while starting a viewer.
#[derive(Debug)]
pub enum AppError {
    /// Configuration failed validation.
    Config(ConfigError),

    /// Failed to create the tile cache or its loader pool.
    Cache(CacheError),

    /// Failed to create the renderer.
    Render(RenderError),

    /// Failed to spawn the paint thread.
    Painter(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Cache(e) => write!(f, "Failed to start tile cache: {}", e),
            AppError::Render(e) => write!(f, "Failed to create renderer: {}", e),
            AppError::Painter(e) => write!(f, "Failed to start painter thread: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Cache(e) => Some(e),
            AppError::Render(e) => Some(e),
            AppError::Painter(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::Cache(e)
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        // Settings problems surface as configuration errors
        match e {
            RenderError::Config(e) => AppError::Config(e),
            other => AppError::Render(other),
        }
    }
}
