//! Settings structs for all configuration sections.
//!
//! `[cache]` and `[scheduler]` map onto [`CacheConfig`], `[render]` onto
//! [`RenderSettings`], `[logging]` onto [`LoggingSettings`].

use std::path::PathBuf;

use super::error::ConfigError;
use crate::cache::CacheConfig;
use crate::render::RenderSettings;

/// Complete viewer configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Cache ceilings and loader threads
    pub cache: CacheConfig,
    /// Renderer budgets and scales
    pub render: RenderSettings,
    pub logging: LoggingSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "volview=debug")
    pub level: String,
    /// Optional log file; stdout only when `None`
    pub file: Option<PathBuf>,
}

impl ViewerConfig {
    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_tiles == Some(0) {
            return Err(ConfigError::ZeroCeiling("max_tiles"));
        }
        if self.cache.max_bytes == Some(0) {
            return Err(ConfigError::ZeroCeiling("max_bytes"));
        }
        if self.cache.loader_threads == 0 {
            return Err(ConfigError::ZeroThreads("loader_threads"));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.render.validate()
    }
}
