//! Default values for all configuration settings.

use std::path::PathBuf;

use super::settings::{LoggingSettings, ViewerConfig};
use crate::cache::CacheConfig;
use crate::render::RenderSettings;

// =============================================================================
// Renderer
// =============================================================================

/// Screen scales, finest first.
pub const DEFAULT_SCREEN_SCALES: [f64; 5] = [1.0, 0.75, 0.5, 0.25, 0.125];

/// Wall-clock budget per frame in milliseconds.
pub const DEFAULT_QUALITY_BUDGET_MS: u64 = 30;

/// Blocking-load time per frame, in milliseconds, above which the frame is slow.
pub const DEFAULT_IO_BUDGET_MS: u64 = 10;

/// Consecutive slow frames before refinement is capped.
pub const DEFAULT_BAD_IO_FRAME_BLOCK_FRAMES: u32 = 5;

pub const DEFAULT_DOUBLE_BUFFERED: bool = true;

/// Threads painting each pass.
pub const DEFAULT_RENDERING_THREADS: usize = 3;

// =============================================================================
// Logging
// =============================================================================

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file name inside the config directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "volview.log";

/// Default log file (~/.volview/volview.log).
pub fn default_log_file() -> PathBuf {
    super::file::config_directory().join(DEFAULT_LOG_FILE_NAME)
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            render: RenderSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
