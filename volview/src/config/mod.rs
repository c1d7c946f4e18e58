//! Viewer configuration.
//!
//! Configuration is read from `~/.volview/config.ini`, one INI section per
//! concern, and overlaid onto built-in defaults:
//!
//! ```ini
//! [cache]       max_tiles, max_bytes
//! [scheduler]   loader_threads
//! [render]      screen_scales, quality_budget_ms, io_budget_ms,
//!               bad_io_frame_block_frames, double_buffered, rendering_threads
//! [logging]     level, file
//! ```
//!
//! # Example
//!
//! ```
//! use volview::config::ViewerConfig;
//!
//! let config = ViewerConfig::default();
//! assert!(config.validate().is_ok());
//! ```

mod defaults;
mod error;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use error::ConfigError;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{LoggingSettings, ViewerConfig};
pub use size::{format_size, parse_size, SizeParseError};
