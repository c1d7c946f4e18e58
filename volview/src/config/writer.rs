//! INI serialization: `ViewerConfig` → commented INI string.

use super::settings::ViewerConfig;
use super::size::format_size;

/// Convert a `ViewerConfig` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ViewerConfig) -> String {
    let max_tiles = config
        .cache
        .max_tiles
        .map(|n| n.to_string())
        .unwrap_or_else(|| "none".to_string());
    let max_bytes = config
        .cache
        .max_bytes
        .map(format_size)
        .unwrap_or_else(|| "none".to_string());
    let screen_scales = config
        .render
        .screen_scales
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let log_file = config
        .logging
        .file
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        r#"[cache]
; Maximum number of resident tiles, loaded or pending (default: none)
max_tiles = {}
; Maximum memory held by loaded tiles (default: 1GB)
; Supports: KB, MB, GB suffixes, or 'none' for no limit
max_bytes = {}

[scheduler]
; Background loader threads (default: 4)
loader_threads = {}

[render]
; Screen scales rendered coarse to fine, listed finest first
screen_scales = {}
; Wall-clock budget per frame in milliseconds (default: 30)
quality_budget_ms = {}
; Blocking I/O per frame above which a frame counts as slow (default: 10)
io_budget_ms = {}
; Consecutive slow frames before refinement is capped (default: 5)
bad_io_frame_block_frames = {}
; Render into a back buffer while the front buffer is shown (default: true)
double_buffered = {}
; Threads painting each pass (default: 3)
rendering_threads = {}

[logging]
; Log filter used when RUST_LOG is unset (default: info)
level = {}
; Log file path; empty logs to stdout only
file = {}
"#,
        max_tiles,
        max_bytes,
        config.cache.loader_threads,
        screen_scales,
        config.render.quality_budget.as_millis(),
        config.render.io_budget.as_millis(),
        config.render.bad_io_frame_block_frames,
        config.render.double_buffered,
        config.render.rendering_threads,
        config.logging.level,
        log_file,
    )
}
