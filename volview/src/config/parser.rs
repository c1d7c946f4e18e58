//! INI parsing: `Ini` → `ViewerConfig`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ViewerConfig;
use super::size::parse_size;

/// Parse an `Ini` object into a `ViewerConfig`.
///
/// Starts from `ViewerConfig::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ViewerConfig, ConfigFileError> {
    let mut config = ViewerConfig::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("max_tiles") {
            config.cache.max_tiles = if is_unlimited(v) {
                None
            } else {
                Some(parse_number(section, "cache", "max_tiles", "a tile count or 'none'")?)
            };
        }
        if let Some(v) = section.get("max_bytes") {
            config.cache.max_bytes = if is_unlimited(v) {
                None
            } else {
                Some(parse_size(v).map_err(|_| invalid("cache", "max_bytes", v, "expected format like '2GB', '500MB', or 'none'"))?)
            };
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if section.contains_key("loader_threads") {
            config.cache.loader_threads =
                parse_number(section, "scheduler", "loader_threads", "must be a positive integer")?;
        }
    }

    // [render] section
    if let Some(section) = ini.section(Some("render")) {
        if let Some(v) = section.get("screen_scales") {
            config.render.screen_scales = parse_scales(v)?;
        }
        if section.contains_key("quality_budget_ms") {
            let ms: u64 = parse_number(section, "render", "quality_budget_ms", "must be milliseconds")?;
            config.render.quality_budget = Duration::from_millis(ms);
        }
        if section.contains_key("io_budget_ms") {
            let ms: u64 = parse_number(section, "render", "io_budget_ms", "must be milliseconds")?;
            config.render.io_budget = Duration::from_millis(ms);
        }
        if section.contains_key("bad_io_frame_block_frames") {
            config.render.bad_io_frame_block_frames = parse_number(
                section,
                "render",
                "bad_io_frame_block_frames",
                "must be a positive integer",
            )?;
        }
        if let Some(v) = section.get("double_buffered") {
            config.render.double_buffered = parse_bool(v);
        }
        if section.contains_key("rendering_threads") {
            config.render.rendering_threads =
                parse_number(section, "render", "rendering_threads", "must be a positive integer")?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("level") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.level = v.to_string();
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            config.logging.file = if v.is_empty() {
                None
            } else {
                Some(expand_tilde(v))
            };
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    properties: &Properties,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    let value = properties.get(key).unwrap_or_default();
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

/// Comma-separated scales, e.g. `1.0, 0.5, 0.25`.
fn parse_scales(value: &str) -> Result<Vec<f64>, ConfigFileError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| {
                invalid(
                    "render",
                    "screen_scales",
                    value,
                    "expected comma-separated numbers like '1.0, 0.5, 0.25'",
                )
            })
        })
        .collect()
}

fn is_unlimited(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "" | "none" | "unlimited"
    )
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_QUALITY_BUDGET_MS;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ViewerConfig, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ViewerConfig::load_from(&config_path)
    }

    #[test]
    fn test_partial_config() {
        let config = load(
            r#"
[cache]
max_tiles = 500

[render]
io_budget_ms = 25
"#,
        )
        .unwrap();

        assert_eq!(config.cache.max_tiles, Some(500));
        assert_eq!(config.render.io_budget, Duration::from_millis(25));

        // Default values
        assert_eq!(
            config.render.quality_budget,
            Duration::from_millis(DEFAULT_QUALITY_BUDGET_MS)
        );
        assert_eq!(config.render.screen_scales.len(), 5);
    }

    #[test]
    fn test_human_readable_sizes() {
        let config = load("[cache]\nmax_bytes = 512MB\n").unwrap();
        assert_eq!(config.cache.max_bytes, Some(512 * 1024 * 1024));

        let config = load("[cache]\nmax_bytes = none\nmax_tiles = unlimited\n").unwrap();
        assert_eq!(config.cache.max_bytes, None);
        assert_eq!(config.cache.max_tiles, None);
    }

    #[test]
    fn test_invalid_size() {
        let err = load("[cache]\nmax_bytes = 2TB\n").unwrap_err();
        assert!(err.to_string().contains("max_bytes"));
    }

    #[test]
    fn test_scales_and_threads() {
        let config = load(
            r#"
[scheduler]
loader_threads = 8

[render]
screen_scales = 1.0, 0.5, 0.25
rendering_threads = 2
double_buffered = off
"#,
        )
        .unwrap();
        assert_eq!(config.cache.loader_threads, 8);
        assert_eq!(config.render.screen_scales, vec![1.0, 0.5, 0.25]);
        assert_eq!(config.render.rendering_threads, 2);
        assert!(!config.render.double_buffered);
    }

    #[test]
    fn test_invalid_number() {
        let err = load("[render]\nrendering_threads = many\n").unwrap_err();
        assert!(err.to_string().contains("rendering_threads"));

        let err = load("[render]\nscreen_scales = 1.0, half\n").unwrap_err();
        assert!(err.to_string().contains("screen_scales"));
    }

    #[test]
    fn test_logging_section() {
        let config = load("[logging]\nlevel = volview=debug\nfile = /tmp/volview.log\n").unwrap();
        assert_eq!(config.logging.level, "volview=debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/volview.log")));
    }

    #[test]
    fn test_parse_bool_values() {
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/logs/volview.log");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("logs/volview.log"));
        }
        assert_eq!(expand_tilde("/abs"), PathBuf::from("/abs"));
    }
}
