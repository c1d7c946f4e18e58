//! Human-readable size parsing (e.g., "2GB", "500MB").

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '2GB', '500MB', or '1024KB'")]
pub struct SizeParseError {
    input: String,
}

/// Parse a human-readable size into bytes.
///
/// Bare numbers are bytes; `K`/`KB`, `M`/`MB` and `G`/`GB` suffixes are powers
/// of 1024. Case-insensitive, whitespace tolerant.
///
/// ```
/// use volview::config::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1 KB").unwrap(), 1024);
/// assert_eq!(parse_size("512m").unwrap(), 512 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let error = || SizeParseError {
        input: s.to_string(),
    };
    let trimmed = s.trim();
    let upper = trimmed.to_uppercase();

    let (digits, multiplier) = [("GB", GB), ("G", GB), ("MB", MB), ("M", MB), ("KB", KB), ("K", KB)]
        .iter()
        .find_map(|&(suffix, mult)| upper.strip_suffix(suffix).map(|rest| (rest.trim(), mult)))
        .unwrap_or((upper.as_str(), 1));

    if digits.is_empty() {
        return Err(error());
    }
    let value: u64 = digits.parse().map_err(|_| error())?;
    value.checked_mul(multiplier).ok_or_else(error)
}

/// Format a byte count with the largest exact suffix.
///
/// ```
/// use volview::config::format_size;
///
/// assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2GB");
/// assert_eq!(format_size(1000), "1000");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        bytes.to_string()
    }
}
