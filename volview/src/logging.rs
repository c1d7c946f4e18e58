//! Logging infrastructure.
//!
//! Structured `tracing` output to stdout, plus an optional log file written
//! through a non-blocking appender. `RUST_LOG` overrides the configured level.

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber from `settings`.
///
/// The log file, if any, is truncated at startup. Fails if the log directory
/// cannot be created or a global subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, io::Error> {
    let env_filter = build_filter(&settings.level);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(true);

    let (file_layer, file_guard) = match &settings.file {
        Some(path) => {
            let (writer, guard) = open_log_file(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// `RUST_LOG` when set, otherwise `level`, otherwise `info`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(crate::config::DEFAULT_LOG_LEVEL))
}

fn open_log_file(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), io::Error> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file has no name"))?;

    fs::create_dir_all(dir)?;
    fs::write(path, "")?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_and_truncates() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("logs/nested/volview.log");

        let (_writer, guard) = open_log_file(&path).unwrap();
        drop(guard);
        assert!(path.exists());

        fs::write(&path, "old log data").unwrap();
        let (_writer, _guard) = open_log_file(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_open_log_file_rejects_directory_path() {
        assert!(open_log_file(Path::new("/")).is_err());
    }

    #[test]
    fn test_guard_structure() {
        let (_writer, guard) = tracing_appender::non_blocking(std::io::sink());
        let _logging_guard = LoggingGuard {
            _file_guard: Some(guard),
        };
    }

    // Installing the global subscriber is process-wide and stays out of unit tests.
}
