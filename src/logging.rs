use crate::config::LoggingConfig;
use crate::error::{CollectorError, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer alive; dropping it flushes pending lines.
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Log to stdout and append to `cfg.file` at the same time.
pub fn init(cfg: &LoggingConfig) -> Result<LogGuard> {
    let (dir, name) = split_log_path(&cfg.file)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| CollectorError::Config(format!("log file {}: {e}", cfg.file)))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|e| CollectorError::Config(format!("logging already initialised: {e}")))?;

    Ok(LogGuard { _file: guard })
}

fn split_log_path(file: &str) -> Result<(PathBuf, String)> {
    let path = Path::new(file);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CollectorError::Config(format!("invalid log file path: {file}")))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_bare_file_name() {
        let (dir, name) = split_log_path("span.log").unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "span.log");
    }

    #[test]
    fn test_split_nested_path() {
        let (dir, name) = split_log_path("/var/log/span/collector.log").unwrap();
        assert_eq!(dir, PathBuf::from("/var/log/span"));
        assert_eq!(name, "collector.log");
    }

    #[test]
    fn test_split_rejects_directory() {
        assert!(split_log_path("/var/log/..").is_err());
    }
}
