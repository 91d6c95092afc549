//! Tracing subscriber setup.
//!
//! A console layer (pretty or JSON) is always installed. When a log file is
//! configured, a second JSON layer writes to a daily-rotated file through a
//! non-blocking appender; the returned guard must be held for the lifetime of
//! the process or buffered lines are lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer,
};

use super::toml_config::{LogFormat, LoggingConfig};

/// Console filter: `RUST_LOG` wins over the configured level.
fn console_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Call once, from the binary.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let (pretty_layer, json_layer) = match config.format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter(&config.level)),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter(&config.level)),
            ),
        ),
    };

    let (file_layer, guard) = match config.file.as_deref().and_then(file_appender) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new("debug")),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(pretty_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

fn file_appender(
    path: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name()?;

    std::fs::create_dir_all(dir).ok()?;
    let appender = tracing_appender::rolling::daily(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}
