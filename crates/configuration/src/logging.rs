use crate::error::ConfigError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Installs the global subscriber: human-readable stdout plus a daily rolling file
/// under `logs/<service>.log`.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. The returned guard must be
/// held for the life of the process or buffered file lines are lost on exit.
pub fn init_tracing(service: &str) -> Result<WorkerGuard, ConfigError> {
    let file = RollingFileAppender::new(Rotation::DAILY, "logs", format!("{}.log", service));
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(filter()))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(filter()),
        )
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}
