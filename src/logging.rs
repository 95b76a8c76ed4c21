//! Tracing initialisation.

use crate::config::{LoggingConfig, finsight_home};
use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. When file logging is enabled,
/// JSON lines are written to a daily-rotated file and the returned guard must
/// be kept alive for the lifetime of the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if config.file_enabled {
        let dir = config
            .directory
            .clone()
            .unwrap_or_else(|| finsight_home().join("logs"));
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(dir, "finsight.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer().json().with_writer(writer);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        return Ok(Some(guard));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
    Ok(None)
}
