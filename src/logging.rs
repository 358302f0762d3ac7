//! Tracing setup.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. When a log file is configured,
/// output goes there through a non-blocking writer whose guard must be kept
/// alive until exit; otherwise it goes to stderr.
pub fn init(config: &LogConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
  let level = if verbose { "debug" } else { config.level.as_str() };
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  let subscriber = tracing_subscriber::registry().with(env_filter);

  match &config.file {
    Some(path) => {
      let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;

      std::fs::create_dir_all(directory)
        .map_err(|e| eyre!("Failed to create log directory: {}", e))?;
      let appender = tracing_appender::rolling::never(directory, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      subscriber
        .with(fmt::layer().with_ansi(false).with_target(true).with_writer(writer))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      subscriber
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(None)
    }
  }
}
