//! Tracing setup.
//!
//! The TUI owns the terminal, so interactive runs log to a daily file under
//! the data directory. Headless commands log to stderr instead.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "lms.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
  /// Daily rolling file in the data directory
  File,
  Stderr,
}

/// `RUST_LOG` wins over the configured level.
fn filter(default_level: &str) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Keep the guard alive for the lifetime of
/// the process or buffered file output is lost.
pub fn init(target: LogTarget, default_level: &str, data_dir: &Path) -> Result<Option<WorkerGuard>> {
  match target {
    LogTarget::File => {
      std::fs::create_dir_all(data_dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", data_dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(data_dir, LOG_FILE_PREFIX);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter(default_level))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(Some(guard))
    }
    LogTarget::Stderr => {
      tracing_subscriber::registry()
        .with(filter(default_level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| eyre!("Failed to install logger: {}", e))?;
      Ok(None)
    }
  }
}
