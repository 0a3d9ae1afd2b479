//! Tracing subscriber setup.
//!
//! The TUI owns stdout, so logs go to a file under the platform data
//! directory. `RUST_LOG` overrides the default `info` level.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log file location.
pub fn log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().context("Could not find data directory")?;
    Ok(data_dir.join("termtabs").join("termtabs.log"))
}

/// Install the global subscriber writing to `log_file_path`.
pub fn init(log_file_path: &Path) -> Result<()> {
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let log_file = File::create(log_file_path)
        .with_context(|| format!("Failed to create log file: {}", log_file_path.display()))?;

    build_subscriber(log_file, env_filter())
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Subscriber shared by the binary and tests.
pub fn build_subscriber(
    log_file: File,
    filter: EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(filter)
}
