// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-stage log file and subscriber setup.

use mqsf_core::Config;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LogSetupError {
    #[error("log setup failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("log setup failed: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    #[error("log setup failed: invalid log file path {0}")]
    InvalidPath(PathBuf),
}

/// Initialize the process-wide subscriber: stderr plus the stage's own
/// log file `<log_dir>/<service>_service.log`, creating the directory if
/// needed.
///
/// The returned guard keeps the background log writer alive; hold it for
/// the lifetime of the process.
pub fn init(config: &Config, service: &str) -> Result<WorkerGuard, LogSetupError> {
    let log_file = config.log_file(service);
    let dir = log_file
        .parent()
        .ok_or_else(|| LogSetupError::InvalidPath(log_file.clone()))?;
    std::fs::create_dir_all(dir)?;
    let file_name = log_file
        .file_name()
        .ok_or_else(|| LogSetupError::InvalidPath(log_file.clone()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()?;
    Ok(guard)
}

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;
