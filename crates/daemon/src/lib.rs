// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! mqsf-daemon: process entry point for a pipeline stage.
//!
//! Loads the configuration, sets up logging, connects the broker, wires
//! signal handlers to the engine's stop handle, and runs the engine to
//! completion. Embedding binaries register their plugins before calling
//! [`run_service`].

pub mod logging;

use mqsf_broker::AmqpBroker;
use mqsf_core::{Config, ConfigError};
use mqsf_engine::{Engine, EngineError, EngineHandle, PluginRegistry};
use std::path::Path;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    LogSetup(#[from] logging::LogSetupError),

    #[error(transparent)]
    Broker(#[from] mqsf_broker::BrokerError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed installing signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

/// Run one pipeline stage to completion.
///
/// Startup failures (config, logging, broker connection) surface as
/// errors; a signal-triggered shutdown drains running jobs and returns
/// `Ok`.
pub async fn run_service(
    service: &str,
    config_path: &Path,
    registry: PluginRegistry,
) -> Result<(), DaemonError> {
    let config = Config::load(config_path)?;
    let _guard = logging::init(&config, service)?;

    let broker = AmqpBroker::from_config(&config);
    broker.connect().await?;

    let engine = Engine::new(service, &config, broker, registry)?;
    install_signal_handlers(engine.handle())?;

    info!(service = %service, "stage started");
    engine.run().await?;
    Ok(())
}

/// Route INT/TERM to a graceful engine stop.
fn install_signal_handlers(handle: EngineHandle) -> Result<(), DaemonError> {
    let mut interrupt = signal(SignalKind::interrupt()).map_err(DaemonError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        info!("got a TERM/INTERRUPT signal, shutting down gracefully");
        handle.stop();
    });
    Ok(())
}
