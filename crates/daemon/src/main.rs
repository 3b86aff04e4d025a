// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mqsfd — run one stage of an mqsf pipeline.

use clap::Parser;
use mqsf_daemon::run_service;
use mqsf_engine::PluginRegistry;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mqsfd", version, about = "Run one stage of an mqsf pipeline")]
struct Cli {
    /// Stage name; also the exchange this stage publishes results on
    service: String,

    /// Path to the YAML configuration file
    #[arg(long, default_value = mqsf_core::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Plugins are registered here before the registry is handed to the
    // engine; the bare daemon ships only the built-in no-op fallback,
    // which the engine adds when the stage permits it.
    let registry = PluginRegistry::new();

    match run_service(&cli.service, &cli.config, registry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("mqsfd: {error}");
            ExitCode::FAILURE
        }
    }
}
