// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only view over the stage configuration file.
//!
//! The configuration is a YAML document; every key except
//! `previous_service` has a documented default, so an empty file is a
//! valid configuration for a stage that never asks for the previous
//! service.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the stage configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/mqsf/mqsf_config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("previous_service is required in config file")]
    MissingPreviousService,
}

/// Parsed stage configuration with defaults applied.
///
/// Unknown keys are ignored so collaborating services can share one file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Message broker host.
    #[serde(default = "defaults::mq_host")]
    pub mq_host: String,
    /// Message broker user name.
    #[serde(default = "defaults::mq_user")]
    pub mq_user: String,
    /// Message broker password.
    #[serde(default = "defaults::mq_pass")]
    pub mq_pass: String,
    /// Message broker port.
    #[serde(default = "defaults::mq_port")]
    pub mq_port: u16,
    /// Message broker virtual host.
    #[serde(default = "defaults::mq_vhost")]
    pub mq_vhost: String,
    /// Connection heartbeat interval in seconds.
    #[serde(default = "defaults::mq_heartbeat")]
    pub mq_heartbeat: u16,
    /// Directory for per-stage log files.
    #[serde(default = "defaults::log_dir")]
    pub log_dir: PathBuf,
    /// Parent directory of each stage's job directory.
    #[serde(default = "defaults::base_job_dir")]
    pub base_job_dir: PathBuf,
    /// Upstream exchange name. Required; absence is a fatal config error
    /// at the point of access.
    #[serde(default)]
    previous_service: Option<String>,
    /// Whether unknown plugin names fall back to the no-op plugin.
    #[serde(default = "defaults::no_op_okay")]
    pub no_op_okay: bool,
    /// Worker count for the job scheduler.
    #[serde(default = "defaults::base_thread_pool_count")]
    pub base_thread_pool_count: usize,
    /// JSON field name carrying the plugin selector.
    #[serde(default = "defaults::plugin_key")]
    pub plugin_key: String,
}

mod defaults {
    use std::path::PathBuf;

    pub fn mq_host() -> String {
        "localhost".into()
    }

    pub fn mq_user() -> String {
        "guest".into()
    }

    pub fn mq_pass() -> String {
        "guest".into()
    }

    pub fn mq_port() -> u16 {
        5672
    }

    pub fn mq_vhost() -> String {
        "/".into()
    }

    pub fn mq_heartbeat() -> u16 {
        600
    }

    pub fn log_dir() -> PathBuf {
        "/var/log/mqsf/".into()
    }

    pub fn base_job_dir() -> PathBuf {
        "/var/lib/mqsf/".into()
    }

    pub fn no_op_okay() -> bool {
        true
    }

    pub fn base_thread_pool_count() -> usize {
        10
    }

    pub fn plugin_key() -> String {
        "plugin".into()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mq_host: defaults::mq_host(),
            mq_user: defaults::mq_user(),
            mq_pass: defaults::mq_pass(),
            mq_port: defaults::mq_port(),
            mq_vhost: defaults::mq_vhost(),
            mq_heartbeat: defaults::mq_heartbeat(),
            log_dir: defaults::log_dir(),
            base_job_dir: defaults::base_job_dir(),
            previous_service: None,
            no_op_okay: defaults::no_op_okay(),
            base_thread_pool_count: defaults::base_thread_pool_count(),
            plugin_key: defaults::plugin_key(),
        }
    }
}

impl Config {
    /// Load and parse the configuration file.
    ///
    /// An empty document yields the defaults; an unreadable or malformed
    /// file is a fatal error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// The upstream exchange name this stage binds its listener queue to.
    pub fn previous_service(&self) -> Result<&str, ConfigError> {
        self.previous_service.as_deref().ok_or(ConfigError::MissingPreviousService)
    }

    /// Directory holding this stage's persisted jobs.
    pub fn job_directory(&self, service: &str) -> PathBuf {
        self.base_job_dir.join(format!("{service}_jobs"))
    }

    /// Path of this stage's log file.
    pub fn log_file(&self, service: &str) -> PathBuf {
        self.log_dir.join(format!("{service}_service.log"))
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn set_previous_service(&mut self, service: impl Into<String>) {
        self.previous_service = Some(service.into());
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
