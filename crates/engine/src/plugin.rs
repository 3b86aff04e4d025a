// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The workload seam: a named unit of work invoked once per job.

use async_trait::async_trait;
use mqsf_core::{JobRecord, Status};
use thiserror::Error;

/// Failure raised out of a plugin run.
///
/// Returning `Err` from [`JobPlugin::run_task`] surfaces as an ERROR
/// outcome; the engine then overwrites the record's status with
/// EXCEPTION and appends the message to its errors.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PluginError(String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for PluginError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for PluginError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// A registered workload.
///
/// The plugin owns the record for the duration of the run: it sets
/// `status`, may append to `errors`, and may add or rewrite payload
/// fields, all of which flow to the next stage in the result message.
#[async_trait]
pub trait JobPlugin: Send + Sync + std::fmt::Debug {
    async fn run_task(&self, record: &mut JobRecord, log: &LogCallback)
        -> Result<(), PluginError>;
}

/// Structured logging sink handed to each plugin invocation.
///
/// Keeps the job id attached to every line a plugin emits; formatting and
/// transport stay with the process-wide subscriber.
#[derive(Debug, Clone)]
pub struct LogCallback {
    job_id: String,
}

impl LogCallback {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self { job_id: job_id.into() }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn info(&self, message: &str) {
        tracing::info!(job_id = %self.job_id, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(job_id = %self.job_id, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(job_id = %self.job_id, "{message}");
    }
}

/// Built-in fallback workload: marks the job SUCCESS without side effects.
///
/// Lets stages that do not apply to a given job pass it through untouched.
#[derive(Debug)]
pub struct NoOpJob;

#[async_trait]
impl JobPlugin for NoOpJob {
    async fn run_task(
        &self,
        record: &mut JobRecord,
        _log: &LogCallback,
    ) -> Result<(), PluginError> {
        record.status = Status::SUCCESS;
        Ok(())
    }
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
