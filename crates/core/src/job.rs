// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable unit of work handed from stage to stage.

use crate::status::Status;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single job as it travels through the pipeline.
///
/// The wire object is open-ended: besides `id`, `status`, and `errors`,
/// every other field (including the plugin selector) lives in the flattened
/// payload and is forwarded untouched to the plugin and to the next stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque identifier, unique within a pipeline run. Immutable once
    /// ingested.
    pub id: String,
    /// Current status code; terminal values are set by the plugin or the
    /// engine.
    pub status: Status,
    /// Human-readable error strings, appended on each failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Every other field of the wire object.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, status: Status) -> Self {
        Self { id: id.into(), status, errors: Vec::new(), payload: Map::new() }
    }

    /// Read the plugin selector from the payload by the configured key.
    pub fn selector(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// Append an error string to the record.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Set a payload field, replacing any previous value.
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.payload.insert(key.into(), value);
    }

    /// Read a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
