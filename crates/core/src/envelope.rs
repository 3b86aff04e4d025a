// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire envelopes for listener and result messages.
//!
//! A stage consumes `{ "<previous_service>_result": { …record… } }` from its
//! listener queue and publishes `{ "<service_name>_result": { …record… } }`
//! on its own exchange.

use crate::job::JobRecord;
use crate::json_format;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid listener message: {0}")]
    Body(#[from] serde_json::Error),

    #[error("invalid listener message, missing key: {0}")]
    MissingKey(String),

    #[error("invalid listener message, job id is empty")]
    EmptyId,
}

/// The envelope key a stage wraps its results under.
pub fn result_key(service: &str) -> String {
    format!("{service}_result")
}

/// Extract the job record published by the previous stage.
///
/// The body must be a JSON object carrying the record under
/// `"<previous_service>_result"` with a non-empty `id`.
pub fn extract_record(body: &[u8], previous_service: &str) -> Result<JobRecord, EnvelopeError> {
    let key = result_key(previous_service);
    let mut value: Value = serde_json::from_slice(body)?;
    let inner = value
        .get_mut(&key)
        .map(Value::take)
        .ok_or_else(|| EnvelopeError::MissingKey(key))?;
    let record: JobRecord = serde_json::from_value(inner)?;
    if record.id.is_empty() {
        return Err(EnvelopeError::EmptyId);
    }
    Ok(record)
}

/// Build the result message for this stage: the full record wrapped under
/// `"<service_name>_result"`, pretty-printed with sorted keys.
pub fn result_message(service: &str, record: &JobRecord) -> Result<String, serde_json::Error> {
    let envelope = serde_json::json!({ result_key(service): record });
    json_format::to_pretty_sorted(&envelope)
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
