// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job completion status codes shared across pipeline stages.

use serde::{Deserialize, Serialize};

/// Integer status code carried on every job record.
///
/// Stages agree on the meaning of `SUCCESS` and `EXCEPTION`; collaborating
/// services may define further codes. Ingest treats any non-`SUCCESS` value
/// as an upstream failure, whatever the exact code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub i64);

impl Status {
    /// The stage's workload completed.
    pub const SUCCESS: Status = Status(0);
    /// A previous stage reported failure; the job passes through unchanged.
    pub const FAILED_UPSTREAM: Status = Status(1);
    /// The workload raised, or could not be resolved to a plugin.
    pub const EXCEPTION: Status = Status(2);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
