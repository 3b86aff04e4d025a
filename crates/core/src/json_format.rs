// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical JSON rendering for the wire and on-disk formats.
//!
//! Every message a stage publishes and every job file it writes goes
//! through [`to_pretty_sorted`], so downstream stages and recovery always
//! see the same stable key ordering.

use serde::Serialize;

/// Serialize a value as pretty-printed JSON with lexicographically sorted
/// keys.
///
/// Sorting falls out of serde_json's default map representation: the value
/// is first converted to a `Value`, whose objects are BTreeMap-backed.
pub fn to_pretty_sorted<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string_pretty(&value)
}

#[cfg(test)]
#[path = "json_format_tests.rs"]
mod tests;
