// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolves the plugin that will run a given job.

use crate::plugin::JobPlugin;
use crate::registry::{PluginRegistry, NO_OP_PLUGIN};
use mqsf_core::JobRecord;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no plugin specified, cannot create job")]
    MissingSelector,

    #[error("plugin {plugin} is not supported in {service} service")]
    Unsupported { plugin: String, service: String },
}

/// Per-stage plugin resolution policy.
///
/// Reads the selector from the record by the configured key and looks it
/// up in the registry. Stages that do not always apply set `can_skip`, in
/// which case unknown selectors fall back to the no-op plugin instead of
/// failing.
pub struct JobFactory {
    service: String,
    plugin_key: String,
    can_skip: bool,
    registry: PluginRegistry,
}

impl JobFactory {
    pub fn new(
        service: impl Into<String>,
        plugin_key: impl Into<String>,
        can_skip: bool,
        registry: PluginRegistry,
    ) -> Self {
        Self { service: service.into(), plugin_key: plugin_key.into(), can_skip, registry }
    }

    pub fn create_job(&self, record: &JobRecord) -> Result<Arc<dyn JobPlugin>, FactoryError> {
        let plugin_name =
            record.selector(&self.plugin_key).ok_or(FactoryError::MissingSelector)?;

        if let Some(plugin) = self.registry.get(plugin_name) {
            return Ok(plugin);
        }
        if self.can_skip {
            if let Some(no_op) = self.registry.get(NO_OP_PLUGIN) {
                return Ok(no_op);
            }
        }
        Err(FactoryError::Unsupported {
            plugin: plugin_name.to_string(),
            service: self.service.clone(),
        })
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
