// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name-keyed plugin registry, populated once at startup.

use crate::plugin::{JobPlugin, NoOpJob};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry name of the built-in no-op plugin.
pub const NO_OP_PLUGIN: &str = "NoOpJob";

/// Mapping from selector name to workload implementation.
///
/// Populated programmatically in `main` before the engine is built; the
/// engine takes it by value, so there is no post-startup mutation.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn JobPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in no-op plugin alongside whatever is present.
    pub fn with_no_op(mut self) -> Self {
        self.register(NO_OP_PLUGIN, Arc::new(NoOpJob));
        self
    }

    /// Register a plugin under a selector name, replacing any previous
    /// registration for that name.
    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn JobPlugin>) {
        self.plugins.insert(name.into(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobPlugin>> {
        self.plugins.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
