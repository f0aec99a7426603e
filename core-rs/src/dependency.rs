//! Component → configuration usage graph
//!
//! Keys are component names, values the configurations that include them.
//! Lookups are case-insensitive; stored names keep the case they were first
//! seen with.

use crate::errors::{CfgError, Result};
use crate::model::Configuration;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DependencyTracker {
    /// lowercase component name -> (display name, dependents)
    graph: BTreeMap<String, (String, Vec<String>)>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a component has an (initially empty) entry
    pub fn register_component(&mut self, component: &str) {
        self.graph
            .entry(component.to_lowercase())
            .or_insert_with(|| (component.to_string(), Vec::new()));
    }

    /// Record that `config` uses each of its components (idempotent)
    pub fn on_configuration_saved(&mut self, config: &Configuration) {
        for component in config.components() {
            self.register_component(component);
            if let Some((_, dependents)) = self.graph.get_mut(&component.to_lowercase()) {
                if !dependents.iter().any(|d| d.eq_ignore_ascii_case(&config.name)) {
                    dependents.push(config.name.clone());
                }
            }
        }
    }

    /// Drop `name` from components it no longer references
    ///
    /// `old_components` is what the configuration referenced before the change;
    /// `current` is what it references now (empty when it was deleted).
    pub fn on_configuration_removed_or_changed(
        &mut self,
        old_components: &[String],
        current: &[String],
        name: &str,
    ) {
        for component in old_components {
            if current.iter().any(|c| c.eq_ignore_ascii_case(component)) {
                continue;
            }
            if let Some((_, dependents)) = self.graph.get_mut(&component.to_lowercase()) {
                dependents.retain(|d| !d.eq_ignore_ascii_case(name));
            }
        }
    }

    /// Remove a configuration from every dependents list
    pub fn forget_configuration(&mut self, name: &str) {
        for (_, dependents) in self.graph.values_mut() {
            dependents.retain(|d| !d.eq_ignore_ascii_case(name));
        }
    }

    /// Remove a component's entry entirely
    pub fn forget_component(&mut self, component: &str) {
        self.graph.remove(&component.to_lowercase());
    }

    pub fn dependents(&self, component: &str) -> Vec<String> {
        self.graph
            .get(&component.to_lowercase())
            .map(|(_, deps)| deps.clone())
            .unwrap_or_default()
    }

    /// Fails listing dependents when `component` is still in use
    pub fn guard_delete(&self, component: &str) -> Result<()> {
        let dependents = self.dependents(component);
        if dependents.is_empty() {
            Ok(())
        } else {
            Err(CfgError::Guard(format!(
                "Component {} is used by: {}",
                component,
                dependents.join(", ")
            )))
        }
    }

    /// Display name -> dependents, for publication
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.graph
            .values()
            .map(|(name, deps)| (name.clone(), deps.clone()))
            .collect()
    }
}
