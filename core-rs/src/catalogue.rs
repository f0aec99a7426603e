/**
 * catalogue.rs
 * Catalogue of stored configurations and components
 *
 * Tracks every item on disk, the protocol-safe identifier assigned to it and
 * which configurations use which components. Entries move
 * Unknown -> Imported -> Published: imported once read from disk (or saved),
 * published once their metadata has been pushed to the board.
 *
 * Every mutation is preceded by all of its guards; nothing on disk, in version
 * control or in memory changes when a guard fails.
 */

use crate::dependency::DependencyTracker;
use crate::errors::{CfgError, Result};
use crate::model::validation::validate_component_references;
use crate::model::{ConfigMeta, Configuration};
use crate::naming::{self, DEFAULT_COMPONENT_TOKEN, DEFAULT_CONFIG_TOKEN};
use crate::publish::MetadataBoard;
use crate::storage::ConfigFileStore;
use crate::vcs::RevisionStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unknown,
    Imported,
    Published,
}

#[derive(Debug, Clone)]
struct Entry {
    meta: ConfigMeta,
    /// Components referenced (configurations only)
    components: Vec<String>,
    state: EntryState,
}

/// One namespace of the catalogue, keyed by lowercase name
#[derive(Debug, Default)]
struct Namespace {
    entries: BTreeMap<String, Entry>,
}

impl Namespace {
    fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(&name.to_lowercase())
    }

    fn identifiers(&self) -> HashSet<String> {
        self.entries.values().map(|e| e.meta.pv.clone()).collect()
    }

    fn list(&self) -> Vec<ConfigMeta> {
        self.entries.values().map(|e| e.meta.clone()).collect()
    }
}

/// Outcome of a full import from disk
#[derive(Debug, Default, Clone)]
pub struct ImportReport {
    pub configurations: usize,
    pub components: usize,
    /// (item, reason) for directories that failed validation
    pub skipped: Vec<(String, String)>,
}

pub struct ConfigListManager {
    files: Arc<ConfigFileStore>,
    store: Arc<dyn RevisionStore>,
    board: Arc<MetadataBoard>,
    configs: Namespace,
    components: Namespace,
    dependencies: DependencyTracker,
}

impl ConfigListManager {
    pub fn new(
        files: Arc<ConfigFileStore>,
        store: Arc<dyn RevisionStore>,
        board: Arc<MetadataBoard>,
    ) -> Self {
        Self {
            files,
            store,
            board,
            configs: Namespace::default(),
            components: Namespace::default(),
            dependencies: DependencyTracker::new(),
        }
    }

    fn namespace(&self, is_component: bool) -> &Namespace {
        if is_component {
            &self.components
        } else {
            &self.configs
        }
    }

    fn namespace_mut(&mut self, is_component: bool) -> &mut Namespace {
        if is_component {
            &mut self.components
        } else {
            &mut self.configs
        }
    }

    fn kind_label(is_component: bool) -> &'static str {
        if is_component {
            "component"
        } else {
            "configuration"
        }
    }

    /// Read every item on disk: components first, then configurations
    ///
    /// Directories that fail validation are logged and skipped. The resulting
    /// state is committed as the initial snapshot and published.
    pub fn import_all(&mut self) -> Result<ImportReport> {
        self.files.ensure_layout()?;
        self.configs = Namespace::default();
        self.components = Namespace::default();
        self.dependencies = DependencyTracker::new();
        let mut report = ImportReport::default();

        for is_component in [true, false] {
            for name in self.files.list_names(is_component)? {
                let loaded = self.files.read(&name, is_component).and_then(|config| {
                    if !is_component {
                        let known = self.component_names();
                        validate_component_references(&config, known.iter().map(|s| s.as_str()))?;
                    }
                    Ok(config)
                });
                match loaded {
                    Ok(config) => {
                        self.record(&config);
                        if is_component {
                            report.components += 1;
                        } else {
                            report.configurations += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "[Catalogue] Skipping {} {}: {}",
                            Self::kind_label(is_component),
                            name,
                            e
                        );
                        report.skipped.push((name, e.to_string()));
                    }
                }
            }
        }

        for is_component in [true, false] {
            self.store.add(&self.files.namespace_root(is_component))?;
        }
        self.store.commit("Configurations imported at startup")?;

        info!(
            "[Catalogue] Imported {} configuration(s), {} component(s), skipped {}",
            report.configurations,
            report.components,
            report.skipped.len()
        );
        self.publish();
        Ok(report)
    }

    /// Insert or refresh the entry for `config` without publishing
    fn record(&mut self, config: &Configuration) -> ConfigMeta {
        let is_component = config.is_component;
        let namespace = self.namespace(is_component);
        let previous = namespace.get(&config.name).cloned();

        let pv = match &previous {
            Some(entry) => entry.meta.pv.clone(),
            None => {
                let token = if is_component {
                    DEFAULT_COMPONENT_TOKEN
                } else {
                    DEFAULT_CONFIG_TOKEN
                };
                naming::derive(&config.name, &namespace.identifiers(), token)
            }
        };

        if is_component {
            self.dependencies.register_component(&config.name);
        } else {
            let old = previous
                .as_ref()
                .map(|e| e.components.clone())
                .unwrap_or_default();
            self.dependencies
                .on_configuration_removed_or_changed(&old, config.components(), &config.name);
            self.dependencies.on_configuration_saved(config);
        }

        let meta = ConfigMeta::from_config(config, pv);
        let entry = Entry {
            meta: meta.clone(),
            components: config.components().to_vec(),
            state: EntryState::Imported,
        };
        self.namespace_mut(is_component)
            .entries
            .insert(config.name.to_lowercase(), entry);
        debug!(
            "[Catalogue] Recorded {} {} as {}",
            Self::kind_label(is_component),
            meta.name,
            meta.pv
        );
        meta
    }

    /// Refresh the entry for an item already committed to disk, then publish
    pub fn upsert(&mut self, config: &Configuration) -> ConfigMeta {
        let meta = self.record(config);
        self.publish();
        meta
    }

    /// Write, commit and record `config`
    ///
    /// Only the items defined directly in `config` are written; component
    /// contents stay with their components. The catalogue is advanced only
    /// after the commit succeeded.
    pub fn persist(&mut self, config: &Configuration, message: &str) -> Result<ConfigMeta> {
        let own = config.without_component_items();
        let dir = self.files.write(&own)?;
        self.store.add(&dir)?;
        self.store.commit(message)?;
        Ok(self.upsert(&own))
    }

    /// Refuse to overwrite a protected item
    pub fn guard_overwrite(&self, name: &str, is_component: bool) -> Result<()> {
        match self.namespace(is_component).get(name) {
            Some(entry) if entry.meta.protected => Err(CfgError::Guard(format!(
                "{} {} is protected",
                Self::kind_label(is_component),
                entry.meta.name
            ))),
            _ => Ok(()),
        }
    }

    /// Delete items by name; all guards are checked before anything is removed
    pub fn delete(&mut self, names: &[String], active: Option<&str>, is_component: bool) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        for name in names {
            if !is_component {
                if let Some(active) = active {
                    if active.eq_ignore_ascii_case(name) {
                        return Err(CfgError::Guard(format!(
                            "Cannot delete currently active configuration {}",
                            name
                        )));
                    }
                }
            }
        }
        for name in names {
            if self.namespace(is_component).get(name).is_none() {
                return Err(CfgError::Guard(format!(
                    "Unknown {}: {}",
                    Self::kind_label(is_component),
                    name
                )));
            }
        }
        if is_component {
            for name in names {
                self.dependencies.guard_delete(name)?;
            }
        }
        for name in names {
            self.guard_overwrite(name, is_component)?;
        }

        let removed: Vec<String> = names
            .iter()
            .filter_map(|name| self.namespace(is_component).get(name))
            .map(|entry| entry.meta.name.clone())
            .collect();
        for name in names {
            self.store.remove(&self.files.item_dir(name, is_component))?;
        }
        self.store.commit(&format!(
            "Deleted {} {}",
            Self::kind_label(is_component),
            removed.join(", ")
        ))?;

        for name in names {
            self.forget(name, is_component);
        }
        info!(
            "[Catalogue] Deleted {} {}",
            Self::kind_label(is_component),
            removed.join(", ")
        );
        self.publish();
        Ok(())
    }

    /// Drop an item whose directory disappeared from disk
    ///
    /// Returns false when the item was not in the catalogue.
    pub fn remove_by_hand(&mut self, name: &str, is_component: bool) -> bool {
        let removed = self.forget(name, is_component);
        if removed {
            self.publish();
        }
        removed
    }

    fn forget(&mut self, name: &str, is_component: bool) -> bool {
        let removed = self
            .namespace_mut(is_component)
            .entries
            .remove(&name.to_lowercase())
            .is_some();
        if is_component {
            self.dependencies.forget_component(name);
        } else {
            self.dependencies.forget_configuration(name);
        }
        removed
    }

    pub fn list(&self, is_component: bool) -> Vec<ConfigMeta> {
        self.namespace(is_component).list()
    }

    pub fn get(&self, name: &str, is_component: bool) -> Option<ConfigMeta> {
        self.namespace(is_component).get(name).map(|e| e.meta.clone())
    }

    pub fn contains(&self, name: &str, is_component: bool) -> bool {
        self.namespace(is_component).get(name).is_some()
    }

    pub fn entry_state(&self, name: &str, is_component: bool) -> EntryState {
        self.namespace(is_component)
            .get(name)
            .map(|e| e.state)
            .unwrap_or(EntryState::Unknown)
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.list().into_iter().map(|m| m.name).collect()
    }

    pub fn dependents(&self, component: &str) -> Vec<String> {
        self.dependencies.dependents(component)
    }

    pub fn dependency_snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.dependencies.snapshot()
    }

    pub fn files(&self) -> &ConfigFileStore {
        &self.files
    }

    pub fn store(&self) -> &dyn RevisionStore {
        self.store.as_ref()
    }

    /// Push all catalogue metadata to the board
    pub fn publish(&mut self) {
        self.board.publish_catalogue(
            self.configs.list(),
            self.components.list(),
            self.dependencies.snapshot(),
        );
        for namespace in [&mut self.configs, &mut self.components] {
            for entry in namespace.entries.values_mut() {
                entry.state = EntryState::Published;
            }
        }
    }
}
