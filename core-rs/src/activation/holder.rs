//! The single active configuration
//!
//! `live` is what is projected onto the instrument, flattened with the
//! contents of its components. `staged` holds a loaded or edited
//! configuration that has not been activated yet. Every operation builds and
//! validates a candidate first and only then touches disk, processes or the
//! held state, so a rejected call leaves everything as it was.

use crate::activation::diff::ProcessDiff;
use crate::activation::process::{ProcessReport, ProcessSupervisor};
use crate::catalogue::ConfigListManager;
use crate::errors::{CfgError, ErrorKind, Result};
use crate::extensions::ExtensionRegistry;
use crate::model::validation::{validate_component_references, validate_configuration, validate_item_name};
use crate::model::{ConfigDetails, ConfigMeta, Configuration};
use crate::publish::MetadataBoard;
use crate::storage::ConfigFileStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What an activation did to managed processes
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    pub configuration: String,
    pub diff: ProcessDiff,
    pub processes: Vec<ProcessReport>,
}

impl ActivationReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProcessReport> {
        self.processes.iter().filter(|r| !r.ok())
    }
}

pub struct ActiveConfigHolder {
    files: Arc<ConfigFileStore>,
    supervisor: ProcessSupervisor,
    extensions: Arc<ExtensionRegistry>,
    board: Arc<MetadataBoard>,
    live: Configuration,
    staged: Option<Configuration>,
}

impl ActiveConfigHolder {
    pub fn new(
        files: Arc<ConfigFileStore>,
        supervisor: ProcessSupervisor,
        extensions: Arc<ExtensionRegistry>,
        board: Arc<MetadataBoard>,
    ) -> Self {
        Self {
            files,
            supervisor,
            extensions,
            board,
            live: Configuration::new(""),
            staged: None,
        }
    }

    pub fn live(&self) -> &Configuration {
        &self.live
    }

    pub fn staged(&self) -> Option<&Configuration> {
        self.staged.as_ref()
    }

    /// Empty when nothing has been activated
    pub fn active_name(&self) -> &str {
        &self.live.name
    }

    pub fn active_details(&self) -> ConfigDetails {
        self.live.to_details()
    }

    pub fn staged_details(&self) -> Option<ConfigDetails> {
        self.staged.as_ref().map(|c| c.to_details())
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Whether a change to this item has to be reflected in the live configuration
    pub fn is_affected_by(&self, name: &str, is_component: bool) -> bool {
        if self.live.name.is_empty() {
            return false;
        }
        if is_component {
            self.live.references_component(name)
        } else {
            self.live.name.eq_ignore_ascii_case(name)
        }
    }

    /// Merge the contents of every referenced component
    fn flatten(&self, config: &Configuration, catalogue: &ConfigListManager) -> Result<Configuration> {
        let known = catalogue.component_names();
        validate_component_references(config, known.iter().map(|s| s.as_str()))?;

        let mut flat = config.clone();
        for name in config.components() {
            let component = self.files.read(name, true).map_err(|e| {
                CfgError::Validation(format!("Component {} could not be read: {}", name, e))
            })?;
            flat.merge_component(&component);
        }
        Ok(flat)
    }

    /// Stage a stored configuration; no process changes yet
    pub fn load(&mut self, name: &str, is_component: bool, catalogue: &ConfigListManager) -> Result<()> {
        if is_component {
            return Err(CfgError::Guard(format!(
                "{} is a component and cannot be the active configuration",
                name
            )));
        }
        let stored = self.files.read(name, false).map_err(|e| match e.kind() {
            ErrorKind::Validation => e,
            _ => CfgError::Validation(format!("Could not load {}: {}", name, e)),
        })?;
        let flat = self.flatten(&stored, catalogue)?;

        info!("[Activation] Loaded {}", flat.name);
        self.staged = Some(flat);
        self.board.publish_staged(self.staged.as_ref());
        Ok(())
    }

    /// Validate details and stage them
    pub fn set_details(&mut self, details: &ConfigDetails, catalogue: &ConfigListManager) -> Result<()> {
        if details.component {
            return Err(CfgError::Guard(
                "Component details cannot be staged as the active configuration".to_string(),
            ));
        }
        let candidate = Configuration::from_details(details)?;
        validate_configuration(&candidate)?;
        let flat = self.flatten(&candidate.without_component_items(), catalogue)?;

        self.staged = Some(flat);
        self.board.publish_staged(self.staged.as_ref());
        Ok(())
    }

    /// Promote the staged configuration (or re-apply the live one)
    ///
    /// With `full` the process diff between the old and new process sets is
    /// applied. Run-control and published metadata are always refreshed.
    pub fn activate(&mut self, full: bool) -> ActivationReport {
        let next = self.staged.take().unwrap_or_else(|| self.live.clone());

        let mut report = ActivationReport {
            configuration: next.name.clone(),
            ..ActivationReport::default()
        };
        if full {
            let supervisor = &self.supervisor;
            report.diff = ProcessDiff::compute(
                self.live.iocs(),
                next.iocs(),
                |n| supervisor.is_running(n),
                |n| supervisor.is_protected(n),
            );
            report.processes = report.diff.apply(supervisor);
        }

        self.live = next;
        self.extensions.notify_activated(&self.live);

        if !self.live.name.is_empty() {
            if let Err(e) = self.files.write_last_config(&self.live.name) {
                warn!("[Activation] Could not record last active configuration: {}", e);
            }
        }

        let failed = report.failures().count();
        if failed > 0 {
            warn!(
                "[Activation] {} active with {} process failure(s)",
                self.live.name, failed
            );
        } else {
            info!("[Activation] {} active", self.live.name);
        }

        self.board.publish_active(&self.live);
        self.board.publish_staged(None);
        report
    }

    /// Save the staged configuration if there is one, otherwise the live one
    ///
    /// `as_name` saves under a new name. Live run-control values are captured
    /// into the saved blocks and an edit timestamp is appended.
    pub fn save(&mut self, as_name: Option<&str>, catalogue: &mut ConfigListManager) -> Result<ConfigMeta> {
        let saving_staged = self.staged.is_some();
        let mut candidate = match &self.staged {
            Some(staged) => staged.clone(),
            None => self.live.clone(),
        };

        if let Some(name) = as_name {
            candidate.name = name.to_string();
            candidate.protected = false;
        }
        validate_item_name(&candidate.name)?;
        catalogue.guard_overwrite(&candidate.name, false)?;

        if !saving_staged {
            self.extensions.prepare_save(&mut candidate);
        }
        candidate.touch_history(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
        validate_configuration(&candidate)?;
        let known = catalogue.component_names();
        validate_component_references(&candidate, known.iter().map(|s| s.as_str()))?;

        let meta = catalogue.persist(&candidate, &format!("{} saved", candidate.name))?;

        if saving_staged {
            self.staged = Some(candidate);
            self.board.publish_staged(self.staged.as_ref());
        } else {
            self.live = candidate;
            if let Err(e) = self.files.write_last_config(&self.live.name) {
                warn!("[Activation] Could not record last active configuration: {}", e);
            }
            self.board.publish_active(&self.live);
        }
        Ok(meta)
    }

    /// Load and fully activate the last active configuration
    ///
    /// Falls back to a blank configuration when the pointer is missing or the
    /// configuration cannot be loaded.
    pub fn restore_last(&mut self, catalogue: &ConfigListManager) -> ActivationReport {
        match self.files.read_last_config() {
            Some(name) => match self.load(&name, false, catalogue) {
                Ok(()) => return self.activate(true),
                Err(e) => warn!(
                    "[Activation] Last configuration {} could not be loaded, using a blank configuration: {}",
                    name, e
                ),
            },
            None => info!("[Activation] No last configuration recorded, using a blank configuration"),
        }
        self.staged = Some(Configuration::new(""));
        self.activate(true)
    }

    /// Re-read the live configuration (and its components) from disk
    pub fn reload(&mut self, catalogue: &ConfigListManager) -> Result<ActivationReport> {
        let name = self.live.name.clone();
        if name.is_empty() {
            return Ok(self.activate(false));
        }
        self.load(&name, false, catalogue)?;
        Ok(self.activate(true))
    }
}
