//! Extension documents and hooks
//!
//! A fixed set of extensions hang off the active configuration: run-control
//! thresholds, synoptic documents and the device screens document. Each one
//! advertises what it can do through [`Extension::as_readable`] and
//! [`Extension::as_writable`]; the engine walks the registered list and
//! dispatches on those capabilities.

use crate::activation::{RunControlManager, RunControlTransport};
use crate::errors::{CfgError, Result};
use crate::model::validation::validate_item_name;
use crate::model::Configuration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    RunControl,
    Synoptic,
    Devices,
}

impl ExtensionKind {
    pub const ALL: [ExtensionKind; 3] = [
        ExtensionKind::RunControl,
        ExtensionKind::Synoptic,
        ExtensionKind::Devices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionKind::RunControl => "run_control",
            ExtensionKind::Synoptic => "synoptic",
            ExtensionKind::Devices => "devices",
        }
    }
}

impl std::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionKind {
    type Err = CfgError;

    fn from_str(s: &str) -> Result<Self> {
        ExtensionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CfgError::Validation(format!("Unknown extension: {}", s)))
    }
}

pub trait ReadableExtension: Send + Sync {
    /// `None` reads the whole extension (or its index), `Some` one entry
    fn read(&self, name: Option<&str>) -> Result<JsonValue>;
}

pub trait WritableExtension: Send + Sync {
    /// Store a document; returns the file to put under version control
    fn write(&self, name: &str, document: &JsonValue) -> Result<PathBuf>;
}

pub trait Extension: Send + Sync {
    fn kind(&self) -> ExtensionKind;

    fn as_readable(&self) -> Option<&dyn ReadableExtension> {
        None
    }

    fn as_writable(&self) -> Option<&dyn WritableExtension> {
        None
    }

    /// Called after a configuration became active
    fn on_activated(&self, _config: &Configuration) -> Result<()> {
        Ok(())
    }

    /// Called on the candidate configuration before it is saved
    fn on_saving(&self, _config: &mut Configuration) {}
}

// ---------------------------------------------------------------------------
// Run-control
// ---------------------------------------------------------------------------

pub struct RunControlExtension {
    manager: RunControlManager,
    /// Blocks of the last activated configuration
    blocks: Mutex<Vec<String>>,
}

impl RunControlExtension {
    pub fn new(manager: RunControlManager) -> Self {
        Self {
            manager,
            blocks: Mutex::new(Vec::new()),
        }
    }

    fn active_blocks(&self) -> Vec<String> {
        self.blocks
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Extension for RunControlExtension {
    fn kind(&self) -> ExtensionKind {
        ExtensionKind::RunControl
    }

    fn as_readable(&self) -> Option<&dyn ReadableExtension> {
        Some(self)
    }

    fn on_activated(&self, config: &Configuration) -> Result<()> {
        match self.blocks.lock() {
            Ok(mut blocks) => *blocks = config.block_names(),
            Err(poisoned) => *poisoned.into_inner() = config.block_names(),
        }
        let failures = self.manager.sync(config);
        if failures > 0 {
            return Err(CfgError::Unexpected(format!(
                "run-control thresholds not applied for {} block(s)",
                failures
            )));
        }
        Ok(())
    }

    fn on_saving(&self, config: &mut Configuration) {
        self.manager.capture(config);
    }
}

impl ReadableExtension for RunControlExtension {
    fn read(&self, name: Option<&str>) -> Result<JsonValue> {
        match name {
            Some(block) => Ok(serde_json::to_value(self.manager.read(block)?)?),
            None => {
                let mut all = Map::new();
                for block in self.active_blocks() {
                    match self.manager.read(&block) {
                        Ok(spec) => {
                            all.insert(block, serde_json::to_value(spec)?);
                        }
                        Err(e) => debug!("[RunControl] Skipping {}: {}", block, e),
                    }
                }
                Ok(JsonValue::Object(all))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed documents
// ---------------------------------------------------------------------------

/// JSON documents kept beside the configurations
///
/// Synoptics live one per file under their directory; the devices extension is
/// a single `screens.json` document.
pub struct DocumentExtension {
    kind: ExtensionKind,
    dir: PathBuf,
    single_file: Option<String>,
}

impl DocumentExtension {
    pub fn synoptics(dir: PathBuf) -> Self {
        Self {
            kind: ExtensionKind::Synoptic,
            dir,
            single_file: None,
        }
    }

    pub fn devices(dir: PathBuf) -> Self {
        Self {
            kind: ExtensionKind::Devices,
            dir,
            single_file: Some("screens.json".to_string()),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        match &self.single_file {
            Some(file) => Ok(self.dir.join(file)),
            None => {
                validate_item_name(name)?;
                Ok(self.dir.join(format!("{}.json", name)))
            }
        }
    }

    fn names(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl Extension for DocumentExtension {
    fn kind(&self) -> ExtensionKind {
        self.kind
    }

    fn as_readable(&self) -> Option<&dyn ReadableExtension> {
        Some(self)
    }

    fn as_writable(&self) -> Option<&dyn WritableExtension> {
        Some(self)
    }
}

impl ReadableExtension for DocumentExtension {
    fn read(&self, name: Option<&str>) -> Result<JsonValue> {
        let path = match (name, &self.single_file) {
            (None, None) => return Ok(json!(self.names()?)),
            (Some(name), _) => self.path_for(name)?,
            (None, Some(file)) => self.dir.join(file),
        };
        if !path.exists() {
            if self.single_file.is_some() {
                return Ok(json!({}));
            }
            return Err(CfgError::NotFound(format!("{} {}", self.kind, path.display())));
        }
        let content = fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| CfgError::Validation(format!("{} is not valid JSON: {}", path.display(), e)))
    }
}

impl WritableExtension for DocumentExtension {
    fn write(&self, name: &str, document: &JsonValue) -> Result<PathBuf> {
        if !document.is_object() {
            return Err(CfgError::Validation(format!(
                "{} document must be a JSON object",
                self.kind
            )));
        }
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir)?;
        let mut json = serde_json::to_string_pretty(document)?;
        json.push('\n');
        fs::write(&path, json)?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run-control on `transport`, synoptics and devices under the given directories
    pub fn standard(
        transport: Arc<dyn RunControlTransport>,
        prefix: &str,
        synoptics_dir: PathBuf,
        devices_dir: PathBuf,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RunControlExtension::new(RunControlManager::new(
            transport, prefix,
        ))));
        registry.register(Box::new(DocumentExtension::synoptics(synoptics_dir)));
        registry.register(Box::new(DocumentExtension::devices(devices_dir)));
        registry
    }

    /// Register an extension, replacing any previous one of the same kind
    pub fn register(&mut self, extension: Box<dyn Extension>) {
        self.extensions.retain(|e| e.kind() != extension.kind());
        self.extensions.push(extension);
    }

    pub fn kinds(&self) -> Vec<ExtensionKind> {
        self.extensions.iter().map(|e| e.kind()).collect()
    }

    fn find(&self, kind: ExtensionKind) -> Result<&dyn Extension> {
        self.extensions
            .iter()
            .find(|e| e.kind() == kind)
            .map(|e| &**e)
            .ok_or_else(|| CfgError::NotFound(format!("extension {}", kind)))
    }

    /// Tell every extension about a new active configuration; failures are logged
    pub fn notify_activated(&self, config: &Configuration) {
        for extension in &self.extensions {
            if let Err(e) = extension.on_activated(config) {
                warn!("[Extensions] {} did not apply {}: {}", extension.kind(), config.name, e);
            }
        }
    }

    pub fn prepare_save(&self, config: &mut Configuration) {
        for extension in &self.extensions {
            extension.on_saving(config);
        }
    }

    pub fn read(&self, kind: ExtensionKind, name: Option<&str>) -> Result<JsonValue> {
        self.find(kind)?
            .as_readable()
            .ok_or_else(|| CfgError::Validation(format!("{} cannot be read", kind)))?
            .read(name)
    }

    pub fn write(&self, kind: ExtensionKind, name: &str, document: &JsonValue) -> Result<PathBuf> {
        self.find(kind)?
            .as_writable()
            .ok_or_else(|| CfgError::Validation(format!("{} is read-only", kind)))?
            .write(name, document)
    }
}
