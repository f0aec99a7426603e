//! On-disk layout of configurations and components
//!
//! ```text
//! <root>/configurations/<Name>/{meta,blocks,groups,iocs,components}.json
//! <root>/components/<Name>/{meta,blocks,groups,iocs}.json
//! <root>/last_config.txt
//! ```
//!
//! Every document is schema-checked when read; a directory missing any
//! required document is rejected as an incomplete file set.

use crate::errors::{CfgError, Result};
use crate::model::schema::{ComponentRef, MetaDocument};
use crate::model::validation::validate_configuration;
use crate::model::{Block, Configuration, DocumentKind, Group, Ioc, SchemaValidator};
use crate::settings::LayoutSettings;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Which namespace a path under the data root belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub name: String,
    pub is_component: bool,
}

pub struct ConfigFileStore {
    root: PathBuf,
    layout: LayoutSettings,
    validator: Arc<dyn SchemaValidator>,
}

impl std::fmt::Debug for ConfigFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFileStore")
            .field("root", &self.root)
            .field("layout", &self.layout)
            .field("validator", &"<SchemaValidator>")
            .finish()
    }
}

impl ConfigFileStore {
    pub fn new(root: PathBuf, layout: LayoutSettings, validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            root,
            layout,
            validator,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validator(&self) -> &dyn SchemaValidator {
        self.validator.as_ref()
    }

    pub fn namespace_root(&self, is_component: bool) -> PathBuf {
        if is_component {
            self.root.join(&self.layout.components_dir)
        } else {
            self.root.join(&self.layout.configurations_dir)
        }
    }

    pub fn last_config_path(&self) -> PathBuf {
        self.root.join(&self.layout.last_config_file)
    }

    pub fn synoptics_root(&self) -> PathBuf {
        self.root.join(&self.layout.synoptics_dir)
    }

    pub fn devices_root(&self) -> PathBuf {
        self.root.join(&self.layout.devices_dir)
    }

    /// Create the namespace directories if missing
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.namespace_root(false))?;
        fs::create_dir_all(self.namespace_root(true))?;
        Ok(())
    }

    /// Item directory names in a namespace, sorted, hidden entries skipped
    pub fn list_names(&self, is_component: bool) -> Result<Vec<String>> {
        let dir = self.namespace_root(is_component);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort_by_key(|n| n.to_lowercase());
        Ok(names)
    }

    /// Existing directory for `name`, matched case-insensitively
    pub fn find_dir(&self, name: &str, is_component: bool) -> Option<PathBuf> {
        let exact = self.namespace_root(is_component).join(name);
        if exact.is_dir() {
            return Some(exact);
        }
        self.list_names(is_component)
            .ok()?
            .into_iter()
            .find(|n| n.eq_ignore_ascii_case(name))
            .map(|n| self.namespace_root(is_component).join(n))
    }

    /// Directory `name` is (or would be) stored in
    pub fn item_dir(&self, name: &str, is_component: bool) -> PathBuf {
        self.find_dir(name, is_component)
            .unwrap_or_else(|| self.namespace_root(is_component).join(name))
    }

    pub fn exists(&self, name: &str, is_component: bool) -> bool {
        self.find_dir(name, is_component).is_some()
    }

    fn read_document<T: DeserializeOwned>(&self, dir: &Path, kind: DocumentKind) -> Result<T> {
        let path = dir.join(kind.file_name());
        let content = fs::read_to_string(&path)?;
        let value: JsonValue = serde_json::from_str(&content).map_err(|e| {
            CfgError::Validation(format!("{} is not valid JSON: {}", path.display(), e))
        })?;
        self.validator.validate(&value, kind)?;
        serde_json::from_value(value)
            .map_err(|e| CfgError::Validation(format!("{}: {}", path.display(), e)))
    }

    /// Load and validate a stored item
    pub fn read(&self, name: &str, is_component: bool) -> Result<Configuration> {
        let dir = self.find_dir(name, is_component).ok_or_else(|| {
            CfgError::NotFound(format!(
                "{} {}",
                if is_component { "component" } else { "configuration" },
                name
            ))
        })?;

        let missing: Vec<&str> = DocumentKind::required(is_component)
            .iter()
            .filter(|kind| !dir.join(kind.file_name()).is_file())
            .map(|kind| kind.file_name())
            .collect();
        if !missing.is_empty() {
            return Err(CfgError::Validation(format!(
                "Incomplete file set in {}: missing {}",
                dir.display(),
                missing.join(", ")
            )));
        }

        let meta: MetaDocument = self.read_document(&dir, DocumentKind::Meta)?;
        let blocks: Vec<Block> = self.read_document(&dir, DocumentKind::Blocks)?;
        let groups: Vec<Group> = self.read_document(&dir, DocumentKind::Groups)?;
        let iocs: Vec<Ioc> = self.read_document(&dir, DocumentKind::Iocs)?;
        let components: Vec<ComponentRef> = if is_component {
            Vec::new()
        } else {
            self.read_document(&dir, DocumentKind::Components)?
        };

        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string());
        let display_name = if meta.name.eq_ignore_ascii_case(&dir_name) {
            meta.name.clone()
        } else {
            dir_name
        };

        let mut config = if is_component {
            Configuration::new_component(display_name)
        } else {
            Configuration::new(display_name)
        };
        config.description = meta.description;
        config.synoptic = meta.synoptic;
        config.history = meta.history;
        config.protected = meta.protected;

        for (i, block) in blocks.iter().enumerate() {
            if blocks[..i].iter().any(|b| b.is_named(&block.name)) {
                return Err(CfgError::Validation(format!(
                    "Duplicate block {} in {}",
                    block.name,
                    dir.display()
                )));
            }
        }
        for (i, ioc) in iocs.iter().enumerate() {
            if iocs[..i].iter().any(|other| other.name.eq_ignore_ascii_case(&ioc.name)) {
                return Err(CfgError::Validation(format!(
                    "Duplicate IOC {} in {}",
                    ioc.name,
                    dir.display()
                )));
            }
        }
        for group in &groups {
            for block in &group.blocks {
                let holders = groups
                    .iter()
                    .filter(|g| !g.is_none_group() && g.contains(block))
                    .count();
                if holders > 1 {
                    return Err(CfgError::Validation(format!(
                        "Block {} appears in {} groups in {}",
                        block,
                        holders,
                        dir.display()
                    )));
                }
            }
        }

        config.set_contents(
            blocks,
            groups,
            iocs,
            components.into_iter().map(|c| c.name).collect(),
        );
        validate_configuration(&config)?;
        Ok(config)
    }

    fn write_document<T: Serialize + ?Sized>(&self, dir: &Path, kind: DocumentKind, doc: &T) -> Result<()> {
        let mut json = serde_json::to_string_pretty(doc)?;
        json.push('\n');
        fs::write(dir.join(kind.file_name()), json)?;
        Ok(())
    }

    /// Write every document of `config`, returning the item directory
    ///
    /// The caller is responsible for stripping component-owned items first.
    pub fn write(&self, config: &Configuration) -> Result<PathBuf> {
        let dir = self.item_dir(&config.name, config.is_component);
        fs::create_dir_all(&dir)?;

        let meta = MetaDocument {
            name: config.name.clone(),
            description: config.description.clone(),
            synoptic: config.synoptic.clone(),
            history: config.history.clone(),
            protected: config.protected,
        };
        self.write_document(&dir, DocumentKind::Meta, &meta)?;
        self.write_document(&dir, DocumentKind::Blocks, config.blocks())?;
        self.write_document(&dir, DocumentKind::Groups, &config.groups_with_none())?;
        let iocs: Vec<&Ioc> = config.iocs().values().collect();
        self.write_document(&dir, DocumentKind::Iocs, &iocs)?;
        if !config.is_component {
            let components: Vec<ComponentRef> = config
                .components()
                .iter()
                .map(|name| ComponentRef { name: name.clone() })
                .collect();
            self.write_document(&dir, DocumentKind::Components, &components)?;
        }
        Ok(dir)
    }

    pub fn read_last_config(&self) -> Option<String> {
        fs::read_to_string(self.last_config_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn write_last_config(&self, name: &str) -> Result<PathBuf> {
        let path = self.last_config_path();
        fs::write(&path, format!("{}\n", name))?;
        Ok(path)
    }

    /// Map a path under the data root to the item it belongs to
    pub fn classify(&self, path: &Path) -> Option<ItemRef> {
        for is_component in [false, true] {
            let ns = self.namespace_root(is_component);
            if let Ok(rest) = path.strip_prefix(&ns) {
                if let Some(Component::Normal(first)) = rest.components().next() {
                    let name = first.to_string_lossy().to_string();
                    if name.starts_with('.') {
                        return None;
                    }
                    return Some(ItemRef { name, is_component });
                }
            }
        }
        None
    }
}
