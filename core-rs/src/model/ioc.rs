//! Managed background processes (IOCs)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Simulation level an IOC is started with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimLevel {
    #[default]
    None,
    Recsim,
    Devsim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ioc {
    /// Always uppercase
    pub name: String,

    #[serde(default)]
    pub autostart: bool,

    /// Restart when the owning configuration is (re)activated
    #[serde(default)]
    pub restart: bool,

    #[serde(default)]
    pub simlevel: SimLevel,

    #[serde(default)]
    pub macros: BTreeMap<String, String>,

    #[serde(default)]
    pub pvs: BTreeMap<String, String>,

    #[serde(default)]
    pub pvsets: BTreeMap<String, bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_pv_prefix: Option<String>,
}

impl Ioc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_uppercase(),
            autostart: true,
            restart: true,
            simlevel: SimLevel::None,
            macros: BTreeMap::new(),
            pvs: BTreeMap::new(),
            pvsets: BTreeMap::new(),
            component: None,
            remote_pv_prefix: None,
        }
    }

    pub fn with_flags(mut self, autostart: bool, restart: bool) -> Self {
        self.autostart = autostart;
        self.restart = restart;
        self
    }

    pub fn with_macro(mut self, key: &str, value: &str) -> Self {
        self.macros.insert(key.to_string(), value.to_string());
        self
    }

    /// Canonical form: uppercase name
    pub fn normalized(mut self) -> Self {
        self.name = self.name.to_uppercase();
        self
    }
}
