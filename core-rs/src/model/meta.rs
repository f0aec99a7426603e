//! Lightweight catalogue projection of a configuration

use crate::model::configuration::Configuration;
use serde::{Deserialize, Serialize};

/// What the catalogue publishes about a stored configuration or component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMeta {
    pub name: String,

    /// Protocol-safe identifier derived from `name`
    pub pv: String,

    pub description: String,

    #[serde(default)]
    pub synoptic: String,

    #[serde(default)]
    pub history: Vec<String>,

    #[serde(default)]
    pub component: bool,

    #[serde(default)]
    pub protected: bool,
}

impl ConfigMeta {
    pub fn from_config(config: &Configuration, pv: String) -> Self {
        Self {
            name: config.name.clone(),
            pv,
            description: config.description.clone(),
            synoptic: config.synoptic.clone(),
            history: config.history.clone(),
            component: config.is_component,
            protected: config.protected,
        }
    }
}
