//! External (JSON) representation of a full configuration
//!
//! This is what the wire layer reads from "get details" and hands back to
//! "set details". Groups are always listed with `NONE` last.

use crate::errors::{CfgError, Result};
use crate::model::block::Block;
use crate::model::configuration::Configuration;
use crate::model::group::Group;
use crate::model::ioc::Ioc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDetails {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub synoptic: String,

    #[serde(default)]
    pub history: Vec<String>,

    #[serde(default)]
    pub protected: bool,

    #[serde(default)]
    pub component: bool,

    #[serde(default)]
    pub blocks: Vec<Block>,

    #[serde(default)]
    pub groups: Vec<Group>,

    #[serde(default)]
    pub iocs: Vec<Ioc>,

    #[serde(default)]
    pub components: Vec<String>,

    #[serde(default)]
    pub macros: BTreeMap<String, String>,
}

impl ConfigDetails {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| CfgError::Validation(format!("Invalid configuration details: {}", e)))
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Configuration {
    pub fn to_details(&self) -> ConfigDetails {
        ConfigDetails {
            name: self.name.clone(),
            description: self.description.clone(),
            synoptic: self.synoptic.clone(),
            history: self.history.clone(),
            protected: self.protected,
            component: self.is_component,
            blocks: self.blocks().to_vec(),
            groups: self.groups_with_none(),
            iocs: self.iocs().values().cloned().collect(),
            components: self.components().to_vec(),
            macros: self.macros.clone(),
        }
    }

    /// Build a configuration from details, rejecting inconsistent input
    ///
    /// Duplicate block/IOC names, groups naming unknown blocks and blocks listed
    /// in two groups are all validation failures. Any `NONE` group in the input
    /// is ignored; it is recomputed.
    pub fn from_details(details: &ConfigDetails) -> Result<Self> {
        let mut config = if details.component {
            Configuration::new_component(details.name.clone())
        } else {
            Configuration::new(details.name.clone())
        };
        config.description = details.description.clone();
        config.synoptic = details.synoptic.clone();
        config.history = details.history.clone();
        config.protected = details.protected;
        config.macros = details.macros.clone();

        for block in &details.blocks {
            config
                .add_block(block.clone(), None)
                .map_err(|e| CfgError::Validation(e.to_string()))?;
        }

        for group in details.groups.iter().filter(|g| !g.is_none_group()) {
            config
                .add_group(&group.name, group.component.as_deref())
                .map_err(|e| CfgError::Validation(e.to_string()))?;
            for block in &group.blocks {
                if let Some(holder) = config.groups().iter().find(|g| g.contains(block)) {
                    return Err(CfgError::Validation(format!(
                        "Block {} listed in groups {} and {}",
                        block, holder.name, group.name
                    )));
                }
                config.assign_to_group(block, &group.name).map_err(|_| {
                    CfgError::Validation(format!(
                        "Group {} references unknown block {}",
                        group.name, block
                    ))
                })?;
            }
        }

        for ioc in &details.iocs {
            config
                .add_ioc(ioc.clone())
                .map_err(|e| CfgError::Validation(e.to_string()))?;
        }

        for component in &details.components {
            config
                .add_component(component)
                .map_err(|e| CfgError::Validation(e.to_string()))?;
        }

        Ok(config)
    }
}
