//! Structural rules every stored configuration must satisfy
//!
//! These run before any filesystem or version-control side effect.

use crate::errors::{CfgError, Result};
use crate::model::configuration::Configuration;
use crate::model::group::NONE_GROUP;
use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static block name regex"));

/// Names become directory names: reject separators, dot-names and control chars
pub fn validate_item_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CfgError::Validation("Name cannot be empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(CfgError::Validation(format!("Invalid name: {}", name)));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control())
    {
        return Err(CfgError::Validation(format!(
            "Name {:?} contains forbidden character {:?}",
            name, bad
        )));
    }
    Ok(())
}

pub fn validate_block_name(name: &str) -> Result<()> {
    if !BLOCK_NAME.is_match(name) {
        return Err(CfgError::Validation(format!(
            "Block name {:?} must start with a letter and contain only letters, digits and underscores",
            name
        )));
    }
    Ok(())
}

/// Check a configuration on its own (no catalogue knowledge)
pub fn validate_configuration(config: &Configuration) -> Result<()> {
    validate_item_name(&config.name)?;

    for block in config.blocks() {
        validate_block_name(&block.name)?;
        if block.pv.trim().is_empty() {
            return Err(CfgError::Validation(format!(
                "Block {} has no PV address",
                block.name
            )));
        }
        if let Some(rc) = &block.runcontrol {
            if let (Some(low), Some(high)) = (rc.low_limit, rc.high_limit) {
                if low > high {
                    return Err(CfgError::Validation(format!(
                        "Block {} run-control low limit {} above high limit {}",
                        block.name, low, high
                    )));
                }
            }
        }
    }

    for group in config.groups() {
        if group.name.eq_ignore_ascii_case(NONE_GROUP) {
            return Err(CfgError::Validation(format!(
                "{} cannot be declared explicitly",
                NONE_GROUP
            )));
        }
        for member in &group.blocks {
            if config.block(member).is_none() {
                return Err(CfgError::Validation(format!(
                    "Group {} references unknown block {}",
                    group.name, member
                )));
            }
        }
    }

    for ioc in config.iocs().values() {
        if ioc.name.trim().is_empty() {
            return Err(CfgError::Validation("IOC name cannot be empty".to_string()));
        }
    }

    if config.is_component && !config.components().is_empty() {
        return Err(CfgError::Validation(format!(
            "Component {} cannot reference other components",
            config.name
        )));
    }

    Ok(())
}

/// Check component references against the set of known component names
pub fn validate_component_references<'a, I>(config: &Configuration, known: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    for component in config.components() {
        if !known
            .clone()
            .into_iter()
            .any(|k| k.eq_ignore_ascii_case(component))
        {
            return Err(CfgError::Validation(format!(
                "Configuration {} references unknown component {}",
                config.name, component
            )));
        }
    }
    Ok(())
}
