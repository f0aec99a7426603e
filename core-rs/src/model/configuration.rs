//! Configuration / component contents
//!
//! The same shape backs both kinds; `is_component` decides which namespace it
//! lives in and whether it may reference components itself.
//!
//! Group membership is stored only for explicit groups. The reserved `NONE`
//! group is derived from the blocks that no explicit group claims, which keeps
//! the "a block is in at most one group" invariant true by construction.

use crate::errors::{CfgError, Result};
use crate::model::block::Block;
use crate::model::group::{Group, NONE_GROUP};
use crate::model::ioc::Ioc;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    pub name: String,
    pub description: String,
    /// Default synoptic shown when this configuration is active
    pub synoptic: String,
    /// Edit timestamps, oldest first
    pub history: Vec<String>,
    pub protected: bool,
    pub is_component: bool,
    /// Macros inherited from the instrument environment
    pub macros: BTreeMap<String, String>,
    blocks: Vec<Block>,
    groups: Vec<Group>,
    iocs: BTreeMap<String, Ioc>,
    components: Vec<String>,
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn new_component(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_component: true,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.is_named(name))
    }

    pub fn block_names(&self) -> Vec<String> {
        self.blocks.iter().map(|b| b.name.clone()).collect()
    }

    /// Add a block, optionally straight into a group
    ///
    /// Fails when a block with the same name (case-insensitive) exists.
    pub fn add_block(&mut self, block: Block, group: Option<&str>) -> Result<()> {
        if self.block(&block.name).is_some() {
            return Err(CfgError::Guard(format!(
                "Block {} already exists in {}",
                block.name, self.name
            )));
        }
        let name = block.name.clone();
        self.blocks.push(block);
        if let Some(group) = group {
            self.assign_to_group(&name, group)?;
        }
        Ok(())
    }

    /// Replace an existing block's settings, keeping its group membership
    pub fn edit_block(&mut self, block: Block) -> Result<()> {
        match self.blocks.iter_mut().find(|b| b.is_named(&block.name)) {
            Some(existing) => {
                *existing = block;
                Ok(())
            }
            None => Err(CfgError::NotFound(format!(
                "Block {} in {}",
                block.name, self.name
            ))),
        }
    }

    pub fn remove_block(&mut self, name: &str) -> Result<Block> {
        let index = self
            .blocks
            .iter()
            .position(|b| b.is_named(name))
            .ok_or_else(|| CfgError::NotFound(format!("Block {} in {}", name, self.name)))?;
        for group in &mut self.groups {
            group.remove(name);
        }
        Ok(self.blocks.remove(index))
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    /// Explicit groups only
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.is_named(name))
    }

    /// Explicit groups followed by the derived `NONE` group
    pub fn groups_with_none(&self) -> Vec<Group> {
        let mut groups = self.groups.clone();
        let mut none = Group::new(NONE_GROUP);
        none.blocks = self
            .blocks
            .iter()
            .filter(|b| !self.groups.iter().any(|g| g.contains(&b.name)))
            .map(|b| b.name.clone())
            .collect();
        groups.push(none);
        groups
    }

    /// Group a block belongs to, `NONE` if unassigned
    pub fn group_of(&self, block: &str) -> Option<String> {
        self.block(block)?;
        Some(
            self.groups
                .iter()
                .find(|g| g.contains(block))
                .map(|g| g.name.clone())
                .unwrap_or_else(|| NONE_GROUP.to_string()),
        )
    }

    /// Create an empty group if it does not exist yet
    pub fn add_group(&mut self, name: &str, component: Option<&str>) -> Result<()> {
        if name.eq_ignore_ascii_case(NONE_GROUP) {
            return Err(CfgError::Guard(format!(
                "{} is a reserved group name",
                NONE_GROUP
            )));
        }
        if name.trim().is_empty() {
            return Err(CfgError::Validation("Group name cannot be empty".to_string()));
        }
        if self.group(name).is_none() {
            let mut group = Group::new(name);
            group.component = component.map(str::to_string);
            self.groups.push(group);
        }
        Ok(())
    }

    /// Move a block into a group, taking it out of whichever group held it
    ///
    /// Assigning to `NONE` only removes the block from its explicit group.
    pub fn assign_to_group(&mut self, block: &str, group: &str) -> Result<()> {
        let block_name = self
            .block(block)
            .map(|b| b.name.clone())
            .ok_or_else(|| CfgError::NotFound(format!("Block {} in {}", block, self.name)))?;

        for existing in &mut self.groups {
            existing.remove(&block_name);
        }

        if group.eq_ignore_ascii_case(NONE_GROUP) {
            return Ok(());
        }

        self.add_group(group, None)?;
        if let Some(target) = self.groups.iter_mut().find(|g| g.is_named(group)) {
            target.blocks.push(block_name);
        }
        Ok(())
    }

    pub fn remove_group(&mut self, name: &str) -> Result<Group> {
        let index = self
            .groups
            .iter()
            .position(|g| g.is_named(name))
            .ok_or_else(|| CfgError::NotFound(format!("Group {} in {}", name, self.name)))?;
        Ok(self.groups.remove(index))
    }

    // ---------------------------------------------------------------------
    // IOCs
    // ---------------------------------------------------------------------

    pub fn iocs(&self) -> &BTreeMap<String, Ioc> {
        &self.iocs
    }

    pub fn ioc(&self, name: &str) -> Option<&Ioc> {
        self.iocs.get(&name.to_uppercase())
    }

    pub fn add_ioc(&mut self, ioc: Ioc) -> Result<()> {
        let ioc = ioc.normalized();
        if self.iocs.contains_key(&ioc.name) {
            return Err(CfgError::Guard(format!(
                "IOC {} already exists in {}",
                ioc.name, self.name
            )));
        }
        self.iocs.insert(ioc.name.clone(), ioc);
        Ok(())
    }

    pub fn remove_ioc(&mut self, name: &str) -> Result<Ioc> {
        self.iocs
            .remove(&name.to_uppercase())
            .ok_or_else(|| CfgError::NotFound(format!("IOC {} in {}", name, self.name)))
    }

    // ---------------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------------

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn references_component(&self, name: &str) -> bool {
        self.components.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn add_component(&mut self, name: &str) -> Result<()> {
        if self.is_component {
            return Err(CfgError::Guard(format!(
                "Component {} cannot reference other components",
                self.name
            )));
        }
        if self.references_component(name) {
            return Err(CfgError::Guard(format!(
                "Component {} already referenced by {}",
                name, self.name
            )));
        }
        self.components.push(name.to_string());
        Ok(())
    }

    pub fn remove_component(&mut self, name: &str) -> Result<()> {
        let before = self.components.len();
        self.components.retain(|c| !c.eq_ignore_ascii_case(name));
        if before == self.components.len() {
            return Err(CfgError::NotFound(format!(
                "Component {} in {}",
                name, self.name
            )));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Flattening
    // ---------------------------------------------------------------------

    /// Merge a component's contents into this configuration
    ///
    /// Items defined directly in the configuration win over component items of
    /// the same name. Merged items are tagged with the component name.
    pub fn merge_component(&mut self, component: &Configuration) {
        let owner = component.name.clone();
        let mut added = Vec::new();

        for block in component.blocks() {
            if self.block(&block.name).is_some() {
                tracing::warn!(
                    "[Config] [{}] Block {} from component {} shadowed by existing block",
                    self.name,
                    block.name,
                    owner
                );
                continue;
            }
            let mut block = block.clone();
            block.component = Some(owner.clone());
            added.push(block.name.clone());
            self.blocks.push(block);
        }

        for group in component.groups() {
            let members: Vec<String> = group
                .blocks
                .iter()
                .filter(|b| added.iter().any(|a| a.eq_ignore_ascii_case(b)))
                .cloned()
                .collect();
            match self.groups.iter_mut().find(|g| g.is_named(&group.name)) {
                Some(existing) => existing.blocks.extend(members),
                None => self.groups.push(Group {
                    name: group.name.clone(),
                    blocks: members,
                    component: Some(owner.clone()),
                }),
            }
        }

        for (name, ioc) in component.iocs() {
            if self.iocs.contains_key(name) {
                continue;
            }
            let mut ioc = ioc.clone();
            ioc.component = Some(owner.clone());
            self.iocs.insert(name.clone(), ioc);
        }
    }

    /// Copy holding only the items defined directly in this configuration
    ///
    /// Component blocks are dropped from group listings; groups owned by a
    /// component disappear entirely.
    pub fn without_component_items(&self) -> Configuration {
        let mut own = self.clone();
        own.blocks.retain(|b| b.component.is_none());
        own.iocs.retain(|_, ioc| ioc.component.is_none());
        own.groups.retain(|g| g.component.is_none());
        let own_blocks = own.blocks.clone();
        for group in &mut own.groups {
            group
                .blocks
                .retain(|name| own_blocks.iter().any(|b| b.is_named(name)));
        }
        own
    }

    /// Append an edit timestamp
    pub fn touch_history(&mut self, timestamp: impl Into<String>) {
        self.history.push(timestamp.into());
    }

    /// Replace all contents at once (used by the codecs)
    pub(crate) fn set_contents(
        &mut self,
        blocks: Vec<Block>,
        groups: Vec<Group>,
        iocs: Vec<Ioc>,
        components: Vec<String>,
    ) {
        self.blocks = blocks;
        self.groups = groups
            .into_iter()
            .filter(|g| !g.is_none_group())
            .collect();
        self.iocs = iocs
            .into_iter()
            .map(|ioc| {
                let ioc = ioc.normalized();
                (ioc.name.clone(), ioc)
            })
            .collect();
        self.components = components;
    }
}
