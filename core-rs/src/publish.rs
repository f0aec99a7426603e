//! Read-only metadata published for concurrent readers
//!
//! Only the queue consumer writes here. Readers take a cloned snapshot under a
//! short read lock, or subscribe to [`Topic`] notifications.

use crate::model::{ConfigDetails, ConfigMeta, Configuration, Group};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Which part of the snapshot changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Configs,
    Components,
    Dependencies,
    ActiveName,
    ActiveDetails,
    StagedDetails,
    BlockNames,
    Groups,
    Status,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSnapshot {
    pub configs: Vec<ConfigMeta>,
    pub components: Vec<ConfigMeta>,
    /// component -> configurations using it
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub active_name: String,
    pub active_details: Option<ConfigDetails>,
    pub staged_details: Option<ConfigDetails>,
    pub block_names: Vec<String>,
    pub groups: Vec<Group>,
    /// Label of the unit currently executing, empty when idle
    pub status: String,
}

pub struct MetadataBoard {
    snapshot: RwLock<MetadataSnapshot>,
    changes: broadcast::Sender<Topic>,
}

impl Default for MetadataBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataBoard {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            snapshot: RwLock::new(MetadataSnapshot::default()),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MetadataSnapshot> {
        self.snapshot.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MetadataSnapshot> {
        self.snapshot.write().unwrap_or_else(|p| p.into_inner())
    }

    fn notify(&self, topics: &[Topic]) {
        for topic in topics {
            // no receivers is fine
            let _ = self.changes.send(*topic);
        }
    }

    pub fn snapshot(&self) -> MetadataSnapshot {
        self.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.changes.subscribe()
    }

    pub fn status(&self) -> String {
        self.read().status.clone()
    }

    pub fn active_name(&self) -> String {
        self.read().active_name.clone()
    }

    pub fn set_status(&self, label: &str) {
        self.write().status = label.to_string();
        self.notify(&[Topic::Status]);
    }

    pub fn publish_catalogue(
        &self,
        configs: Vec<ConfigMeta>,
        components: Vec<ConfigMeta>,
        dependencies: BTreeMap<String, Vec<String>>,
    ) {
        {
            let mut snapshot = self.write();
            snapshot.configs = configs;
            snapshot.components = components;
            snapshot.dependencies = dependencies;
        }
        self.notify(&[Topic::Configs, Topic::Components, Topic::Dependencies]);
    }

    pub fn publish_active(&self, live: &Configuration) {
        {
            let mut snapshot = self.write();
            snapshot.active_name = live.name.clone();
            snapshot.active_details = Some(live.to_details());
            snapshot.block_names = live
                .blocks()
                .iter()
                .filter(|b| b.visible)
                .map(|b| b.name.to_uppercase())
                .collect();
            snapshot.groups = live.groups_with_none();
        }
        self.notify(&[
            Topic::ActiveName,
            Topic::ActiveDetails,
            Topic::BlockNames,
            Topic::Groups,
        ]);
    }

    pub fn publish_staged(&self, staged: Option<&Configuration>) {
        self.write().staged_details = staged.map(|c| c.to_details());
        self.notify(&[Topic::StagedDetails]);
    }
}
