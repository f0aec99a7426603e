//! Single-writer orchestration
//!
//! - `write_queue`: FIFO of mutating units, tickets, and the one consumer
//! - `guard`: pause/resume switch shared with the watcher
//! - `watcher`: detects hand-edits and enqueues them as units

mod guard;
mod watcher;
mod write_queue;

pub use guard::{FileWatcherGuard, PauseScope};
pub use watcher::FileWatcher;
pub use write_queue::{QueueConsumer, QueueHandle, QueueUnit, Ticket, UnitExecutor};

use crate::activation::{ActivationReport, ProcessAction, ProcessReport};
use crate::extensions::ExtensionKind;
use crate::model::{ConfigDetails, ConfigMeta};
use crate::storage::ItemRef;
use serde_json::Value as JsonValue;
use std::path::PathBuf;

/// How an item directory changed on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandEdit {
    pub item: ItemRef,
    pub change: ChangeKind,
}

/// A mutating request
#[derive(Debug, Clone)]
pub enum Operation {
    /// Load a stored configuration and make it active
    Load { name: String },
    /// Stage details and make them active
    SetActiveDetails(ConfigDetails),
    /// Stage details without activating
    StageDetails(ConfigDetails),
    /// Save the active (or staged) configuration, optionally under a new name
    SaveActive { as_name: Option<String> },
    /// Save a configuration or component that is not the active one
    SaveInactive(ConfigDetails),
    Delete { names: Vec<String>, is_component: bool },
    Processes { names: Vec<String>, action: ProcessAction },
    WriteExtension {
        kind: ExtensionKind,
        name: String,
        document: JsonValue,
    },
    /// Re-import everything from disk and re-apply the active configuration
    ReloadFromDisk,
    HandEdit(HandEdit),
}

impl Operation {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Operation::Load { name } => format!("load {}", name),
            Operation::SetActiveDetails(d) => format!("set active details {}", d.name),
            Operation::StageDetails(d) => format!("stage details {}", d.name),
            Operation::SaveActive { as_name: Some(name) } => format!("save active as {}", name),
            Operation::SaveActive { as_name: None } => "save active".to_string(),
            Operation::SaveInactive(d) => format!("save inactive {}", d.name),
            Operation::Delete { names, is_component } => format!(
                "delete {} {}",
                if *is_component { "components" } else { "configurations" },
                names.join(", ")
            ),
            Operation::Processes { names, action } => format!("{} {}", action, names.join(", ")),
            Operation::WriteExtension { kind, name, .. } => format!("write {} {}", kind, name),
            Operation::ReloadFromDisk => "reload from disk".to_string(),
            Operation::HandEdit(edit) => format!("hand edit {:?} {}", edit.change, edit.item.name),
        }
    }
}

/// What a unit produced
#[derive(Debug, Clone)]
pub enum Outcome {
    Done,
    Saved(ConfigMeta),
    Activated(ActivationReport),
    Processes(Vec<ProcessReport>),
    Written(PathBuf),
}
