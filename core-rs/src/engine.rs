//! Engine composition and lifecycle
//!
//! [`Engine`] owns everything: the catalogue, the active configuration, the
//! store, the queue and the watcher. Nothing is global. Mutating calls only
//! enqueue and hand back a [`Ticket`]; reads come from the published
//! metadata snapshot.
//!
//! Background work is explicit:
//! - [`Engine::start`] starts the push loop, the watcher and the consumer thread
//! - [`Engine::stop`] stops them again
//! - [`Engine::flush`] runs queued units on the caller's thread while stopped
//!
//! ## Usage
//!
//! ```no_run
//! use blockcfg_core::engine::{Collaborators, Engine};
//! use blockcfg_core::settings::EngineSettings;
//! use std::path::PathBuf;
//!
//! let engine = Engine::open(
//!     PathBuf::from("/instrument/settings/config"),
//!     EngineSettings::default(),
//!     Collaborators::simulated(),
//! ).unwrap();
//! engine.start().unwrap();
//! engine.load("Beamline").wait().unwrap();
//! engine.stop();
//! ```

use crate::activation::{
    ActiveConfigHolder, ProcessAction, ProcessControl, ProcessSupervisor, RunControlTransport,
};
use crate::catalogue::ConfigListManager;
use crate::errors::{CfgError, Result};
use crate::extensions::{ExtensionKind, ExtensionRegistry};
use crate::model::validation::{validate_component_references, validate_configuration, validate_item_name};
use crate::model::{ConfigDetails, ConfigMeta, Configuration, SchemaValidator, StructuralValidator};
use crate::publish::{MetadataBoard, MetadataSnapshot, Topic};
use crate::queue::{
    ChangeKind, FileWatcher, FileWatcherGuard, HandEdit, Operation, Outcome, QueueConsumer,
    QueueHandle, Ticket, UnitExecutor,
};
use crate::settings::EngineSettings;
use crate::sim::{SimulatedProcesses, SimulatedRunControl};
use crate::storage::ConfigFileStore;
use crate::vcs::{open_store, open_store_with, RevisionStore, VcsBackend};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// External collaborators the engine is built on
pub struct Collaborators {
    pub processes: Arc<dyn ProcessControl>,
    pub run_control: Arc<dyn RunControlTransport>,
    pub validator: Arc<dyn SchemaValidator>,
    /// `None` uses git in the data root
    pub vcs: Option<Box<dyn VcsBackend>>,
}

impl Collaborators {
    /// In-memory process control and run-control, git for versioning
    pub fn simulated() -> Self {
        Self {
            processes: Arc::new(SimulatedProcesses::permissive()),
            run_control: Arc::new(SimulatedRunControl::new()),
            validator: Arc::new(StructuralValidator),
            vcs: None,
        }
    }

    pub fn with_vcs(mut self, backend: Box<dyn VcsBackend>) -> Self {
        self.vcs = Some(backend);
        self
    }
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// State owned by the queue consumer
pub struct EngineCore {
    files: Arc<ConfigFileStore>,
    store: Arc<dyn RevisionStore>,
    extensions: Arc<ExtensionRegistry>,
    catalogue: ConfigListManager,
    holder: ActiveConfigHolder,
}

impl EngineCore {
    pub fn catalogue(&self) -> &ConfigListManager {
        &self.catalogue
    }

    pub fn holder(&self) -> &ActiveConfigHolder {
        &self.holder
    }

    fn active_name(&self) -> Option<String> {
        let name = self.holder.active_name();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn reload_if_affected(&mut self, name: &str, is_component: bool) {
        if !self.holder.is_affected_by(name, is_component) {
            return;
        }
        info!("[Engine] {} changed, reloading the active configuration", name);
        if let Err(e) = self.holder.reload(&self.catalogue) {
            error!("[Engine] Could not reload the active configuration: {}", e);
        }
    }

    fn save_inactive(&mut self, details: ConfigDetails) -> Result<Outcome> {
        let is_component = details.component;
        let mut config = Configuration::from_details(&details)?;
        validate_item_name(&config.name)?;
        validate_configuration(&config)?;
        if !is_component {
            let known = self.catalogue.component_names();
            validate_component_references(&config, known.iter().map(|s| s.as_str()))?;
        }
        self.catalogue.guard_overwrite(&config.name, is_component)?;

        config.touch_history(timestamp());
        let meta = self
            .catalogue
            .persist(&config, &format!("{} saved", config.name))?;
        self.reload_if_affected(&meta.name, is_component);
        Ok(Outcome::Saved(meta))
    }

    fn write_extension(&mut self, kind: ExtensionKind, name: &str, document: &JsonValue) -> Result<Outcome> {
        let path = self.extensions.write(kind, name, document)?;
        self.store.add(&path)?;
        self.store.commit(&format!("{} {} updated", kind, name))?;
        Ok(Outcome::Written(path))
    }

    fn reload_from_disk(&mut self) -> Result<Outcome> {
        self.store.update(self.files.root())?;
        self.catalogue.import_all()?;
        Ok(Outcome::Activated(self.holder.reload(&self.catalogue)?))
    }

    fn apply_hand_edit(&mut self, edit: HandEdit) -> Result<Outcome> {
        let HandEdit { item, change } = edit;
        let dir = self.files.item_dir(&item.name, item.is_component);

        if change == ChangeKind::Deleted {
            if !self.catalogue.contains(&item.name, item.is_component) {
                return Ok(Outcome::Done);
            }
            self.store.remove(&dir)?;
            self.store.commit(&format!("{} deleted by hand", item.name))?;
            self.catalogue.remove_by_hand(&item.name, item.is_component);
            if self.holder.is_affected_by(&item.name, item.is_component) {
                warn!(
                    "[Engine] {} was deleted by hand but is in use by the active configuration",
                    item.name
                );
            }
            return Ok(Outcome::Done);
        }

        let config = self.files.read(&item.name, item.is_component)?;
        if !item.is_component {
            let known = self.catalogue.component_names();
            validate_component_references(&config, known.iter().map(|s| s.as_str()))?;
        }
        self.store.add(&dir)?;
        self.store
            .commit(&format!("{} modified by hand", config.name))?;
        self.catalogue.upsert(&config);
        info!("[Engine] Re-imported {} ({:?})", config.name, change);

        self.reload_if_affected(&config.name, item.is_component);
        Ok(Outcome::Done)
    }
}

impl UnitExecutor for EngineCore {
    fn execute(&mut self, operation: Operation) -> Result<Outcome> {
        match operation {
            Operation::Load { name } => {
                self.holder.load(&name, false, &self.catalogue)?;
                Ok(Outcome::Activated(self.holder.activate(true)))
            }
            Operation::SetActiveDetails(details) => {
                self.holder.set_details(&details, &self.catalogue)?;
                Ok(Outcome::Activated(self.holder.activate(true)))
            }
            Operation::StageDetails(details) => {
                self.holder.set_details(&details, &self.catalogue)?;
                Ok(Outcome::Done)
            }
            Operation::SaveActive { as_name } => {
                let meta = self.holder.save(as_name.as_deref(), &mut self.catalogue)?;
                Ok(Outcome::Saved(meta))
            }
            Operation::SaveInactive(details) => self.save_inactive(details),
            Operation::Delete {
                names,
                is_component,
            } => {
                let active = self.active_name();
                self.catalogue
                    .delete(&names, active.as_deref(), is_component)?;
                Ok(Outcome::Done)
            }
            Operation::Processes { names, action } => Ok(Outcome::Processes(
                self.holder.supervisor().perform_all(&names, action),
            )),
            Operation::WriteExtension {
                kind,
                name,
                document,
            } => self.write_extension(kind, &name, &document),
            Operation::ReloadFromDisk => self.reload_from_disk(),
            Operation::HandEdit(edit) => self.apply_hand_edit(edit),
        }
    }
}

pub struct Engine {
    root: PathBuf,
    settings: EngineSettings,
    store: Arc<dyn RevisionStore>,
    board: Arc<MetadataBoard>,
    extensions: Arc<ExtensionRegistry>,
    queue: QueueHandle,
    consumer: Mutex<Option<QueueConsumer<EngineCore>>>,
    worker: Mutex<Option<JoinHandle<QueueConsumer<EngineCore>>>>,
    shutdown: Arc<AtomicBool>,
    watcher: Mutex<FileWatcher>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl Engine {
    /// Build the engine, import the catalogue and restore the last active configuration
    ///
    /// No background thread is started.
    pub fn open(root: PathBuf, settings: EngineSettings, collaborators: Collaborators) -> Result<Self> {
        settings.validate()?;
        let Collaborators {
            processes,
            run_control,
            validator,
            vcs,
        } = collaborators;

        let files = Arc::new(ConfigFileStore::new(
            root.clone(),
            settings.layout.clone(),
            validator,
        ));
        files.ensure_layout()?;

        let store = match vcs {
            Some(backend) => open_store_with(&root, &settings.vcs, backend)?,
            None => open_store(&root, &settings.vcs)?,
        };

        let board = Arc::new(MetadataBoard::new());
        let queue = QueueHandle::new();
        let guard = FileWatcherGuard::new(settings.watcher.settle());
        let extensions = Arc::new(ExtensionRegistry::standard(
            run_control,
            &settings.run_control.prefix,
            files.synoptics_root(),
            files.devices_root(),
        ));

        let mut catalogue = ConfigListManager::new(files.clone(), store.clone(), board.clone());
        let supervisor = ProcessSupervisor::new(processes, &settings.process);
        let mut holder =
            ActiveConfigHolder::new(files.clone(), supervisor, extensions.clone(), board.clone());
        {
            let _paused = guard.paused();
            catalogue.import_all()?;
            holder.restore_last(&catalogue);
        }

        let core = EngineCore {
            files: files.clone(),
            store: store.clone(),
            extensions: extensions.clone(),
            catalogue,
            holder,
        };
        let consumer = QueueConsumer::new(
            queue.clone(),
            guard.clone(),
            board.clone(),
            core,
            settings.queue.idle_sleep(),
        );
        let watcher = FileWatcher::new(files, guard, queue.clone(), &settings.watcher);

        info!(
            "[Engine] Opened {} ({})",
            root.display(),
            if store.is_versioned() { "versioned" } else { "unversioned" }
        );

        Ok(Self {
            root,
            settings,
            store,
            board,
            extensions,
            queue,
            consumer: Mutex::new(Some(consumer)),
            worker: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            watcher: Mutex::new(watcher),
        })
    }

    /// Open with settings from `<root>/blockcfg.yaml` (defaults if absent)
    pub fn open_root(root: &Path, collaborators: Collaborators) -> Result<Self> {
        let settings = EngineSettings::load_from_root(root)?;
        Self::open(root.to_path_buf(), settings, collaborators)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    /// Start the push loop, the watcher and the queue consumer
    pub fn start(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }
        let mut consumer = lock(&self.consumer)
            .take()
            .ok_or_else(|| CfgError::Unexpected("queue consumer is missing".to_string()))?;

        self.store.start();
        if self.settings.watcher.enabled {
            if let Err(e) = lock(&self.watcher).start() {
                warn!("[Engine] Hand edits will not be detected: {}", e);
            }
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name("blockcfg-queue".to_string())
            .spawn(move || {
                consumer.run(&shutdown);
                consumer
            })?;
        *worker = Some(handle);
        info!("[Engine] Started");
        Ok(())
    }

    /// Stop background work; queued units stay queued
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = lock(&self.worker).take() {
            match handle.join() {
                Ok(consumer) => *lock(&self.consumer) = Some(consumer),
                Err(_) => error!("[Engine] MAJOR: queue consumer thread panicked"),
            }
            info!("[Engine] Stopped");
        }
        lock(&self.watcher).stop();
        self.store.stop();
    }

    /// Run queued units on this thread; only while stopped
    ///
    /// Returns the number of units run (0 while the consumer thread owns the queue).
    pub fn flush(&self) -> usize {
        match lock(&self.consumer).as_mut() {
            Some(consumer) => consumer.run_pending(),
            None => 0,
        }
    }

    /// Push pending commits now
    pub fn flush_push(&self) -> Result<()> {
        self.store.flush_push()
    }

    pub fn is_versioned(&self) -> bool {
        self.store.is_versioned()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> MetadataSnapshot {
        self.board.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Topic> {
        self.board.subscribe()
    }

    pub fn list(&self, is_component: bool) -> Vec<ConfigMeta> {
        let snapshot = self.board.snapshot();
        if is_component {
            snapshot.components
        } else {
            snapshot.configs
        }
    }

    pub fn active_name(&self) -> String {
        self.board.active_name()
    }

    pub fn active_details(&self) -> Option<ConfigDetails> {
        self.board.snapshot().active_details
    }

    pub fn staged_details(&self) -> Option<ConfigDetails> {
        self.board.snapshot().staged_details
    }

    pub fn dependencies(&self) -> BTreeMap<String, Vec<String>> {
        self.board.snapshot().dependencies
    }

    pub fn status(&self) -> String {
        self.board.status()
    }

    pub fn read_extension(&self, kind: ExtensionKind, name: Option<&str>) -> Result<JsonValue> {
        self.extensions.read(kind, name)
    }

    // ---------------------------------------------------------------------
    // Mutations (enqueued)
    // ---------------------------------------------------------------------

    pub fn load(&self, name: &str) -> Ticket {
        self.queue.enqueue(
            Operation::Load {
                name: name.to_string(),
            },
            format!("Loading {}", name),
        )
    }

    pub fn set_active_details(&self, details: ConfigDetails) -> Ticket {
        let label = format!("Applying {}", details.name);
        self.queue.enqueue(Operation::SetActiveDetails(details), label)
    }

    pub fn stage_details(&self, details: ConfigDetails) -> Ticket {
        self.queue
            .enqueue(Operation::StageDetails(details), "Staging configuration")
    }

    pub fn save_active(&self, as_name: Option<&str>) -> Ticket {
        self.queue.enqueue(
            Operation::SaveActive {
                as_name: as_name.map(str::to_string),
            },
            "Saving configuration",
        )
    }

    pub fn save_inactive(&self, details: ConfigDetails) -> Ticket {
        let label = format!("Saving {}", details.name);
        self.queue.enqueue(Operation::SaveInactive(details), label)
    }

    pub fn delete(&self, names: &[&str], is_component: bool) -> Ticket {
        self.queue.enqueue(
            Operation::Delete {
                names: names.iter().map(|n| n.to_string()).collect(),
                is_component,
            },
            "Deleting",
        )
    }

    fn processes(&self, names: &[&str], action: ProcessAction) -> Ticket {
        self.queue.enqueue(
            Operation::Processes {
                names: names.iter().map(|n| n.to_uppercase()).collect(),
                action,
            },
            format!("Process {}", action),
        )
    }

    pub fn start_processes(&self, names: &[&str]) -> Ticket {
        self.processes(names, ProcessAction::Start)
    }

    pub fn stop_processes(&self, names: &[&str]) -> Ticket {
        self.processes(names, ProcessAction::Stop)
    }

    pub fn restart_processes(&self, names: &[&str]) -> Ticket {
        self.processes(names, ProcessAction::Restart)
    }

    pub fn write_extension(&self, kind: ExtensionKind, name: &str, document: JsonValue) -> Ticket {
        self.queue.enqueue(
            Operation::WriteExtension {
                kind,
                name: name.to_string(),
                document,
            },
            format!("Writing {}", kind),
        )
    }

    pub fn reload_from_disk(&self) -> Ticket {
        self.queue
            .enqueue(Operation::ReloadFromDisk, "Reloading from disk")
    }

    /// Queue a hand-edit as the watcher would
    pub fn hand_edit(&self, edit: HandEdit) -> Ticket {
        self.queue
            .enqueue(Operation::HandEdit(edit), "Processing hand edit")
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
