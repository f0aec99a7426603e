//! Hand-edit detection
//!
//! Watches the configuration and component directories. Events that arrive
//! while the guard is paused (or settling) are the engine's own writes and are
//! dropped. The rest are grouped per item directory, debounced, classified and
//! enqueued as [`Operation::HandEdit`] units so they run serialized with every
//! other mutation.
//!
//! Falls back to polling the tree when no native watcher can be created.

use crate::errors::Result;
use crate::queue::guard::FileWatcherGuard;
use crate::queue::write_queue::QueueHandle;
use crate::queue::{ChangeKind, HandEdit, Operation};
use crate::settings::WatcherSettings;
use crate::storage::{ConfigFileStore, ItemRef};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const HAND_EDIT_LABEL: &str = "Processing hand edit";

#[derive(Debug)]
struct Pending {
    last_event: Instant,
    created: bool,
}

/// Groups raw path events per item and releases them once quiet
pub(crate) struct ChangeTracker {
    files: Arc<ConfigFileStore>,
    debounce: Duration,
    pending: HashMap<ItemRef, Pending>,
}

impl ChangeTracker {
    pub(crate) fn new(files: Arc<ConfigFileStore>, debounce: Duration) -> Self {
        Self {
            files,
            debounce,
            pending: HashMap::new(),
        }
    }

    /// Record an event on `path`; `created` marks creation events
    pub(crate) fn observe(&mut self, path: &Path, created: bool, now: Instant) {
        let Some(item) = self.files.classify(path) else {
            return;
        };
        let item_dir_created = created
            && path.parent() == Some(self.files.namespace_root(item.is_component).as_path());

        let entry = self.pending.entry(item).or_insert(Pending {
            last_event: now,
            created: false,
        });
        entry.last_event = now;
        entry.created |= item_dir_created;
    }

    /// Items quiet for at least the debounce period
    pub(crate) fn due(&mut self, now: Instant) -> Vec<HandEdit> {
        let ready: Vec<ItemRef> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_event) >= self.debounce)
            .map(|(item, _)| item.clone())
            .collect();

        let mut edits = Vec::new();
        for item in ready {
            if let Some(pending) = self.pending.remove(&item) {
                let change = if !self.files.namespace_root(item.is_component).join(&item.name).exists() {
                    ChangeKind::Deleted
                } else if pending.created {
                    ChangeKind::New
                } else {
                    ChangeKind::Modified
                };
                edits.push(HandEdit { item, change });
            }
        }
        edits.sort_by(|a, b| a.item.name.cmp(&b.item.name));
        edits
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

pub struct FileWatcher {
    files: Arc<ConfigFileStore>,
    guard: FileWatcherGuard,
    queue: QueueHandle,
    debounce: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new(
        files: Arc<ConfigFileStore>,
        guard: FileWatcherGuard,
        queue: QueueHandle,
        settings: &WatcherSettings,
    ) -> Self {
        Self {
            files,
            guard,
            queue,
            debounce: settings.debounce(),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start watching on a background thread
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        self.files.ensure_layout()?;
        self.running.store(true, Ordering::SeqCst);

        let roots = [self.files.namespace_root(false), self.files.namespace_root(true)];
        let tracker = ChangeTracker::new(self.files.clone(), self.debounce);
        let guard = self.guard.clone();
        let queue = self.queue.clone();
        let running = self.running.clone();

        let (tx, rx) = channel();
        let spawned = match RecommendedWatcher::new(tx, NotifyConfig::default()) {
            Ok(mut watcher) => {
                for root in &roots {
                    watcher.watch(root, RecursiveMode::Recursive)?;
                }
                info!("[Watcher] Watching {} for hand edits", self.files.root().display());
                thread::Builder::new()
                    .name("blockcfg-watcher".to_string())
                    .spawn(move || {
                        // keep the native watcher alive for the loop's lifetime
                        let _watcher = watcher;
                        event_loop(rx, tracker, guard, queue, running);
                    })
            }
            Err(e) => {
                warn!("[Watcher] Native watcher unavailable, polling instead: {}", e);
                let interval = self.debounce.max(Duration::from_millis(100));
                thread::Builder::new()
                    .name("blockcfg-watcher".to_string())
                    .spawn(move || poll_loop(roots.to_vec(), interval, tracker, guard, queue, running))
            }
        };

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
            debug!("[Watcher] Stopped");
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flush_due(tracker: &mut ChangeTracker, guard: &FileWatcherGuard, queue: &QueueHandle) {
    if tracker.is_idle() || guard.is_paused() {
        return;
    }
    for edit in tracker.due(Instant::now()) {
        info!("[Watcher] {:?} by hand: {}", edit.change, edit.item.name);
        // nobody waits on hand-edit tickets
        let _ = queue.enqueue(Operation::HandEdit(edit), HAND_EDIT_LABEL);
    }
}

fn event_loop(
    rx: Receiver<notify::Result<Event>>,
    mut tracker: ChangeTracker,
    guard: FileWatcherGuard,
    queue: QueueHandle,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(Ok(event)) => {
                if !guard.accepts_events() {
                    continue;
                }
                let created = matches!(event.kind, EventKind::Create(_));
                let now = Instant::now();
                for path in &event.paths {
                    tracker.observe(path, created, now);
                }
            }
            Ok(Err(e)) => warn!("[Watcher] Watch error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        flush_due(&mut tracker, &guard, &queue);
    }
}

fn snapshot(roots: &[PathBuf]) -> BTreeMap<PathBuf, Option<SystemTime>> {
    let mut files = BTreeMap::new();
    for root in roots {
        for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            files.insert(entry.path().to_path_buf(), modified);
        }
    }
    files
}

fn poll_loop(
    roots: Vec<PathBuf>,
    interval: Duration,
    mut tracker: ChangeTracker,
    guard: FileWatcherGuard,
    queue: QueueHandle,
    running: Arc<AtomicBool>,
) {
    let mut previous = snapshot(&roots);
    while running.load(Ordering::SeqCst) {
        thread::sleep(interval);
        let current = snapshot(&roots);
        if guard.accepts_events() {
            let now = Instant::now();
            for (path, modified) in &current {
                match previous.get(path) {
                    None => tracker.observe(path, true, now),
                    Some(before) if before != modified => tracker.observe(path, false, now),
                    Some(_) => {}
                }
            }
            for path in previous.keys().filter(|p| !current.contains_key(*p)) {
                tracker.observe(path, false, now);
            }
        }
        previous = current;
        flush_due(&mut tracker, &guard, &queue);
    }
}
