//! Versioned persistence for the configuration data root
//!
//! `add`/`remove`/`commit` are synchronous and local. A successful commit marks
//! a push as pending; the push loop (started explicitly with
//! [`RevisionStore::start`]) drains that flag on its own thread, backing off to
//! the retry interval while the remote is unreachable.
//!
//! When the data root cannot be versioned (not a repository, disallowed
//! branch) [`open_store`] substitutes a [`NullStore`] so the engine keeps
//! working with filesystem-only persistence.

use crate::errors::{CfgError, ErrorKind, Result};
use crate::settings::VcsSettings;
use crate::vcs::backend::VcsBackend;
use crate::vcs::git::GitBackend;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Persistence contract used by the catalogue and activation engine
pub trait RevisionStore: Send + Sync {
    /// Track a written file or directory
    fn add(&self, path: &Path) -> Result<()>;

    /// Delete a file or directory and stop tracking it
    fn remove(&self, path: &Path) -> Result<()>;

    fn commit(&self, message: &str) -> Result<()>;

    /// Pull, then commit any local drift under `path`
    fn update(&self, path: &Path) -> Result<()>;

    /// False for the filesystem-only fallback
    fn is_versioned(&self) -> bool;

    fn push_pending(&self) -> bool {
        false
    }

    /// Push now if a push is pending
    fn flush_push(&self) -> Result<()> {
        Ok(())
    }

    fn start(&self) {}

    fn stop(&self) {}
}

/// Shared between the store handle and its push thread
struct StoreShared {
    backend: Box<dyn VcsBackend>,
    root: PathBuf,
    ignore: Vec<Regex>,
    push_pending: AtomicBool,
    running: AtomicBool,
    push_interval: Duration,
    retry_interval: Duration,
}

impl StoreShared {
    fn is_ignored(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components().any(|c| {
            let part = c.as_os_str().to_string_lossy();
            self.ignore.iter().any(|re| re.is_match(&part))
        })
    }

    fn try_push(&self) -> Result<()> {
        if !self.push_pending.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        match self.backend.push() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.push_pending.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

/// Repository-backed store
pub struct VersionedStore {
    shared: Arc<StoreShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VersionedStore {
    /// Open the store on an existing working copy
    ///
    /// Fails with a structural error when the root is not a repository or is on
    /// a disallowed branch, and with a transient error when the initial pull
    /// fails.
    pub fn open(root: PathBuf, settings: &VcsSettings, backend: Box<dyn VcsBackend>) -> Result<Self> {
        if !backend.is_repository() {
            return Err(CfgError::StructuralVcs(format!(
                "{} is not under version control",
                root.display()
            )));
        }

        let branch = backend.current_branch()?;
        check_branch(&branch, settings)?;

        let ignore = settings
            .ignore_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!("[VCS] Pulling {} (branch {})", root.display(), branch);
        backend.pull()?;

        Ok(Self {
            shared: Arc::new(StoreShared {
                backend,
                root,
                ignore,
                push_pending: AtomicBool::new(false),
                running: AtomicBool::new(false),
                push_interval: settings.push_interval(),
                retry_interval: settings.retry_interval(),
            }),
            worker: Mutex::new(None),
        })
    }

    fn push_loop(shared: Arc<StoreShared>) {
        let mut interval = shared.push_interval;
        let mut failing = false;

        while shared.running.load(Ordering::SeqCst) {
            if shared.push_pending.load(Ordering::SeqCst) {
                match shared.try_push() {
                    Ok(()) => {
                        if failing {
                            info!("[VCS] Push succeeded after earlier failures");
                        } else {
                            debug!("[VCS] Pushed");
                        }
                        failing = false;
                        interval = shared.push_interval;
                    }
                    Err(e) => {
                        if !failing {
                            warn!(
                                "[VCS] Unable to push configuration changes, retrying every {:?}: {}",
                                shared.retry_interval, e
                            );
                        }
                        failing = true;
                        interval = shared.retry_interval;
                    }
                }
            }
            sleep_while(&shared.running, interval);
        }
    }
}

/// Sleep up to `total`, waking early once `flag` drops
fn sleep_while(flag: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    let slice = Duration::from_millis(25);
    while flag.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(slice.min(deadline - now));
    }
}

fn check_branch(branch: &str, settings: &VcsSettings) -> Result<()> {
    if settings
        .disallowed_branches
        .iter()
        .any(|b| b.eq_ignore_ascii_case(branch))
    {
        return Err(CfgError::StructuralVcs(format!(
            "Refusing to manage configurations on shared branch {}",
            branch
        )));
    }

    if let Some(pattern) = &settings.host_branch_pattern {
        let host_branch = Regex::new(pattern)?;
        if host_branch.is_match(branch) {
            let host = settings.resolved_host_name().unwrap_or_default();
            if !branch.eq_ignore_ascii_case(&host) {
                return Err(CfgError::StructuralVcs(format!(
                    "Branch {} belongs to another host (this host is {:?})",
                    branch, host
                )));
            }
        }
    }
    Ok(())
}

impl RevisionStore for VersionedStore {
    fn add(&self, path: &Path) -> Result<()> {
        if self.shared.is_ignored(path) {
            return Ok(());
        }
        self.shared.backend.add(path)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if self.shared.is_ignored(path) {
            return remove_path(path);
        }
        self.shared.backend.remove(path)
    }

    fn commit(&self, message: &str) -> Result<()> {
        match self.shared.backend.commit(message)? {
            Some(hash) => {
                info!("[VCS] Committed {}: {}", short_hash(&hash), message);
                self.shared.push_pending.store(true, Ordering::SeqCst);
            }
            None => debug!("[VCS] Nothing to commit for: {}", message),
        }
        Ok(())
    }

    fn update(&self, path: &Path) -> Result<()> {
        self.shared.backend.pull()?;
        if self.shared.is_ignored(path) {
            return Ok(());
        }
        self.shared.backend.add(path)?;
        self.commit(&format!(
            "Local changes recovered in {}",
            path.strip_prefix(&self.shared.root).unwrap_or(path).display()
        ))
    }

    fn is_versioned(&self) -> bool {
        true
    }

    fn push_pending(&self) -> bool {
        self.shared.push_pending.load(Ordering::SeqCst)
    }

    fn flush_push(&self) -> Result<()> {
        self.shared.try_push()
    }

    fn start(&self) {
        let mut worker = match self.worker.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if worker.is_some() {
            return;
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("blockcfg-vcs-push".to_string())
            .spawn(move || VersionedStore::push_loop(shared));
        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                error!("[VCS] Could not start push thread: {}", e);
            }
        }
    }

    fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = match self.worker.lock() {
            Ok(mut w) => w.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for VersionedStore {
    fn drop(&mut self) {
        self.stop();
    }
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Filesystem-only store used when version control is unavailable
#[derive(Debug, Default)]
pub struct NullStore;

impl RevisionStore for NullStore {
    fn add(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        remove_path(path)
    }

    fn commit(&self, message: &str) -> Result<()> {
        debug!("[VCS] (unversioned) {}", message);
        Ok(())
    }

    fn update(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn is_versioned(&self) -> bool {
        false
    }
}

/// Open a git-backed store, falling back to [`NullStore`] on structural problems
pub fn open_store(root: &Path, settings: &VcsSettings) -> Result<Arc<dyn RevisionStore>> {
    let backend = Box::new(GitBackend::new(root.to_path_buf()));
    open_store_with(root, settings, backend)
}

/// Same as [`open_store`] with an explicit backend
pub fn open_store_with(
    root: &Path,
    settings: &VcsSettings,
    backend: Box<dyn VcsBackend>,
) -> Result<Arc<dyn RevisionStore>> {
    if !settings.enabled {
        info!("[VCS] Version control disabled in settings");
        return Ok(Arc::new(NullStore));
    }

    match VersionedStore::open(root.to_path_buf(), settings, backend) {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if e.kind() == ErrorKind::StructuralVcs => {
            warn!(
                "[VCS] {}. Changes will be saved to disk but NOT version controlled",
                e
            );
            Ok(Arc::new(NullStore))
        }
        Err(e) => Err(e),
    }
}
