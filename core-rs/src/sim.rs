//! In-memory collaborators
//!
//! Stand-ins for the version control backend, the process-control service and
//! the run-control transport. `blockcfg serve --simulate` runs the engine on
//! them and the test suites use them to observe what the engine did.

use crate::activation::{ProcessControl, ProcessStatus, RunControlTransport};
use crate::errors::{CfgError, Result};
use crate::vcs::VcsBackend;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// VCS backend that records every call instead of running git
///
/// Log entries: `add <path>`, `remove <path>`, `commit <message>`, `pull`,
/// `push`, `push-failed`, `local-failed <verb>`.
#[derive(Debug)]
pub struct RecordingVcs {
    branch: String,
    repository: bool,
    remote_down: Arc<AtomicBool>,
    local_down: Arc<AtomicBool>,
    commit_down: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<String>>>,
    staged: AtomicBool,
}

impl RecordingVcs {
    pub fn new(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            repository: true,
            remote_down: Arc::new(AtomicBool::new(false)),
            local_down: Arc::new(AtomicBool::new(false)),
            commit_down: Arc::new(AtomicBool::new(false)),
            log: Arc::new(Mutex::new(Vec::new())),
            staged: AtomicBool::new(false),
        }
    }

    pub fn not_a_repository(mut self) -> Self {
        self.repository = false;
        self
    }

    /// Make pull/push fail until switched back
    pub fn fail_remote(&self, down: bool) {
        self.remote_down.store(down, Ordering::SeqCst);
    }

    /// Shared switch for flipping the remote after the backend is boxed
    pub fn remote_switch(&self) -> Arc<AtomicBool> {
        self.remote_down.clone()
    }

    /// Shared switch making add/remove/commit fail, as a broken working copy would
    pub fn local_switch(&self) -> Arc<AtomicBool> {
        self.local_down.clone()
    }

    /// Shared switch making only commit fail; staging still works
    pub fn commit_switch(&self) -> Arc<AtomicBool> {
        self.commit_down.clone()
    }

    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        self.log.clone()
    }

    fn record(&self, entry: String) {
        lock(&self.log).push(entry);
    }

    fn check_local(&self, verb: &str) -> Result<()> {
        let down = self.local_down.load(Ordering::SeqCst)
            || (verb == "commit" && self.commit_down.load(Ordering::SeqCst));
        if down {
            self.record(format!("local-failed {}", verb));
            return Err(CfgError::Unexpected(format!("git {} failed: index.lock exists", verb)));
        }
        Ok(())
    }
}

impl VcsBackend for RecordingVcs {
    fn is_repository(&self) -> bool {
        self.repository
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.branch.clone())
    }

    fn add(&self, path: &Path) -> Result<()> {
        self.check_local("add")?;
        self.record(format!("add {}", path.display()));
        self.staged.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.check_local("rm")?;
        self.record(format!("remove {}", path.display()));
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        self.staged.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<Option<String>> {
        self.check_local("commit")?;
        if !self.staged.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.record(format!("commit {}", message));
        let count = lock(&self.log).iter().filter(|e| e.starts_with("commit")).count();
        Ok(Some(format!("{:040x}", count)))
    }

    fn pull(&self) -> Result<()> {
        if self.remote_down.load(Ordering::SeqCst) {
            return Err(CfgError::TransientVcs("remote unreachable".to_string()));
        }
        self.record("pull".to_string());
        Ok(())
    }

    fn push(&self) -> Result<()> {
        if self.remote_down.load(Ordering::SeqCst) {
            self.record("push-failed".to_string());
            return Err(CfgError::TransientVcs("remote unreachable".to_string()));
        }
        self.record("push".to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SimProcess {
    running: bool,
    autorestart: bool,
    /// Accepts commands but never changes state
    hung: bool,
}

/// Process-control service holding registered processes in memory
#[derive(Debug, Default)]
pub struct SimulatedProcesses {
    processes: Mutex<BTreeMap<String, SimProcess>>,
    history: Mutex<Vec<String>>,
    /// Register unknown processes on first use instead of failing
    permissive: bool,
}

impl SimulatedProcesses {
    pub fn new(names: &[&str]) -> Self {
        let sim = Self::default();
        for name in names {
            sim.register(name);
        }
        sim
    }

    /// Accepts any process name
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn register(&self, name: &str) {
        lock(&self.processes).entry(name.to_uppercase()).or_default();
    }

    pub fn set_running(&self, name: &str, running: bool) {
        if let Some(p) = lock(&self.processes).get_mut(&name.to_uppercase()) {
            p.running = running;
        }
    }

    pub fn hang(&self, name: &str) {
        if let Some(p) = lock(&self.processes).get_mut(&name.to_uppercase()) {
            p.hung = true;
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        lock(&self.processes)
            .get(&name.to_uppercase())
            .map(|p| p.running)
            .unwrap_or(false)
    }

    pub fn autorestart(&self, name: &str) -> Option<bool> {
        lock(&self.processes)
            .get(&name.to_uppercase())
            .map(|p| p.autorestart)
    }

    /// Commands received so far, e.g. `start SIMPLE`
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    fn command(&self, verb: &str, name: &str, running: bool) -> Result<()> {
        let key = name.to_uppercase();
        if self.permissive {
            self.register(&key);
        }
        let mut processes = lock(&self.processes);
        let process = processes
            .get_mut(&key)
            .ok_or_else(|| CfgError::process(name, "not registered"))?;
        lock(&self.history).push(format!("{} {}", verb, key));
        if !process.hung {
            process.running = running;
        }
        Ok(())
    }
}

impl ProcessControl for SimulatedProcesses {
    fn start(&self, name: &str) -> Result<()> {
        self.command("start", name, true)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.command("stop", name, false)
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.command("restart", name, true)
    }

    fn status(&self, name: &str) -> Result<ProcessStatus> {
        match lock(&self.processes).get(&name.to_uppercase()) {
            Some(p) if p.running => Ok(ProcessStatus::Running),
            Some(_) => Ok(ProcessStatus::Shutdown),
            None if self.permissive => Ok(ProcessStatus::Shutdown),
            None => Err(CfgError::process(name, "not registered")),
        }
    }

    fn set_autorestart(&self, name: &str, enabled: bool) -> Result<()> {
        if self.permissive {
            self.register(name);
        }
        let mut processes = lock(&self.processes);
        let process = processes
            .get_mut(&name.to_uppercase())
            .ok_or_else(|| CfgError::process(name, "not registered"))?;
        process.autorestart = enabled;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run-control
// ---------------------------------------------------------------------------

/// Key/value run-control transport; unknown keys read as empty
#[derive(Debug, Default)]
pub struct SimulatedRunControl {
    values: Mutex<BTreeMap<String, String>>,
    rejected: Mutex<Vec<String>>,
}

impl SimulatedRunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    /// Fail every get/set whose key starts with `prefix`
    pub fn reject(&self, prefix: &str) {
        lock(&self.rejected).push(prefix.to_string());
    }

    fn check(&self, key: &str) -> Result<()> {
        if lock(&self.rejected).iter().any(|p| key.starts_with(p.as_str())) {
            return Err(CfgError::Unexpected(format!("{} is not reachable", key)));
        }
        Ok(())
    }
}

impl RunControlTransport for SimulatedRunControl {
    fn get(&self, key: &str) -> Result<String> {
        self.check(key)?;
        Ok(self.value(key).unwrap_or_default())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check(key)?;
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}
