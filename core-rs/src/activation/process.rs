//! Managed process control
//!
//! The engine never talks to processes directly; it goes through a
//! [`ProcessControl`] collaborator and waits for the requested state with a
//! bounded number of status polls. A poll loop that runs out is escalated
//! (logged as MAJOR) and fails that one action only.

use crate::errors::{CfgError, Result};
use crate::settings::ProcessSettings;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Running,
    Shutdown,
    Unknown,
}

/// External process-control collaborator
///
/// Individual calls may fail when the named process is not registered.
pub trait ProcessControl: Send + Sync {
    fn start(&self, name: &str) -> Result<()>;

    fn stop(&self, name: &str) -> Result<()>;

    fn restart(&self, name: &str) -> Result<()>;

    fn status(&self, name: &str) -> Result<ProcessStatus>;

    fn set_autorestart(&self, name: &str, enabled: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessAction {
    Start,
    Stop,
    Restart,
}

impl std::fmt::Display for ProcessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessAction::Start => write!(f, "start"),
            ProcessAction::Stop => write!(f, "stop"),
            ProcessAction::Restart => write!(f, "restart"),
        }
    }
}

/// Result of one process action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessReport {
    pub process: String,
    pub action: ProcessAction,
    /// None on success
    pub error: Option<String>,
}

impl ProcessReport {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives a [`ProcessControl`] and waits (bounded) for the outcome
pub struct ProcessSupervisor {
    control: Arc<dyn ProcessControl>,
    poll_interval: Duration,
    max_polls: u32,
    protected: Vec<String>,
}

impl ProcessSupervisor {
    pub fn new(control: Arc<dyn ProcessControl>, settings: &ProcessSettings) -> Self {
        Self {
            control,
            poll_interval: settings.poll_interval(),
            max_polls: settings.max_polls.max(1),
            protected: settings.protected.clone(),
        }
    }

    /// Processes the engine must never stop
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected.iter().any(|p| p.eq_ignore_ascii_case(name))
    }

    pub fn status(&self, name: &str) -> ProcessStatus {
        self.control.status(name).unwrap_or(ProcessStatus::Unknown)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.status(name) == ProcessStatus::Running
    }

    fn wait_for(&self, name: &str, wanted: ProcessStatus, action: ProcessAction) -> Result<()> {
        for poll in 0..self.max_polls {
            match self.control.status(name) {
                Ok(status) if status == wanted => {
                    debug!("[Process] {} reached {:?} after {} poll(s)", name, wanted, poll + 1);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!("[Process] Status of {} unavailable: {}", name, e),
            }
            thread::sleep(self.poll_interval);
        }

        error!(
            "[Process] MAJOR: gave up waiting for {} to {} after {} polls",
            name, action, self.max_polls
        );
        Err(CfgError::process(
            name,
            format!("did not reach {:?} after {} polls", wanted, self.max_polls),
        ))
    }

    pub fn start(&self, name: &str) -> Result<()> {
        if self.is_running(name) {
            debug!("[Process] {} already running", name);
            return Ok(());
        }
        info!("[Process] Starting {}", name);
        self.control.start(name)?;
        self.wait_for(name, ProcessStatus::Running, ProcessAction::Start)
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        if self.is_protected(name) {
            return Err(CfgError::process(name, "process is protected"));
        }
        info!("[Process] Stopping {}", name);
        if let Err(e) = self.control.set_autorestart(name, false) {
            warn!("[Process] Could not disable autorestart for {}: {}", name, e);
        }
        self.control.stop(name)?;
        self.wait_for(name, ProcessStatus::Shutdown, ProcessAction::Stop)
    }

    pub fn restart(&self, name: &str) -> Result<()> {
        info!("[Process] Restarting {}", name);
        self.control.restart(name)?;
        self.wait_for(name, ProcessStatus::Running, ProcessAction::Restart)
    }

    pub fn set_autorestart(&self, name: &str, enabled: bool) -> Result<()> {
        self.control.set_autorestart(name, enabled)
    }

    /// Run one action and turn its result into a report
    pub fn perform(&self, name: &str, action: ProcessAction) -> ProcessReport {
        let result = match action {
            ProcessAction::Start => self.start(name),
            ProcessAction::Stop => self.stop(name),
            ProcessAction::Restart => self.restart(name),
        };
        let error = match result {
            Ok(()) => None,
            Err(e) => {
                warn!("[Process] Failed to {} {}: {}", action, name, e);
                Some(e.to_string())
            }
        };
        ProcessReport {
            process: name.to_string(),
            action,
            error,
        }
    }

    /// Apply the same action to several processes, tolerating failures
    pub fn perform_all(&self, names: &[String], action: ProcessAction) -> Vec<ProcessReport> {
        names.iter().map(|n| self.perform(n, action)).collect()
    }
}
