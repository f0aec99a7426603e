//! Process set transition between two active configurations

use crate::activation::process::{ProcessAction, ProcessReport, ProcessSupervisor};
use crate::model::Ioc;
use serde::Serialize;
use tracing::warn;
use std::collections::BTreeMap;

/// What has to happen to managed processes when the active configuration changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessDiff {
    pub start: Vec<String>,
    pub restart: Vec<String>,
    pub stop: Vec<String>,
    /// Restart-on-crash flag sent for each started process
    pub autorestart: BTreeMap<String, bool>,
}

impl ProcessDiff {
    /// Compare the previous and the next process sets
    ///
    /// - start: in `new`, flagged autostart, and absent from `old` or not running
    /// - restart: in both, flagged restart in `new`, and not already being started
    /// - stop: only in `old` and not protected
    pub fn compute<R, P>(
        old: &BTreeMap<String, Ioc>,
        new: &BTreeMap<String, Ioc>,
        is_running: R,
        is_protected: P,
    ) -> Self
    where
        R: Fn(&str) -> bool,
        P: Fn(&str) -> bool,
    {
        let mut diff = ProcessDiff::default();

        for (name, ioc) in new {
            let in_old = old.contains_key(name);
            if ioc.autostart && (!in_old || !is_running(name)) {
                diff.start.push(name.clone());
                diff.autorestart.insert(name.clone(), ioc.restart);
            } else if in_old && ioc.restart {
                diff.restart.push(name.clone());
            }
        }

        for name in old.keys() {
            if !new.contains_key(name) && !is_protected(name) {
                diff.stop.push(name.clone());
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.restart.is_empty() && self.stop.is_empty()
    }

    /// Stop, then start, then restart; one failure never aborts the rest
    pub fn apply(&self, supervisor: &ProcessSupervisor) -> Vec<ProcessReport> {
        let mut reports = supervisor.perform_all(&self.stop, ProcessAction::Stop);
        let started = supervisor.perform_all(&self.start, ProcessAction::Start);
        for report in started.iter().filter(|r| r.ok()) {
            let enabled = self.autorestart.get(&report.process).copied().unwrap_or(false);
            if let Err(e) = supervisor.set_autorestart(&report.process, enabled) {
                warn!("[Process] Could not set autorestart for {}: {}", report.process, e);
            }
        }
        reports.extend(started);
        reports.extend(supervisor.perform_all(&self.restart, ProcessAction::Restart));
        reports
    }
}
