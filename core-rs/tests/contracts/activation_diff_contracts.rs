//! Activation Diff Contract Tests
//!
//! The process diff decides which IOCs are started, stopped or restarted
//! when the active configuration changes. Getting it wrong either leaves
//! hardware unmanaged or bounces processes an experiment depends on.

use blockcfg_core::activation::{ProcessAction, ProcessDiff, ProcessSupervisor, ProcessStatus};
use blockcfg_core::model::Ioc;
use blockcfg_core::settings::ProcessSettings;
use blockcfg_core::sim::SimulatedProcesses;
use blockcfg_core::ErrorKind;
use blockcfg_core::activation::ProcessControl;
use std::collections::BTreeMap;
use std::sync::Arc;

fn set(iocs: &[Ioc]) -> BTreeMap<String, Ioc> {
    iocs.iter().map(|i| (i.name.clone(), i.clone())).collect()
}

fn settings(protected: &[&str]) -> ProcessSettings {
    ProcessSettings {
        poll_interval_ms: 1,
        max_polls: 3,
        protected: protected.iter().map(|s| s.to_string()).collect(),
    }
}

/// WHY: A process is never both started and restarted in one activation
/// BREAKS: Double restarts of freshly started IOCs
#[test]
fn start_and_restart_are_disjoint() {
    let old = set(&[Ioc::new("A"), Ioc::new("B")]);
    let new = set(&[Ioc::new("A"), Ioc::new("B"), Ioc::new("C")]);

    let diff = ProcessDiff::compute(&old, &new, |name| name == "A", |_| false);

    assert_eq!(diff.start, vec!["B", "C"]);
    assert_eq!(diff.restart, vec!["A"]);
    assert!(diff.start.iter().all(|s| !diff.restart.contains(s)));
}

/// WHY: Only processes leaving the configuration are stopped, and never protected ones
/// BREAKS: Shared infrastructure IOCs going down on configuration change
#[test]
fn stop_only_removed_unprotected_processes() {
    let old = set(&[Ioc::new("A"), Ioc::new("GATEWAY"), Ioc::new("KEEP")]);
    let new = set(&[Ioc::new("KEEP")]);

    let diff = ProcessDiff::compute(&old, &new, |_| true, |name| name == "GATEWAY");

    assert_eq!(diff.stop, vec!["A"]);
    assert!(diff.start.is_empty());
}

/// WHY: Identical configurations with nothing to restart produce no work
/// BREAKS: Needless process churn on reload
#[test]
fn unchanged_running_set_is_empty_diff() {
    let iocs = set(&[Ioc::new("A").with_flags(true, false)]);
    let diff = ProcessDiff::compute(&iocs, &iocs, |_| true, |_| false);
    assert!(diff.is_empty());
}

/// WHY: Non-autostart IOCs are never started by activation
/// BREAKS: Manual-start IOCs launching unexpectedly
#[test]
fn non_autostart_is_not_started() {
    let new = set(&[Ioc::new("MANUAL").with_flags(false, true)]);
    let diff = ProcessDiff::compute(&BTreeMap::new(), &new, |_| false, |_| false);
    assert!(diff.is_empty());
}

/// WHY: Stops run before starts so a renamed IOC never has two instances
/// BREAKS: Port and channel conflicts between old and new instances
#[test]
fn apply_runs_stops_before_starts_before_restarts() {
    let sim = Arc::new(SimulatedProcesses::new(&["OLD", "NEW", "KEEP"]));
    sim.set_running("OLD", true);
    sim.set_running("KEEP", true);
    let supervisor = ProcessSupervisor::new(sim.clone(), &settings(&[]));

    let old = set(&[Ioc::new("OLD"), Ioc::new("KEEP")]);
    let new = set(&[Ioc::new("NEW"), Ioc::new("KEEP")]);
    let diff = ProcessDiff::compute(&old, &new, |n| supervisor.is_running(n), |_| false);
    let reports = diff.apply(&supervisor);

    assert!(reports.iter().all(|r| r.ok()));
    assert_eq!(sim.history(), vec!["stop OLD", "start NEW", "restart KEEP"]);
    assert_eq!(sim.autorestart("OLD"), Some(false));
    assert_eq!(sim.autorestart("NEW"), Some(true));
}

/// WHY: A started process carries its restart-on-crash flag to process control
/// BREAKS: Crashed IOCs staying down, or no-restart IOCs bouncing back
#[test]
fn started_processes_get_their_restart_flag() {
    let sim = Arc::new(SimulatedProcesses::new(&["KEEPALIVE", "ONESHOT", "STUCK"]));
    sim.hang("STUCK");
    let supervisor = ProcessSupervisor::new(sim.clone(), &settings(&[]));

    let new = set(&[
        Ioc::new("KEEPALIVE").with_flags(true, true),
        Ioc::new("ONESHOT").with_flags(true, false),
        Ioc::new("STUCK").with_flags(true, true),
    ]);
    let diff = ProcessDiff::compute(&BTreeMap::new(), &new, |_| false, |_| false);
    assert_eq!(diff.autorestart.get("KEEPALIVE"), Some(&true));
    assert_eq!(diff.autorestart.get("ONESHOT"), Some(&false));

    let reports = diff.apply(&supervisor);
    assert_eq!(reports.iter().filter(|r| !r.ok()).count(), 1);
    assert_eq!(sim.autorestart("KEEPALIVE"), Some(true));
    assert_eq!(sim.autorestart("ONESHOT"), Some(false));
    assert_eq!(sim.autorestart("STUCK"), Some(false), "failed start leaves the flag alone");
}

/// WHY: Status polling is bounded; a hung process fails only its own action
/// BREAKS: Activation blocking forever on one IOC
#[test]
fn hung_process_fails_after_bounded_polls() {
    let sim = Arc::new(SimulatedProcesses::new(&["HUNG", "FINE"]));
    sim.hang("HUNG");
    let supervisor = ProcessSupervisor::new(sim.clone(), &settings(&[]));

    let reports = supervisor.perform_all(&["HUNG".to_string(), "FINE".to_string()], ProcessAction::Start);

    assert_eq!(reports.len(), 2);
    assert!(!reports[0].ok());
    assert!(reports[1].ok());
    assert_eq!(sim.status("FINE").unwrap(), ProcessStatus::Running);
    assert_eq!(
        supervisor.start("HUNG").unwrap_err().kind(),
        ErrorKind::ProcessControl
    );
}
