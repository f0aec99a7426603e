//! Engine Lifecycle Integration Tests
//!
//! Tests the engine with its background threads running: queue consumer,
//! push loop and file watcher. Also covers activation side effects on the
//! simulated process-control and run-control collaborators.
//!
//! Uses tempfile for isolation - NO /tmp pollution

use blockcfg_core::activation::ProcessStatus;
use blockcfg_core::activation::ProcessControl;
use blockcfg_core::engine::{Collaborators, Engine};
use blockcfg_core::extensions::ExtensionKind;
use blockcfg_core::model::{Block, ConfigDetails, Configuration, Ioc, RunControlSpec, StructuralValidator};
use blockcfg_core::queue::Outcome;
use blockcfg_core::settings::EngineSettings;
use blockcfg_core::sim::{RecordingVcs, SimulatedProcesses, SimulatedRunControl};
use blockcfg_core::ErrorKind;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Harness {
    processes: Arc<SimulatedProcesses>,
    run_control: Arc<SimulatedRunControl>,
    vcs_log: Arc<Mutex<Vec<String>>>,
    remote_down: Arc<AtomicBool>,
}

fn settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.vcs.host_name = Some("NDXTEST".to_string());
    settings.vcs.push_interval_ms = 20;
    settings.vcs.retry_interval_ms = 20;
    settings.watcher.enabled = false;
    settings.watcher.debounce_ms = 50;
    settings.watcher.settle_ms = 0;
    settings.process.poll_interval_ms = 1;
    settings.process.max_polls = 5;
    settings.queue.idle_sleep_ms = 2;
    settings
}

fn open_with(root: &Path, settings: EngineSettings) -> (Engine, Harness) {
    let processes = Arc::new(SimulatedProcesses::new(&["SIMPLE", "MOTOR", "INSTETC"]));
    let run_control = Arc::new(SimulatedRunControl::new());
    let vcs = RecordingVcs::new("NDXTEST");
    let harness = Harness {
        processes: processes.clone(),
        run_control: run_control.clone(),
        vcs_log: vcs.log(),
        remote_down: vcs.remote_switch(),
    };
    let collaborators = Collaborators {
        processes,
        run_control,
        validator: Arc::new(StructuralValidator),
        vcs: Some(Box::new(vcs)),
    };
    let engine = Engine::open(root.to_path_buf(), settings, collaborators).unwrap();
    (engine, harness)
}

fn details(name: &str, iocs: &[&str]) -> ConfigDetails {
    let mut config = Configuration::new(name);
    config
        .add_block(
            Block::new("TEMP", "TC:TEMP").with_runcontrol(RunControlSpec::new(true, 1.5, 4.0)),
            None,
        )
        .unwrap();
    config.add_block(Block::new("FIELD", "MAG:FIELD"), None).unwrap();
    for ioc in iocs {
        config.add_ioc(Ioc::new(ioc)).unwrap();
    }
    config.to_details()
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    check()
}

#[test]
fn test_start_serve_and_stop() {
    let temp = TempDir::new().unwrap();
    let (engine, _) = open_with(temp.path(), settings());

    engine.start().unwrap();
    engine.start().unwrap();
    assert!(engine.is_running());

    let saved = engine.save_inactive(details("Alpha", &["SIMPLE"])).wait().unwrap();
    match saved {
        Outcome::Saved(meta) => assert_eq!(meta.pv, "ALPHA"),
        other => panic!("unexpected outcome {:?}", other),
    }

    engine.stop();
    assert!(!engine.is_running());
    assert_eq!(engine.status(), "");
}

#[test]
fn test_load_then_delete_from_two_callers_is_serialized() {
    let temp = TempDir::new().unwrap();
    let (engine, _) = open_with(temp.path(), settings());
    let engine = Arc::new(engine);
    let saved = engine.save_inactive(details("X", &[]));
    engine.flush();
    saved.wait().unwrap();
    engine.start().unwrap();

    let (enqueued_tx, enqueued_rx) = mpsc::channel();
    let loader = {
        let engine = engine.clone();
        thread::spawn(move || {
            let ticket = engine.load("X");
            enqueued_tx.send(()).unwrap();
            ticket.wait()
        })
    };
    let deleter = {
        let engine = engine.clone();
        thread::spawn(move || {
            enqueued_rx.recv().unwrap();
            engine.delete(&["X"], false).wait()
        })
    };

    assert!(loader.join().unwrap().is_ok());
    let err = deleter.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Guard);
    assert_eq!(engine.active_name(), "X");
    assert_eq!(engine.list(false).len(), 1);
    engine.stop();
}

#[test]
fn test_activation_applies_process_diff() {
    let temp = TempDir::new().unwrap();
    let (engine, harness) = open_with(temp.path(), settings());
    engine.save_inactive(details("First", &["SIMPLE", "INSTETC"]));
    engine.save_inactive(details("Second", &["MOTOR", "INSTETC"]));
    let first = engine.load("First");
    engine.flush();
    first.wait().unwrap();
    assert!(harness.processes.is_running("SIMPLE"));
    harness.processes.clear_history();

    let second = engine.load("Second");
    engine.flush();
    let report = match second.wait().unwrap() {
        Outcome::Activated(report) => report,
        other => panic!("unexpected outcome {:?}", other),
    };

    assert_eq!(report.diff.stop, vec!["SIMPLE"]);
    assert_eq!(report.diff.start, vec!["MOTOR"]);
    assert_eq!(report.diff.restart, vec!["INSTETC"]);
    assert_eq!(
        harness.processes.history(),
        vec!["stop SIMPLE", "start MOTOR", "restart INSTETC"]
    );
    assert_eq!(harness.processes.status("MOTOR").unwrap(), ProcessStatus::Running);
}

#[test]
fn test_process_failure_does_not_abort_activation() {
    let temp = TempDir::new().unwrap();
    let (engine, harness) = open_with(temp.path(), settings());
    harness.processes.hang("SIMPLE");
    engine.save_inactive(details("Hung", &["SIMPLE", "MOTOR"]));
    let load = engine.load("Hung");
    engine.flush();

    let report = match load.wait().unwrap() {
        Outcome::Activated(report) => report,
        other => panic!("unexpected outcome {:?}", other),
    };
    let failed: Vec<&str> = report.failures().map(|r| r.process.as_str()).collect();
    assert_eq!(failed, vec!["SIMPLE"]);
    assert!(harness.processes.is_running("MOTOR"));
    assert_eq!(engine.active_name(), "Hung");
}

#[test]
fn test_explicit_process_commands() {
    let temp = TempDir::new().unwrap();
    let (engine, harness) = open_with(temp.path(), settings());

    let start = engine.start_processes(&["simple", "ghost"]);
    engine.flush();
    let reports = match start.wait().unwrap() {
        Outcome::Processes(reports) => reports,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(reports[0].ok());
    assert!(!reports[1].ok());
    assert!(harness.processes.is_running("SIMPLE"));

    let stop = engine.stop_processes(&["SIMPLE"]);
    engine.flush();
    stop.wait().unwrap();
    assert!(!harness.processes.is_running("SIMPLE"));
}

#[test]
fn test_run_control_synchronised_on_activation() {
    let temp = TempDir::new().unwrap();
    let (engine, harness) = open_with(temp.path(), settings());
    engine.save_inactive(details("Rc", &[]));
    engine.load("Rc");
    engine.flush();

    assert_eq!(harness.run_control.value("CS:SB:TEMP:RC:LOW").as_deref(), Some("1.5"));
    assert_eq!(harness.run_control.value("CS:SB:TEMP:RC:HIGH").as_deref(), Some("4"));
    assert_eq!(harness.run_control.value("CS:SB:TEMP:RC:ENABLE").as_deref(), Some("1"));
    assert_eq!(harness.run_control.value("CS:SB:FIELD:RC:ENABLE").as_deref(), Some("0"));
}

#[test]
fn test_staged_details_stay_out_of_the_live_view() {
    let temp = TempDir::new().unwrap();
    let (engine, _) = open_with(temp.path(), settings());
    engine.save_inactive(details("Base", &[]));
    engine.load("Base");
    engine.flush();

    let mut staged = details("Base", &[]);
    staged.blocks.retain(|b| b.name != "FIELD");
    let ticket = engine.stage_details(staged);
    engine.flush();
    ticket.wait().unwrap();

    assert_eq!(engine.staged_details().unwrap().blocks.len(), 1);
    assert_eq!(engine.active_details().unwrap().blocks.len(), 2);

    let bad = ConfigDetails {
        groups: vec![blockcfg_core::Group {
            name: "G".to_string(),
            blocks: vec!["MISSING".to_string()],
            component: None,
        }],
        ..details("Base", &[])
    };
    let rejected = engine.set_active_details(bad);
    engine.flush();
    assert_eq!(rejected.wait().unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(engine.active_details().unwrap().blocks.len(), 2);
}

#[test]
fn test_save_active_as_new_name() {
    let temp = TempDir::new().unwrap();
    let (engine, _) = open_with(temp.path(), settings());
    engine.save_inactive(details("Orig", &[]));
    engine.load("Orig");
    let save_as = engine.save_active(Some("Copy"));
    engine.flush();
    save_as.wait().unwrap();

    assert_eq!(engine.active_name(), "Copy");
    let names: Vec<String> = engine.list(false).into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["Copy", "Orig"]);
    assert_eq!(engine.active_details().unwrap().history.len(), 2);
}

#[test]
fn test_last_configuration_restored_on_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let (engine, _) = open_with(temp.path(), settings());
        engine.save_inactive(details("Sticky", &["SIMPLE"]));
        engine.load("Sticky");
        engine.flush();
    }

    let (engine, harness) = open_with(temp.path(), settings());
    assert_eq!(engine.active_name(), "Sticky");
    assert!(harness.processes.is_running("SIMPLE"));
}

#[test]
fn test_unloadable_last_configuration_falls_back_to_blank() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("last_config.txt"), "Vanished\n").unwrap();

    let (engine, _) = open_with(temp.path(), settings());
    assert_eq!(engine.active_name(), "");
    assert!(engine.active_details().unwrap().blocks.is_empty());
}

#[test]
fn test_extension_documents() {
    let temp = TempDir::new().unwrap();
    let (engine, harness) = open_with(temp.path(), settings());

    let written = engine.write_extension(ExtensionKind::Synoptic, "beam", json!({"components": []}));
    let rejected = engine.write_extension(ExtensionKind::RunControl, "x", json!({}));
    engine.flush();

    match written.wait().unwrap() {
        Outcome::Written(path) => assert!(path.ends_with("synoptics/beam.json")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(rejected.wait().is_err());
    assert_eq!(
        engine.read_extension(ExtensionKind::Synoptic, None).unwrap(),
        json!(["beam"])
    );
    assert!(harness
        .vcs_log
        .lock()
        .unwrap()
        .iter()
        .any(|e| e == "commit synoptic beam updated"));
}

#[test]
fn test_push_retried_until_remote_returns() {
    let temp = TempDir::new().unwrap();
    let (engine, harness) = open_with(temp.path(), settings());
    harness.remote_down.store(true, Ordering::SeqCst);
    engine.start().unwrap();
    engine.save_inactive(details("Pushy", &[])).wait().unwrap();

    let log = harness.vcs_log.clone();
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().unwrap().iter().any(|e| e == "push-failed")
    }));

    harness.remote_down.store(false, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().unwrap().iter().any(|e| e == "push")
    }));
    engine.stop();
}

#[test]
fn test_falls_back_to_unversioned_store() {
    let temp = TempDir::new().unwrap();
    let collaborators =
        Collaborators::simulated().with_vcs(Box::new(RecordingVcs::new("NDXTEST").not_a_repository()));
    let engine = Engine::open(temp.path().to_path_buf(), settings(), collaborators).unwrap();

    assert!(!engine.is_versioned());
    let saved = engine.save_inactive(details("Plain", &[]));
    engine.flush();
    saved.wait().unwrap();
    assert!(temp.path().join("configurations/Plain/meta.json").is_file());
}

#[test]
fn test_watcher_picks_up_hand_edits() {
    let temp = TempDir::new().unwrap();
    let mut settings = settings();
    settings.watcher.enabled = true;
    let (engine, harness) = open_with(temp.path(), settings);
    engine.start().unwrap();
    engine.save_inactive(details("Watched", &[])).wait().unwrap();

    let dir = temp.path().join("configurations/Watched");
    let meta = fs::read_to_string(dir.join("meta.json")).unwrap();
    fs::write(
        dir.join("meta.json"),
        meta.replace("\"description\": \"\"", "\"description\": \"edited\""),
    )
    .unwrap();

    let log = harness.vcs_log.clone();
    assert!(wait_until(Duration::from_secs(10), || {
        log.lock()
            .unwrap()
            .iter()
            .any(|e| e == "commit Watched modified by hand")
    }));
    assert!(wait_until(Duration::from_secs(10), || {
        engine.list(false)[0].description == "edited"
    }));
    engine.stop();
}

#[tokio::test]
async fn test_ticket_awaited_from_async_code() {
    let temp = TempDir::new().unwrap();
    let (engine, _) = open_with(temp.path(), settings());
    engine.start().unwrap();

    let outcome = engine.save_inactive(details("Async", &[])).outcome().await;
    assert!(matches!(outcome, Ok(Outcome::Saved(_))));
    engine.stop();
}
