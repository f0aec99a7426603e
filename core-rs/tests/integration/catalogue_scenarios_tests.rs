//! Catalogue Scenario Integration Tests
//!
//! Drives the engine through its public surface: every mutation is enqueued
//! and the queue is flushed on the test thread, so results are deterministic.
//!
//! Uses tempfile for isolation and `RecordingVcs` in place of git.

use blockcfg_core::engine::{Collaborators, Engine};
use blockcfg_core::model::{Block, ConfigDetails, Configuration, Ioc};
use blockcfg_core::queue::{ChangeKind, HandEdit, Outcome};
use blockcfg_core::settings::EngineSettings;
use blockcfg_core::sim::RecordingVcs;
use blockcfg_core::storage::ItemRef;
use blockcfg_core::ErrorKind;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
    engine: Engine,
    vcs_log: Arc<Mutex<Vec<String>>>,
    vcs_down: Arc<AtomicBool>,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let vcs = RecordingVcs::new("NDXTEST");
    let vcs_log = vcs.log();
    let vcs_down = vcs.local_switch();

    let mut settings = EngineSettings::default();
    settings.vcs.host_name = Some("NDXTEST".to_string());
    settings.watcher.enabled = false;
    settings.process.poll_interval_ms = 1;

    let engine = Engine::open(
        temp.path().to_path_buf(),
        settings,
        Collaborators::simulated().with_vcs(Box::new(vcs)),
    )
    .unwrap();

    Fixture {
        temp,
        engine,
        vcs_log,
        vcs_down,
    }
}

fn component(name: &str, block: &str) -> ConfigDetails {
    let mut config = Configuration::new_component(name);
    config
        .add_block(Block::new(block, format!("{}:PV", block)), None)
        .unwrap();
    config.to_details()
}

fn configuration(name: &str, components: &[&str]) -> ConfigDetails {
    let mut config = Configuration::new(name);
    config.add_block(Block::new("TEMP", "TC:TEMP"), None).unwrap();
    config.add_ioc(Ioc::new("SIMPLE")).unwrap();
    for c in components {
        config.add_component(c).unwrap();
    }
    config.to_details()
}

impl Fixture {
    fn save(&self, details: ConfigDetails) {
        let ticket = self.engine.save_inactive(details);
        self.engine.flush();
        ticket.wait().unwrap();
    }

    fn commits(&self) -> Vec<String> {
        self.vcs_log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("commit "))
            .cloned()
            .collect()
    }
}

#[test]
fn component_in_use_cannot_be_deleted_until_configuration_is_gone() {
    let f = fixture();
    f.save(component("A", "ALPHA"));
    f.save(component("B", "BETA"));
    f.save(configuration("C1", &["A"]));
    assert_eq!(f.engine.dependencies().get("A"), Some(&vec!["C1".to_string()]));

    let refused = f.engine.delete(&["A"], true);
    f.engine.flush();
    let err = refused.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Guard);
    assert!(err.to_string().contains("C1"));
    assert!(f.temp.path().join("components/A").is_dir());
    assert_eq!(f.engine.list(true).len(), 2);

    let drop_config = f.engine.delete(&["C1"], false);
    let drop_component = f.engine.delete(&["A"], true);
    f.engine.flush();
    drop_config.wait().unwrap();
    drop_component.wait().unwrap();

    assert!(!f.temp.path().join("components/A").exists());
    let names: Vec<String> = f.engine.list(true).into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["B"]);
    assert!(f.engine.dependencies().get("A").is_none());
}

#[test]
fn punctuation_names_get_suffixed_identifiers_in_creation_order() {
    let f = fixture();
    f.save(configuration("#@!", &[]));
    f.save(configuration("$%^", &[]));

    let configs = f.engine.list(false);
    let pv_of = |name: &str| {
        configs
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.pv.clone())
            .unwrap()
    };
    assert_eq!(pv_of("#@!"), "CONFIG");
    assert_eq!(pv_of("$%^"), "CONFIG0");
}

#[test]
fn identifiers_are_stable_across_reimport() {
    let f = fixture();
    f.save(configuration("#@!", &[]));
    f.save(configuration("$%^", &[]));

    let reload = f.engine.reload_from_disk();
    f.engine.flush();
    reload.wait().unwrap();

    let mut pvs: Vec<String> = f.engine.list(false).into_iter().map(|m| m.pv).collect();
    pvs.sort();
    assert_eq!(pvs, vec!["CONFIG", "CONFIG0"]);
}

#[test]
fn deleting_the_active_configuration_is_refused() {
    let f = fixture();
    f.save(configuration("Live", &[]));
    f.save(configuration("Other", &[]));
    let load = f.engine.load("Live");
    f.engine.flush();
    load.wait().unwrap();

    let ticket = f.engine.delete(&["Other", "Live"], false);
    f.engine.flush();
    assert_eq!(ticket.wait().unwrap_err().kind(), ErrorKind::Guard);

    // all-or-nothing: Other survives too
    assert_eq!(f.engine.list(false).len(), 2);
    assert!(f.temp.path().join("configurations/Other").is_dir());
}

#[test]
fn unknown_names_fail_before_anything_is_removed() {
    let f = fixture();
    f.save(configuration("Keep", &[]));
    let before = f.commits().len();

    let ticket = f.engine.delete(&["Keep", "Missing"], false);
    f.engine.flush();
    assert_eq!(ticket.wait().unwrap_err().kind(), ErrorKind::Guard);
    assert!(f.temp.path().join("configurations/Keep").is_dir());
    assert_eq!(f.commits().len(), before);
}

#[test]
fn configuration_round_trips_through_save_and_load() {
    let f = fixture();
    let mut config = Configuration::new("Round").with_description("trip");
    config.add_block(Block::new("TEMP", "TC:TEMP"), Some("Temps")).unwrap();
    config.add_block(Block::new("FIELD", "MAG:FIELD"), None).unwrap();
    config
        .add_ioc(Ioc::new("TC_01").with_flags(true, false).with_macro("PORT", "COM3"))
        .unwrap();
    let details = config.to_details();

    f.save(details.clone());
    let load = f.engine.load("Round");
    f.engine.flush();
    load.wait().unwrap();

    let active = f.engine.active_details().unwrap();
    assert_eq!(active.blocks, details.blocks);
    assert_eq!(active.groups, details.groups);
    assert_eq!(active.iocs, details.iocs);
    assert_eq!(active.groups.last().unwrap().name, "NONE");
}

#[test]
fn unknown_component_reference_is_rejected_without_side_effects() {
    let f = fixture();
    let before = f.commits().len();

    let ticket = f.engine.save_inactive(configuration("Broken", &["Nope"]));
    f.engine.flush();
    assert_eq!(ticket.wait().unwrap_err().kind(), ErrorKind::Validation);
    assert!(!f.temp.path().join("configurations/Broken").exists());
    assert_eq!(f.commits().len(), before);
}

#[test]
fn protected_configuration_cannot_be_overwritten_or_deleted() {
    let f = fixture();
    let mut details = configuration("Safe", &[]);
    details.protected = true;
    f.save(details);

    let overwrite = f.engine.save_inactive(configuration("Safe", &[]));
    let delete = f.engine.delete(&["Safe"], false);
    f.engine.flush();
    assert_eq!(overwrite.wait().unwrap_err().kind(), ErrorKind::Guard);
    assert_eq!(delete.wait().unwrap_err().kind(), ErrorKind::Guard);
    assert!(f.engine.list(false)[0].protected);
}

#[test]
fn saving_a_component_of_the_active_configuration_reloads_it() {
    let f = fixture();
    f.save(component("Cryo", "COLD"));
    f.save(configuration("Main", &["Cryo"]));
    let load = f.engine.load("Main");
    f.engine.flush();
    load.wait().unwrap();
    assert_eq!(f.engine.snapshot().block_names, vec!["TEMP", "COLD"]);

    let mut updated = Configuration::new_component("Cryo");
    updated.add_block(Block::new("COLD", "CRYO:T"), None).unwrap();
    updated.add_block(Block::new("COLDER", "CRYO:T2"), None).unwrap();
    f.save(updated.to_details());

    assert_eq!(f.engine.snapshot().block_names, vec!["TEMP", "COLD", "COLDER"]);
    assert_eq!(f.engine.active_name(), "Main");
}

#[test]
fn hand_edit_reimports_and_commits() {
    let f = fixture();
    f.save(configuration("Manual", &[]));
    let load = f.engine.load("Manual");
    f.engine.flush();
    load.wait().unwrap();

    let blocks = f.temp.path().join("configurations/Manual/blocks.json");
    let mut edited: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(&blocks).unwrap()).unwrap();
    edited.push(serde_json::json!({"name": "EXTRA", "pv": "X:PV"}));
    fs::write(&blocks, serde_json::to_string_pretty(&edited).unwrap()).unwrap();

    let ticket = f.engine.hand_edit(HandEdit {
        item: ItemRef {
            name: "Manual".to_string(),
            is_component: false,
        },
        change: ChangeKind::Modified,
    });
    f.engine.flush();
    assert!(matches!(ticket.wait(), Ok(Outcome::Done)));

    assert!(f.commits().contains(&"commit Manual modified by hand".to_string()));
    assert!(f.engine.snapshot().block_names.contains(&"EXTRA".to_string()));
}

#[test]
fn invalid_hand_edit_leaves_catalogue_unchanged() {
    let f = fixture();
    f.save(configuration("Fragile", &[]));
    let before = f.engine.list(false);

    fs::write(f.temp.path().join("configurations/Fragile/groups.json"), "{not json").unwrap();
    let ticket = f.engine.hand_edit(HandEdit {
        item: ItemRef {
            name: "Fragile".to_string(),
            is_component: false,
        },
        change: ChangeKind::Modified,
    });
    f.engine.flush();

    assert_eq!(ticket.wait().unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(f.engine.list(false), before);
}

#[test]
fn hand_deleted_directory_leaves_the_catalogue() {
    let f = fixture();
    f.save(configuration("Gone", &[]));
    fs::remove_dir_all(f.temp.path().join("configurations/Gone")).unwrap();

    let ticket = f.engine.hand_edit(HandEdit {
        item: ItemRef {
            name: "Gone".to_string(),
            is_component: false,
        },
        change: ChangeKind::Deleted,
    });
    f.engine.flush();
    ticket.wait().unwrap();

    assert!(f.engine.list(false).is_empty());
    assert!(f.commits().contains(&"commit Gone deleted by hand".to_string()));
}

#[test]
fn hand_edit_with_broken_working_copy_leaves_catalogue_unchanged() {
    let f = fixture();
    f.save(configuration("Edited", &[]));
    let before = f.engine.list(false);
    let commits = f.commits().len();

    let blocks = f.temp.path().join("configurations/Edited/blocks.json");
    fs::write(&blocks, r#"[{"name": "OTHER", "pv": "X:PV"}]"#).unwrap();
    f.vcs_down.store(true, Ordering::SeqCst);

    let ticket = f.engine.hand_edit(HandEdit {
        item: ItemRef {
            name: "Edited".to_string(),
            is_component: false,
        },
        change: ChangeKind::Modified,
    });
    f.engine.flush();

    assert!(ticket.wait().is_err());
    assert_eq!(f.engine.list(false), before);
    assert_eq!(f.commits().len(), commits);
}

#[test]
fn hand_delete_with_broken_working_copy_keeps_the_entry() {
    let f = fixture();
    f.save(component("Shared", "SHARED"));
    f.save(configuration("Uses", &["Shared"]));
    fs::remove_dir_all(f.temp.path().join("components/Shared")).unwrap();
    f.vcs_down.store(true, Ordering::SeqCst);

    let ticket = f.engine.hand_edit(HandEdit {
        item: ItemRef {
            name: "Shared".to_string(),
            is_component: true,
        },
        change: ChangeKind::Deleted,
    });
    f.engine.flush();

    assert!(ticket.wait().is_err());
    let names: Vec<String> = f.engine.list(true).into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["Shared"]);
    assert_eq!(f.engine.dependencies().get("Shared"), Some(&vec!["Uses".to_string()]));
    assert!(!f.commits().contains(&"commit Shared deleted by hand".to_string()));
}
