//! On-Disk Layout Contract Tests
//!
//! Item directories are shared with other tools and edited by hand, so the
//! file set and document shapes are a protocol, not an implementation detail.

use blockcfg_core::model::{Block, Configuration, Ioc, StructuralValidator, NONE_GROUP};
use blockcfg_core::settings::LayoutSettings;
use blockcfg_core::storage::ConfigFileStore;
use blockcfg_core::ErrorKind;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn files(temp: &TempDir) -> ConfigFileStore {
    let files = ConfigFileStore::new(
        temp.path().to_path_buf(),
        LayoutSettings::default(),
        Arc::new(StructuralValidator),
    );
    files.ensure_layout().unwrap();
    files
}

fn read_json(path: &Path) -> JsonValue {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn sample() -> Configuration {
    let mut config = Configuration::new("Beamline").with_description("main setup");
    config.add_block(Block::new("TEMP", "TC:TEMP"), Some("Temps")).unwrap();
    config.add_block(Block::new("FIELD", "MAG:FIELD"), None).unwrap();
    config.add_ioc(Ioc::new("tc_01")).unwrap();
    config
}

/// WHY: A configuration is exactly five documents in its own directory
/// BREAKS: Tools reading configurations directly from disk
#[test]
fn configuration_directory_holds_five_documents() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let dir = files.write(&sample()).unwrap();

    assert_eq!(dir, temp.path().join("configurations").join("Beamline"));
    for name in ["meta.json", "blocks.json", "groups.json", "iocs.json", "components.json"] {
        assert!(dir.join(name).is_file(), "{} missing", name);
    }
}

/// WHY: Components never reference other components
/// BREAKS: Hand-written components being rejected or misread
#[test]
fn component_directory_has_no_components_document() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let mut component = Configuration::new_component("Cryostat");
    component.add_block(Block::new("COLD", "CRYO:T"), None).unwrap();

    let dir = files.write(&component).unwrap();
    assert_eq!(dir, temp.path().join("components").join("Cryostat"));
    assert!(!dir.join("components.json").exists());
    assert!(files.read("Cryostat", true).is_ok());
}

/// WHY: Ungrouped blocks are listed in a NONE group that always comes last
/// BREAKS: Display clients relying on group order
#[test]
fn none_group_is_written_last() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let dir = files.write(&sample()).unwrap();

    let groups = read_json(&dir.join("groups.json"));
    let groups = groups.as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["name"], "Temps");
    assert_eq!(groups[1]["name"], NONE_GROUP);
    assert_eq!(groups[1]["blocks"], serde_json::json!(["FIELD"]));
}

/// WHY: Reading back what was written gives the same configuration
/// BREAKS: Any save/load cycle
#[test]
fn written_configuration_reads_back_identically() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let config = sample();
    files.write(&config).unwrap();

    let loaded = files.read("beamline", false).unwrap();
    assert_eq!(loaded.to_details(), config.to_details());
}

/// WHY: Half-written directories must not load
/// BREAKS: Partially copied configurations silently losing blocks
#[test]
fn incomplete_file_set_is_rejected() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let dir = files.write(&sample()).unwrap();
    fs::remove_file(dir.join("iocs.json")).unwrap();

    let err = files.read("Beamline", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("iocs.json"));
}

/// WHY: A block may belong to at most one group
/// BREAKS: Block ownership in hand-edited groups.json
#[test]
fn block_in_two_groups_is_rejected() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let dir = files.write(&sample()).unwrap();
    fs::write(
        dir.join("groups.json"),
        r#"[{"name": "A", "blocks": ["TEMP"]}, {"name": "B", "blocks": ["TEMP"]}]"#,
    )
    .unwrap();

    assert_eq!(files.read("Beamline", false).unwrap_err().kind(), ErrorKind::Validation);
}

/// WHY: The last active configuration survives restarts as a one-line pointer
/// BREAKS: Restoring the previous configuration on startup
#[test]
fn last_config_pointer_is_a_plain_line() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    assert_eq!(files.read_last_config(), None);

    files.write_last_config("Beamline").unwrap();
    assert_eq!(
        fs::read_to_string(temp.path().join("last_config.txt")).unwrap(),
        "Beamline\n"
    );
    assert_eq!(files.read_last_config().as_deref(), Some("Beamline"));
}

/// WHY: IOC names are unique case-insensitively, also in hand-edited files
/// BREAKS: One IOC silently shadowing another and skewing the process diff
#[test]
fn duplicate_ioc_in_two_cases_is_rejected() {
    let temp = TempDir::new().unwrap();
    let files = files(&temp);
    let dir = files.write(&sample()).unwrap();

    let mut first = serde_json::to_value(Ioc::new("SIMPLE").with_flags(true, false)).unwrap();
    let mut second = serde_json::to_value(Ioc::new("SIMPLE").with_flags(false, false)).unwrap();
    first["name"] = JsonValue::from("SIMPLE");
    second["name"] = JsonValue::from("simple");
    fs::write(
        dir.join("iocs.json"),
        serde_json::to_string_pretty(&vec![first, second]).unwrap(),
    )
    .unwrap();

    let err = files.read("Beamline", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("Duplicate IOC"));
}
