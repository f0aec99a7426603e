//! Git Store Integration Tests
//!
//! Runs the engine against a real git working copy (and a bare remote) to
//! check commits, pushes and the branch rules of the versioned store.
//!
//! Requires the `git` CLI on PATH.

use blockcfg_core::engine::{Collaborators, Engine};
use blockcfg_core::model::{Block, Configuration};
use blockcfg_core::settings::EngineSettings;
use blockcfg_core::vcs::{open_store, GitBackend, VcsBackend};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.vcs.host_name = Some("NDXTEST".to_string());
    settings.watcher.enabled = false;
    settings.process.poll_interval_ms = 1;
    settings
}

fn open(root: &Path) -> Engine {
    Engine::open(
        root.to_path_buf(),
        settings(),
        Collaborators::simulated().with_vcs(Box::new(GitBackend::new(root.to_path_buf()))),
    )
    .unwrap()
}

fn sample(name: &str) -> Configuration {
    let mut config = Configuration::new(name);
    config.add_block(Block::new("TEMP", "TC:TEMP"), None).unwrap();
    config
}

#[test]
fn test_saves_and_deletes_are_committed() {
    let temp = TempDir::new().unwrap();
    GitBackend::new(temp.path().to_path_buf()).init("NDXTEST").unwrap();
    let engine = open(temp.path());
    assert!(engine.is_versioned());

    let saved = engine.save_inactive(sample("Demo").to_details());
    engine.flush();
    saved.wait().unwrap();
    let log = git(temp.path(), &["log", "--format=%s"]);
    assert!(log.lines().any(|l| l == "Demo saved"), "log was {}", log);
    assert!(git(temp.path(), &["ls-files"]).contains("configurations/Demo/blocks.json"));

    let deleted = engine.delete(&["Demo"], false);
    engine.flush();
    deleted.wait().unwrap();
    assert!(!temp.path().join("configurations/Demo").exists());
    assert!(!git(temp.path(), &["ls-files"]).contains("configurations/Demo"));
}

#[test]
fn test_commits_pushed_to_remote() {
    let remote = TempDir::new().unwrap();
    git(remote.path(), &["init", "-q", "--bare"]);

    let temp = TempDir::new().unwrap();
    GitBackend::new(temp.path().to_path_buf()).init("NDXTEST").unwrap();
    git(
        temp.path(),
        &["remote", "add", "origin", &remote.path().to_string_lossy()],
    );

    let engine = open(temp.path());
    let saved = engine.save_inactive(sample("Pushed").to_details());
    engine.flush();
    saved.wait().unwrap();
    engine.flush_push().unwrap();

    let remote_log = git(remote.path(), &["log", "NDXTEST", "--format=%s"]);
    assert!(remote_log.lines().any(|l| l == "Pushed saved"));
}

#[test]
fn test_shared_branch_falls_back_to_unversioned() {
    let temp = TempDir::new().unwrap();
    GitBackend::new(temp.path().to_path_buf()).init("master").unwrap();

    let store = open_store(temp.path(), &settings().vcs).unwrap();
    assert!(!store.is_versioned());

    let engine = open(temp.path());
    assert!(!engine.is_versioned());
    let saved = engine.save_inactive(sample("Local").to_details());
    engine.flush();
    saved.wait().unwrap();
    assert!(temp.path().join("configurations/Local/meta.json").is_file());
}

#[test]
fn test_other_hosts_branch_is_refused() {
    let temp = TempDir::new().unwrap();
    let git_backend = GitBackend::new(temp.path().to_path_buf());
    git_backend.init("NDXOTHER").unwrap();
    assert_eq!(git_backend.current_branch().unwrap(), "NDXOTHER");

    let store = open_store(temp.path(), &settings().vcs).unwrap();
    assert!(!store.is_versioned());
}
