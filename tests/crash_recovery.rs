//! Crash Recovery Tests
//!
//! Runs the real binary with `DUALMASTER_CRASH_POINT` set, lets it abort
//! mid-claim, and checks that the next invocation completes the claim.
//!
//! The stand-in client `true` accepts every statement and returns no
//! rows, which is all the First claim needs.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use dualmaster::crash_point::{points, CRASH_POINT_ENV};
use dualmaster::directory::{FileDirectory, PeerDirectory};
use dualmaster::node::NodeStateStore;
use dualmaster::RoleMarker;
use serde_json::json;
use tempfile::TempDir;

struct Setup {
    _temp_dir: TempDir,
    config_path: PathBuf,
    directory_root: PathBuf,
    state_dir: PathBuf,
}

fn setup() -> Setup {
    let temp_dir = TempDir::new().unwrap();
    let directory_root = temp_dir.path().join("directory");
    let state_dir = temp_dir.path().join("state");
    fs::create_dir_all(&directory_root).unwrap();

    let config_path = temp_dir.path().join("dualmaster.json");
    let config = json!({
        "directory_root": directory_root.to_string_lossy(),
        "node_name": "db1",
        "environment": "prod",
        "address": "10.0.0.1",
        "state_dir": state_dir.to_string_lossy(),
        "mysql_bin": "true",
    });
    fs::write(&config_path, config.to_string()).unwrap();

    Setup {
        _temp_dir: temp_dir,
        config_path,
        directory_root,
        state_dir,
    }
}

fn reconcile(config_path: &Path, crash_point: Option<&str>) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_dualmaster"));
    command
        .arg("--quiet")
        .arg("reconcile")
        .arg("--config")
        .arg(config_path);
    if let Some(point) = crash_point {
        command.env(CRASH_POINT_ENV, point);
    }
    command.output().unwrap()
}

#[test]
fn test_crash_before_publish_leaves_no_role() {
    let s = setup();

    let output = reconcile(&s.config_path, Some(points::FIRST_BEFORE_PUBLISH));
    assert!(!output.status.success());

    let directory = FileDirectory::new(&s.directory_root);
    assert!(directory.find_node("prod", "db1").unwrap().is_none());
    assert!(NodeStateStore::new(&s.state_dir)
        .load("prod", "db1")
        .unwrap()
        .is_none());

    let output = reconcile(&s.config_path, None);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let record = directory.find_node("prod", "db1").unwrap().unwrap();
    assert_eq!(record.role_marker, RoleMarker::First);

    let state = NodeStateStore::new(&s.state_dir)
        .load("prod", "db1")
        .unwrap()
        .unwrap();
    assert_eq!(state.role, Some(RoleMarker::First));
    assert_eq!(state.replication_secret, record.replication_secret);
}

#[test]
fn test_crash_after_publish_restores_role_from_directory() {
    let s = setup();

    let output = reconcile(&s.config_path, Some(points::FIRST_AFTER_PUBLISH));
    assert!(!output.status.success());

    let directory = FileDirectory::new(&s.directory_root);
    let record = directory.find_node("prod", "db1").unwrap().unwrap();
    assert_eq!(record.role_marker, RoleMarker::First);

    let output = reconcile(&s.config_path, None);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let state = NodeStateStore::new(&s.state_dir)
        .load("prod", "db1")
        .unwrap()
        .unwrap();
    assert_eq!(state.role, Some(RoleMarker::First));
    assert_eq!(state.replication_secret, record.replication_secret);

    let after = directory.find_node("prod", "db1").unwrap().unwrap();
    assert_eq!(after.published_at, record.published_at);
}

#[test]
fn test_bad_config_exits_with_one() {
    let s = setup();
    fs::write(&s.config_path, "{}").unwrap();

    let output = reconcile(&s.config_path, None);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("DUALMASTER_CLI_CONFIG_ERROR"));
}
