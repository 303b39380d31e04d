//! Integration tests for sync through a real git remote.
//!
//! Each test creates a bare remote and one or more clones, then drives
//! `ik sync` in the clones:
//! - first push creates the sync branch, a second run is a no-op
//! - a second clone pulls records, updates and deletions
//! - conflicting edits resolve by version and keep the loser in the attic
//! - a foreign record imported on two clones is reported after the pull
//! - an unreachable remote fails pull/push but degrades status

mod common;

use common::{git, Remote, TestRepo};
use predicates::prelude::*;

fn sync_run(repo: &TestRepo) -> serde_json::Value {
    repo.ik_json(&["sync", "run"])
}

fn attic_dir(repo: &TestRepo) -> std::path::PathBuf {
    repo.data_dir().join("workspaces").join("sync").join("attic")
}

#[test]
fn test_status_before_first_sync() {
    let remote = Remote::new();
    let repo = remote.clone_repo();
    repo.ik().arg("init").assert().success();
    repo.create_issue("First");

    let status = repo.ik_json(&["sync", "status"]);
    assert_eq!(status["synced"], false);
    assert_eq!(status["remote_available"], true);
    assert_eq!(status["remote_branch_missing"], true);
    assert_eq!(status["local_changes"].as_array().unwrap().len(), 1);
}

#[test]
fn test_first_sync_pushes_then_noop() {
    let remote = Remote::new();
    let repo = remote.clone_repo();
    repo.ik().arg("init").assert().success();
    let id = repo.create_issue("First");

    let report = sync_run(&repo);
    assert_eq!(report["pull"]["outcome"], "no_remote_branch");
    assert_eq!(report["push"]["outcome"], "pushed");

    // The record travels on the sync branch, not on the user's branches.
    let listing = git(
        remote.path(),
        &["ls-tree", "--name-only", "issuekeeper-sync", "issues/"],
    );
    assert_eq!(listing, format!("issues/{id}.json"));

    let report = sync_run(&repo);
    assert_eq!(report["pull"]["outcome"], "up_to_date");
    assert_eq!(report["push"]["outcome"], "nothing_to_push");

    let status = repo.ik_json(&["sync", "status"]);
    assert_eq!(status["synced"], true);
}

#[test]
fn test_second_clone_pulls_updates_and_deletions() {
    let remote = Remote::new();
    let a = remote.clone_repo();
    a.ik().arg("init").assert().success();
    let keep = a.create_issue("Keep me");
    let drop = a.create_issue("Drop me");
    sync_run(&a);

    let b = remote.clone_repo();
    b.ik().arg("init").assert().success();
    let report = b.ik_json(&["sync", "pull"]);
    assert_eq!(report["outcome"], "pulled");
    assert_eq!(report["applied"].as_array().unwrap().len(), 2);
    assert_eq!(b.show(&keep)["title"], "Keep me");

    a.ik()
        .args(["issue", "update", &keep, "--title", "Kept and renamed"])
        .assert()
        .success();
    a.ik().args(["issue", "delete", &drop]).assert().success();
    sync_run(&a);

    let report = sync_run(&b);
    assert_eq!(report["pull"]["removed"][0], drop.as_str());
    assert_eq!(b.show(&keep)["title"], "Kept and renamed");
    assert_eq!(b.show(&keep)["version"], 2);
    b.ik().args(["issue", "show", &drop]).assert().failure().code(3);
}

#[test]
fn test_conflict_keeps_higher_version_and_quarantines_loser() {
    let remote = Remote::new();
    let a = remote.clone_repo();
    a.ik().arg("init").assert().success();
    let id = a.create_issue("Shared");
    sync_run(&a);

    let b = remote.clone_repo();
    b.ik().arg("init").assert().success();
    sync_run(&b);

    // A edits once (version 2) and publishes first.
    a.ik()
        .args(["issue", "update", &id, "--title", "Edited on A"])
        .assert()
        .success();
    sync_run(&a);

    // B edits twice (version 3) without pulling.
    b.ik()
        .args(["issue", "update", &id, "--status", "wip"])
        .assert()
        .success();
    b.ik()
        .args(["issue", "update", &id, "--priority", "high"])
        .assert()
        .success();

    // Push alone is refused while the remote is ahead.
    b.ik()
        .args(["sync", "push"])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("REMOTE_AHEAD"));

    let report = sync_run(&b);
    let conflict = &report["pull"]["conflicts"][0];
    assert_eq!(conflict["id"], id.as_str());
    assert_eq!(conflict["winner"], "local");
    assert_eq!(conflict["decision"], "higher_version");
    assert_eq!(report["push"]["outcome"], "pushed");

    let quarantined = attic_dir(&b).join(format!("{id}.json"));
    let loser: serde_json::Value =
        serde_json::from_slice(&std::fs::read(quarantined).unwrap()).unwrap();
    assert_eq!(loser["title"], "Edited on A");

    let winner = b.show(&id);
    assert_eq!(winner["status"], "in_progress");
    assert_eq!(winner["version"], 3);

    // A receives B's copy on its next sync.
    sync_run(&a);
    assert_eq!(a.show(&id)["status"], "in_progress");
    assert_eq!(a.show(&id)["title"], "Shared");
}

#[test]
fn test_force_keeps_local_without_attic_copy() {
    let remote = Remote::new();
    let a = remote.clone_repo();
    a.ik().arg("init").assert().success();
    let id = a.create_issue("Shared");
    sync_run(&a);

    let b = remote.clone_repo();
    b.ik().arg("init").assert().success();
    sync_run(&b);

    a.ik().args(["issue", "update", &id, "-p", "4"]).assert().success();
    a.ik().args(["issue", "update", &id, "-p", "3"]).assert().success();
    sync_run(&a);

    b.ik()
        .args(["issue", "update", &id, "--title", "Mine"])
        .assert()
        .success();

    let report = b.ik_json(&["sync", "run", "--force"]);
    assert_eq!(report["forced"], true);
    assert_eq!(report["pull"]["conflicts"][0]["decision"], "forced");
    assert!(report["pull"]["conflicts"][0].get("quarantined").is_none());
    assert_eq!(b.show(&id)["title"], "Mine");
    assert!(!attic_dir(&b).join(format!("{id}.json")).exists());
}

#[test]
fn test_updates_only_save_includes_import_after_sync() {
    let remote = Remote::new();
    let repo = remote.clone_repo();
    repo.ik().arg("init").assert().success();
    repo.create_issue("Synced already");
    sync_run(&repo);

    let export = repo.path().join("export.jsonl");
    std::fs::write(
        &export,
        r#"{"id":"J-7","title":"Old upstream","created_at":"2024-12-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"}"#,
    )
    .unwrap();
    let stats = repo.ik_json(&["import", export.to_str().unwrap(), "--source", "jira"]);
    assert_eq!(stats["imported"], 1);

    let report = repo.ik_json(&["workspace", "save", "--outbox", "--updates-only"]);
    assert_eq!(report["mode"], "updates_only");
    assert_eq!(report["copied"], 1);
    assert_eq!(report["unchanged"], 1);
}

#[test]
fn test_same_foreign_record_imported_on_two_clones() {
    let remote = Remote::new();
    let line = r#"{"id":"J-1","title":"Upstream","updated_at":"2025-01-01T00:00:00Z"}"#;

    let a = remote.clone_repo();
    a.ik().arg("init").assert().success();
    let export = a.path().join("export.jsonl");
    std::fs::write(&export, line).unwrap();
    a.ik_json(&["import", export.to_str().unwrap(), "--source", "jira"]);
    sync_run(&a);

    let b = remote.clone_repo();
    b.ik().arg("init").assert().success();
    let export = b.path().join("export.jsonl");
    std::fs::write(&export, line).unwrap();
    b.ik_json(&["import", export.to_str().unwrap(), "--source", "jira"]);

    let report = sync_run(&b);
    let duplicate = &report["pull"]["duplicate_origins"][0];
    assert_eq!(duplicate["kind"], "duplicate_origin");
    assert_eq!(duplicate["source"], "jira");
    assert_eq!(duplicate["original_id"], "J-1");
    assert_eq!(duplicate["ids"].as_array().unwrap().len(), 2);

    b.ik()
        .arg("check")
        .assert()
        .failure()
        .code(5)
        .stderr(predicate::str::contains("DUPLICATE_ORIGIN"));
}

#[test]
fn test_unreachable_remote() {
    let repo = TestRepo::init();
    repo.create_issue("Offline");

    repo.ik()
        .args(["sync", "pull"])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("REMOTE_UNAVAILABLE"));

    let status = repo.ik_json(&["sync", "status"]);
    assert_eq!(status["remote_available"], false);
    assert_eq!(status["synced"], false);
}

#[test]
fn test_sync_outside_git_repository() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_ik"));
    cmd.current_dir(dir.path()).env_remove("IK_DIR");
    cmd.arg("init").assert().success();

    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_ik"));
    cmd.current_dir(dir.path())
        .env_remove("IK_DIR")
        .env("GIT_CEILING_DIRECTORIES", dir.path().parent().unwrap())
        .args(["sync", "status"])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("GIT_ERROR"));
}
