use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;

use tempfile::TempDir;

fn nexus_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nexus"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn init_registry(home: &TempDir) {
    nexus_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Created"));
}

fn add_github_server(home: &TempDir) {
    nexus_cmd(home.path())
        .args([
            "server",
            "add",
            "GitHub",
            "--npm",
            "@modelcontextprotocol/server-github",
            "--env",
            "GITHUB_TOKEN=${GITHUB_TOKEN}",
            "--target",
            "cursor",
        ])
        .assert()
        .success()
        .stdout(contains("Added 'GitHub'"));
}

fn status_json(home: &TempDir) -> serde_json::Value {
    let assert = nexus_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    serde_json::from_str(&stdout).expect("parse status json")
}

fn status_rows_by_target(home: &TempDir) -> HashMap<String, serde_json::Value> {
    let payload = status_json(home);
    let mut by_target = HashMap::new();
    for row in payload["targets"].as_array().expect("targets array") {
        let target = row["target"].as_str().expect("target id").to_string();
        by_target.insert(target, row.clone());
    }
    by_target
}

/// Keys of a JSON object, for schema comparisons.
fn key_set<'a>(value: &'a serde_json::Value, what: &str) -> BTreeSet<&'a str> {
    value
        .as_object()
        .unwrap_or_else(|| panic!("{what} should be an object"))
        .keys()
        .map(String::as_str)
        .collect()
}

#[test]
fn add_sync_status_round_trip() {
    let home = TempDir::new().expect("home");
    init_registry(&home);
    add_github_server(&home);

    nexus_cmd(home.path())
        .args(["server", "list"])
        .assert()
        .success()
        .stdout(contains("github (GitHub)"))
        .stdout(contains("cursor"));

    nexus_cmd(home.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("Synced 7 of 8 target(s)"))
        .stdout(contains("1 manual"));

    let cursor_config = home.path().join(".cursor").join("mcp.json");
    let content = fs::read_to_string(&cursor_config).expect("cursor config written");
    assert!(content.contains("GitHub"), "entry keyed by display name");
    assert!(content.contains("@modelcontextprotocol/server-github"));
    assert!(
        content.contains("${GITHUB_TOKEN}"),
        "credential references must pass through verbatim"
    );

    // Targets with no enabled servers still get a managed (empty) document.
    assert!(home.path().join(".claude.json").exists());

    let by_target = status_rows_by_target(&home);
    assert_eq!(by_target.len(), 8, "one status row per supported client");
    assert_eq!(by_target["cursor"]["signal"], "synced");
    assert_eq!(by_target["cursor"]["server_count"], 1);
    assert_eq!(by_target["warp"]["signal"], "manual");

    // A config edited behind nexus's back shows up as drift and the next
    // sync puts the registry's content back.
    fs::write(&cursor_config, "{\"mcpServers\": {}}\n").expect("clobber cursor config");
    let by_target = status_rows_by_target(&home);
    assert_eq!(by_target["cursor"]["signal"], "drifted");

    nexus_cmd(home.path()).arg("sync").assert().success();
    let restored = fs::read_to_string(&cursor_config).expect("restored config");
    assert!(restored.contains("GitHub"));
    let by_target = status_rows_by_target(&home);
    assert_eq!(by_target["cursor"]["signal"], "synced");
}

#[test]
fn status_json_schema_is_stable() {
    let home = TempDir::new().expect("home");
    init_registry(&home);

    let payload = status_json(&home);

    assert_eq!(
        key_set(&payload, "status root"),
        BTreeSet::from(["summary", "targets"]),
        "status root schema changed"
    );
    assert_eq!(
        key_set(&payload["summary"], "summary"),
        BTreeSet::from(["targets", "installed", "drifted", "failed"]),
        "summary schema changed"
    );

    let rows = payload["targets"].as_array().expect("targets array");
    assert_eq!(rows.len(), 8, "expected every supported client in status output");

    let expected_row_fields = BTreeSet::from([
        "target",
        "display_name",
        "installed",
        "config_path",
        "config_exists",
        "server_count",
        "sync_enabled",
        "signal",
        "detail",
        "last_sync_at",
        "last_sync_age",
        "last_error",
    ]);

    for row in rows {
        assert_eq!(
            key_set(row, "target row"),
            expected_row_fields,
            "target row schema changed"
        );

        // Nothing is installed in a fresh temp home, so every automatic
        // client sits at never-synced and the paste-in one at manual.
        let signal = row["signal"].as_str().expect("signal");
        assert!(
            signal == "never-synced" || signal == "manual",
            "unexpected signal {signal} in fresh home"
        );
    }
}

#[test]
fn dry_run_sync_writes_nothing() {
    let home = TempDir::new().expect("home");
    init_registry(&home);
    add_github_server(&home);

    nexus_cmd(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run] Synced"));

    assert!(
        !home.path().join(".cursor").exists(),
        "dry run must not create config directories"
    );
    assert!(!home.path().join(".claude.json").exists());

    let by_target = status_rows_by_target(&home);
    assert_eq!(
        by_target["cursor"]["signal"], "never-synced",
        "dry run must not record sync state"
    );
}

#[test]
fn diff_previews_pending_registry_changes() {
    let home = TempDir::new().expect("home");
    init_registry(&home);
    add_github_server(&home);
    nexus_cmd(home.path()).arg("sync").assert().success();

    nexus_cmd(home.path())
        .args([
            "server",
            "add",
            "Fetch",
            "--npm",
            "@modelcontextprotocol/server-fetch",
            "--target",
            "cursor",
        ])
        .assert()
        .success();

    let assert = nexus_cmd(home.path())
        .args(["sync", "--diff"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    assert!(
        stdout
            .lines()
            .any(|line| line.starts_with('+') && line.contains("Fetch")),
        "expected a unified diff added line for the pending server"
    );

    nexus_cmd(home.path()).arg("sync").assert().success();
    nexus_cmd(home.path())
        .args(["sync", "--diff"])
        .assert()
        .success()
        .stdout(contains("Client configs already match the registry."));
}

#[test]
fn import_adopts_existing_client_entries() {
    let home = TempDir::new().expect("home");
    let cursor_dir = home.path().join(".cursor");
    fs::create_dir_all(&cursor_dir).expect("mkdir cursor");
    fs::write(
        cursor_dir.join("mcp.json"),
        r#"{"mcpServers": {"filesystem": {"command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]}}}"#,
    )
    .expect("seed cursor config");

    init_registry(&home);
    nexus_cmd(home.path())
        .args(["server", "import", "cursor"])
        .assert()
        .success()
        .stdout(contains("Imported 1 server(s) from Cursor"))
        .stdout(contains("+ filesystem"));

    nexus_cmd(home.path())
        .args(["server", "list"])
        .assert()
        .success()
        .stdout(contains("filesystem"));

    // Second import of the same config skips the known entry.
    nexus_cmd(home.path())
        .args(["server", "import", "cursor"])
        .assert()
        .success()
        .stdout(contains("(1 skipped)"));
}

#[test]
fn manual_target_payload_is_pasteable_json() {
    let home = TempDir::new().expect("home");
    init_registry(&home);
    add_github_server(&home);
    nexus_cmd(home.path())
        .args(["server", "enable", "github", "--target", "warp"])
        .assert()
        .success();

    let assert = nexus_cmd(home.path())
        .args(["manual", "warp"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let payload: serde_json::Value = serde_json::from_str(&stdout).expect("payload is plain JSON");
    assert!(payload["mcpServers"]["GitHub"].is_object());

    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("stderr utf8");
    assert!(
        stderr.contains("Warp"),
        "paste instructions belong on stderr, not in the payload"
    );
}

#[test]
fn unknown_target_is_rejected() {
    let home = TempDir::new().expect("home");
    init_registry(&home);

    nexus_cmd(home.path())
        .args(["sync", "nope"])
        .assert()
        .failure()
        .stderr(contains("unknown target 'nope'"));
}

#[test]
fn status_without_registry_points_at_init() {
    let home = TempDir::new().expect("home");

    nexus_cmd(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("nexus init"));
}
