//! CLI integration tests
//!
//! Drives the `aidmesh` binary against temp data directories.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn aidmesh(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("aidmesh").expect("binary builds");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("aidmesh")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("report"))
        .stdout(predicate::str::contains("queue"))
        .stdout(predicate::str::contains("host"));
}

#[test]
fn info_shows_empty_queue() {
    let dir = TempDir::new().unwrap();
    aidmesh(&dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued operations: 0"));
}

#[test]
fn offline_submit_queues_report() {
    let dir = TempDir::new().unwrap();
    aidmesh(&dir)
        .args([
            "report", "submit", "--kind", "fire", "--lat", "37.77", "--lon", "-122.42",
            "--place", "pier 7", "smoke from the second floor",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued offline"));

    aidmesh(&dir)
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 operation(s) pending"));
}

#[test]
fn clear_refused_while_queue_pending() {
    let dir = TempDir::new().unwrap();
    aidmesh(&dir)
        .args([
            "report", "submit", "--kind", "medical", "--lat", "1.0", "--lon", "2.0",
            "--place", "clinic", "help needed",
        ])
        .assert()
        .success();

    aidmesh(&dir)
        .args(["queue", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not yet synced"));
}

#[test]
fn online_submit_syncs_and_lists() {
    let dir = TempDir::new().unwrap();
    aidmesh(&dir)
        .args([
            "--online", "report", "submit", "--kind", "security", "--lat", "50.0",
            "--lon", "8.0", "--place", "north gate", "fence breached",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("synced as report_"));

    aidmesh(&dir)
        .args(["--online", "report", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fence breached"))
        .stdout(predicate::str::contains("REPORTED"));
}

#[test]
fn drain_flushes_offline_queue_once_online() {
    let dir = TempDir::new().unwrap();
    aidmesh(&dir)
        .args([
            "report", "submit", "--kind", "accident", "--lat", "10.0", "--lon", "20.0",
            "--place", "crossing", "two cars collided",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued offline"));

    aidmesh(&dir)
        .args(["--online", "queue", "drain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Drained 1 operation(s); 0 left."));

    // Now clear succeeds
    aidmesh(&dir)
        .args(["queue", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Local queue cleared."));
}

#[test]
fn duplicate_offline_submissions_merge_on_drain() {
    let dir = TempDir::new().unwrap();
    for _ in 0..2 {
        aidmesh(&dir)
            .args([
                "report", "submit", "--kind", "fire", "--lat", "37.77", "--lon",
                "-122.42", "--place", "pier 7", "smoke",
            ])
            .assert()
            .success();
    }

    aidmesh(&dir)
        .args(["--online", "queue", "drain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 left."));

    // Both entries drained into one canonical report
    let output = aidmesh(&dir)
        .args(["--online", "report", "list"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("report_").count(), 1, "stdout: {}", stdout);
}
