use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("angela").unwrap();
    cmd.env("HOME", home.path());
    cmd
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution core"))
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_missing_subcommand_fails() {
    let home = TempDir::new().unwrap();
    cmd(&home).assert().failure();
}

#[test]
fn test_suggest_only_prints_text_without_executing() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["request", "rm -rf /", "--suggest-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rm -rf /"));
}

#[test]
fn test_dry_run_safe_command_succeeds_without_side_effects() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["request", "ls -la", "--dry-run"])
        .assert()
        .success();
}

#[test]
fn test_refused_command_fails_with_nonzero_exit() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["request", "rm -rf /", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("refused"));
}

#[test]
fn test_force_runs_safe_command_and_records_journal() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["request", "echo hello-from-angela", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello-from-angela"));

    cmd(&home)
        .args(["rollback", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("echo hello-from-angela"));
}

#[test]
fn test_rollback_list_on_empty_journal_succeeds() {
    let home = TempDir::new().unwrap();
    cmd(&home).args(["rollback", "list"]).assert().success();
}

#[test]
fn test_rollback_operation_not_found_fails() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["rollback", "operation", "999", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
