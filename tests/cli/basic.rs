use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_dev_command() {
    Command::cargo_bin("pgdev")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dev"));
}

#[test]
fn test_dev_help_shows_overrides() {
    Command::cargo_bin("pgdev")
        .unwrap()
        .args(["dev", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--shadow-port"))
        .stdout(predicate::str::contains("--no-seed"));
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("pgdev")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("pgdev")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pgdev"));
}
