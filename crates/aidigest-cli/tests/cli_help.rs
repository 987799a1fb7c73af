use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("aidigest")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("rss-data"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_generate_help_shows_options() {
    cargo_bin_cmd!("aidigest")
        .args(["generate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--ids"))
        .stdout(predicate::str::contains("--stream"))
        .stdout(predicate::str::contains("--out"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("aidigest")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}

#[test]
fn test_invalid_date_is_rejected() {
    cargo_bin_cmd!("aidigest")
        .args(["content", "--date", "2025/06/01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date"));
}

#[test]
fn test_unknown_category_is_rejected() {
    cargo_bin_cmd!("aidigest")
        .args(["fetch", "--category", "videos"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
}
