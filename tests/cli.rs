use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn unknown_option_prints_usage_and_fails() {
    Command::cargo_bin("stackup")
        .unwrap()
        .arg("--frobnicate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unknown option: --frobnicate"))
        .stderr(predicate::str::contains("Usage: stackup"));
}

#[test]
fn help_prints_the_flag_grammar_and_succeeds() {
    Command::cargo_bin("stackup")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--enable-gpu[count=COUNT]"))
        .stdout(predicate::str::contains("--webui[port=PORT]"))
        .stdout(predicate::str::contains("Detected GPU driver:"));
}

#[test]
fn help_wins_even_with_other_flags_present() {
    Command::cargo_bin("stackup")
        .unwrap()
        .args(["--drop", "-h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: stackup"));
}

#[test]
fn invalid_bracket_value_is_reported() {
    Command::cargo_bin("stackup")
        .unwrap()
        .arg("--webui[port=many]")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid value for --webui: 'many'"));
}
