//! End-to-end tests for the `peggle` binary.
#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const GRAMMAR: &str = "pair <- key '=' key\nkey <- ~'[a-z]+'\n";

fn write(dir: &TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn peggle() -> Command {
    Command::cargo_bin("peggle").unwrap()
}

#[test]
fn prints_tree_for_input_file() {
    let dir = TempDir::new().unwrap();
    let grammar = write(&dir, "pair.peg", GRAMMAR);
    let input = write(&dir, "input.txt", "a=b");

    peggle()
        .args([&grammar, &input])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"(pair key:"a" '=':"=" key:"b")"#));
}

#[test]
fn reads_stdin_for_dash() {
    let dir = TempDir::new().unwrap();
    let grammar = write(&dir, "pair.peg", GRAMMAR);

    peggle()
        .args([grammar.as_str(), "-"])
        .write_stdin("xy=z")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"key:"xy""#));
}

#[test]
fn config_selects_entry_rule() {
    let dir = TempDir::new().unwrap();
    let grammar = write(&dir, "pair.peg", GRAMMAR);
    let config = write(&dir, "options.json", r#"{"entry": "key"}"#);

    peggle()
        .args([grammar.as_str(), "-", "--config", config.as_str()])
        .write_stdin("abc")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"key:"abc""#));
}

#[test]
fn mismatch_reports_furthest_failure() {
    let dir = TempDir::new().unwrap();
    let grammar = write(&dir, "pair.peg", GRAMMAR);

    peggle()
        .args([grammar.as_str(), "-"])
        .write_stdin("a=")
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected ~'[a-z]+' at offset 2"));
}

#[test]
fn undefined_rule_is_rejected() {
    let dir = TempDir::new().unwrap();
    let grammar = write(&dir, "bad.peg", "start <- nope\n");

    peggle()
        .args([grammar.as_str(), "-"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rule 'nope' not found"));
}

#[test]
fn missing_grammar_file_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.peg");

    peggle()
        .args([missing.to_string_lossy().as_ref(), "-"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading"));
}
