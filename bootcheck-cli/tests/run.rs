//! CLI surface tests with stubbed external tools.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bootcheck() -> Command {
    Command::cargo_bin("bootcheck").unwrap()
}

#[test]
fn help_documents_the_local_boot_switch() {
    bootcheck()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--disable-local-boot"))
        .stdout(predicate::str::contains("--cases-dir"));
}

#[test]
fn empty_case_directory_reports_nothing_run() {
    let dir = TempDir::new().unwrap();

    bootcheck()
        .arg("--cases-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0 passed, 0 failed, 0 skipped"));
}

#[test]
fn unreadable_case_is_skipped_with_a_diagnostic() {
    let dir = TempDir::new().unwrap();

    bootcheck()
        .arg("--cases-dir")
        .arg(dir.path())
        .arg(dir.path().join("missing.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("SKIP"))
        .stdout(predicate::str::contains("0 passed, 0 failed, 1 skipped"));
}

#[test]
fn arch_mismatch_is_skipped() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("otherarch.json"),
        r#"{
            "compose-request": {"Distro": "d", "Arch": "z80", "Filename": "disk.img"},
            "Manifest": {},
            "Boot": {"Type": "qemu"}
        }"#,
    )
    .unwrap();

    bootcheck()
        .arg("--cases-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("SKIP"))
        .stdout(predicate::str::contains("the required arch is z80"));
}

#[test]
fn undecodable_case_fails_the_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    bootcheck()
        .arg("--cases-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("FAIL"));
}

#[test]
fn unknown_boot_type_is_a_fatal_configuration_error() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("warp.json"),
        format!(
            r#"{{
                "compose-request": {{"Distro": "d", "Arch": "{arch}", "Filename": "disk.img"}},
                "Manifest": {{}},
                "Boot": {{"Type": "warp-drive"}}
            }}"#,
            arch = std::env::consts::ARCH,
        ),
    )
    .unwrap();

    bootcheck()
        .arg("--cases-dir")
        .arg(dir.path())
        .arg("--osbuild")
        .arg("true")
        .arg("--disable-local-boot")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown boot type: warp-drive"));
}

#[test]
fn missing_case_directory_is_an_error() {
    bootcheck()
        .arg("--cases-dir")
        .arg("/nonexistent/bootcheck-cases")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot list test cases"));
}
