//! Exit codes and file layout of the `pgo2mbox` binary.

mod common;

use std::process::{Command, Output};

use assert_fs::prelude::*;
use predicates::prelude::*;

use common::ArchiveFixture;

fn pgo2mbox(dir: &assert_fs::TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pgo2mbox"))
        .current_dir(dir.path())
        .env("PGO2MBOX_CONFIG", dir.path().join("no-such-config.toml"))
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn healthy_archive(dir: &assert_fs::TempDir) {
    ArchiveFixture::create(dir.path())
        .person(1, b"Alice", b"a@b.com")
        .group(1, "Test")
        .message(1, 1, 1, 1, None, 1, b"<p>hello</p>")
        .message(2, 1, 2, 1, Some(1), 1, b"<p>reply</p>");
}

#[test]
fn test_successful_run() {
    let dir = assert_fs::TempDir::new().unwrap();
    healthy_archive(&dir);

    let output = pgo2mbox(&dir, &["archive.pgo", "--dates", "utc"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let out = dir.child("archive_mbox");
    out.assert(predicate::path::is_dir());
    out.child("Test.mbox").assert(predicate::path::is_file());
    out.child("Test.mbox")
        .assert(predicate::str::contains("Message-ID: <Test_2@yahoogroups.invalid>"));
    out.child("Test.mbox.lock").assert(predicate::path::missing());
    out.child("pgo2mbox.log")
        .assert(predicate::str::contains("Starting conversion"));
}

#[test]
fn test_explicit_output_dir() {
    let dir = assert_fs::TempDir::new().unwrap();
    healthy_archive(&dir);

    let output = pgo2mbox(&dir, &["archive.pgo", "-o", "mail", "--flush-after", "1"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    dir.child("mail/Test.mbox").assert(predicate::path::is_file());
    dir.child("archive_mbox").assert(predicate::path::missing());
}

#[test]
fn test_contradictory_flags_fail_before_output() {
    let dir = assert_fs::TempDir::new().unwrap();
    healthy_archive(&dir);

    let output = pgo2mbox(&dir, &["archive.pgo", "--flush-after", "-1", "--max-size", "100"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid configuration"));
    dir.child("archive_mbox").assert(predicate::path::missing());
}

#[test]
fn test_missing_source() {
    let dir = assert_fs::TempDir::new().unwrap();

    let output = pgo2mbox(&dir, &["missing.pgo"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    dir.child("missing_mbox").assert(predicate::path::missing());
}

#[test]
fn test_failed_group_exit_code() {
    let dir = assert_fs::TempDir::new().unwrap();
    ArchiveFixture::create(dir.path())
        .person(1, b"Alice", b"a@b.com")
        .group(1, "Broken")
        .group(2, "Fine")
        .message(1, 1, 1, 1, None, 99, b"<p>orphan</p>")
        .message(2, 2, 1, 1, None, 1, b"<p>fine</p>");

    let output = pgo2mbox(&dir, &["archive.pgo"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 group(s) failed"));
    dir.child("archive_mbox/Fine.mbox")
        .assert(predicate::str::contains("<p>fine</p>"));
}

#[test]
fn test_config_file_supplies_defaults() {
    let dir = assert_fs::TempDir::new().unwrap();
    healthy_archive(&dir);
    let config = dir.child("config.toml");
    config
        .write_str("[conversion]\noutput_dir = \"from-config\"\n\n[logging]\nlog_file = false\n")
        .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_pgo2mbox"))
        .current_dir(dir.path())
        .env("PGO2MBOX_CONFIG", config.path())
        .arg("archive.pgo")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    dir.child("from-config/Test.mbox")
        .assert(predicate::path::is_file());
    dir.child("from-config/pgo2mbox.log")
        .assert(predicate::path::missing());
}
