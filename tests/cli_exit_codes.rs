//! CLI behavior through the built binary: exit codes, output files, report modes

mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::ModelBuilder;

fn cuantizar(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cuantizar"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn cuantizar")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 temp path")
}

#[test]
fn test_success_prints_decisions_and_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = ModelBuilder::tiny().write_to(dir.path(), "in.bin");
    let output = dir.path().join("out.bin");

    let out = cuantizar(&[
        "--tensor-type",
        r"encoder\..*=q8_0",
        path_str(&input),
        path_str(&output),
        "q4_k",
    ]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(output.exists());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("encoder.blocks.0.attn.query.weight"));
    assert!(stdout.contains("(rule #0)"));
    assert!(stdout.contains("(default)"));
    assert!(stdout.contains("(skipped)"));
    assert!(stdout.contains("mixed precision"));
}

#[test]
fn test_quiet_hides_decision_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = ModelBuilder::tiny().write_to(dir.path(), "in.bin");
    let output = dir.path().join("out.bin");

    let out = cuantizar(&["-q", path_str(&input), path_str(&output), "q5_1"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("encoder.blocks.0.attn.query.weight"));
    assert!(stdout.contains("type summary"));
}

#[test]
fn test_json_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = ModelBuilder::tiny().write_to(dir.path(), "in.bin");
    let output = dir.path().join("out.bin");

    let out = cuantizar(&["--json", path_str(&input), path_str(&output), "7"]);
    assert_eq!(out.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).expect("stdout is JSON");
    assert_eq!(report["tensor_count"], 10);
    assert_eq!(report["header_type"], "q8_0");
    assert_eq!(report["hparams"]["ftype"], 2007);
}

#[test]
fn test_unknown_rule_type_exits_1_without_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = ModelBuilder::tiny().write_to(dir.path(), "in.bin");
    let output = dir.path().join("out.bin");

    let out = cuantizar(&[
        "--tensor-type",
        ".*=q9_bogus",
        path_str(&input),
        path_str(&output),
        "q4_0",
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("q9_bogus"));
    assert!(!output.exists());
}

#[test]
fn test_argument_errors_exit_1() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = ModelBuilder::tiny().write_to(dir.path(), "in.bin");
    let output = dir.path().join("out.bin");
    let (i, o) = (path_str(&input), path_str(&output));

    let cases: [&[&str]; 6] = [
        &[],
        &[i, o],
        &["--tensor-type", "enc(=q4_0", i, o, "q4_0"],
        &["--tensor-type", "no-separator", i, o, "q4_0"],
        &[i, o, "f16"],
        &[i, i, "q4_0"],
    ];
    for args in cases {
        let out = cuantizar(args);
        assert_eq!(out.status.code(), Some(1), "{args:?}");
    }
    assert!(!output.exists());
}

#[test]
fn test_help_lists_types_and_exits_0() {
    let out = cuantizar(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("type = \"q4_k\" or 12"));
    assert!(stdout.contains("--tensor-type"));

    assert_eq!(cuantizar(&["--version"]).status.code(), Some(0));
}

#[test]
fn test_log_level_does_not_change_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = ModelBuilder::tiny().write_to(dir.path(), "in.bin");
    let quiet = dir.path().join("a.bin");
    let noisy = dir.path().join("b.bin");

    let out = cuantizar(&["-q", path_str(&input), path_str(&quiet), "q4_0"]);
    assert_eq!(out.status.code(), Some(0));
    let out = Command::new(env!("CARGO_BIN_EXE_cuantizar"))
        .args(["-q", path_str(&input), path_str(&noisy), "q4_0"])
        .env("RUST_LOG", "debug")
        .output()
        .expect("spawn cuantizar");
    assert_eq!(out.status.code(), Some(0));
    assert!(!out.stderr.is_empty());

    assert_eq!(
        std::fs::read(quiet).expect("read"),
        std::fs::read(noisy).expect("read")
    );
}

#[test]
fn test_library_entry_matches_binary_exit_codes() {
    assert_eq!(cuantizar::cli::run(["cuantizar"]), 1);
    assert_eq!(cuantizar::cli::run(["cuantizar", "--help"]), 0);
}
