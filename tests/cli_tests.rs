//! CLI integration tests.
//!
//! Runs the n2r-diff binary as a subprocess and checks exit status and output.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

fn binary() -> &'static str {
    env!("CARGO_BIN_EXE_n2r-diff")
}

fn run_with_stdin(args: &[&str], input: &str) -> (i32, String) {
    let mut child = Command::new(binary())
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to spawn n2r-diff: {}", e));

    {
        let stdin = child.stdin.as_mut().unwrap();
        stdin.write_all(input.as_bytes()).unwrap();
    }

    let output = child.wait_with_output().unwrap();
    let code = output.status.code().unwrap_or(-1);
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    (code, text)
}

fn run(args: &[&str]) -> (i32, String) {
    run_with_stdin(args, "")
}

fn write_config(dir: &Path, body: &str) -> String {
    let path = dir.join("harness.toml");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

const UNROUNDED: &str = r#"
[tolerance]
kind = "exact"
rounding = "none"
"#;

// ============================================================================
// Exit status
// ============================================================================

#[test]
fn test_version() {
    let (code, out) = run(&["version"]);
    assert_eq!(code, 0);
    assert!(out.contains("n2r-diff v"));
}

#[test]
fn test_default_run_is_clean() {
    let (code, out) = run(&["run", "40", "--seed", "7"]);
    assert_eq!(code, 0, "output: {}", out);
    assert!(out.contains("over 40 cases (seed: 7"));
    assert!(out.contains("40 cases: 40 matched, 0 mismatched"));
}

#[test]
fn test_run_with_workers() {
    let (code, out) = run(&["run", "25", "--seed", "7", "--workers", "3"]);
    assert_eq!(code, 0, "output: {}", out);
    assert!(out.contains("25 cases: 25 matched"));
}

#[test]
fn test_non_positive_count_exits_2() {
    for count in ["0", "-5"] {
        let (code, out) = run(&["run", count]);
        assert_eq!(code, 2, "count {}: {}", count, out);
        assert!(out.contains("sample count must be positive"));
    }
}

#[test]
fn test_mismatches_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), UNROUNDED);
    let (code, out) = run(&["--config", &config, "run", "30", "--seed", "11"]);
    assert_eq!(code, 1, "output: {}", out);
    assert!(out.contains("MISMATCH"));
    assert!(out.contains("=== Divergence at case #"));
    assert!(out.contains("rerun with --seed 11"));
}

#[test]
fn test_missing_engine_is_setup_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[target]
engine = "process"
program = "/no/such/engine"
"#,
    );
    let (code, out) = run(&["--config", &config, "run", "5"]);
    assert_eq!(code, 2);
    assert!(out.contains("target engine"));
}

#[test]
fn test_bad_config_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[tolerance]\nkind = \"absolute\"\nepsilon = -1.0\n");
    let (code, _) = run(&["--config", &config, "run", "5"]);
    assert_eq!(code, 2);

    let (code, _) = run(&["--config", "/no/such/harness.toml", "run", "5"]);
    assert_eq!(code, 2);
}

// ============================================================================
// Input
// ============================================================================

#[test]
fn test_count_from_stdin() {
    let (code, out) = run_with_stdin(&["run", "--seed", "3"], "12\n");
    assert_eq!(code, 0, "output: {}", out);
    assert!(out.contains("over 12 cases"));
}

#[test]
fn test_empty_stdin_uses_config_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[run]\ndefault_count = 9\n");
    let (code, out) = run(&["--config", &config, "run", "--seed", "3"]);
    assert_eq!(code, 0, "output: {}", out);
    assert!(out.contains("over 9 cases"));
}

#[test]
fn test_garbage_stdin_exits_2() {
    let (code, out) = run_with_stdin(&[], "lots\n");
    assert_eq!(code, 2);
    assert!(out.contains("not an integer"));
}

// ============================================================================
// Replay, report, show-config
// ============================================================================

#[test]
fn test_replay_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), UNROUNDED);
    let (code, out) = run(&["--config", &config, "replay", "--value", "1000", "--value", "1001"]);
    assert_eq!(code, 1, "output: {}", out);
    assert!(out.contains("2 cases: 1 matched, 1 mismatched"));
    assert!(out.contains("replay with --value 1001"));

    let (code, _) = run(&["replay", "--value", "1000"]);
    assert_eq!(code, 0);
}

#[test]
fn test_report_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), UNROUNDED);
    let report = dir.path().join("report.json");
    let report_arg = report.to_string_lossy().into_owned();

    let (code, out) = run(&["--config", &config, "run", "20", "--seed", "5", "--report", &report_arg]);
    assert_eq!(code, 1, "output: {}", out);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["seed"], 5);
    assert_eq!(json["reference"], "reference");
    assert_eq!(json["target"], "target");
    assert_eq!(json["summary"]["total_cases"], 20);
}

#[test]
fn test_show_config() {
    let (code, out) = run(&["show-config"]);
    assert_eq!(code, 0);
    assert!(out.contains("[tolerance]"));
    assert!(out.contains("rounding = \"floor\""));
    assert!(out.contains("engine = \"fixed_point\""));
}

#[test]
fn test_show_config_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[run]\nworkers = 4\n\n[tolerance]\nrounding = \"nearest\"\n");

    for args in [
        ["--config", config.as_str(), "show-config"],
        ["show-config", "--config", config.as_str()],
    ] {
        let (code, out) = run(&args);
        assert_eq!(code, 0, "args {:?}: {}", args, out);
        assert!(out.contains("workers = 4"));
        assert!(out.contains("rounding = \"nearest\""));
    }
}

#[test]
fn test_replay_with_config_file_matches() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[run]\ntimeout_ms = 2000\n");
    let (code, out) = run(&[
        "--config", &config, "replay", "--value", "1000", "--value", "1001",
    ]);
    assert_eq!(code, 0, "output: {}", out);
    assert!(out.contains("2 cases: 2 matched, 0 mismatched"));
}

#[test]
fn test_no_subcommand_with_config_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[run]\ndefault_count = 6\n\n[distribution]\nseed = 9\n");
    let (code, out) = run_with_stdin(&["--config", &config], "");
    assert_eq!(code, 0, "output: {}", out);
    assert!(out.contains("over 6 cases (seed: 9"));
}

#[test]
fn test_output_has_no_ansi_escapes_when_piped() {
    let (code, out) = run(&["run", "3", "--seed", "2"]);
    assert_eq!(code, 0, "output: {}", out);
    assert!(!out.contains('\u{1b}'), "output: {:?}", out);
}

#[cfg(unix)]
#[test]
fn test_process_engines() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[reference]
engine = "process"
program = "sh"
args = ["-c", "echo $1", "sh"]

[target]
engine = "process"
program = "sh"
args = ["-c", "echo $(($1 + 1))", "sh"]
"#,
    );
    let (code, out) = run(&["--config", &config, "run", "3", "--seed", "1", "--timeout-ms", "5000"]);
    assert_eq!(code, 1, "output: {}", out);
    assert!(out.contains("3 cases: 0 matched, 3 mismatched"));
    assert!(out.contains("divergence=1"));
}
