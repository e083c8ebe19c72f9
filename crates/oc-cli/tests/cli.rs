//! End-to-end tests for the `onchange` binary.

use std::process::Command;

use tempfile::TempDir;

fn onchange() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_onchange"));
    command.env("NO_COLOR", "1").env_remove("RUST_LOG");
    for var in [
        "ONCHANGE_CMD",
        "ONCHANGE_TIMEOUT",
        "ONCHANGE_DEBOUNCE",
        "ONCHANGE_RENAME_WINDOW",
        "ONCHANGE_DETECT_CREATE",
    ] {
        command.env_remove(var);
    }
    command
}

#[test]
fn test_print_config_reflects_options() {
    let output = onchange()
        .args(["--print-config", "--debounce", "250", "-t", "5000", "*.rb"])
        .output()
        .expect("binary runs");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("UTF-8 output");
    assert!(stdout.contains("\"pending_period_ms\": 250"));
    assert!(stdout.contains("\"timeout_ms\": 5000"));
    assert!(stdout.contains("\"regard_rename_as_mod_period_ms\": 1000"));
}

#[test]
fn test_environment_overrides_defaults() {
    let output = onchange()
        .env("ONCHANGE_RENAME_WINDOW", "300")
        .args(["--print-config", "*.rb"])
        .output()
        .expect("binary runs");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("UTF-8 output");
    assert!(stdout.contains("\"regard_rename_as_mod_period_ms\": 300"));
}

#[test]
fn test_unresolvable_patterns_fail_startup() {
    let temp = TempDir::new().expect("Failed to create temp directory");

    let output = onchange()
        .current_dir(temp.path())
        .args(["missing/*.rb", "gone.txt"])
        .output()
        .expect("binary runs");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no pattern resolved"), "{stderr}");
}

#[test]
fn test_missing_pattern_is_usage_error() {
    let output = onchange().output().expect("binary runs");
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}
