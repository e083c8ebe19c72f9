//! Integration tests for command execution.

#![cfg(unix)]

use std::time::{Duration, Instant};

use oc_core::ExecConfig;
use oc_exec::{ExecError, StopReason, TimeoutArbiter, execute, execute_with_timeout};
use tempfile::TempDir;

#[tokio::test]
async fn test_execute_runs_command_with_quoted_arguments() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let marker = temp.path().join("marker file.txt");
    let command = format!("sh -c 'echo done > \"$1\"' sh '{}'", marker.display());

    execute(&command).await.expect("command succeeds");
    let contents = std::fs::read_to_string(&marker).expect("marker written");
    assert_eq!(contents.trim(), "done");
}

#[tokio::test]
async fn test_nonzero_exit_without_timeout() {
    let err = execute_with_timeout("false", 0).await.expect_err("false fails");
    assert!(matches!(err, ExecError::Process { interrupted: None, .. }));
    assert_eq!(err.code(), Some(1));
}

#[tokio::test]
async fn test_interrupted_child_result_is_its_own() {
    // The child handles SIGINT and exits cleanly, so the run succeeds.
    let started = Instant::now();
    execute_with_timeout("sh -c 'trap \"exit 0\" INT; sleep 5 & wait'", 300)
        .await
        .expect("child exits 0 after SIGINT");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_child_exit_code_after_timeout_is_preserved() {
    let err = execute_with_timeout("sh -c 'trap \"exit 7\" INT; sleep 5 & wait'", 300)
        .await
        .expect_err("child exits 7");
    assert_eq!(err.code(), Some(7));
    assert_eq!(err.interrupted(), Some(StopReason::Timeout));
    assert!(err.to_string().contains("interrupted (timeout)"));
}

#[tokio::test]
async fn test_concurrent_commands_are_independent() {
    let arbiter = TimeoutArbiter::new(&ExecConfig {
        timeout_ms: 300,
        ..ExecConfig::default()
    });

    let started = Instant::now();
    let (slow, fast) = tokio::join!(arbiter.run("sleep 5"), arbiter.run("sleep 0.05"));

    assert_eq!(
        slow.expect_err("slow interrupted").interrupted(),
        Some(StopReason::Timeout)
    );
    fast.expect("fast completes");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_parse_errors_never_spawn() {
    for command in ["", "echo \"unterminated"] {
        let err = execute_with_timeout(command, 100).await.expect_err("parse error");
        assert!(matches!(err, ExecError::Parse { .. }), "{command:?}");
    }
}
