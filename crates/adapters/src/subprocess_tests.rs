// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn runs_command_and_captures_stdout() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo")
        .await
        .unwrap();
    assert_eq!(stdout_or_stderr(output, "echo").unwrap(), "hello");
}

#[tokio::test]
async fn timeout_produces_descriptive_error() {
    let mut cmd = Command::new("sleep");
    cmd.arg("5");
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleep test")
        .await
        .unwrap_err();
    assert!(err.contains("timed out"), "unexpected error: {err}");
}

#[tokio::test]
async fn missing_binary_is_an_error() {
    let cmd = Command::new("definitely-not-a-real-binary-4242");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "nonexistent")
        .await
        .unwrap_err();
    assert!(err.contains("failed"), "unexpected error: {err}");
}

#[tokio::test]
async fn nonzero_exit_surfaces_stderr() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo oops >&2; exit 1"]);
    let output = run_with_timeout(cmd, Duration::from_secs(5), "sh")
        .await
        .unwrap();
    let err = stdout_or_stderr(output, "sh").unwrap_err();
    assert!(err.contains("oops"));
}
