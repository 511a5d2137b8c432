// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn spawn_send_capture_kill_cycle() {
    let host = FakeSessionHost::new();
    let id = host
        .spawn("builder-issue-42", Path::new("/tmp"), "claude", &[])
        .await
        .unwrap();
    assert_eq!(id, "loom-builder-issue-42");
    assert!(host.is_alive(&id).await.unwrap());

    host.send(&id, "/builder 42").await.unwrap();
    host.send_enter(&id).await.unwrap();
    host.set_pane_content(&id, "esc to interrupt");
    assert_eq!(host.capture_output(&id, 50).await.unwrap(), "esc to interrupt");

    host.kill(&id).await.unwrap();
    assert!(!host.is_alive(&id).await.unwrap());

    let session = host.session(&id).unwrap();
    assert_eq!(session.sent_keys, vec!["/builder 42", "Enter"]);
}

#[tokio::test]
async fn dead_session_rejects_sends() {
    let host = FakeSessionHost::new();
    let id = host
        .spawn("x", Path::new("/tmp"), "true", &[])
        .await
        .unwrap();
    host.kill(&id).await.unwrap();
    assert!(host.send(&id, "hi").await.is_err());
}

#[tokio::test]
async fn list_sessions_only_alive() {
    let host = FakeSessionHost::new();
    let a = host.spawn("a", Path::new("/tmp"), "t", &[]).await.unwrap();
    let _b = host.spawn("b", Path::new("/tmp"), "t", &[]).await.unwrap();
    host.kill(&a).await.unwrap();
    assert_eq!(host.list_sessions().await.unwrap(), vec!["loom-b"]);
}

#[tokio::test]
async fn exit_code_visible_after_set() {
    let host = FakeSessionHost::new();
    let id = host.spawn("a", Path::new("/tmp"), "t", &[]).await.unwrap();
    assert_eq!(host.exit_code(&id).await.unwrap(), None);
    host.set_exit_code(&id, 4);
    assert_eq!(host.exit_code(&id).await.unwrap(), Some(4));
}

#[tokio::test]
async fn fail_next_spawn() {
    let host = FakeSessionHost::new();
    host.fail_next_spawn("no server");
    assert!(host
        .spawn("a", Path::new("/tmp"), "t", &[])
        .await
        .is_err());
    // Subsequent spawns succeed
    assert!(host.spawn("a", Path::new("/tmp"), "t", &[]).await.is_ok());
}
