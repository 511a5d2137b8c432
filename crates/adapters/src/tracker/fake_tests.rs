// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn list_issues_filters_by_label_and_state() {
    let tracker = FakeTracker::new();
    tracker.add_issue(1, "ready", &["loom:issue"], "2026-01-01T00:00:00Z");
    tracker.add_issue(2, "building", &["loom:building"], "2026-01-02T00:00:00Z");
    tracker.add_issue(3, "closed", &["loom:issue"], "2026-01-03T00:00:00Z");
    tracker.close_issue(3);

    let ready = tracker.list_issues(Some("loom:issue")).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].number, 1);

    let all = tracker.list_issues(None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn label_edits_are_recorded_and_applied() {
    let tracker = FakeTracker::new();
    tracker.add_issue(42, "t", &["loom:building"], "2026-01-01T00:00:00Z");

    tracker
        .edit_issue_labels(42, &["loom:building"], &["loom:issue"])
        .await
        .unwrap();

    assert_eq!(tracker.labels_of_issue(42), vec!["loom:issue"]);
    assert_eq!(
        tracker.calls(),
        vec![TrackerCall::EditIssueLabels {
            issue: 42,
            remove: vec!["loom:building".into()],
            add: vec!["loom:issue".into()],
        }]
    );
}

#[tokio::test]
async fn create_pr_assigns_sequential_numbers() {
    let tracker = FakeTracker::new();
    let a = tracker
        .create_pr("feature/issue-1", "t", "b", &["loom:review-requested"])
        .await
        .unwrap();
    let b = tracker
        .create_pr("feature/issue-2", "t", "b", &[])
        .await
        .unwrap();
    assert_eq!(a, 100);
    assert_eq!(b, 101);
    assert_eq!(
        tracker
            .find_pr_by_head("feature/issue-1", EntityState::Open)
            .await
            .unwrap(),
        Some(100)
    );
}

#[tokio::test]
async fn search_matches_body_case_insensitive() {
    let tracker = FakeTracker::new();
    tracker.add_pr(200, "feature/x", "t", "closes #42\nmore", &[]);
    assert_eq!(
        tracker.search_open_prs("Closes #42").await.unwrap(),
        Some(200)
    );
    assert_eq!(tracker.search_open_prs("Closes #99").await.unwrap(), None);
}

#[tokio::test]
async fn injected_query_failure() {
    let tracker = FakeTracker::new();
    tracker.fail_queries_for_label("loom:blocked");
    assert!(tracker.list_issues(Some("loom:blocked")).await.is_err());
    assert!(tracker.list_issues(Some("loom:issue")).await.is_ok());
}

#[tokio::test]
async fn comments_accumulate() {
    let tracker = FakeTracker::new();
    tracker.add_issue(42, "t", &[], "2026-01-01T00:00:00Z");
    tracker.comment_issue(42, "first").await.unwrap();
    tracker.comment_issue(42, "second").await.unwrap();
    assert_eq!(tracker.issue_comments(42), vec!["first", "second"]);
}
