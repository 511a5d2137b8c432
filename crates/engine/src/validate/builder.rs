// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder contract: an open PR with `loom:review-requested` must exist for
//! the issue. Includes mechanical recovery — when the worker produced
//! substantive changes but exited before finishing the git/PR steps, the
//! validator stages, commits, pushes, and opens the PR itself.

use super::diagnostics::gather_builder_diagnostics;
use super::pr_body::{build_recovery_pr_body, derive_commit_message, is_rate_limited_builder_exit};
use super::{mark_phase_failed, ValidateOptions};
use crate::context::EngineContext;
use loom_adapters::{parse_porcelain_path, EntityState, SessionHost, Tracker, Vcs};
use loom_core::{feature_branch, labels, pr_title, Clock, Phase, ShepherdProgress, ValidationResult};
use loom_storage::{log_recovery_event, read_checkpoint, CheckpointStage, RecoveryEvent};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

// Allow expect here as the regexes are compile-time verified to be valid
#[allow(clippy::expect_used)]
static CLOSING_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Closes|Fixes|Resolves)\s+#(\d+)").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static CLOSING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(Closes|Fixes|Resolves)\s+#\d+\s*$")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static SUMMARY_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^## Summary").expect("constant regex pattern is valid"));

// Generic PR title anti-patterns: the builder failed to derive a meaningful
// title from its diff. Warning only — the PR already exists and blocking
// here would disrupt the pipeline.
#[allow(clippy::expect_used)]
static GENERIC_TITLES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)implement\s+changes?\s+for\s+issue",
        r"(?i)address\s+issue\s+#?\d+",
        r"(?i)implement\s+feature\s+from\s+issue",
        r"(?i)^issue\s+#?\d+\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("constant regex pattern is valid"))
    .collect()
});

/// Delay before the single checkpoint-driven PR re-search (tracker eventual
/// consistency).
const CHECKPOINT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Minimum meaningful body length after stripping closing keywords.
const MINIMAL_BODY_CHARS: usize = 80;

/// How a PR was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FoundBy {
    CallerCached,
    BranchName,
    ClosingKeyword,
}

/// Record a heartbeat milestone on the shepherd's progress document.
async fn report_milestone<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    task_id: Option<&str>,
    action: &str,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let Some(task_id) = task_id else { return };
    let path = ctx.paths.progress_file(task_id);
    if !path.is_file() {
        return;
    }
    let now = ctx.timestamp();
    let action = action.to_string();
    let result = ctx.store.update::<ShepherdProgress, _>(&path, |progress| {
        progress.heartbeat(&now, None);
        progress.milestones.push(
            loom_core::Milestone::new("heartbeat", &now).with_data("action", action.clone()),
        );
    });
    if let Err(e) = result {
        warn!(task_id, error = %e, "failed to report milestone");
    }
}

/// Find an open PR for the issue via the ordered discovery strategies.
async fn find_pr_for_issue<T: Tracker>(
    tracker: &T,
    issue: u64,
    cached_pr: Option<u64>,
) -> Option<(u64, FoundBy)> {
    if let Some(cached) = cached_pr {
        if let Ok(EntityState::Open) = tracker.pr_state(cached).await {
            return Some((cached, FoundBy::CallerCached));
        }
    }

    if let Ok(Some(pr)) = tracker
        .find_pr_by_head(&feature_branch(issue), EntityState::Open)
        .await
    {
        return Some((pr, FoundBy::BranchName));
    }

    for keyword in ["Closes", "Fixes", "Resolves"] {
        if let Ok(Some(pr)) = tracker.search_open_prs(&format!("{keyword} #{issue}")).await {
            return Some((pr, FoundBy::ClosingKeyword));
        }
    }

    None
}

/// Ensure the PR body carries a closing keyword for *this* issue.
///
/// Wrong-issue keywords are struck through (`~~Closes #N~~`) rather than
/// deleted — the audit trail stays intact — and the correct keyword is
/// appended. Everything lands in a single body edit.
async fn ensure_pr_body_references_issue<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    pr: u64,
    issue: u64,
    task_id: Option<&str>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let Ok(mut body) = ctx.tracker.pr_body(pr).await else {
        return;
    };

    let has_correct_ref = CLOSING_REF.captures_iter(&body).any(|cap| {
        cap.get(2)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map(|n| n == issue)
            .unwrap_or(false)
    });

    // Strike out references to other issues in place, preserving them for
    // the audit trail.
    let mut wrong_numbers: Vec<u64> = Vec::new();
    let struck = CLOSING_REF.replace_all(&body, |caps: &regex::Captures| {
        let keyword = &caps[1];
        let number: u64 = caps[2].parse().unwrap_or(issue);
        if number != issue {
            wrong_numbers.push(number);
            format!("~~{keyword} #{number}~~ (removed: wrong issue)")
        } else {
            caps[0].to_string()
        }
    });
    let mut needs_edit = false;
    if !wrong_numbers.is_empty() {
        body = struck.into_owned();
        needs_edit = true;
        let wrong_list = wrong_numbers
            .iter()
            .map(|n| format!("#{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        report_milestone(
            ctx,
            task_id,
            &format!(
                "warning: PR #{pr} referenced wrong issue(s) {wrong_list} instead of #{issue} \
                 -- removed closing keywords"
            ),
        )
        .await;
    }

    if !has_correct_ref {
        if body.is_empty() {
            body = format!("Closes #{issue}");
        } else {
            body = format!("{body}\n\nCloses #{issue}");
        }
        needs_edit = true;
    }

    if needs_edit {
        if let Err(e) = ctx.tracker.edit_pr_body(pr, &body).await {
            warn!(pr, error = %e, "failed to correct PR body references");
            return;
        }
        report_milestone(
            ctx,
            task_id,
            &format!("recovery: ensured PR #{pr} body references #{issue}"),
        )
        .await;
    }
}

/// Warn (via milestone) when the PR title matches a generic anti-pattern.
async fn warn_generic_pr_title<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    pr: u64,
    task_id: Option<&str>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let Ok(title) = ctx.tracker.pr_title(pr).await else {
        return;
    };
    if title.is_empty() {
        return;
    }
    for pattern in GENERIC_TITLES.iter() {
        if pattern.is_match(&title) {
            report_milestone(
                ctx,
                task_id,
                &format!(
                    "warning: PR #{pr} has generic title matching anti-pattern \
                     /{}/: {title:?}",
                    pattern.as_str()
                ),
            )
            .await;
            return;
        }
    }
}

/// Enrich a PR body that contains no meaningful summary.
///
/// Minimal = under 80 chars once closing keywords are stripped, and no
/// `## Summary` section. The original body is preserved at the end.
async fn recover_minimal_pr_body<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    pr: u64,
    issue: u64,
    task_id: Option<&str>,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let Ok(body) = ctx.tracker.pr_body(pr).await else {
        return;
    };

    if SUMMARY_SECTION.is_match(&body) {
        return;
    }
    let stripped = CLOSING_LINE.replace_all(&body, "");
    if stripped.trim().len() >= MINIMAL_BODY_CHARS {
        return;
    }

    let mut parts: Vec<String> = vec![
        "## Summary".to_string(),
        String::new(),
        "> **Note:** This summary was auto-generated because the builder \
         created a PR with a minimal body."
            .to_string(),
        String::new(),
    ];

    if let Ok(files) = ctx.tracker.pr_files(pr).await {
        if !files.is_empty() {
            parts.push("## Changes".to_string());
            parts.push(String::new());
            for file in files.iter().take(25) {
                parts.push(format!(
                    "- `{} (+{}/-{})`",
                    file.path, file.additions, file.deletions
                ));
            }
            parts.push(String::new());
        }
    }

    if !body.is_empty() {
        parts.push(body.clone());
    }

    if ctx
        .tracker
        .edit_pr_body(pr, &parts.join("\n"))
        .await
        .is_ok()
    {
        report_milestone(
            ctx,
            task_id,
            &format!("recovery: enriched minimal PR #{pr} body for issue #{issue}"),
        )
        .await;
        log_recovery_event(
            &ctx.paths,
            RecoveryEvent {
                timestamp: ctx.timestamp(),
                issue,
                recovery_type: "enrich_pr_body".to_string(),
                reason: "minimal_pr_body".to_string(),
                pr_number: Some(pr),
                ..Default::default()
            },
        );
    }
}

fn substantive_status_lines(status: &[String]) -> Vec<String> {
    status
        .iter()
        .filter(|line| {
            let trimmed = line.trim_end();
            !trimmed.ends_with(".loom-in-use") && !line.contains(".loom/")
        })
        .cloned()
        .collect()
}

/// Validate the builder contract for an issue.
pub async fn validate_builder<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    opts: &ValidateOptions,
) -> ValidationResult
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let task_id = opts.task_id.as_deref();

    // Workflow-violation pre-check: missing worktree plus a dirty main
    // usually means the builder worked on main directly.
    if let Some(worktree) = opts.worktree.as_deref() {
        if !Path::new(worktree).is_dir() {
            if let Ok(status) = ctx.vcs.status_porcelain(ctx.paths.repo_root()).await {
                if !status.is_empty() {
                    warn!(
                        issue,
                        worktree,
                        "WORKFLOW VIOLATION: builder appears to have worked on main \
                         instead of in its worktree"
                    );
                }
            }
        }
    }

    // Closed-issue short-circuit
    if let Ok(EntityState::Closed) = ctx.tracker.issue_state(issue).await {
        if let Some((pr, _)) = find_pr_for_issue(&ctx.tracker, issue, opts.pr_number).await {
            return ValidationResult::satisfied(
                Phase::Builder,
                issue,
                format!("Issue #{issue} is closed with associated PR #{pr}"),
            );
        }
        if let Ok(Some(merged)) = ctx
            .tracker
            .find_pr_by_head(&feature_branch(issue), EntityState::Merged)
            .await
        {
            return ValidationResult::satisfied(
                Phase::Builder,
                issue,
                format!("Issue #{issue} is closed with merged PR #{merged}"),
            );
        }
        // Closed without any PR: the builder abandoned the issue. Reopen so
        // legitimate feature requests are not silently destroyed.
        if !opts.check_only {
            let _ = ctx.tracker.reopen_issue(issue).await;
            mark_phase_failed(
                ctx,
                issue,
                Phase::Builder,
                "Issue was closed without an associated PR. Builder may have abandoned \
                 the issue instead of implementing it. Issue has been automatically reopened.",
                "",
                opts.quiet,
            )
            .await;
        }
        return ValidationResult::failed(
            Phase::Builder,
            issue,
            format!("Issue #{issue} was closed without a PR — builder abandoned issue (reopened)"),
        );
    }

    // PR discovery
    let mut pr = find_pr_for_issue(&ctx.tracker, issue, opts.pr_number).await;

    // Checkpoint-aware retry: the worker says it created a PR that the
    // tracker cannot see yet — wait briefly and search once more.
    if pr.is_none() {
        if let Some(worktree) = opts.worktree.as_deref() {
            let wt = Path::new(worktree);
            if wt.is_dir() {
                if let Some(checkpoint) = read_checkpoint(wt) {
                    if checkpoint.stage == CheckpointStage::PrCreated {
                        warn!(
                            issue,
                            "no PR found but checkpoint says pr_created — retrying after \
                             propagation delay"
                        );
                        tokio::time::sleep(CHECKPOINT_RETRY_DELAY).await;
                        pr = find_pr_for_issue(&ctx.tracker, issue, opts.pr_number).await;
                    }
                }
            }
        }
    }

    if let Some((pr_num, found_by)) = pr {
        info!(issue, pr = pr_num, found_by = ?found_by, "found PR for issue");
        // Body correctness runs for every discovery strategy: the builder
        // may have solved the wrong issue.
        if !opts.check_only {
            ensure_pr_body_references_issue(ctx, pr_num, issue, task_id).await;
            warn_generic_pr_title(ctx, pr_num, task_id).await;
            recover_minimal_pr_body(ctx, pr_num, issue, task_id).await;
        }

        let pr_labels = ctx.tracker.pr_labels(pr_num).await.unwrap_or_default();
        if labels::has_label(&pr_labels, labels::REVIEW_REQUESTED) {
            return ValidationResult::satisfied(
                Phase::Builder,
                issue,
                format!("PR #{pr_num} exists with loom:review-requested"),
            );
        }

        if opts.check_only {
            return ValidationResult::failed(
                Phase::Builder,
                issue,
                format!(
                    "PR #{pr_num} exists but missing loom:review-requested \
                     (check-only mode, no recovery attempted)"
                ),
            );
        }

        // Recovery: add the missing label
        if ctx
            .tracker
            .edit_pr_labels(pr_num, &[], &[labels::REVIEW_REQUESTED])
            .await
            .is_ok()
        {
            report_milestone(
                ctx,
                task_id,
                &format!("recovery: added loom:review-requested to PR #{pr_num}"),
            )
            .await;
            log_recovery_event(
                &ctx.paths,
                RecoveryEvent {
                    timestamp: ctx.timestamp(),
                    issue,
                    recovery_type: "add_label".to_string(),
                    reason: "validation_failed".to_string(),
                    pr_number: Some(pr_num),
                    ..Default::default()
                },
            );
            return ValidationResult::recovered(
                Phase::Builder,
                issue,
                format!("Added loom:review-requested to existing PR #{pr_num}"),
                "add_label",
            );
        }
    }

    // No PR found
    if opts.check_only {
        return ValidationResult::failed(
            Phase::Builder,
            issue,
            format!("No PR found for issue #{issue} (check-only mode, no recovery attempted)"),
        );
    }

    let Some(worktree) = opts.worktree.as_deref() else {
        mark_phase_failed(
            ctx,
            issue,
            Phase::Builder,
            &format!(
                "Builder did not create a PR. Searched for: branch '{}' and \
                 'Closes/Fixes/Resolves #{issue}' in PR body. No worktree available.",
                feature_branch(issue)
            ),
            "",
            opts.quiet,
        )
        .await;
        return ValidationResult::failed(
            Phase::Builder,
            issue,
            format!(
                "No PR found (searched by branch '{}' and keywords) and no worktree path provided",
                feature_branch(issue)
            ),
        );
    };

    let wt = Path::new(worktree);
    if !wt.is_dir() {
        let diag = gather_builder_diagnostics(ctx, issue, worktree).await;
        mark_phase_failed(
            ctx,
            issue,
            Phase::Builder,
            "Builder did not create a PR and worktree path does not exist.",
            &diag.to_markdown(),
            opts.quiet,
        )
        .await;
        return ValidationResult::failed(
            Phase::Builder,
            issue,
            format!("Worktree path does not exist: {worktree}"),
        );
    }

    let status = match ctx.vcs.status_porcelain(wt).await {
        Ok(status) => status,
        Err(_) => {
            mark_phase_failed(
                ctx,
                issue,
                Phase::Builder,
                "Builder did not create a PR and worktree is not a valid git directory.",
                "",
                opts.quiet,
            )
            .await;
            return ValidationResult::failed(
                Phase::Builder,
                issue,
                "Could not check worktree status",
            );
        }
    };

    if status.is_empty() {
        // Clean tree: is there unpushed work?
        let unpushed = ctx
            .vcs
            .log_oneline(wt, "@{upstream}..HEAD")
            .await
            .unwrap_or_default();
        if unpushed.is_empty() {
            let diag = gather_builder_diagnostics(ctx, issue, worktree).await;
            mark_phase_failed(
                ctx,
                issue,
                Phase::Builder,
                "Builder did not create a PR. Worktree had no uncommitted or unpushed changes.",
                &diag.to_markdown(),
                opts.quiet,
            )
            .await;
            return ValidationResult::failed(
                Phase::Builder,
                issue,
                "No PR found and no changes in worktree.",
            );
        }

        // Unpushed commits that only add the no-op marker are "no changes
        // needed", not recoverable work.
        let committed = ctx
            .vcs
            .committed_files_vs_upstream(wt)
            .await
            .unwrap_or_default();
        if committed == [loom_storage::NO_CHANGES_MARKER] {
            let diag = gather_builder_diagnostics(ctx, issue, worktree).await;
            mark_phase_failed(
                ctx,
                issue,
                Phase::Builder,
                "Builder committed only the .no-changes-needed marker — treating as \
                 'no changes needed', skipping recovery PR.",
                &diag.to_markdown(),
                opts.quiet,
            )
            .await;
            return ValidationResult::failed(
                Phase::Builder,
                issue,
                "No substantive changes to recover (only .no-changes-needed committed).",
            );
        }
    }

    let substantive = substantive_status_lines(&status);
    if !status.is_empty() && substantive.is_empty() {
        let diag = gather_builder_diagnostics(ctx, issue, worktree).await;
        mark_phase_failed(
            ctx,
            issue,
            Phase::Builder,
            "Builder did not produce substantive changes. Only marker/infrastructure \
             files were found in the worktree.",
            &diag.to_markdown(),
            opts.quiet,
        )
        .await;
        return ValidationResult::failed(
            Phase::Builder,
            issue,
            "No substantive changes to recover (only marker files found).",
        );
    }

    // Mechanical recovery: stage -> commit -> push -> PR.
    mechanical_recovery(ctx, issue, worktree, &status, &substantive, opts).await
}

async fn mechanical_recovery<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    worktree: &str,
    status: &[String],
    substantive: &[String],
    opts: &ValidateOptions,
) -> ValidationResult
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let wt = Path::new(worktree);
    let branch = feature_branch(issue);
    let task_id = opts.task_id.as_deref();

    // Step 1: stage and commit uncommitted substantive changes
    if !status.is_empty() {
        let files_to_stage: Vec<String> = substantive
            .iter()
            .filter_map(|line| parse_porcelain_path(line))
            .collect();

        if !files_to_stage.is_empty() {
            if let Err(e) = ctx.vcs.stage(wt, &files_to_stage).await {
                return recovery_failed(ctx, issue, worktree, opts, "git add", &e.to_string()).await;
            }
            let message = derive_commit_message(issue, &files_to_stage);
            if let Err(e) = ctx.vcs.commit(wt, &message).await {
                return recovery_failed(ctx, issue, worktree, opts, "git commit", &e.to_string())
                    .await;
            }
        }
    }

    // Step 2: push
    if let Err(e) = ctx.vcs.push_upstream(wt, &branch).await {
        return recovery_failed(ctx, issue, worktree, opts, "git push", &e.to_string()).await;
    }

    // Step 3: create the PR
    let rate_limited = is_rate_limited_builder_exit(ctx, issue);
    let issue_title = ctx.tracker.issue_title(issue).await.unwrap_or(None);
    let title = pr_title(issue_title.as_deref(), issue);
    let body = build_recovery_pr_body(ctx, issue, worktree, rate_limited).await;

    let pr_num = match ctx
        .tracker
        .create_pr(&branch, &title, &body, &[labels::REVIEW_REQUESTED])
        .await
    {
        Ok(pr) => pr,
        Err(e) => {
            return recovery_failed(ctx, issue, worktree, opts, "pr create", &e.to_string()).await;
        }
    };

    let source = if rate_limited {
        "rate-limited"
    } else {
        "uncommitted"
    };
    report_milestone(
        ctx,
        task_id,
        &format!("recovery: created PR from {source} worktree changes for issue #{issue}"),
    )
    .await;
    log_recovery_event(
        &ctx.paths,
        RecoveryEvent {
            timestamp: ctx.timestamp(),
            issue,
            recovery_type: "commit_and_pr".to_string(),
            reason: if rate_limited {
                "rate_limited".to_string()
            } else {
                "validation_failed".to_string()
            },
            worktree_had_changes: !status.is_empty(),
            pr_number: Some(pr_num),
            builder_exit_reason: rate_limited.then(|| "rate_limited".to_string()),
            ..Default::default()
        },
    );

    ValidationResult::recovered(
        Phase::Builder,
        issue,
        format!(
            "Recovered: staged, committed, pushed, and created PR from worktree changes{}",
            if rate_limited {
                " (builder was rate-limited)"
            } else {
                ""
            }
        ),
        "commit_and_pr",
    )
}

async fn recovery_failed<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    worktree: &str,
    opts: &ValidateOptions,
    step: &str,
    error: &str,
) -> ValidationResult
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    let truncated: String = error.chars().take(200).collect();
    let diag = gather_builder_diagnostics(ctx, issue, worktree).await;
    mark_phase_failed(
        ctx,
        issue,
        Phase::Builder,
        &format!("Recovery failed: {step} failed: {truncated}"),
        &diag.to_markdown(),
        opts.quiet,
    )
    .await;
    ValidationResult::failed(
        Phase::Builder,
        issue,
        format!("Recovery failed: could not complete {step}."),
    )
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
