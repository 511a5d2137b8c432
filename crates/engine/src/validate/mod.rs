// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase contract validators.
//!
//! Each phase leaves label and artefact evidence behind; validators check
//! that evidence and attempt mechanical recovery where the missing piece is
//! purely procedural. `check_only` suppresses every side effect; `quiet`
//! permits recovery but suppresses failure labels and diagnostic comments
//! (mid-pipeline retries would otherwise spam the issue).

mod builder;
mod diagnostics;
mod pr_body;

pub use builder::validate_builder;
pub use diagnostics::BuilderDiagnostics;
pub use pr_body::derive_commit_message;

use crate::context::EngineContext;
use loom_adapters::{SessionHost, Tracker, Vcs};
use loom_core::{labels, Clock, Phase, ValidationResult};
use tracing::warn;

/// Options shared by all phase validators.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Worktree path (required for builder mechanical recovery).
    pub worktree: Option<String>,
    /// Caller's cached PR number (judge/doctor need it; builder verifies it).
    pub pr_number: Option<u64>,
    /// Shepherd task id for milestone reporting.
    pub task_id: Option<String>,
    /// Check contract status only; skip all side effects.
    pub check_only: bool,
    /// Attempt recovery but suppress failure labels and comments.
    pub quiet: bool,
}

/// Validate a phase contract.
pub async fn validate_phase<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    phase: Phase,
    issue: u64,
    opts: &ValidateOptions,
) -> ValidationResult
where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    match phase {
        Phase::Curator => validate_curator(ctx, issue, opts).await,
        Phase::Builder => validate_builder(ctx, issue, opts).await,
        Phase::Judge => validate_judge(ctx, issue, opts).await,
        Phase::Doctor => validate_doctor(ctx, issue, opts).await,
    }
}

/// Curator contract: issue must carry `loom:curated`.
pub async fn validate_curator<T, S, V, C>(
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
    let issue_labels = match ctx.tracker.issue_labels(issue).await {
        Ok(labels) => labels,
        Err(_) => {
            return ValidationResult::failed(Phase::Curator, issue, "Could not fetch issue labels")
        }
    };

    if labels::has_label(&issue_labels, labels::CURATED) {
        return ValidationResult::satisfied(
            Phase::Curator,
            issue,
            "Issue has loom:curated label",
        );
    }

    if opts.check_only {
        return ValidationResult::failed(
            Phase::Curator,
            issue,
            "Issue missing loom:curated label (check-only mode, no recovery attempted)",
        );
    }

    // Recovery: apply the label
    match ctx
        .tracker
        .edit_issue_labels(issue, &[labels::CURATING], &[labels::CURATED])
        .await
    {
        Ok(()) => ValidationResult::recovered(
            Phase::Curator,
            issue,
            "Applied loom:curated label",
            "apply_label",
        ),
        Err(_) => {
            ValidationResult::failed(Phase::Curator, issue, "Could not apply loom:curated label")
        }
    }
}

/// Judge contract: PR must carry `loom:pr` or `loom:changes-requested`.
pub async fn validate_judge<T, S, V, C>(
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
    let Some(pr_number) = opts.pr_number else {
        return ValidationResult::failed(
            Phase::Judge,
            issue,
            "PR number required for judge phase validation",
        );
    };

    let pr_labels = match ctx.tracker.pr_labels(pr_number).await {
        Ok(labels) => labels,
        Err(_) => return ValidationResult::failed(Phase::Judge, issue, "Could not fetch PR labels"),
    };

    if labels::has_label(&pr_labels, labels::PR_APPROVED) {
        return ValidationResult::satisfied(
            Phase::Judge,
            issue,
            format!("PR #{pr_number} approved (loom:pr)"),
        );
    }
    if labels::has_label(&pr_labels, labels::CHANGES_REQUESTED) {
        return ValidationResult::satisfied(
            Phase::Judge,
            issue,
            format!("PR #{pr_number} has changes requested (loom:changes-requested)"),
        );
    }

    // Doctor just re-submitted and judge hasn't labelled its outcome yet:
    // an expected intermediate state, reported distinctly.
    let message = if labels::has_label(&pr_labels, labels::REVIEW_REQUESTED) {
        format!(
            "PR #{pr_number} has loom:review-requested (Doctor applied fixes) \
             but judge did not produce outcome label yet"
        )
    } else {
        format!("Judge did not produce loom:pr or loom:changes-requested on PR #{pr_number}")
    };

    if !opts.check_only {
        mark_phase_failed(
            ctx,
            issue,
            Phase::Judge,
            &format!("Judge phase did not produce a review decision on PR #{pr_number}."),
            "",
            opts.quiet,
        )
        .await;
    }

    ValidationResult::failed(Phase::Judge, issue, message)
}

/// Doctor contract: PR must carry `loom:review-requested` again.
pub async fn validate_doctor<T, S, V, C>(
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
    let Some(pr_number) = opts.pr_number else {
        return ValidationResult::failed(
            Phase::Doctor,
            issue,
            "PR number required for doctor phase validation",
        );
    };

    let pr_labels = match ctx.tracker.pr_labels(pr_number).await {
        Ok(labels) => labels,
        Err(_) => {
            return ValidationResult::failed(Phase::Doctor, issue, "Could not fetch PR labels")
        }
    };

    if labels::has_label(&pr_labels, labels::REVIEW_REQUESTED) {
        return ValidationResult::satisfied(
            Phase::Doctor,
            issue,
            format!("PR #{pr_number} has loom:review-requested"),
        );
    }

    if !opts.check_only {
        mark_phase_failed(
            ctx,
            issue,
            Phase::Doctor,
            &format!("Doctor phase did not apply loom:review-requested to PR #{pr_number}."),
            "",
            opts.quiet,
        )
        .await;
    }

    ValidationResult::failed(
        Phase::Doctor,
        issue,
        format!("Doctor did not re-request review on PR #{pr_number}"),
    )
}

/// Swap `loom:building` to `loom:blocked` and attach a diagnostic comment.
///
/// Suppressed entirely in quiet mode so intermediate retry failures leave no
/// residue when the shepherd later recovers.
pub(crate) async fn mark_phase_failed<T, S, V, C>(
    ctx: &EngineContext<T, S, V, C>,
    issue: u64,
    phase: Phase,
    reason: &str,
    diagnostics_markdown: &str,
    quiet: bool,
) where
    T: Tracker,
    S: SessionHost,
    V: Vcs,
    C: Clock,
{
    if quiet {
        return;
    }

    if let Err(e) = ctx
        .tracker
        .edit_issue_labels(issue, &[labels::BUILDING], &[labels::BLOCKED])
        .await
    {
        warn!(issue, error = %e, "failed to apply blocked label");
    }

    let mut body = format!(
        "**Phase contract failed**: `{phase}` phase did not produce expected outcome. {reason}\n\n\
         The issue has been labelled `loom:blocked`; see the recovery options below."
    );
    if !diagnostics_markdown.is_empty() {
        body.push_str("\n\n");
        body.push_str(diagnostics_markdown);
    }

    if let Err(e) = ctx.tracker.comment_issue(issue, &body).await {
        warn!(issue, error = %e, "failed to attach failure comment");
    }
}

/// Strip ANSI escape sequences from captured terminal output.
pub(crate) fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequence: ESC [ ... final byte in @-~
            if chars.peek() == Some(&'[') {
                chars.next();
                for follow in chars.by_ref() {
                    if ('@'..='~').contains(&follow) {
                        break;
                    }
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
