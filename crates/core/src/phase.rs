// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase pipeline types: phases, validation results, worker exit contract.

use serde::{Deserialize, Serialize};

/// One stage of the fixed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Curator,
    Builder,
    Judge,
    Doctor,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Curator => "curator",
            Self::Builder => "builder",
            Self::Judge => "judge",
            Self::Doctor => "doctor",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "curator" => Some(Self::Curator),
            "builder" => Some(Self::Builder),
            "judge" => Some(Self::Judge),
            "doctor" => Some(Self::Doctor),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of a phase contract check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Satisfied,
    Recovered,
    Failed,
}

/// Result of a phase contract validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub phase: Phase,
    pub issue: u64,
    pub status: ValidationStatus,
    pub message: String,
    #[serde(default)]
    pub recovery_action: String,
}

impl ValidationResult {
    pub fn satisfied(phase: Phase, issue: u64, message: impl Into<String>) -> Self {
        Self {
            phase,
            issue,
            status: ValidationStatus::Satisfied,
            message: message.into(),
            recovery_action: "none".to_string(),
        }
    }

    pub fn recovered(
        phase: Phase,
        issue: u64,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            issue,
            status: ValidationStatus::Recovered,
            message: message.into(),
            recovery_action: recovery_action.into(),
        }
    }

    pub fn failed(phase: Phase, issue: u64, message: impl Into<String>) -> Self {
        Self {
            phase,
            issue,
            status: ValidationStatus::Failed,
            message: message.into(),
            recovery_action: "none".to_string(),
        }
    }

    /// True when the contract is met, either initially or after recovery.
    pub fn is_satisfied(&self) -> bool {
        matches!(
            self.status,
            ValidationStatus::Satisfied | ValidationStatus::Recovered
        )
    }
}

/// Worker subprocess exit contract, observed by the shepherd engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exit 0: phase completed.
    Success,
    /// Exit 3: shutdown signal observed; release and exit cleanly.
    Shutdown,
    /// Exit 4: stuck after internal retry.
    Stuck,
    /// Exit 5: explicit no-op (e.g. pre-existing test failures).
    NoOp,
    /// Any other exit code.
    Failure(i32),
}

impl WorkerExit {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            3 => Self::Shutdown,
            4 => Self::Stuck,
            5 => Self::NoOp,
            other => Self::Failure(other),
        }
    }
}

/// Failure modes surfaced to the scheduler in phase result data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Zero commits made.
    NoProgress,
    /// Commits made but the problem persists.
    InsufficientChanges,
    /// Label state inconsistent with the work performed.
    ValidationFailed,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoProgress => "no_progress",
            Self::InsufficientChanges => "insufficient_changes",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
