//! The persisted task-state document and its closed enums.
//!
//! One document per project tracks where the current unit of work sits in the
//! pipeline. These types define stable contracts between core components and
//! the state store; invariant checks collect human-readable violations and
//! never touch the filesystem.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline position. `Done` is terminal; every other step has a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Bootstrap,
    Scenarios,
    Implement,
    Review,
    Finalize,
    Done,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Bootstrap => "bootstrap",
            Step::Scenarios => "scenarios",
            Step::Implement => "implement",
            Step::Review => "review",
            Step::Finalize => "finalize",
            Step::Done => "done",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap" => Ok(Step::Bootstrap),
            "scenarios" => Ok(Step::Scenarios),
            "implement" => Ok(Step::Implement),
            "review" => Ok(Step::Review),
            "finalize" => Ok(Step::Finalize),
            "done" => Ok(Step::Done),
            other => Err(format!("unknown step '{other}'")),
        }
    }
}

/// Unit discriminator: a structured story or a free-text task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Story,
    Custom,
}

/// Run status for the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Pass,
    Failing,
    NeedsHuman,
    Timeout,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Pass => "pass",
            Status::Failing => "failing",
            Status::NeedsHuman => "needs_human",
            Status::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run failed or needs attention. Drives failure routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NeedsClarification,
    TestFailure,
    LintFailure,
    ScenarioGap,
    BlockedDependency,
}

/// All reason codes, in the order they are documented to executors.
pub const REASONS: &[Reason] = &[
    Reason::NeedsClarification,
    Reason::TestFailure,
    Reason::LintFailure,
    Reason::ScenarioGap,
    Reason::BlockedDependency,
];

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::NeedsClarification => "needs_clarification",
            Reason::TestFailure => "test_failure",
            Reason::LintFailure => "lint_failure",
            Reason::ScenarioGap => "scenario_gap",
            Reason::BlockedDependency => "blocked_dependency",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_clarification" => Ok(Reason::NeedsClarification),
            "test_failure" => Ok(Reason::TestFailure),
            "lint_failure" => Ok(Reason::LintFailure),
            "scenario_gap" => Ok(Reason::ScenarioGap),
            "blocked_dependency" => Ok(Reason::BlockedDependency),
            other => Err(format!("unknown reason '{other}'")),
        }
    }
}

/// Test counts from the last completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTally {
    pub pass: u32,
    pub fail: u32,
    pub skip: u32,
}

/// The per-project state document (`.foreman/state/task.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Identifier of the current story or ad-hoc task; null before first start.
    pub unit_id: Option<String>,
    pub kind: UnitKind,
    pub step: Step,
    /// 1-indexed attempt counter for the current step.
    pub attempt: u32,
    /// Attempt ceiling adopted from the current step's rule.
    pub max_attempts: u32,
    pub status: Status,
    pub reason: Option<Reason>,
    /// Set exactly when the state enters `running`.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Set only when the state leaves `running`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Run budget for the current step, always positive.
    pub timeout_minutes: u32,
    pub tests: Option<TestTally>,
    pub failing_tests: Vec<String>,
    /// Outcome of the step's declared verification command, if it ran.
    pub lint_pass: Option<bool>,
    pub files_changed: Vec<String>,
    /// External blocking identifiers reported by the executor.
    pub blocked_by: Vec<String>,
    /// Pending operator instruction or reviewer comment.
    pub human_note: Option<String>,
}

/// Check semantic invariants the schema cannot express.
///
/// Returns one message per violation; empty means valid.
pub fn validate_invariants(state: &TaskState) -> Vec<String> {
    let mut errors = Vec::new();

    if state.max_attempts == 0 {
        errors.push("max_attempts must be >= 1".to_string());
    }
    if state.timeout_minutes == 0 {
        errors.push("timeout_minutes must be >= 1".to_string());
    }
    if matches!(
        state.status,
        Status::Pending | Status::Running | Status::Failing
    ) {
        if state.attempt == 0 {
            errors.push(format!(
                "attempt must be >= 1 while status is '{}'",
                state.status
            ));
        }
        if state.attempt > state.max_attempts {
            errors.push(format!(
                "attempt {} exceeds max_attempts {} while status is '{}'",
                state.attempt, state.max_attempts, state.status
            ));
        }
    }
    if state.status == Status::Running && state.dispatched_at.is_none() {
        errors.push("status 'running' requires dispatched_at".to_string());
    }
    if state.step == Step::Done && state.status == Status::Running {
        errors.push("terminal step cannot be running".to_string());
    }

    errors
}
