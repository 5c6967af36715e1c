//! Read-only status projection of the state document.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::state::{Reason, Status, Step, TaskState, TestTally, UnitKind};
use crate::io::init::ForemanPaths;
use crate::io::state_store::load_state;

/// Snapshot answered to status queries; a projection, never a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub unit_id: Option<String>,
    pub kind: UnitKind,
    pub step: Step,
    pub status: Status,
    pub attempt: u32,
    pub max_attempts: u32,
    pub reason: Option<Reason>,
    pub timeout_minutes: u32,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tests: Option<TestTally>,
    pub failing_tests: Vec<String>,
    pub lint_pass: Option<bool>,
    pub files_changed: Vec<String>,
    pub blocked_by: Vec<String>,
    pub human_note: Option<String>,
}

impl StatusReport {
    pub fn from_state(state: &TaskState) -> Self {
        Self {
            unit_id: state.unit_id.clone(),
            kind: state.kind,
            step: state.step,
            status: state.status,
            attempt: state.attempt,
            max_attempts: state.max_attempts,
            reason: state.reason,
            timeout_minutes: state.timeout_minutes,
            dispatched_at: state.dispatched_at,
            completed_at: state.completed_at,
            tests: state.tests,
            failing_tests: state.failing_tests.clone(),
            lint_pass: state.lint_pass,
            files_changed: state.files_changed.clone(),
            blocked_by: state.blocked_by.clone(),
            human_note: state.human_note.clone(),
        }
    }
}

/// Load the current state and project it.
pub fn project_status(root: &Path) -> Result<StatusReport> {
    let paths = ForemanPaths::new(root);
    let state = load_state(&paths.schema_path, &paths.state_path)?;
    Ok(StatusReport::from_state(&state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::io::init::ForemanPaths;
    use crate::start::start_story;

    #[test]
    fn status_reflects_the_document_without_mutation() {
        let temp = tempfile::tempdir().expect("tempdir");
        start_story(temp.path(), "S-1").expect("start");

        let paths = ForemanPaths::new(temp.path());
        let before = fs::read(&paths.state_path).expect("read");

        let report = project_status(temp.path()).expect("status");
        assert_eq!(report.unit_id.as_deref(), Some("S-1"));
        assert_eq!(report.step, Step::Bootstrap);
        assert_eq!(report.status, Status::Pending);

        let after = fs::read(&paths.state_path).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn status_without_state_is_a_hard_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(project_status(temp.path()).is_err());
    }
}
