//! Test-only helpers for constructing task states.

use chrono::TimeZone;

use crate::core::rules::RulesTable;
use crate::core::state::{Status, Step, TaskState, UnitKind};

/// Create a deterministic state positioned at `step` with `status`.
///
/// Limits come from the step's rule; running states get a fixed dispatch
/// timestamp so invariants hold.
pub fn state_at(step: Step, status: Status) -> TaskState {
    let (max_attempts, timeout_minutes) = match RulesTable::new().rule_for(step) {
        Ok(rule) => (rule.max_attempts, rule.timeout_minutes),
        Err(_) => (1, 1),
    };
    let dispatched_at = (status == Status::Running)
        .then(|| chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    TaskState {
        unit_id: Some("S-1".to_string()),
        kind: UnitKind::Story,
        step,
        attempt: 1,
        max_attempts,
        status,
        reason: None,
        dispatched_at,
        completed_at: None,
        timeout_minutes,
        tests: None,
        failing_tests: Vec::new(),
        lint_pass: None,
        files_changed: Vec::new(),
        blocked_by: Vec::new(),
        human_note: None,
    }
}
