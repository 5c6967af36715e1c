//! The dispatch decision function.
//!
//! `decide` turns the persisted state into the next action: dispatch an
//! instruction, report progress, pause for a human, or stop. It mutates the
//! state in memory and reports whether it did; the orchestration layer
//! decides whether the mutation is committed, which is how the read-only
//! preview gets the identical outcome with no side effects.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::instruction;
use crate::core::rules::RulesTable;
use crate::core::state::{Status, Step, TaskState};

/// Next action for the caller, tagged so one discriminant is enough to
/// branch on. Every variant is an expected pipeline state, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Hand this instruction to the executor; the unit is now running.
    Dispatched {
        step: Step,
        attempt: u32,
        instruction: String,
    },
    /// A run is in flight and within budget; nothing changed.
    AlreadyRunning {
        step: Step,
        elapsed_minutes: i64,
        timeout_minutes: u32,
    },
    /// The run exceeded its budget (transition applied at most once).
    TimedOut { step: Step, elapsed_minutes: i64 },
    /// Paused at the human checkpoint, or waiting on one.
    NeedsHuman { step: Step, summary: String },
    /// Attempt ceiling reached; a human must intervene.
    Blocked {
        step: Step,
        attempts: u32,
        diagnostic: String,
    },
    /// The pipeline is complete for the current unit.
    Completed,
}

/// An outcome plus whether the in-memory state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub mutated: bool,
}

impl Decision {
    fn unchanged(outcome: Outcome) -> Self {
        Self {
            outcome,
            mutated: false,
        }
    }

    fn changed(outcome: Outcome) -> Self {
        Self {
            outcome,
            mutated: true,
        }
    }
}

/// Decide the next action for `state` at time `now`.
pub fn decide(
    state: &mut TaskState,
    rules: &RulesTable,
    now: DateTime<Utc>,
) -> Result<Decision, String> {
    if state.step == Step::Done {
        return Ok(Decision::unchanged(Outcome::Completed));
    }

    if state.status == Status::Running {
        let dispatched_at = state
            .dispatched_at
            .ok_or_else(|| "running state has no dispatched_at".to_string())?;
        let elapsed = now.signed_duration_since(dispatched_at);
        if elapsed.num_seconds() > i64::from(state.timeout_minutes) * 60 {
            state.status = Status::Timeout;
            state.completed_at = Some(now);
            return Ok(Decision::changed(Outcome::TimedOut {
                step: state.step,
                elapsed_minutes: elapsed.num_minutes(),
            }));
        }
        return Ok(Decision::unchanged(Outcome::AlreadyRunning {
            step: state.step,
            elapsed_minutes: elapsed.num_minutes(),
            timeout_minutes: state.timeout_minutes,
        }));
    }

    // The running -> timeout transition happens exactly once; afterwards the
    // unit waits for a human or a new report, it is never re-timed-out.
    if state.status == Status::Timeout {
        let elapsed_minutes = match (state.dispatched_at, state.completed_at) {
            (Some(start), Some(end)) => end.signed_duration_since(start).num_minutes(),
            _ => 0,
        };
        return Ok(Decision::unchanged(Outcome::TimedOut {
            step: state.step,
            elapsed_minutes,
        }));
    }

    let rule = rules.rule_for(state.step)?;

    // The checkpoint pauses anything that has not passed it, except a
    // rejection (`failing`), which must reach the ordinary routing below.
    if rule.needs_review && !matches!(state.status, Status::Pass | Status::Failing) {
        let mutated = state.status != Status::NeedsHuman;
        state.status = Status::NeedsHuman;
        let outcome = Outcome::NeedsHuman {
            step: state.step,
            summary: review_summary(state),
        };
        return Ok(if mutated {
            Decision::changed(outcome)
        } else {
            Decision::unchanged(outcome)
        });
    }

    // Blocked outside the checkpoint: the ceiling was exhausted earlier and
    // only a human (or a fresh unit) unblocks it.
    if state.status == Status::NeedsHuman {
        return Ok(Decision::unchanged(Outcome::Blocked {
            step: state.step,
            attempts: state.attempt,
            diagnostic: blocked_diagnostic(state),
        }));
    }

    if state.status == Status::Pass {
        state.attempt = 1;
        state.reason = None;
        state.failing_tests.clear();
        state.blocked_by.clear();
        state.human_note = None;
        state.lint_pass = None;
        state.step = rule.on_pass;

        if state.step == Step::Done {
            return Ok(Decision::changed(Outcome::Completed));
        }

        let next_rule = rules.rule_for(state.step)?;
        state.max_attempts = next_rule.max_attempts;
        state.timeout_minutes = next_rule.timeout_minutes;

        // Single level of look-ahead: land on a checkpoint and pause there
        // instead of dispatching.
        if next_rule.needs_review {
            state.status = Status::NeedsHuman;
            return Ok(Decision::changed(Outcome::NeedsHuman {
                step: state.step,
                summary: review_summary(state),
            }));
        }
    } else if state.status == Status::Failing {
        if state.attempt >= state.max_attempts {
            let diagnostic = blocked_diagnostic(state);
            let attempts = state.attempt;
            state.status = Status::NeedsHuman;
            return Ok(Decision::changed(Outcome::Blocked {
                step: state.step,
                attempts,
                diagnostic,
            }));
        }

        let target = rule.route_for(state.reason);
        if target == state.step {
            state.attempt += 1;
        } else {
            state.step = target;
            state.attempt = 1;
            let target_rule = rules.rule_for(target)?;
            state.max_attempts = target_rule.max_attempts;
            state.timeout_minutes = target_rule.timeout_minutes;
        }
        state.status = Status::Pending;
    }

    // Dispatch the now-current step.
    let rule = rules.rule_for(state.step)?;
    let text = instruction::build(state, &rule);
    state.status = Status::Running;
    state.dispatched_at = Some(now);
    state.completed_at = None;
    state.reason = None;
    Ok(Decision::changed(Outcome::Dispatched {
        step: state.step,
        attempt: state.attempt,
        instruction: text,
    }))
}

/// Short multi-line summary shown when a unit waits at the checkpoint.
fn review_summary(state: &TaskState) -> String {
    let unit = state.unit_id.as_deref().unwrap_or("(no unit)");
    let mut lines = vec![format!("unit {unit} awaiting review")];
    if let Some(tally) = state.tests {
        lines.push(format!(
            "tests: {} passed, {} failed, {} skipped",
            tally.pass, tally.fail, tally.skip
        ));
    }
    if let Some(lint_pass) = state.lint_pass {
        lines.push(format!(
            "verification: {}",
            if lint_pass { "passed" } else { "failed" }
        ));
    }
    if !state.files_changed.is_empty() {
        lines.push(format!("files changed ({}):", state.files_changed.len()));
        for file in &state.files_changed {
            lines.push(format!("  - {file}"));
        }
    }
    if let Some(note) = state.human_note.as_deref() {
        lines.push(format!("note: {note}"));
    }
    lines.join("\n")
}

fn blocked_diagnostic(state: &TaskState) -> String {
    let reason = state
        .reason
        .map(|r| r.as_str())
        .unwrap_or("none recorded");
    format!(
        "attempts exhausted at {} ({}/{}); last reason: {}",
        state.step, state.attempt, state.max_attempts, reason
    )
}
