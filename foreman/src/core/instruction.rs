//! Instruction-text rendering for the external executor.
//!
//! A deterministic template fill: everything the executor needs is embedded
//! in the text, so it never reads the persisted state document itself.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::rules::{ResolvedRule, resolve_template};
use crate::core::state::{REASONS, Step, TaskState, TestTally};

const INSTRUCTION_TEMPLATE: &str = include_str!("templates/instruction.md");

/// Where the executor must write its completion report, relative to the
/// project root.
pub const REPORT_PATH: &str = ".foreman/report.md";

/// Tallies and changed files inlined into the bookkeeping step's text.
#[derive(Debug, Clone, Serialize)]
struct Handoff {
    pass: u32,
    fail: u32,
    skip: u32,
    files: Vec<String>,
}

/// Render the instruction for the state's current step.
pub fn build(state: &TaskState, rule: &ResolvedRule) -> String {
    let mut env = Environment::new();
    env.add_template("instruction", INSTRUCTION_TEMPLATE)
        .expect("instruction template should be valid");
    let template = env
        .get_template("instruction")
        .expect("instruction template should be registered");

    let unit = state.unit_id.as_deref();
    let handoff = (rule.step == Step::Finalize).then(|| {
        let tally = state.tests.unwrap_or(TestTally {
            pass: 0,
            fail: 0,
            skip: 0,
        });
        Handoff {
            pass: tally.pass,
            fail: tally.fail,
            skip: tally.skip,
            files: state.files_changed.clone(),
        }
    });
    let failing_tests = (state.attempt > 1 && !state.failing_tests.is_empty())
        .then(|| state.failing_tests.clone());
    let outputs: Vec<String> = rule
        .outputs
        .iter()
        .map(|template| resolve_template(template, unit))
        .collect();
    let reason_codes = REASONS
        .iter()
        .map(|reason| reason.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    template
        .render(context! {
            unit => unit.unwrap_or("unassigned"),
            label => rule.label,
            attempt => state.attempt,
            max_attempts => state.max_attempts,
            inputs => rule.resolved_inputs(unit),
            outputs => (!outputs.is_empty()).then_some(outputs),
            note => state
                .human_note
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            failing_tests => failing_tests,
            handoff => handoff,
            body => resolve_template(rule.instruction, unit).trim(),
            report_path => REPORT_PATH,
            reason_codes => reason_codes,
        })
        .expect("instruction template rendering should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::RulesTable;
    use crate::core::state::{Status, TestTally};
    use crate::test_support::state_at;

    fn rule_for(step: Step) -> ResolvedRule {
        RulesTable::new().rule_for(step).expect("rule")
    }

    /// The attempt count is omitted from the header on the first attempt.
    #[test]
    fn first_attempt_omits_attempt_count() {
        let state = state_at(Step::Scenarios, Status::Pending);
        let text = build(&state, &rule_for(Step::Scenarios));
        assert!(text.contains("Unit S-1: scenario writing."));
        assert!(!text.contains("attempt 1 of"));
    }

    #[test]
    fn retry_includes_attempt_count_and_failing_tests() {
        let mut state = state_at(Step::Implement, Status::Pending);
        state.attempt = 2;
        state.failing_tests = vec!["auth::login_rejects_bad_token".to_string()];
        let text = build(&state, &rule_for(Step::Implement));
        assert!(text.contains("(attempt 2 of 3)"));
        assert!(text.contains("Failing Tests From The Previous Attempt"));
        assert!(text.contains("- auth::login_rejects_bad_token"));
    }

    #[test]
    fn inputs_resolve_the_unit_placeholder() {
        let state = state_at(Step::Implement, Status::Pending);
        let text = build(&state, &rule_for(Step::Implement));
        assert!(text.contains("- .foreman/units/S-1/scenarios.md"));
    }

    #[test]
    fn operator_note_is_embedded_when_present() {
        let mut state = state_at(Step::Scenarios, Status::Pending);
        state.human_note = Some("focus on the offline case".to_string());
        let text = build(&state, &rule_for(Step::Scenarios));
        assert!(text.contains("### Operator Note"));
        assert!(text.contains("focus on the offline case"));
    }

    #[test]
    fn note_section_absent_without_a_note() {
        let state = state_at(Step::Scenarios, Status::Pending);
        let text = build(&state, &rule_for(Step::Scenarios));
        assert!(!text.contains("### Operator Note"));
    }

    /// The bookkeeping step inlines tallies and changed files so the executor
    /// never reads the state document.
    #[test]
    fn finalize_inlines_run_summary() {
        let mut state = state_at(Step::Finalize, Status::Pending);
        state.tests = Some(TestTally {
            pass: 42,
            fail: 0,
            skip: 1,
        });
        state.files_changed = vec!["src/lib.rs".to_string(), "src/io/mod.rs".to_string()];
        let text = build(&state, &rule_for(Step::Finalize));
        assert!(text.contains("Tests: 42 passed, 0 failed, 1 skipped."));
        assert!(text.contains("- src/lib.rs"));
        assert!(text.contains("- src/io/mod.rs"));
    }

    #[test]
    fn non_finalize_steps_omit_run_summary() {
        let mut state = state_at(Step::Implement, Status::Pending);
        state.tests = Some(TestTally {
            pass: 10,
            fail: 2,
            skip: 0,
        });
        let text = build(&state, &rule_for(Step::Implement));
        assert!(!text.contains("### Run Summary"));
    }

    /// The completion-report contract closes every instruction.
    #[test]
    fn contract_section_is_always_present() {
        for step in [Step::Bootstrap, Step::Scenarios, Step::Implement, Step::Finalize] {
            let state = state_at(step, Status::Pending);
            let text = build(&state, &rule_for(step));
            assert!(text.contains("### Completion Report"), "missing in {step}");
            assert!(text.contains(REPORT_PATH));
            assert!(text.contains("needs_clarification"));
            assert!(text.contains("blocked_dependency"));
        }
    }
}
