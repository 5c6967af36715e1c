//! The two narrow mutators usable while a unit is paused at the checkpoint.

use crate::core::state::{Reason, Status, Step, TaskState};

/// Approve the unit under review. Sets `status = pass`; an optional reviewer
/// note is stored for the next step's instruction.
pub fn approve(state: &mut TaskState, note: Option<String>) -> Result<(), String> {
    ensure_at_checkpoint(state)?;
    state.status = Status::Pass;
    if let Some(note) = note {
        state.human_note = Some(note);
    }
    Ok(())
}

/// Reject the unit under review with a reason, feeding the ordinary
/// failure-routing path on the next decision.
pub fn reject(state: &mut TaskState, reason: Reason, note: Option<String>) -> Result<(), String> {
    ensure_at_checkpoint(state)?;
    state.status = Status::Failing;
    state.reason = Some(reason);
    if let Some(note) = note {
        state.human_note = Some(note);
    }
    Ok(())
}

fn ensure_at_checkpoint(state: &TaskState) -> Result<(), String> {
    if state.step != Step::Review {
        return Err(format!(
            "review gate requires step 'review' (currently at '{}')",
            state.step
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_at;

    #[test]
    fn approve_sets_pass_and_stores_note() {
        let mut state = state_at(Step::Review, Status::NeedsHuman);
        approve(&mut state, Some("nice work".to_string())).expect("approve");
        assert_eq!(state.status, Status::Pass);
        assert_eq!(state.human_note.as_deref(), Some("nice work"));
    }

    #[test]
    fn approve_without_note_keeps_existing_note() {
        let mut state = state_at(Step::Review, Status::NeedsHuman);
        state.human_note = Some("earlier note".to_string());
        approve(&mut state, None).expect("approve");
        assert_eq!(state.human_note.as_deref(), Some("earlier note"));
    }

    #[test]
    fn reject_sets_failing_with_reason() {
        let mut state = state_at(Step::Review, Status::NeedsHuman);
        reject(
            &mut state,
            Reason::ScenarioGap,
            Some("scenario 3 is wrong".to_string()),
        )
        .expect("reject");
        assert_eq!(state.status, Status::Failing);
        assert_eq!(state.reason, Some(Reason::ScenarioGap));
        assert_eq!(state.human_note.as_deref(), Some("scenario 3 is wrong"));
    }

    /// Gate misuse leaves the state untouched.
    #[test]
    fn gate_refuses_outside_the_checkpoint() {
        let mut state = state_at(Step::Implement, Status::Running);
        let before = state.clone();

        let err = approve(&mut state, None).unwrap_err();
        assert!(err.contains("requires step 'review'"));
        assert_eq!(state, before);

        let err = reject(&mut state, Reason::TestFailure, None).unwrap_err();
        assert!(err.contains("requires step 'review'"));
        assert_eq!(state, before);
    }
}
