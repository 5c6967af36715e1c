//! Orchestration for the current step's declared verification command.
//!
//! The command runs after the executor exits and its result is recorded as a
//! flag only; it never moves the pipeline.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::info;

use crate::core::rules::RulesTable;
use crate::core::state::Step;
use crate::io::config::load_config;
use crate::io::init::ForemanPaths;
use crate::io::state_store::{load_state, write_state};
use crate::io::verify::{VerifyRequest, run_verify};

/// Result of a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// The command ran; its success is now recorded on the state.
    Recorded { step: Step, passed: bool },
    /// The current step declares no verification command.
    NoCommand { step: Step },
}

/// Run the step's verification command (config override first) and record
/// the result as `lint_pass`.
pub fn run_step_verification(root: &Path) -> Result<VerifyOutcome> {
    let paths = ForemanPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let rules = RulesTable::with_overrides(cfg.step_overrides());
    let mut state = load_state(&paths.schema_path, &paths.state_path)?;

    if state.step == Step::Done {
        return Ok(VerifyOutcome::NoCommand { step: Step::Done });
    }
    let rule = rules.rule_for(state.step).map_err(|err| anyhow!(err))?;
    let Some(command) = rule.verify_command else {
        return Ok(VerifyOutcome::NoCommand { step: state.step });
    };

    let passed = run_verify(&VerifyRequest {
        workdir: paths.root.clone(),
        command,
        log_path: paths.verify_log_path.clone(),
        timeout: Duration::from_secs(cfg.verify_timeout_secs),
        output_limit_bytes: cfg.verify_output_limit_bytes,
    })?;

    state.lint_pass = Some(passed);
    write_state(&paths.state_path, &state)?;
    info!(step = %state.step, passed, "verification recorded");
    Ok(VerifyOutcome::Recorded {
        step: state.step,
        passed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::core::rules::StepOverride;
    use crate::core::state::Status;
    use crate::io::config::{ForemanConfig, write_config};
    use crate::start::start_story;

    fn override_command(root: &Path, step: &str, command: &[&str]) {
        let paths = ForemanPaths::new(root);
        let mut steps = HashMap::new();
        steps.insert(
            step.to_string(),
            StepOverride {
                max_attempts: None,
                timeout_minutes: None,
                verify_command: Some(command.iter().map(|s| (*s).to_string()).collect()),
            },
        );
        let cfg = ForemanConfig {
            steps,
            ..ForemanConfig::default()
        };
        write_config(&paths.config_path, &cfg).expect("config");
    }

    #[test]
    fn bootstrap_declares_no_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        start_story(temp.path(), "S-1").expect("start");
        let outcome = run_step_verification(temp.path()).expect("verify");
        assert_eq!(
            outcome,
            VerifyOutcome::NoCommand {
                step: Step::Bootstrap
            }
        );
    }

    /// Success and failure both land in `lint_pass` without touching the
    /// step or status.
    #[test]
    fn command_result_is_recorded_as_a_flag_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        start_story(temp.path(), "S-1").expect("start");
        override_command(temp.path(), "bootstrap", &["sh", "-c", "exit 1"]);

        let outcome = run_step_verification(temp.path()).expect("verify");
        assert_eq!(
            outcome,
            VerifyOutcome::Recorded {
                step: Step::Bootstrap,
                passed: false
            }
        );

        let paths = ForemanPaths::new(temp.path());
        let state = load_state(&paths.schema_path, &paths.state_path).expect("load");
        assert_eq!(state.lint_pass, Some(false));
        assert_eq!(state.step, Step::Bootstrap);
        assert_eq!(state.status, Status::Pending);

        override_command(temp.path(), "bootstrap", &["sh", "-c", "exit 0"]);
        let outcome = run_step_verification(temp.path()).expect("verify");
        assert_eq!(
            outcome,
            VerifyOutcome::Recorded {
                step: Step::Bootstrap,
                passed: true
            }
        );
    }
}
