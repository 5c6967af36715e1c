//! Orchestration for `foreman next` and `foreman preview`.

use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tracing::debug;

use crate::core::engine::{Outcome, decide};
use crate::core::rules::RulesTable;
use crate::io::config::load_config;
use crate::io::init::ForemanPaths;
use crate::io::state_store::{load_state, write_state};

/// Whether a decision's mutation is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Persist the mutation (the normal `next`).
    Commit,
    /// Compute the identical outcome, commit nothing.
    Preview,
}

/// Load state, decide the next action, and (in commit mode) persist it.
pub fn run_dispatch(root: &Path, mode: DispatchMode) -> Result<Outcome> {
    let paths = ForemanPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let rules = RulesTable::with_overrides(cfg.step_overrides());
    let mut state = load_state(&paths.schema_path, &paths.state_path)?;

    let decision = decide(&mut state, &rules, Utc::now()).map_err(|err| anyhow!(err))?;
    debug!(mutated = decision.mutated, mode = ?mode, "decision computed");

    if mode == DispatchMode::Commit && decision.mutated {
        write_state(&paths.state_path, &state)?;
    }
    Ok(decision.outcome)
}
