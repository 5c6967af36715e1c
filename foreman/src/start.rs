//! Orchestration for starting a unit of work.
//!
//! The state document is created here on first start (with the pipeline at
//! its first step) and reseeded for each subsequent unit. Project bootstrap
//! runs once: a later unit enters at scenario writing when the memory file
//! already exists.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{debug, info};

use crate::core::rules::RulesTable;
use crate::core::state::{Status, Step, TaskState, UnitKind};
use crate::io::config::load_config;
use crate::io::init::{ForemanPaths, InitOptions, init_project};
use crate::io::state_store::{load_state, write_state};

/// Outcome of a start: the seeded unit and where it enters the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub unit_id: String,
    pub kind: UnitKind,
    pub entry_step: Step,
}

/// Start a structured story unit by identifier.
pub fn start_story(root: &Path, story_id: &str) -> Result<StartOutcome> {
    validate_unit_id(story_id)?;
    start_unit(root, story_id.to_string(), UnitKind::Story, None)
}

/// Start a free-text task. The brief becomes the pending operator note
/// embedded in the first instruction.
pub fn start_custom(root: &Path, brief: &str) -> Result<StartOutcome> {
    let brief = brief.trim();
    if brief.is_empty() {
        return Err(anyhow!("task brief must not be empty"));
    }
    let unit_id = format!("adhoc-{}", Utc::now().format("%Y%m%d%H%M%S"));
    start_unit(root, unit_id, UnitKind::Custom, Some(brief.to_string()))
}

fn start_unit(
    root: &Path,
    unit_id: String,
    kind: UnitKind,
    brief: Option<String>,
) -> Result<StartOutcome> {
    let paths = ForemanPaths::new(root);
    if !paths.foreman_dir.exists() {
        debug!(root = %root.display(), "no scaffolding yet, initializing");
        init_project(root, &InitOptions { force: false }).context("foreman init")?;
    }

    let cfg = load_config(&paths.config_path)?;
    let rules = RulesTable::with_overrides(cfg.step_overrides());

    if paths.state_path.exists() {
        let state = load_state(&paths.schema_path, &paths.state_path)?;
        if state.unit_id.is_some() && state.step != Step::Done {
            return Err(anyhow!(
                "unit '{}' is still in flight at step '{}' (finish or review it first)",
                state.unit_id.as_deref().unwrap_or("?"),
                state.step
            ));
        }
    }

    // Bootstrap is project-scoped; once the memory file exists, new units
    // enter at scenario writing.
    let entry_step = if paths.notes_path.exists() {
        Step::Scenarios
    } else {
        RulesTable::first_step()
    };
    let rule = rules.rule_for(entry_step).map_err(|err| anyhow!(err))?;

    let state = TaskState {
        unit_id: Some(unit_id.clone()),
        kind,
        step: entry_step,
        attempt: 1,
        max_attempts: rule.max_attempts,
        status: Status::Pending,
        reason: None,
        dispatched_at: None,
        completed_at: None,
        timeout_minutes: rule.timeout_minutes,
        tests: None,
        failing_tests: Vec::new(),
        lint_pass: None,
        files_changed: Vec::new(),
        blocked_by: Vec::new(),
        human_note: brief.clone(),
    };
    write_state(&paths.state_path, &state)?;

    seed_unit_brief(&paths, &unit_id, brief.as_deref())?;

    info!(unit = %unit_id, step = %entry_step, "unit started");
    Ok(StartOutcome {
        unit_id,
        kind,
        entry_step,
    })
}

/// Make sure the unit directory and its brief exist; the scenario step reads
/// the brief as an input.
fn seed_unit_brief(paths: &ForemanPaths, unit_id: &str, brief: Option<&str>) -> Result<()> {
    let unit_dir = paths.unit_dir(unit_id);
    fs::create_dir_all(&unit_dir)
        .with_context(|| format!("create unit directory {}", unit_dir.display()))?;
    let brief_path = unit_dir.join("brief.md");
    if brief_path.exists() {
        return Ok(());
    }
    let contents = match brief {
        Some(text) => format!("# Brief\n\n{text}\n"),
        None => BRIEF_PLACEHOLDER.to_string(),
    };
    fs::write(&brief_path, contents)
        .with_context(|| format!("write brief {}", brief_path.display()))
}

fn validate_unit_id(id: &str) -> Result<()> {
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "invalid story id '{id}' (letters, digits, '-' and '_' only)"
        ));
    }
    Ok(())
}

const BRIEF_PLACEHOLDER: &str = "# Brief\n\nDescribe this unit of work here.\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_creates_state_at_bootstrap() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = start_story(temp.path(), "S-1").expect("start");
        assert_eq!(outcome.entry_step, Step::Bootstrap);

        let paths = ForemanPaths::new(temp.path());
        let state = load_state(&paths.schema_path, &paths.state_path).expect("load");
        assert_eq!(state.unit_id.as_deref(), Some("S-1"));
        assert_eq!(state.kind, UnitKind::Story);
        assert_eq!(state.status, Status::Pending);
        assert_eq!(state.attempt, 1);
        assert!(paths.unit_dir("S-1").join("brief.md").is_file());
    }

    #[test]
    fn start_with_existing_notes_enters_at_scenarios() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.notes_path, "# Notes\n").expect("write notes");

        let outcome = start_story(temp.path(), "S-2").expect("start");
        assert_eq!(outcome.entry_step, Step::Scenarios);
    }

    #[test]
    fn start_refuses_while_a_unit_is_in_flight() {
        let temp = tempfile::tempdir().expect("tempdir");
        start_story(temp.path(), "S-1").expect("start");
        let err = start_story(temp.path(), "S-2").unwrap_err();
        assert!(err.to_string().contains("still in flight"));
    }

    #[test]
    fn start_after_completion_reseeds_the_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        start_story(temp.path(), "S-1").expect("start");

        let paths = ForemanPaths::new(temp.path());
        let mut state = load_state(&paths.schema_path, &paths.state_path).expect("load");
        state.step = Step::Done;
        state.status = Status::Pass;
        state.files_changed = vec!["src/lib.rs".to_string()];
        write_state(&paths.state_path, &state).expect("write");
        fs::write(&paths.notes_path, "# Notes\n").expect("write notes");

        let outcome = start_story(temp.path(), "S-2").expect("start");
        assert_eq!(outcome.entry_step, Step::Scenarios);
        let state = load_state(&paths.schema_path, &paths.state_path).expect("load");
        assert_eq!(state.unit_id.as_deref(), Some("S-2"));
        assert!(state.files_changed.is_empty(), "new unit starts clean");
    }

    #[test]
    fn custom_task_stores_the_brief_as_pending_note() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = start_custom(temp.path(), "rename the config loader").expect("start");
        assert_eq!(outcome.kind, UnitKind::Custom);
        assert!(outcome.unit_id.starts_with("adhoc-"));

        let paths = ForemanPaths::new(temp.path());
        let state = load_state(&paths.schema_path, &paths.state_path).expect("load");
        assert_eq!(
            state.human_note.as_deref(),
            Some("rename the config loader")
        );
    }

    #[test]
    fn invalid_story_id_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(start_story(temp.path(), "bad id!").is_err());
        assert!(start_story(temp.path(), "").is_err());
        assert!(start_custom(temp.path(), "   ").is_err());
    }
}
