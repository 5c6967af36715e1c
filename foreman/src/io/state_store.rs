//! Schema-validated storage for the task-state document.
//!
//! Loads validate in three passes (JSON Schema, serde with closed enums,
//! then semantic invariants) so a corrupt document fails before any decision
//! runs. Writes are whole-document atomic (temp file + rename).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::debug;

use crate::core::state::{TaskState, validate_invariants};

/// Embedded copy of the v1 state schema; written to
/// `.foreman/state/schema.json` at init.
pub const STATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_state/v1.schema.json"
));

/// Load and validate the state document.
///
/// A missing document is a hard error: state is created by `start`, and every
/// other operation requires it.
pub fn load_state(schema_path: &Path, state_path: &Path) -> Result<TaskState> {
    if !state_path.exists() {
        return Err(anyhow!(
            "missing state document {} (run `foreman start` first)",
            state_path.display()
        ));
    }
    debug!(path = %state_path.display(), "loading task state");
    let contents = fs::read_to_string(state_path)
        .with_context(|| format!("read state {}", state_path.display()))?;
    let schema_raw = fs::read_to_string(schema_path)
        .with_context(|| format!("read state schema {}", schema_path.display()))?;

    let instance: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse state json {}", state_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_raw)
        .with_context(|| format!("parse schema json {}", schema_path.display()))?;
    validate_schema(&instance, &schema)?;

    let state: TaskState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state as v1 struct {}", state_path.display()))?;
    let errors = validate_invariants(&state);
    if !errors.is_empty() {
        bail!("state invariant violations:\n- {}", errors.join("\n- "));
    }
    debug!(step = %state.step, status = %state.status, "task state loaded");
    Ok(state)
}

/// Atomically write the state document (temp file + rename).
///
/// Invariants are re-checked so an out-of-range value never reaches disk.
pub fn write_state(state_path: &Path, state: &TaskState) -> Result<()> {
    let errors = validate_invariants(state);
    if !errors.is_empty() {
        bail!(
            "refusing to write invalid state:\n- {}",
            errors.join("\n- ")
        );
    }
    debug!(path = %state_path.display(), step = %state.step, status = %state.status, "writing task state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(state_path, &buf)
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile state schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("state schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
