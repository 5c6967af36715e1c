//! Initialization helpers for `.foreman/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{ForemanConfig, write_config};
use super::state_store::STATE_SCHEMA;

/// All canonical paths within `.foreman/` for a project root.
#[derive(Debug, Clone)]
pub struct ForemanPaths {
    pub root: PathBuf,
    pub foreman_dir: PathBuf,
    pub state_dir: PathBuf,
    pub units_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub applied_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub notes_path: PathBuf,
    pub report_path: PathBuf,
    pub state_path: PathBuf,
    pub schema_path: PathBuf,
    pub config_path: PathBuf,
    pub cooldown_stamp_path: PathBuf,
    pub verify_log_path: PathBuf,
}

impl ForemanPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let foreman_dir = root.join(".foreman");
        let state_dir = foreman_dir.join("state");
        let units_dir = foreman_dir.join("units");
        let logs_dir = foreman_dir.join("logs");
        let applied_dir = state_dir.join("applied");
        Self {
            root: root.clone(),
            foreman_dir: foreman_dir.clone(),
            state_dir: state_dir.clone(),
            units_dir,
            logs_dir: logs_dir.clone(),
            applied_dir,
            gitignore_path: foreman_dir.join(".gitignore"),
            notes_path: foreman_dir.join("NOTES.md"),
            report_path: foreman_dir.join("report.md"),
            state_path: state_dir.join("task.json"),
            schema_path: state_dir.join("schema.json"),
            config_path: state_dir.join("config.toml"),
            cooldown_stamp_path: state_dir.join("last_apply"),
            verify_log_path: logs_dir.join("verify.log"),
        }
    }

    /// Directory for one unit's inputs and outputs.
    pub fn unit_dir(&self, unit_id: &str) -> PathBuf {
        self.units_dir.join(unit_id)
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing coordinator-owned files.
    pub force: bool,
}

/// Create `.foreman/` scaffolding in `root`.
///
/// Writes config, the state schema copy, and the gitignore. The state
/// document itself is created by the first `start`, not here.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ForemanPaths> {
    let paths = ForemanPaths::new(root);
    if paths.foreman_dir.exists() && !options.force {
        return Err(anyhow!(
            "foreman init: .foreman already exists (use --force to overwrite)"
        ));
    }
    if paths.foreman_dir.exists() && !paths.foreman_dir.is_dir() {
        return Err(anyhow!(
            "foreman init: .foreman exists but is not a directory"
        ));
    }

    create_dir(&paths.foreman_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.units_dir)?;
    create_dir(&paths.logs_dir)?;
    create_dir(&paths.applied_dir)?;

    write_file(&paths.gitignore_path, FOREMAN_GITIGNORE)?;
    write_file(&paths.schema_path, STATE_SCHEMA)?;
    write_config(&paths.config_path, &ForemanConfig::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const FOREMAN_GITIGNORE: &str = "logs/\nreport.md\nstate/applied/\nstate/last_apply\n";
