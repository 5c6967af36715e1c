//! Workspace-level queries: adoption detection and project listing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::init::ForemanPaths;

/// How many of the expected core files exist, independent of pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdoptionTier {
    /// Neither core file present.
    Absent,
    /// Exactly one present.
    Partial,
    /// Both the state document and the memory file present.
    Adopted,
}

impl AdoptionTier {
    pub fn level(self) -> u8 {
        match self {
            AdoptionTier::Absent => 0,
            AdoptionTier::Partial => 1,
            AdoptionTier::Adopted => 2,
        }
    }
}

/// Count the expected core files under a project root.
pub fn detect_adoption(root: &Path) -> AdoptionTier {
    let paths = ForemanPaths::new(root);
    let present = [paths.state_path, paths.notes_path]
        .iter()
        .filter(|path| path.is_file())
        .count();
    match present {
        0 => AdoptionTier::Absent,
        1 => AdoptionTier::Partial,
        _ => AdoptionTier::Adopted,
    }
}

/// List recognizable projects under a workspace root: the root itself and
/// its immediate subdirectories that contain a `.foreman` directory. Sorted.
pub fn list_projects(workspace_root: &Path) -> Result<Vec<PathBuf>> {
    let mut projects = Vec::new();
    if workspace_root.join(".foreman").is_dir() {
        projects.push(workspace_root.to_path_buf());
    }
    let entries = fs::read_dir(workspace_root)
        .with_context(|| format!("read workspace {}", workspace_root.display()))?;
    for entry in entries {
        let entry = entry.context("read workspace entry")?;
        let path = entry.path();
        if path.is_dir() && path.join(".foreman").is_dir() {
            projects.push(path);
        }
    }
    projects.sort();
    Ok(projects)
}
