//! Project configuration stored under `.foreman/state/config.toml`.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::fs;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::rules::StepOverride;
use crate::core::state::Step;

/// Coordinator configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForemanConfig {
    /// Seconds during which a second completion signal is ignored.
    pub cooldown_secs: u64,

    /// Wall-clock budget for the declared verification command.
    pub verify_timeout_secs: u64,

    /// Truncate verification stdout/stderr logs beyond this many bytes.
    pub verify_output_limit_bytes: usize,

    /// Command run after a report is applied (e.g. a desktop notification).
    /// Empty means no notification is sent.
    pub notify_command: Vec<String>,

    /// Wall-clock budget for the notify command.
    pub notify_timeout_secs: u64,

    /// Per-step overrides keyed by step name (e.g. `[steps.implement]`).
    pub steps: HashMap<String, StepOverride>,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 10,
            verify_timeout_secs: 30 * 60,
            verify_output_limit_bytes: 100_000,
            notify_command: Vec::new(),
            notify_timeout_secs: 60,
            steps: HashMap::new(),
        }
    }
}

impl ForemanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.verify_timeout_secs == 0 {
            return Err(anyhow!("verify_timeout_secs must be > 0"));
        }
        if self.verify_output_limit_bytes == 0 {
            return Err(anyhow!("verify_output_limit_bytes must be > 0"));
        }
        if self.notify_timeout_secs == 0 {
            return Err(anyhow!("notify_timeout_secs must be > 0"));
        }
        if !self.notify_command.is_empty() && self.notify_command[0].trim().is_empty() {
            return Err(anyhow!("notify_command must start with a program name"));
        }
        for (name, overlay) in &self.steps {
            let step = Step::from_str(name)
                .map_err(|err| anyhow!("config steps: {err}"))?;
            if step == Step::Done {
                return Err(anyhow!("config steps: 'done' has no rule to override"));
            }
            if overlay.max_attempts == Some(0) {
                return Err(anyhow!("steps.{name}.max_attempts must be >= 1"));
            }
            if overlay.timeout_minutes == Some(0) {
                return Err(anyhow!("steps.{name}.timeout_minutes must be >= 1"));
            }
            if let Some(command) = &overlay.verify_command {
                if command.is_empty() || command[0].trim().is_empty() {
                    return Err(anyhow!(
                        "steps.{name}.verify_command must start with a program name"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Overlay for the rules table. Keys were validated by `validate`.
    pub fn step_overrides(&self) -> HashMap<Step, StepOverride> {
        self.steps
            .iter()
            .filter_map(|(name, overlay)| {
                Step::from_str(name).ok().map(|step| (step, overlay.clone()))
            })
            .collect()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForemanConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForemanConfig> {
    if !path.exists() {
        let cfg = ForemanConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForemanConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForemanConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForemanConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = ForemanConfig::default();
        cfg.steps.insert(
            "implement".to_string(),
            StepOverride {
                max_attempts: Some(5),
                timeout_minutes: None,
                verify_command: Some(vec!["cargo".to_string(), "test".to_string()]),
            },
        );
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn step_overrides_map_to_typed_steps() {
        let mut cfg = ForemanConfig::default();
        cfg.steps.insert(
            "scenarios".to_string(),
            StepOverride {
                max_attempts: Some(4),
                timeout_minutes: None,
                verify_command: None,
            },
        );
        let overrides = cfg.step_overrides();
        assert_eq!(
            overrides.get(&Step::Scenarios).and_then(|o| o.max_attempts),
            Some(4)
        );
    }

    #[test]
    fn unknown_step_name_is_rejected() {
        let mut cfg = ForemanConfig::default();
        cfg.steps.insert("deploy".to_string(), StepOverride::default());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown step"));
    }

    #[test]
    fn zero_override_values_are_rejected() {
        let mut cfg = ForemanConfig::default();
        cfg.steps.insert(
            "implement".to_string(),
            StepOverride {
                max_attempts: None,
                timeout_minutes: Some(0),
                verify_command: None,
            },
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_step_override_from_toml() {
        let raw = "cooldown_secs = 5\n\n[steps.implement]\nmax_attempts = 5\ntimeout_minutes = 90\n";
        let cfg: ForemanConfig = toml::from_str(raw).expect("parse");
        assert_eq!(cfg.cooldown_secs, 5);
        let overlay = cfg.steps.get("implement").expect("override");
        assert_eq!(overlay.max_attempts, Some(5));
        assert_eq!(overlay.timeout_minutes, Some(90));
    }
}
