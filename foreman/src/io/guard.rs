//! At-most-once guard for completion application.
//!
//! The environment that runs the executor may fire more than one "finished"
//! signal for a single run. Two cooperating guards keep application
//! idempotent: a run-scoped marker file, committed only after the downstream
//! notification succeeded, and a coarse cooldown stamp suppressing
//! near-simultaneous duplicates regardless of run identity. Single-host
//! only; a multi-host deployment needs a real distributed idempotency key.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Guard over one project's applied-marker directory and cooldown stamp.
#[derive(Debug, Clone)]
pub struct CompletionGuard {
    applied_dir: PathBuf,
    stamp_path: PathBuf,
    cooldown: Duration,
}

/// Whether an application may proceed.
#[derive(Debug)]
pub enum GuardGate {
    /// First signal for this run; commit the token after notifying.
    Proceed(GuardToken),
    /// This run was already applied.
    Duplicate { key: String },
    /// A signal landed within the cooldown window.
    CoolingDown { remaining_secs: u64 },
}

/// Proof that the gate was passed; consumed by [`CompletionGuard::commit`].
#[derive(Debug)]
pub struct GuardToken {
    marker_path: PathBuf,
}

impl CompletionGuard {
    pub fn new(applied_dir: PathBuf, stamp_path: PathBuf, cooldown: Duration) -> Self {
        Self {
            applied_dir,
            stamp_path,
            cooldown,
        }
    }

    /// Check both guards for a run key.
    pub fn gate(&self, key: &str, now: DateTime<Utc>) -> Result<GuardGate> {
        let marker_path = self.applied_dir.join(sanitize(key));
        if marker_path.exists() {
            debug!(key, "completion already applied");
            return Ok(GuardGate::Duplicate {
                key: key.to_string(),
            });
        }

        if !self.cooldown.is_zero() {
            if let Some(last) = self.read_stamp() {
                let elapsed = now.signed_duration_since(last).num_seconds();
                let window = self.cooldown.as_secs() as i64;
                if elapsed >= 0 && elapsed < window {
                    let remaining_secs = (window - elapsed) as u64;
                    debug!(key, remaining_secs, "completion signal inside cooldown");
                    return Ok(GuardGate::CoolingDown { remaining_secs });
                }
            }
        }

        Ok(GuardGate::Proceed(GuardToken { marker_path }))
    }

    /// Commit the marker and stamp the cooldown window.
    ///
    /// Called only after the downstream notification succeeded, so a failed
    /// notification leaves the run retryable instead of silently swallowed.
    pub fn commit(&self, token: GuardToken, now: DateTime<Utc>) -> Result<()> {
        fs::create_dir_all(&self.applied_dir)
            .with_context(|| format!("create {}", self.applied_dir.display()))?;
        fs::write(&token.marker_path, format!("{}\n", now.to_rfc3339()))
            .with_context(|| format!("write marker {}", token.marker_path.display()))?;
        fs::write(&self.stamp_path, format!("{}\n", now.to_rfc3339()))
            .with_context(|| format!("write cooldown stamp {}", self.stamp_path.display()))?;
        Ok(())
    }

    /// An unreadable or unparsable stamp counts as absent.
    fn read_stamp(&self) -> Option<DateTime<Utc>> {
        let raw = fs::read_to_string(&self.stamp_path).ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Run keys become file names; anything unusual collapses to '-'.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
