//! Orchestration for absorbing a completion report.
//!
//! Application is idempotent per run: a marker committed after notification
//! plus a cooldown stamp keep duplicate "finished" signals from double
//! applying (see `io::guard`). A missing report file is not an error: the
//! run is presumed crashed and stays retry-eligible.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::report::{apply_to_state, mark_crashed, parse};
use crate::core::state::{Reason, Status};
use crate::io::config::load_config;
use crate::io::guard::{CompletionGuard, GuardGate};
use crate::io::init::ForemanPaths;
use crate::io::notify::{ApplyEvent, CommandNotifier, Notifier, NullNotifier};
use crate::io::state_store::{load_state, write_state};

/// Result of one apply attempt, tagged like every other surface outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied {
        status: Status,
        reason: Option<Reason>,
        /// True when no report existed and a crash was inferred.
        crashed: bool,
    },
    /// This run's report was already applied.
    Duplicate { key: String },
    /// A second signal landed inside the cooldown window.
    CoolingDown { remaining_secs: u64 },
}

/// Apply with the notifier configured for the project (command or no-op).
pub fn apply_report(root: &Path) -> Result<ApplyOutcome> {
    let paths = ForemanPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    if cfg.notify_command.is_empty() {
        apply_report_with(root, &NullNotifier)
    } else {
        let notifier = CommandNotifier {
            command: cfg.notify_command.clone(),
            timeout: Duration::from_secs(cfg.notify_timeout_secs),
        };
        apply_report_with(root, &notifier)
    }
}

/// Apply the report with an explicit notifier.
///
/// The guard marker is committed only after `notifier` succeeds; a failed
/// notification propagates as an error and leaves the run retryable.
pub fn apply_report_with<N: Notifier>(root: &Path, notifier: &N) -> Result<ApplyOutcome> {
    let paths = ForemanPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let mut state = load_state(&paths.schema_path, &paths.state_path)?;
    let now = Utc::now();

    let key = format!(
        "{}-{}-{}",
        state.unit_id.as_deref().unwrap_or("project"),
        state.step,
        state.attempt
    );
    let guard = CompletionGuard::new(
        paths.applied_dir.clone(),
        paths.cooldown_stamp_path.clone(),
        Duration::from_secs(cfg.cooldown_secs),
    );

    let token = match guard.gate(&key, now)? {
        GuardGate::Proceed(token) => token,
        GuardGate::Duplicate { key } => {
            debug!(key, "skipping duplicate completion signal");
            return Ok(ApplyOutcome::Duplicate { key });
        }
        GuardGate::CoolingDown { remaining_secs } => {
            debug!(remaining_secs, "skipping completion signal in cooldown");
            return Ok(ApplyOutcome::CoolingDown { remaining_secs });
        }
    };

    let crashed = !paths.report_path.exists();
    if crashed {
        warn!(key, "no completion report found, presuming crash");
        mark_crashed(&mut state, now);
    } else {
        let text = fs::read_to_string(&paths.report_path)
            .with_context(|| format!("read report {}", paths.report_path.display()))?;
        let report = parse(&text);
        apply_to_state(&mut state, &report, now);
    }
    write_state(&paths.state_path, &state)?;

    let event = ApplyEvent {
        unit_id: state.unit_id.clone(),
        step: state.step,
        status: state.status,
        reason: state.reason,
        crashed,
    };
    notifier.notify(&event).context("deliver completion notification")?;
    guard.commit(token, now)?;

    info!(key, status = %state.status, crashed, "completion report applied");
    Ok(ApplyOutcome::Applied {
        status: state.status,
        reason: state.reason,
        crashed,
    })
}
