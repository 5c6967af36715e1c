//! Completion notification at the collaborator boundary.
//!
//! The [`Notifier`] trait decouples report application from the delivery
//! mechanism. Tests use scripted notifiers; production wiring picks the
//! command adapter when the project config declares one.

use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::core::state::{Reason, Status, Step};

/// What happened when a report was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyEvent {
    pub unit_id: Option<String>,
    pub step: Step,
    pub status: Status,
    pub reason: Option<Reason>,
    /// True when no report file existed and the run was presumed crashed.
    pub crashed: bool,
}

/// Abstraction over notification delivery.
pub trait Notifier {
    /// Deliver the event. An error leaves the run eligible for a safe retry.
    fn notify(&self, event: &ApplyEvent) -> Result<()>;
}

/// Notifier that delivers nothing.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &ApplyEvent) -> Result<()> {
        Ok(())
    }
}

/// Notifier that runs a configured command with the event JSON appended as
/// the final argument.
pub struct CommandNotifier {
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl Notifier for CommandNotifier {
    fn notify(&self, event: &ApplyEvent) -> Result<()> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("notify command is empty"))?;
        let payload = serde_json::to_string(event).context("serialize apply event")?;
        debug!(program = %program, "delivering completion notification");

        let mut child = Command::new(program)
            .args(&self.command[1..])
            .arg(&payload)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn notify command '{program}'"))?;

        let status = match child
            .wait_timeout(self.timeout)
            .context("wait for notify timeout")?
        {
            Some(status) => status,
            None => {
                child.kill().context("kill notify process")?;
                child.wait().context("wait notify process")?;
                return Err(anyhow!("notify command timed out after {:?}", self.timeout));
            }
        };

        if !status.success() {
            return Err(anyhow!(
                "notify command failed with status {:?}",
                status.code()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ApplyEvent {
        ApplyEvent {
            unit_id: Some("S-1".to_string()),
            step: Step::Implement,
            status: Status::Pass,
            reason: None,
            crashed: false,
        }
    }

    #[test]
    fn null_notifier_always_succeeds() {
        NullNotifier.notify(&event()).expect("notify");
    }

    #[test]
    fn command_notifier_passes_event_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("event.json");
        let notifier = CommandNotifier {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("printf '%s' \"$0\" > {}", out.display()),
            ],
            timeout: Duration::from_secs(10),
        };
        notifier.notify(&event()).expect("notify");
        let written = std::fs::read_to_string(&out).expect("read");
        assert!(written.contains("\"unit_id\":\"S-1\""));
        assert!(written.contains("\"status\":\"pass\""));
    }

    #[test]
    fn failing_command_is_an_error() {
        let notifier = CommandNotifier {
            command: vec!["sh".to_string(), "-c".to_string(), "exit 1".to_string()],
            timeout: Duration::from_secs(10),
        };
        assert!(notifier.notify(&event()).is_err());
    }
}
