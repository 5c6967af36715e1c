//! The natural-language entry point.
//!
//! Classifies a free-text request, routes it to exactly one engine or query
//! call, and wraps the result in a single tagged envelope so a calling layer
//! branches on one discriminant regardless of which path ran.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

use crate::core::engine::Outcome;
use crate::core::intent::{Intent, classify};
use crate::core::review;
use crate::core::state::{Reason, Status};
use crate::dispatch::{DispatchMode, run_dispatch};
use crate::io::init::ForemanPaths;
use crate::io::state_store::{load_state, write_state};
use crate::io::workspace::{AdoptionTier, detect_adoption, list_projects};
use crate::start::{start_custom, start_story};
use crate::status::{StatusReport, project_status};

/// One envelope for every request path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// A dispatch-engine decision (continue, start story, custom task).
    Decision {
        intent: &'static str,
        outcome: Outcome,
    },
    /// The review gate ran.
    Reviewed { approved: bool, status: Status },
    Status { report: StatusReport },
    Projects { roots: Vec<String> },
    Adoption { tier: AdoptionTier, level: u8 },
}

/// Classify `text` and execute the matching call against `root`.
pub fn handle_request(root: &Path, text: &str) -> Result<RequestOutcome> {
    let intent = classify(text);
    debug!(?intent, "request classified");
    match intent {
        Intent::Approve { note } => {
            let status = approve_unit(root, note)?;
            Ok(RequestOutcome::Reviewed {
                approved: true,
                status,
            })
        }
        Intent::Reject { reason, note } => {
            let status = reject_unit(root, reason, note)?;
            Ok(RequestOutcome::Reviewed {
                approved: false,
                status,
            })
        }
        Intent::StartStory { story_id } => {
            start_story(root, &story_id)?;
            let outcome = run_dispatch(root, DispatchMode::Commit)?;
            Ok(RequestOutcome::Decision {
                intent: "start_story",
                outcome,
            })
        }
        Intent::CustomTask { text } => {
            start_custom(root, &text)?;
            let outcome = run_dispatch(root, DispatchMode::Commit)?;
            Ok(RequestOutcome::Decision {
                intent: "custom_task",
                outcome,
            })
        }
        Intent::Continue => {
            let outcome = run_dispatch(root, DispatchMode::Commit)?;
            Ok(RequestOutcome::Decision {
                intent: "continue",
                outcome,
            })
        }
        Intent::Status => Ok(RequestOutcome::Status {
            report: project_status(root)?,
        }),
        Intent::ListProjects => {
            let roots = list_projects(root)?
                .into_iter()
                .map(|path| path.display().to_string())
                .collect();
            Ok(RequestOutcome::Projects { roots })
        }
        Intent::DetectAdoption => {
            let tier = detect_adoption(root);
            Ok(RequestOutcome::Adoption {
                tier,
                level: tier.level(),
            })
        }
    }
}

/// Approve the unit paused at the checkpoint.
pub fn approve_unit(root: &Path, note: Option<String>) -> Result<Status> {
    let paths = ForemanPaths::new(root);
    let mut state = load_state(&paths.schema_path, &paths.state_path)?;
    review::approve(&mut state, note)
        .map_err(|err| anyhow!(err))
        .context("approve")?;
    write_state(&paths.state_path, &state)?;
    Ok(state.status)
}

/// Reject the unit paused at the checkpoint.
pub fn reject_unit(root: &Path, reason: Reason, note: Option<String>) -> Result<Status> {
    let paths = ForemanPaths::new(root);
    let mut state = load_state(&paths.schema_path, &paths.state_path)?;
    review::reject(&mut state, reason, note)
        .map_err(|err| anyhow!(err))
        .context("reject")?;
    write_state(&paths.state_path, &state)?;
    Ok(state.status)
}
