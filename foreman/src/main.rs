//! CLI front-end for the pipeline coordinator.
//!
//! Every expected pipeline state prints a tagged JSON envelope on stdout and
//! maps to a stable exit code; hard errors (corrupt or missing state, bad
//! arguments) print the anyhow chain on stderr and exit `INVALID`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;

use foreman::apply::apply_report;
use foreman::core::engine::Outcome;
use foreman::core::state::Reason;
use foreman::dispatch::{DispatchMode, run_dispatch};
use foreman::exit_codes;
use foreman::io::init::{InitOptions, init_project};
use foreman::io::workspace::{detect_adoption, list_projects};
use foreman::logging;
use foreman::request::{RequestOutcome, approve_unit, handle_request, reject_unit};
use foreman::start::{start_custom, start_story};
use foreman::status::project_status;
use foreman::verification::run_step_verification;

#[derive(Parser)]
#[command(
    name = "foreman",
    version,
    about = "Coordinator for externally executed units of work"
)]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.foreman/` scaffolding (config, schema copy, gitignore).
    Init {
        /// Overwrite existing coordinator-owned files.
        #[arg(short, long)]
        force: bool,
    },
    /// Start a structured story unit by identifier.
    Start { story_id: String },
    /// Start a free-text task.
    Task { text: Vec<String> },
    /// Decide and dispatch the next pipeline action (mutating).
    Next,
    /// Compute the next action without committing any change.
    Preview,
    /// Absorb the executor's completion report (crash inferred if missing).
    Apply,
    /// Run the current step's declared verification command.
    Verify,
    /// Approve the unit paused at the review checkpoint.
    Approve {
        #[arg(long)]
        note: Option<String>,
    },
    /// Reject the unit at the review checkpoint with a reason code.
    Reject {
        reason: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Print the current state document as a report.
    Status,
    /// Report how many of the expected core files exist (adoption tier).
    Detect,
    /// List recognizable projects under a workspace root.
    List { workspace: Option<PathBuf> },
    /// Classify a natural-language request and route it.
    Request { text: Vec<String> },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root;
    match cli.command {
        Command::Init { force } => {
            init_project(&root, &InitOptions { force })?;
            print_json(&serde_json::json!({ "kind": "initialized" }))?;
            Ok(exit_codes::OK)
        }
        Command::Start { story_id } => {
            let outcome = start_story(&root, &story_id)?;
            print_json(&serde_json::json!({
                "kind": "started",
                "unit_id": outcome.unit_id,
                "entry_step": outcome.entry_step,
            }))?;
            Ok(exit_codes::OK)
        }
        Command::Task { text } => {
            let brief = joined(&text, "task text")?;
            let outcome = start_custom(&root, &brief)?;
            print_json(&serde_json::json!({
                "kind": "started",
                "unit_id": outcome.unit_id,
                "entry_step": outcome.entry_step,
            }))?;
            Ok(exit_codes::OK)
        }
        Command::Next => decision(&root, DispatchMode::Commit),
        Command::Preview => decision(&root, DispatchMode::Preview),
        Command::Apply => {
            let outcome = apply_report(&root)?;
            print_json(&outcome)?;
            Ok(exit_codes::OK)
        }
        Command::Verify => {
            let outcome = run_step_verification(&root)?;
            print_json(&outcome)?;
            Ok(exit_codes::OK)
        }
        Command::Approve { note } => {
            let status = approve_unit(&root, note)?;
            print_json(&serde_json::json!({ "kind": "reviewed", "approved": true, "status": status }))?;
            Ok(exit_codes::OK)
        }
        Command::Reject { reason, note } => {
            let reason = Reason::from_str(&reason).map_err(|err| anyhow!(err))?;
            let status = reject_unit(&root, reason, note)?;
            print_json(&serde_json::json!({ "kind": "reviewed", "approved": false, "status": status }))?;
            Ok(exit_codes::OK)
        }
        Command::Status => {
            let report = project_status(&root)?;
            print_json(&serde_json::json!({ "kind": "status", "report": report }))?;
            Ok(exit_codes::OK)
        }
        Command::Detect => {
            let tier = detect_adoption(&root);
            print_json(&serde_json::json!({ "kind": "adoption", "tier": tier, "level": tier.level() }))?;
            Ok(exit_codes::OK)
        }
        Command::List { workspace } => {
            let workspace = workspace.unwrap_or(root);
            let roots: Vec<String> = list_projects(&workspace)?
                .into_iter()
                .map(|path| path.display().to_string())
                .collect();
            print_json(&serde_json::json!({ "kind": "projects", "roots": roots }))?;
            Ok(exit_codes::OK)
        }
        Command::Request { text } => {
            let text = joined(&text, "request text")?;
            let outcome = handle_request(&root, &text)?;
            let code = match &outcome {
                RequestOutcome::Decision { outcome, .. } => outcome_code(outcome),
                _ => exit_codes::OK,
            };
            print_json(&outcome)?;
            Ok(code)
        }
    }
}

fn decision(root: &Path, mode: DispatchMode) -> Result<i32> {
    let outcome = run_dispatch(root, mode)?;
    let code = outcome_code(&outcome);
    print_json(&outcome)?;
    Ok(code)
}

/// Expected pipeline states are non-error results with stable codes.
fn outcome_code(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Completed => exit_codes::COMPLETE,
        Outcome::NeedsHuman { .. } | Outcome::Blocked { .. } => exit_codes::HUMAN,
        _ => exit_codes::OK,
    }
}

fn joined(words: &[String], what: &str) -> Result<String> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        return Err(anyhow!("{what} must not be empty"));
    }
    Ok(text)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
