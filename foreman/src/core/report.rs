//! Completion-report parsing and the merge into task state.
//!
//! The structured block is a deliberately small grammar: `key: value` lines
//! split on the first colon only, a literal `null` for absence, indented
//! dash lines as list items, and an inline `[a, b]` list shorthand. Anything
//! that does not parse degrades to marker-phrase scanning rather than an
//! error, so a sloppy executor still produces a usable outcome.

use chrono::{DateTime, Utc};

use crate::core::state::{Reason, Status, TaskState, TestTally};

/// Opens and closes the structured block.
pub const BLOCK_DELIMITER: &str = "---";

/// Explicit status an executor may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pass,
    Failing,
}

/// Parsed completion report. Transient: folded into [`TaskState`] by
/// [`apply_to_state`] and then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    pub unit_id: Option<String>,
    pub step: Option<String>,
    pub attempt: Option<u32>,
    pub status: Option<ReportStatus>,
    pub reason: Option<Reason>,
    pub tests: Option<TestTally>,
    pub failing_tests: Vec<String>,
    pub files_changed: Vec<String>,
    pub blocked_by: Vec<String>,
    /// Free text after the closing delimiter, verbatim.
    pub body: String,
}

/// Marker phrases recognized by the fallback scan, in priority order.
const MARKERS: &[(&str, Reason)] = &[
    ("needs clarification", Reason::NeedsClarification),
    ("tests failed", Reason::TestFailure),
    ("test failure", Reason::TestFailure),
    ("lint failed", Reason::LintFailure),
    ("scenario gap", Reason::ScenarioGap),
    ("missing scenario", Reason::ScenarioGap),
    ("blocked", Reason::BlockedDependency),
];

/// Parse a raw report. Total: malformed input falls back to marker scanning,
/// and a report with no recognizable signal is an unconditional success.
pub fn parse(text: &str) -> CompletionReport {
    if text.lines().next().map(str::trim_end) == Some(BLOCK_DELIMITER) {
        if let Some(report) = parse_block(text) {
            return report;
        }
    }
    fallback_scan(text)
}

/// Which list the most recent key accumulates dash items into.
enum ListTarget {
    FailingTests,
    FilesChanged,
    BlockedBy,
    Ignored,
}

fn parse_block(text: &str) -> Option<CompletionReport> {
    let lines: Vec<&str> = text.lines().collect();
    let close = lines[1..]
        .iter()
        .position(|line| line.trim_end() == BLOCK_DELIMITER)?
        + 1;

    let mut report = CompletionReport {
        body: lines
            .get(close + 1..)
            .map(|rest| rest.join("\n"))
            .unwrap_or_default(),
        ..CompletionReport::default()
    };

    let mut list_target: Option<ListTarget> = None;
    for line in &lines[1..close] {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            let item = line.trim().strip_prefix('-')?.trim();
            if item.is_empty() {
                return None;
            }
            match list_target.as_ref()? {
                ListTarget::FailingTests => report.failing_tests.push(item.to_string()),
                ListTarget::FilesChanged => report.files_changed.push(item.to_string()),
                ListTarget::BlockedBy => report.blocked_by.push(item.to_string()),
                ListTarget::Ignored => {}
            }
            continue;
        }

        // Split on the first colon only so values containing colons survive.
        let (key, value) = line.split_once(':')?;
        let key = key.trim();
        let value = value.trim();
        list_target = None;

        if value == "null" {
            continue;
        }

        match key {
            "unit" => report.unit_id = non_empty(value),
            "step" => report.step = non_empty(value),
            "attempt" => report.attempt = Some(value.parse().ok()?),
            "status" => {
                report.status = Some(match value {
                    "pass" => ReportStatus::Pass,
                    "failing" => ReportStatus::Failing,
                    _ => return None,
                });
            }
            "reason" => report.reason = Some(value.parse().ok()?),
            "tests_pass" => tally_mut(&mut report).pass = value.parse().ok()?,
            "tests_fail" => tally_mut(&mut report).fail = value.parse().ok()?,
            "tests_skip" => tally_mut(&mut report).skip = value.parse().ok()?,
            "failing_tests" => {
                report.failing_tests = inline_or_block(value)?;
                list_target = Some(ListTarget::FailingTests);
            }
            "files_changed" => {
                report.files_changed = inline_or_block(value)?;
                list_target = Some(ListTarget::FilesChanged);
            }
            "blocked_by" => {
                report.blocked_by = inline_or_block(value)?;
                list_target = Some(ListTarget::BlockedBy);
            }
            // Unknown keys (and any dash items under them) are ignored.
            _ => list_target = Some(ListTarget::Ignored),
        }
    }

    Some(report)
}

/// Empty value starts a dash-item block; `[a, b]` is the inline shorthand.
fn inline_or_block(value: &str) -> Option<Vec<String>> {
    if value.is_empty() {
        return Some(Vec::new());
    }
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn tally_mut(report: &mut CompletionReport) -> &mut TestTally {
    report.tests.get_or_insert(TestTally {
        pass: 0,
        fail: 0,
        skip: 0,
    })
}

/// Scan the whole text for known marker phrases; no marker means success.
fn fallback_scan(text: &str) -> CompletionReport {
    let lowered = text.to_lowercase();
    for (marker, reason) in MARKERS {
        if lowered.contains(marker) {
            return CompletionReport {
                status: Some(ReportStatus::Failing),
                reason: Some(*reason),
                body: text.to_string(),
                ..CompletionReport::default()
            };
        }
    }
    CompletionReport {
        status: Some(ReportStatus::Pass),
        body: text.to_string(),
        ..CompletionReport::default()
    }
}

/// Fold a parsed report into the state document.
///
/// Explicit status wins; otherwise it is inferred from the failing-test
/// count. Changed files and blocked ids are copied only when non-empty
/// (absence means "no change", not "clear the list"). Tallies replace prior
/// ones and the failing-test names are replaced alongside them.
pub fn apply_to_state(state: &mut TaskState, report: &CompletionReport, now: DateTime<Utc>) {
    state.status = match report.status {
        Some(ReportStatus::Pass) => Status::Pass,
        Some(ReportStatus::Failing) => Status::Failing,
        None => {
            if report.tests.is_some_and(|tally| tally.fail > 0) {
                Status::Failing
            } else {
                Status::Pass
            }
        }
    };
    state.reason = report.reason;
    if !report.files_changed.is_empty() {
        state.files_changed = report.files_changed.clone();
    }
    if !report.blocked_by.is_empty() {
        state.blocked_by = report.blocked_by.clone();
    }
    if report.tests.is_some() {
        state.tests = report.tests;
        state.failing_tests = report.failing_tests.clone();
    } else if !report.failing_tests.is_empty() {
        state.failing_tests = report.failing_tests.clone();
    }
    state.completed_at = Some(now);
}

/// Merge for the no-report-at-all case: the run is presumed to have crashed
/// and stays retry-eligible.
pub fn mark_crashed(state: &mut TaskState, now: DateTime<Utc>) {
    state.status = Status::Failing;
    state.reason = None;
    state.completed_at = Some(now);
}
