//! Heuristic classification of free-text requests.
//!
//! The rule list is explicit, ordered data: rules are evaluated top to
//! bottom and the first match wins, so priority is documented here rather
//! than implied by code layout. A message matching nothing is a free-text
//! task; classification never fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::state::Reason;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Approve { note: Option<String> },
    Reject { reason: Reason, note: Option<String> },
    StartStory { story_id: String },
    ListProjects,
    DetectAdoption,
    Status,
    Continue,
    CustomTask { text: String },
}

type Matcher = fn(&str) -> Option<Intent>;

/// Priority-ordered classifier rules; earlier entries win on overlap
/// ("approve S-12" is an approval, not a story start).
pub const RULES: &[(&str, Matcher)] = &[
    ("approve", match_approve),
    ("reject", match_reject),
    ("start_story", match_start_story),
    ("list_projects", match_list_projects),
    ("detect_adoption", match_detect_adoption),
    ("status", match_status),
    ("continue", match_continue),
];

/// Classify a request. Total: unmatched input is a free-text task.
pub fn classify(text: &str) -> Intent {
    for (_, matcher) in RULES {
        if let Some(intent) = matcher(text) {
            return intent;
        }
    }
    Intent::CustomTask {
        text: text.trim().to_string(),
    }
}

static APPROVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:approved?|lgtm|looks\s+good(?:\s+to\s+me)?|ship\s+it)\b[.!:,]?\s*(?<note>.*)$")
        .unwrap()
});

static REJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:reject(?:ed)?|revise|rework|send\s+(?:it\s+)?back)\b[.!:,]?\s*(?<note>.*)$")
        .unwrap()
});

static START_STORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bstart\s+(?:story\s+)?(?<id>[A-Za-z][A-Za-z0-9]*-\d+)\b").unwrap()
});

static LIST_PROJECTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:list|show)\s+(?:all\s+|the\s+)?projects\b").unwrap()
});

static DETECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:detect|adoption)\b").unwrap());

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:status|progress|where\s+(?:are\s+we|is\s+it))\b").unwrap()
});

static CONTINUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:continue|next|proceed|resume|go(?:\s+on|\s+ahead)?|keep\s+going)\b[.!]?\s*$")
        .unwrap()
});

fn match_approve(text: &str) -> Option<Intent> {
    let caps = APPROVE_RE.captures(text)?;
    Some(Intent::Approve {
        note: trailing_note(caps.name("note")),
    })
}

fn match_reject(text: &str) -> Option<Intent> {
    let caps = REJECT_RE.captures(text)?;
    let note = trailing_note(caps.name("note"));
    Some(Intent::Reject {
        reason: reject_reason(note.as_deref().unwrap_or("")),
        note,
    })
}

/// Map a rejection comment to a reason code by keyword; keywords are checked
/// in this order and "needs clarification" is the default.
fn reject_reason(note: &str) -> Reason {
    let lowered = note.to_lowercase();
    if lowered.contains("clarif") {
        Reason::NeedsClarification
    } else if lowered.contains("scenario") {
        Reason::ScenarioGap
    } else if lowered.contains("lint") {
        Reason::LintFailure
    } else if lowered.contains("test") {
        Reason::TestFailure
    } else if lowered.contains("block") || lowered.contains("depend") {
        Reason::BlockedDependency
    } else {
        Reason::NeedsClarification
    }
}

fn match_start_story(text: &str) -> Option<Intent> {
    let caps = START_STORY_RE.captures(text)?;
    Some(Intent::StartStory {
        story_id: caps["id"].to_string(),
    })
}

fn match_list_projects(text: &str) -> Option<Intent> {
    LIST_PROJECTS_RE.is_match(text).then_some(Intent::ListProjects)
}

fn match_detect_adoption(text: &str) -> Option<Intent> {
    DETECT_RE.is_match(text).then_some(Intent::DetectAdoption)
}

fn match_status(text: &str) -> Option<Intent> {
    STATUS_RE.is_match(text).then_some(Intent::Status)
}

fn match_continue(text: &str) -> Option<Intent> {
    CONTINUE_RE.is_match(text).then_some(Intent::Continue)
}

fn trailing_note(capture: Option<regex::Match<'_>>) -> Option<String> {
    capture
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_with_and_without_note() {
        assert_eq!(classify("approve"), Intent::Approve { note: None });
        assert_eq!(
            classify("LGTM, tidy the docs next time"),
            Intent::Approve {
                note: Some("tidy the docs next time".to_string())
            }
        );
        assert_eq!(classify("ship it"), Intent::Approve { note: None });
    }

    #[test]
    fn reject_extracts_reason_keyword() {
        assert_eq!(
            classify("reject: the login test is red"),
            Intent::Reject {
                reason: Reason::TestFailure,
                note: Some("the login test is red".to_string())
            }
        );
        assert_eq!(
            classify("rework, scenario two contradicts the brief"),
            Intent::Reject {
                reason: Reason::ScenarioGap,
                note: Some("scenario two contradicts the brief".to_string())
            }
        );
        assert_eq!(
            classify("send it back, blocked on the billing dependency"),
            Intent::Reject {
                reason: Reason::BlockedDependency,
                note: Some("blocked on the billing dependency".to_string())
            }
        );
    }

    /// No keyword in the comment defaults to needing clarification.
    #[test]
    fn reject_without_keyword_defaults_to_clarification() {
        assert_eq!(
            classify("reject"),
            Intent::Reject {
                reason: Reason::NeedsClarification,
                note: None
            }
        );
    }

    #[test]
    fn start_story_captures_the_identifier() {
        assert_eq!(
            classify("start S-12"),
            Intent::StartStory {
                story_id: "S-12".to_string()
            }
        );
        assert_eq!(
            classify("please start story AUTH-3 today"),
            Intent::StartStory {
                story_id: "AUTH-3".to_string()
            }
        );
    }

    #[test]
    fn queries_classify_as_queries() {
        assert_eq!(classify("list projects"), Intent::ListProjects);
        assert_eq!(classify("show all projects"), Intent::ListProjects);
        assert_eq!(classify("detect adoption"), Intent::DetectAdoption);
        assert_eq!(classify("status?"), Intent::Status);
        assert_eq!(classify("where are we"), Intent::Status);
    }

    #[test]
    fn bare_continue_words_advance_the_unit() {
        for text in ["continue", "next", "proceed", "go ahead", "keep going."] {
            assert_eq!(classify(text), Intent::Continue, "input: {text}");
        }
    }

    /// "next week ..." is a task, not a bare continue.
    #[test]
    fn continue_requires_a_bare_command() {
        assert_eq!(
            classify("next week migrate the billing tables"),
            Intent::CustomTask {
                text: "next week migrate the billing tables".to_string()
            }
        );
    }

    /// Overlaps resolve by rule order: approval outranks the story id.
    #[test]
    fn first_match_wins_on_overlap() {
        assert_eq!(
            classify("approve S-12"),
            Intent::Approve {
                note: Some("S-12".to_string())
            }
        );
    }

    /// Anything unmatched is a free-text task; classification never fails.
    #[test]
    fn unmatched_text_falls_through_to_custom_task() {
        assert_eq!(
            classify("  rename the config loader and add tracing  "),
            Intent::CustomTask {
                text: "rename the config loader and add tracing".to_string()
            }
        );
        assert_eq!(
            classify(""),
            Intent::CustomTask {
                text: String::new()
            }
        );
    }

    #[test]
    fn rule_order_is_pinned() {
        let names: Vec<&str> = RULES.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "approve",
                "reject",
                "start_story",
                "list_projects",
                "detect_adoption",
                "status",
                "continue",
            ]
        );
    }
}
