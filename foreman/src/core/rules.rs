//! Static step rules and the per-project override overlay.
//!
//! The default registry is immutable data. Project-level tuning never mutates
//! it: overrides live in an overlay the lookup consults first, so two
//! projects with different configs can share the same defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::state::{Reason, Step};

/// Placeholder substituted with the unit identifier in path templates.
pub const UNIT_PLACEHOLDER: &str = "{unit}";

/// Static description of one pipeline step.
#[derive(Debug, Clone, Copy)]
struct StepRule {
    step: Step,
    label: &'static str,
    on_pass: Step,
    /// Failure routes keyed by reason; anything else falls back to `reroute_default`.
    reroute: &'static [(Reason, Step)],
    reroute_default: Step,
    max_attempts: u32,
    timeout_minutes: u32,
    needs_review: bool,
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
    /// Empty slice means no declared verification command.
    verify_command: &'static [&'static str],
    instruction: &'static str,
}

const RULES: &[StepRule] = &[
    StepRule {
        step: Step::Bootstrap,
        label: "project bootstrap",
        on_pass: Step::Scenarios,
        reroute: &[],
        reroute_default: Step::Bootstrap,
        max_attempts: 2,
        timeout_minutes: 15,
        needs_review: false,
        inputs: &["README.md"],
        outputs: &[".foreman/NOTES.md"],
        verify_command: &[],
        instruction: "\
Survey the repository: build system, module layout, test entry points, and any
conventions a newcomer must know. Write what you learn to `.foreman/NOTES.md`
so later steps can rely on it without re-reading the whole tree. Do not change
any other file.",
    },
    StepRule {
        step: Step::Scenarios,
        label: "scenario writing",
        on_pass: Step::Implement,
        reroute: &[],
        reroute_default: Step::Scenarios,
        max_attempts: 3,
        timeout_minutes: 30,
        needs_review: false,
        inputs: &[".foreman/NOTES.md", ".foreman/units/{unit}/brief.md"],
        outputs: &[".foreman/units/{unit}/scenarios.md"],
        verify_command: &[],
        instruction: "\
Write concrete acceptance scenarios for this unit in
`.foreman/units/{unit}/scenarios.md`: one numbered scenario per observable
behavior, each with setup, action, and expected outcome. Cover the unhappy
paths. Do not write implementation code in this step.",
    },
    StepRule {
        step: Step::Implement,
        label: "implementation",
        on_pass: Step::Review,
        reroute: &[(Reason::ScenarioGap, Step::Scenarios)],
        reroute_default: Step::Implement,
        max_attempts: 3,
        timeout_minutes: 45,
        needs_review: false,
        inputs: &[
            ".foreman/units/{unit}/scenarios.md",
            ".foreman/NOTES.md",
        ],
        outputs: &[],
        verify_command: &["just", "ci"],
        instruction: "\
Implement the unit until every scenario in
`.foreman/units/{unit}/scenarios.md` is covered by passing tests. Keep changes
scoped to this unit. If a scenario turns out to be wrong or missing, report a
`scenario_gap` rather than silently working around it.",
    },
    StepRule {
        step: Step::Review,
        label: "human review",
        on_pass: Step::Finalize,
        reroute: &[
            (Reason::TestFailure, Step::Implement),
            (Reason::LintFailure, Step::Implement),
            (Reason::ScenarioGap, Step::Scenarios),
        ],
        reroute_default: Step::Scenarios,
        max_attempts: 3,
        timeout_minutes: 1440,
        needs_review: true,
        inputs: &[".foreman/units/{unit}/scenarios.md"],
        outputs: &[],
        verify_command: &[],
        instruction: "\
A human reviewer decides here; no executor work is dispatched for this step.",
    },
    StepRule {
        step: Step::Finalize,
        label: "bookkeeping",
        on_pass: Step::Done,
        reroute: &[],
        reroute_default: Step::Finalize,
        max_attempts: 2,
        timeout_minutes: 15,
        needs_review: false,
        inputs: &[".foreman/NOTES.md"],
        outputs: &[
            ".foreman/NOTES.md",
            ".foreman/units/{unit}/summary.md",
        ],
        verify_command: &[],
        instruction: "\
Close out the unit. Record the outcome in `.foreman/NOTES.md` (what changed,
what to watch out for) and write `.foreman/units/{unit}/summary.md` using the
run summary embedded above; do not read any state file to reconstruct it.",
    },
];

/// Per-step tuning from project config. `None` keeps the registry default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepOverride {
    pub max_attempts: Option<u32>,
    pub timeout_minutes: Option<u32>,
    pub verify_command: Option<Vec<String>>,
}

/// A rule with any project overrides already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule {
    pub step: Step,
    pub label: &'static str,
    pub on_pass: Step,
    reroute: &'static [(Reason, Step)],
    reroute_default: Step,
    pub max_attempts: u32,
    pub timeout_minutes: u32,
    pub needs_review: bool,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub verify_command: Option<Vec<String>>,
    pub instruction: &'static str,
}

impl ResolvedRule {
    /// Failure-route target for a reason; `None` or an unmapped reason takes
    /// the rule's default (usually the step itself).
    pub fn route_for(&self, reason: Option<Reason>) -> Step {
        if let Some(reason) = reason {
            for (candidate, target) in self.reroute {
                if *candidate == reason {
                    return *target;
                }
            }
        }
        self.reroute_default
    }

    /// Input path templates with the unit placeholder substituted.
    pub fn resolved_inputs(&self, unit_id: Option<&str>) -> Vec<String> {
        self.inputs
            .iter()
            .map(|template| resolve_template(template, unit_id))
            .collect()
    }
}

/// Immutable default registry plus the per-project overlay.
#[derive(Debug, Clone, Default)]
pub struct RulesTable {
    overrides: HashMap<Step, StepOverride>,
}

impl RulesTable {
    /// Table with no overrides (registry defaults only).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<Step, StepOverride>) -> Self {
        Self { overrides }
    }

    /// First step of the pipeline for a fresh project.
    pub fn first_step() -> Step {
        Step::Bootstrap
    }

    /// Look up the rule for a step, overlay first.
    ///
    /// The terminal step has no rule; asking for one is an error.
    pub fn rule_for(&self, step: Step) -> Result<ResolvedRule, String> {
        if step == Step::Done {
            return Err("no rule exists for the terminal step 'done'".to_string());
        }
        let rule = RULES
            .iter()
            .find(|rule| rule.step == step)
            .ok_or_else(|| format!("no rule registered for step '{step}'"))?;

        let overlay = self.overrides.get(&step);
        let verify_command = overlay
            .and_then(|o| o.verify_command.clone())
            .or_else(|| {
                (!rule.verify_command.is_empty())
                    .then(|| rule.verify_command.iter().map(|s| (*s).to_string()).collect())
            });

        Ok(ResolvedRule {
            step: rule.step,
            label: rule.label,
            on_pass: rule.on_pass,
            reroute: rule.reroute,
            reroute_default: rule.reroute_default,
            max_attempts: overlay
                .and_then(|o| o.max_attempts)
                .unwrap_or(rule.max_attempts),
            timeout_minutes: overlay
                .and_then(|o| o.timeout_minutes)
                .unwrap_or(rule.timeout_minutes),
            needs_review: rule.needs_review,
            inputs: rule.inputs,
            outputs: rule.outputs,
            verify_command,
            instruction: rule.instruction,
        })
    }
}

/// Substitute the unit identifier into a path template.
///
/// Every occurrence of the placeholder is replaced; a template without the
/// placeholder (or a missing unit id) is returned unchanged.
pub fn resolve_template(template: &str, unit_id: Option<&str>) -> String {
    match unit_id {
        Some(id) => template.replace(UNIT_PLACEHOLDER, id),
        None => template.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Following successor-on-pass from the first step must reach `done`
    /// exactly once, visiting every intermediate step exactly once.
    #[test]
    fn step_chain_visits_every_step_once() {
        let rules = RulesTable::new();
        let mut visited = Vec::new();
        let mut step = RulesTable::first_step();
        while step != Step::Done {
            assert!(
                !visited.contains(&step),
                "cycle detected at step '{step}'"
            );
            visited.push(step);
            step = rules.rule_for(step).expect("rule").on_pass;
        }
        assert_eq!(visited.len(), RULES.len(), "every ruled step visited");
    }

    #[test]
    fn terminal_step_has_no_rule() {
        let err = RulesTable::new().rule_for(Step::Done).unwrap_err();
        assert!(err.contains("terminal"));
    }

    #[test]
    fn mapped_reason_routes_away_and_default_routes_home() {
        let rules = RulesTable::new();
        let implement = rules.rule_for(Step::Implement).expect("rule");
        assert_eq!(
            implement.route_for(Some(Reason::ScenarioGap)),
            Step::Scenarios
        );
        assert_eq!(
            implement.route_for(Some(Reason::TestFailure)),
            Step::Implement
        );
        assert_eq!(implement.route_for(None), Step::Implement);
    }

    #[test]
    fn review_defaults_to_rewinding_to_scenarios() {
        let rules = RulesTable::new();
        let review = rules.rule_for(Step::Review).expect("rule");
        assert_eq!(
            review.route_for(Some(Reason::NeedsClarification)),
            Step::Scenarios
        );
        assert_eq!(review.route_for(Some(Reason::TestFailure)), Step::Implement);
    }

    #[test]
    fn overlay_wins_over_registry_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert(
            Step::Implement,
            StepOverride {
                max_attempts: Some(5),
                timeout_minutes: Some(90),
                verify_command: Some(vec!["cargo".to_string(), "test".to_string()]),
            },
        );
        let rules = RulesTable::with_overrides(overrides);
        let rule = rules.rule_for(Step::Implement).expect("rule");
        assert_eq!(rule.max_attempts, 5);
        assert_eq!(rule.timeout_minutes, 90);
        assert_eq!(
            rule.verify_command,
            Some(vec!["cargo".to_string(), "test".to_string()])
        );

        // Defaults are untouched for a table without the overlay.
        let plain = RulesTable::new().rule_for(Step::Implement).expect("rule");
        assert_eq!(plain.max_attempts, 3);
        assert_eq!(
            plain.verify_command,
            Some(vec!["just".to_string(), "ci".to_string()])
        );
    }

    #[test]
    fn template_substitutes_every_placeholder_occurrence() {
        let resolved = resolve_template(".foreman/units/{unit}/{unit}.md", Some("S-12"));
        assert_eq!(resolved, ".foreman/units/S-12/S-12.md");
    }

    #[test]
    fn template_without_placeholder_is_unchanged() {
        assert_eq!(resolve_template("README.md", Some("S-12")), "README.md");
        assert_eq!(
            resolve_template(".foreman/units/{unit}/brief.md", None),
            ".foreman/units/{unit}/brief.md"
        );
    }

    #[test]
    fn every_rule_carries_a_positive_budget() {
        let rules = RulesTable::new();
        for rule in RULES {
            let resolved = rules.rule_for(rule.step).expect("rule");
            assert!(resolved.timeout_minutes >= 1);
            assert!(resolved.max_attempts >= 1);
        }
    }
}
