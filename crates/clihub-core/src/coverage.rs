//! Intent coverage for entries and workflow chains.
//!
//! [`matches_intent`] decides whether one entry satisfies one intent.
//! [`workflow_intent_coverage`] turns curated workflows that cover several
//! query intents into a per-entry chain boost, decaying by step position.

use std::collections::{BTreeSet, HashMap};

use crate::intent::{IntentRule, IntentSet, IntentTable};
use crate::models::{CliEntry, SearchableText, WorkflowChain};
use crate::tokenize::contains_word;

/// Whether `entry` satisfies `rule`.
///
/// True when a category tag overlaps one of the rule's categories, when any
/// trigger term occurs as a whole word in the entry's searchable text, or when
/// an auth environment variable carries one of the rule's hints.
pub fn matches_intent(entry: &CliEntry, text: &SearchableText, rule: &IntentRule) -> bool {
    categories_overlap(&entry.categories, &rule.categories)
        || text_matches_rule(text.as_str(), rule)
        || entry.auth.env_vars.iter().any(|var| {
            let var = var.to_uppercase();
            rule.env_hints
                .iter()
                .any(|hint| var.contains(&hint.to_uppercase()))
        })
}

/// Textual overlap between tags and category matchers, ignoring case.
fn categories_overlap(tags: &[String], categories: &[String]) -> bool {
    tags.iter().any(|tag| {
        let tag = tag.to_lowercase();
        categories.iter().any(|cat| {
            let cat = cat.to_lowercase();
            tag == cat
                || (cat.len() >= 3 && contains_word(&tag, &cat))
                || (tag.len() >= 3 && contains_word(&cat, &tag))
        })
    })
}

/// Any trigger of `rule` occurs as a whole word in `text`.
pub fn text_matches_rule(text: &str, rule: &IntentRule) -> bool {
    rule.triggers
        .iter()
        .any(|term| contains_word(text, &term.to_lowercase()))
}

/// The subset of `intents` that `entry` satisfies.
pub fn entry_intents(
    entry: &CliEntry,
    text: &SearchableText,
    intents: &IntentSet,
    table: &IntentTable,
) -> BTreeSet<String> {
    intents
        .iter()
        .filter(|name| {
            table
                .rule(name)
                .is_some_and(|rule| matches_intent(entry, text, rule))
        })
        .cloned()
        .collect()
}

/// An entry as seen by the coverage calculator.
pub struct CoverageEntry<'a> {
    pub entry: &'a CliEntry,
    pub text: &'a SearchableText,
}

/// The subset of `intents` a workflow covers through its own title,
/// description and tags, or through any step's entry.
pub fn workflow_intents(
    workflow: &WorkflowChain,
    intents: &IntentSet,
    entries: &HashMap<&str, CoverageEntry<'_>>,
    table: &IntentTable,
) -> BTreeSet<String> {
    let own_text = workflow.own_text();
    intents
        .iter()
        .filter(|name| {
            let Some(rule) = table.rule(name) else {
                return false;
            };
            text_matches_rule(&own_text, rule)
                || categories_overlap(&workflow.tags, &rule.categories)
                || workflow.steps.iter().any(|step| {
                    entries
                        .get(step.cli_slug.as_str())
                        .is_some_and(|ce| matches_intent(ce.entry, ce.text, rule))
                })
        })
        .cloned()
        .collect()
}

/// Chain boost per entry slug from workflows covering a multi-intent query.
///
/// Only active for queries with at least two intents. A workflow contributes
/// once it covers `max(2, min(3, |intents|))` query intents through its own
/// text or its steps' entries. Its strength is spread over its steps with a
/// `max(0.45, 1 - 0.09 * step_index)` decay; each entry keeps the maximum
/// boost seen across workflows.
pub fn workflow_intent_coverage(
    workflows: &[WorkflowChain],
    intents: &IntentSet,
    entries: &HashMap<&str, CoverageEntry<'_>>,
    table: &IntentTable,
) -> HashMap<String, f64> {
    let mut boosts: HashMap<String, f64> = HashMap::new();
    if intents.len() < 2 {
        return boosts;
    }

    let required = intents.len().min(3).max(2);

    for workflow in workflows {
        let matched = workflow_intents(workflow, intents, entries, table).len();

        if matched < required {
            continue;
        }

        let coverage_ratio = matched as f64 / intents.len() as f64;
        let mut strength = coverage_ratio * 1.8 + matched as f64 * 0.7;
        if workflow.steps.len() >= 4 {
            strength += 0.55;
        }
        if intents.len() >= 3 && matched >= 3 {
            strength += 0.9;
        }

        for (step_index, step) in workflow.steps.iter().enumerate() {
            let decay = (1.0 - step_index as f64 * 0.09).max(0.45);
            let boost = strength * decay;
            let slot = boosts.entry(step.cli_slug.clone()).or_insert(0.0);
            if boost > *slot {
                *slot = boost;
            }
        }
    }

    boosts
}
