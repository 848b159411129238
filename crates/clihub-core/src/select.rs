//! Coverage-enforcing top-K selection.
//!
//! For queries with two or more intents the returned top-K must, where the
//! ranked list allows it, contain at least one entry per intent. Repair runs
//! in two phases:
//!
//! 1. **Boost.** For each intent missing from the naive top-K, the best
//!    candidate outside the top-K that is canonical for or satisfies that
//!    intent receives a one-time boost, and the list is re-sorted.
//! 2. **Replace.** While gaps remain, the weakest *replaceable* member of the
//!    top-K (every intent it covers is also covered by another member) is
//!    swapped for the best remaining candidate that covers a missing intent.
//!
//! Each swap adds at least one intent to the covered set without removing
//! any, so the loop is bounded by the number of intents. It is also capped
//! at that number explicitly.

use std::collections::BTreeSet;

use crate::intent::{IntentSet, IntentTable};
use crate::models::{base_identifier, ScoredCandidate};
use crate::rank::sort_candidates;

/// Query intents `candidate` counts towards: its matched intents plus any
/// intent it is canonical for.
fn candidate_intents(
    candidate: &ScoredCandidate,
    intents: &IntentSet,
    table: &IntentTable,
) -> BTreeSet<String> {
    let base = base_identifier(&candidate.slug);
    intents
        .iter()
        .filter(|name| {
            candidate.matched_intents.iter().any(|m| m == *name)
                || table
                    .rule(name)
                    .is_some_and(|r| r.is_canonical(&base) || r.is_canonical(&candidate.slug))
        })
        .cloned()
        .collect()
}

fn covered_by(
    members: &[ScoredCandidate],
    intents: &IntentSet,
    table: &IntentTable,
) -> BTreeSet<String> {
    members
        .iter()
        .flat_map(|c| candidate_intents(c, intents, table))
        .collect()
}

fn covered_except(
    members: &[ScoredCandidate],
    skip: usize,
    intents: &IntentSet,
    table: &IntentTable,
) -> BTreeSet<String> {
    members
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .flat_map(|(_, c)| candidate_intents(c, intents, table))
        .collect()
}

/// Select up to `k` candidates from a list sorted by
/// [`sort_candidates`], enforcing intent coverage.
pub fn select_top_k(
    mut ranked: Vec<ScoredCandidate>,
    k: usize,
    intents: &IntentSet,
    table: &IntentTable,
    repair_boost: f64,
) -> Vec<ScoredCandidate> {
    if intents.len() < 2 || ranked.len() <= k {
        ranked.truncate(k);
        return ranked;
    }

    let covered = covered_by(&ranked[..k], intents, table);
    let missing: Vec<&String> = intents.iter().filter(|i| !covered.contains(*i)).collect();
    if missing.is_empty() {
        ranked.truncate(k);
        return ranked;
    }

    let mut boosted: Vec<usize> = Vec::new();
    for intent in &missing {
        let found = (k..ranked.len()).find(|&i| {
            !boosted.contains(&i) && candidate_intents(&ranked[i], intents, table).contains(*intent)
        });
        if let Some(i) = found {
            tracing::debug!(slug = %ranked[i].slug, intent = %intent, "coverage repair boost");
            ranked[i].score += repair_boost;
            boosted.push(i);
        }
    }
    sort_candidates(&mut ranked);

    let mut rest = ranked.split_off(k);
    let mut top = ranked;

    for _ in 0..intents.len() {
        let covered = covered_by(&top, intents, table);
        let missing: BTreeSet<&String> = intents.iter().filter(|i| !covered.contains(*i)).collect();
        if missing.is_empty() {
            break;
        }

        let Some(incoming) = rest.iter().position(|c| {
            candidate_intents(c, intents, table)
                .iter()
                .any(|i| missing.contains(i))
        }) else {
            break;
        };

        let weakest = (0..top.len()).rev().find(|&i| {
            let others = covered_except(&top, i, intents, table);
            candidate_intents(&top[i], intents, table)
                .iter()
                .all(|own| others.contains(own))
        });
        let Some(weakest) = weakest else {
            break;
        };

        let candidate = rest.remove(incoming);
        tracing::debug!(
            displaced = %top[weakest].slug,
            incoming = %candidate.slug,
            "coverage repair swap"
        );
        let displaced = std::mem::replace(&mut top[weakest], candidate);
        rest.push(displaced);
    }

    sort_candidates(&mut top);
    top
}
