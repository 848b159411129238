//! Ranking combiner.
//!
//! Merges every per-entry signal into one score and decides whether the entry
//! is eligible at all.
//!
//! # Signals
//!
//! | Signal | Contribution |
//! |--------|--------------|
//! | lexical | `matched_tokens × lexical_weight` |
//! | semantic | `similarity × semantic_weight` |
//! | workflow text | `matched_workflows × workflow_text_weight` |
//! | intent | boost scaling with coverage, or a penalty when nothing matches |
//! | chain | [`workflow_intent_coverage`](crate::coverage::workflow_intent_coverage) boost |
//! | canonical | per canonical intent, stronger for multi-intent queries |
//! | direct mention | fixed bonus when the identifier is a query token |
//! | infra | fixed bonus for IaC tools on explicit IaC queries |
//! | trust | normalized trust + mean compatibility, only for relevant entries |
//! | noise | penalties for low-provenance, low-evidence listings |
//!
//! # Gates
//!
//! An entry without lexical overlap, sufficient semantic similarity, or any
//! intent/mention/canonical/chain/infra signal is dropped before sorting.
//! Survivors below `min_score` are dropped as well; the floor is relaxed for
//! broad queries where the entry covers part of the request.

use serde::Deserialize;
use std::collections::HashSet;

use crate::coverage::entry_intents;
use crate::intent::{IntentSet, IntentTable};
use crate::models::{CliEntry, ScoredCandidate, SearchableText, SignalBreakdown};
use crate::scoring::{is_direct_mention, lexical_score, top_commands};

/// Tunable weights and thresholds.
///
/// The defaults are an empirically tuned starting point, not derived values.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingParams {
    pub lexical_weight: f64,
    pub semantic_weight: f64,
    pub workflow_text_weight: f64,
    pub intent_match_weight: f64,
    pub intent_coverage_weight: f64,
    pub missing_intent_penalty: f64,
    /// Applied when a query has at least `broad_query_intents` intents and
    /// the entry covers fewer than half of them.
    pub broad_partial_penalty: f64,
    pub broad_query_intents: usize,
    pub chain_weight: f64,
    pub canonical_single: f64,
    pub canonical_multi: f64,
    pub direct_mention: f64,
    pub infra_boost: f64,
    pub trust_weight: f64,
    pub compatibility_weight: f64,
    pub noise_penalty: f64,
    pub short_identifier_penalty: f64,
    pub short_identifier_len: usize,
    /// Similarity below which a low-provenance entry counts as weak evidence.
    pub noise_semantic_ceiling: f64,
    /// Similarity that counts as a relevance signal when the query carries
    /// lexical or intent evidence.
    pub semantic_threshold: f64,
    /// Similarity that counts as a relevance signal when it does not.
    pub semantic_threshold_no_evidence: f64,
    pub min_score: f64,
    pub min_score_relaxed: f64,
    /// One-time boost given to a coverage-repair candidate.
    pub coverage_repair_boost: f64,
    /// Below this best neighbor similarity discovery uses the lexical pipeline.
    pub discover_min_similarity: f64,
    /// Below this top similarity discovery merges lexical results.
    pub discover_confident_similarity: f64,
    pub top_commands: usize,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            lexical_weight: 1.2,
            semantic_weight: 3.0,
            workflow_text_weight: 0.35,
            intent_match_weight: 1.5,
            intent_coverage_weight: 2.0,
            missing_intent_penalty: 2.5,
            broad_partial_penalty: 0.6,
            broad_query_intents: 4,
            chain_weight: 1.0,
            canonical_single: 1.2,
            canonical_multi: 2.4,
            direct_mention: 3.0,
            infra_boost: 1.5,
            trust_weight: 0.8,
            compatibility_weight: 0.6,
            noise_penalty: 1.5,
            short_identifier_penalty: 1.5,
            short_identifier_len: 3,
            noise_semantic_ceiling: 0.45,
            semantic_threshold: 0.35,
            semantic_threshold_no_evidence: 0.55,
            min_score: 0.9,
            min_score_relaxed: 0.5,
            coverage_repair_boost: 1.5,
            discover_min_similarity: 0.2,
            discover_confident_similarity: 0.45,
            top_commands: 3,
        }
    }
}

/// Query-level inputs shared by every entry.
pub struct QueryContext<'a> {
    pub lower_query: String,
    pub tokens: &'a [String],
    pub token_set: HashSet<&'a str>,
    pub intents: &'a IntentSet,
    /// Whether the query has any lexical or intent evidence in the corpus.
    pub has_evidence: bool,
    pub iac_query: bool,
    pub explain: bool,
}

impl<'a> QueryContext<'a> {
    pub fn new(
        query: &str,
        tokens: &'a [String],
        intents: &'a IntentSet,
        table: &IntentTable,
        has_evidence: bool,
    ) -> Self {
        let lower_query = query.to_lowercase();
        let iac_query = table.is_iac_query(&lower_query, tokens);
        Self {
            lower_query,
            tokens,
            token_set: tokens.iter().map(String::as_str).collect(),
            intents,
            has_evidence,
            iac_query,
            explain: false,
        }
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    fn semantic_threshold(&self, params: &RankingParams) -> f64 {
        if self.has_evidence {
            params.semantic_threshold
        } else {
            params.semantic_threshold_no_evidence
        }
    }
}

/// Per-entry inputs computed outside the combiner.
pub struct EntryInput<'a> {
    pub entry: &'a CliEntry,
    pub text: &'a SearchableText,
    pub similarity: f64,
    pub chain_boost: f64,
    pub matched_workflows: Vec<String>,
}

/// Whether `entry` is tagged or named as an IaC tool.
fn is_iac_tool(entry: &CliEntry, table: &IntentTable) -> bool {
    let base = entry.base_identifier();
    table.iac_markers.iter().any(|marker| {
        *marker == base
            || *marker == entry.slug
            || entry
                .categories
                .iter()
                .any(|c| c.to_lowercase() == *marker)
    })
}

/// Combine all signals for one entry. Returns `None` when the entry fails the
/// relevance gate or the score floor.
pub fn score_entry(
    ctx: &QueryContext<'_>,
    table: &IntentTable,
    params: &RankingParams,
    input: EntryInput<'_>,
) -> Option<ScoredCandidate> {
    let entry = input.entry;
    let total = ctx.intents.len();

    let lexical = lexical_score(ctx.tokens, input.text);
    let matched = entry_intents(entry, input.text, ctx.intents, table);
    let m = matched.len();

    let mut intent = 0.0;
    if total > 0 {
        if m > 0 {
            intent = params.intent_match_weight * m as f64
                + params.intent_coverage_weight * (m as f64 / total as f64);
            if total >= params.broad_query_intents && m * 2 < total {
                intent -= params.broad_partial_penalty;
            }
        } else if total >= 2 {
            intent = -params.missing_intent_penalty;
        }
    }

    let base = entry.base_identifier();
    let mut canonical_for: Vec<&str> = table.canonical_intents(&base, ctx.intents).collect();
    if base != entry.slug {
        for name in table.canonical_intents(&entry.slug, ctx.intents) {
            if !canonical_for.contains(&name) {
                canonical_for.push(name);
            }
        }
    }
    let per_canonical = if total >= 2 {
        params.canonical_multi
    } else {
        params.canonical_single
    };
    let canonical = canonical_for.len() as f64 * per_canonical;

    let mentioned = is_direct_mention(entry, &ctx.token_set);
    let mention = if mentioned { params.direct_mention } else { 0.0 };
    let infra = if ctx.iac_query && is_iac_tool(entry, table) {
        params.infra_boost
    } else {
        0.0
    };
    let chain = input.chain_boost * params.chain_weight;
    let workflow_text = input.matched_workflows.len() as f64 * params.workflow_text_weight;
    let similarity = input.similarity.max(0.0);
    let semantic = similarity * params.semantic_weight;

    let structural = m > 0 || mentioned || canonical > 0.0 || chain > 0.0 || infra > 0.0;
    let semantic_signal = similarity >= ctx.semantic_threshold(params);
    if lexical == 0 && !semantic_signal && !structural {
        return None;
    }

    let trust = params.trust_weight * (entry.trust_score / 100.0).clamp(0.0, 1.0)
        + params.compatibility_weight * entry.mean_compatibility();

    let mut noise = 0.0;
    if entry.is_low_provenance() && !structural && similarity < params.noise_semantic_ceiling {
        noise -= params.noise_penalty;
        if base.chars().count() <= params.short_identifier_len {
            noise -= params.short_identifier_penalty;
        }
    }

    let lexical_weighted = lexical as f64 * params.lexical_weight;
    let score = lexical_weighted
        + semantic
        + workflow_text
        + intent
        + chain
        + canonical
        + mention
        + infra
        + trust
        + noise;

    let floor = if total >= 3 && m >= 1 && m < total {
        params.min_score_relaxed
    } else {
        params.min_score
    };
    if score < floor {
        return None;
    }

    let mut reasons: Vec<String> = Vec::new();
    if mentioned {
        reasons.push("mentioned directly".to_string());
    }
    if m > 0 {
        reasons.push(format!(
            "covers {}",
            matched.iter().cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    if !canonical_for.is_empty() {
        reasons.push(format!("canonical for {}", canonical_for.join(", ")));
    }
    if chain > 0.0 {
        reasons.push("step in a workflow covering this request".to_string());
    }
    if !input.matched_workflows.is_empty() {
        reasons.push(format!("used in {}", input.matched_workflows.join(", ")));
    }
    if infra > 0.0 {
        reasons.push("infrastructure-as-code tool".to_string());
    }
    if lexical > 0 {
        reasons.push(format!(
            "matches {} query term{}",
            lexical,
            if lexical == 1 { "" } else { "s" }
        ));
    }
    if reasons.is_empty() {
        reasons.push(format!("semantically similar ({:.2})", similarity));
    }

    let signals = ctx.explain.then(|| SignalBreakdown {
        lexical: lexical_weighted,
        semantic,
        workflow_text,
        intent,
        chain,
        canonical,
        direct_mention: mention,
        infra,
        trust,
        noise_penalty: noise,
    });

    Some(ScoredCandidate {
        slug: entry.slug.clone(),
        name: entry.name.clone(),
        description: entry.description.clone(),
        score,
        reason: reasons.join("; "),
        matched_workflows: input.matched_workflows,
        top_commands: top_commands(entry, ctx.tokens, params.top_commands),
        matched_intents: matched.into_iter().collect(),
        similarity,
        trust_score: entry.trust_score,
        signals,
    })
}

/// Sort by score (desc), trust (desc), slug (asc).
pub fn sort_candidates(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.trust_score
                    .partial_cmp(&a.trust_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| a.slug.cmp(&b.slug))
    });
}
