//! Intent-aware hybrid search engine.
//!
//! [`SearchEngine`] operates entirely through the store traits and the
//! embedding service, with no database or configuration dependencies. The
//! calling application builds the stores, picks an embedding backend and an
//! optional vector index, and hands them over.
//!
//! # Lexical pipeline (`search`)
//!
//! 1. Tokenize the query and extract intents.
//! 2. Load all entries and workflows (store errors are fatal).
//! 3. Embed the query and score every entry through the [`SemanticLeg`].
//! 4. Compute workflow chain boosts and workflow text matches.
//! 5. Combine signals per entry ([`score_entry`]); drop ineligible entries.
//! 6. Sort by score (desc), trust (desc), slug (asc).
//! 7. Apply the coverage-enforcing selector.
//!
//! # Discovery pipeline (`discover`)
//!
//! Semantic-first when a vector index is active: fetch
//! `max(2K, 15)` neighbors, drop those whose stored vector predates the
//! entry's current text, score the rest with the same combiner, and merge in
//! lexical results when confidence is low or fewer than K survive. Without
//! an index, or when the best current neighbor is below the hard cutoff,
//! `discover` is `search`.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::coverage::{workflow_intent_coverage, workflow_intents, CoverageEntry};
use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::intent::{IntentSet, IntentTable};
use crate::models::{
    CliEntry, ScoredCandidate, ScoredWorkflow, SearchResponse, SearchableText, WorkflowChain,
};
use crate::rank::{score_entry, sort_candidates, EntryInput, QueryContext, RankingParams};
use crate::scoring::lexical_score;
use crate::select::select_top_k;
use crate::similarity::SemanticLeg;
use crate::store::{ProfileStore, VectorIndex, WorkflowStore};
use crate::tokenize::tokenize;

/// Tokens and intents of one query.
struct PreparedQuery {
    raw: String,
    tokens: Vec<String>,
    intents: IntentSet,
}

/// Entries with their searchable text, built once per request.
struct Corpus {
    entries: Vec<CliEntry>,
    texts: Vec<SearchableText>,
    workflows: Vec<WorkflowChain>,
}

impl Corpus {
    fn new(entries: Vec<CliEntry>, workflows: Vec<WorkflowChain>) -> Self {
        let texts = entries.iter().map(SearchableText::from_entry).collect();
        Self {
            entries,
            texts,
            workflows,
        }
    }

    fn coverage_map(&self) -> HashMap<&str, CoverageEntry<'_>> {
        self.entries
            .iter()
            .zip(self.texts.iter())
            .map(|(entry, text)| (entry.slug.as_str(), CoverageEntry { entry, text }))
            .collect()
    }

    fn slug_texts(&self) -> Vec<(String, SearchableText)> {
        self.entries
            .iter()
            .zip(self.texts.iter())
            .map(|(e, t)| (e.slug.clone(), t.clone()))
            .collect()
    }
}

/// Workflows whose searchable text contains at least two query tokens (one
/// for single-token queries), keyed by member entry slug.
fn workflow_text_matches(
    workflows: &[WorkflowChain],
    tokens: &[String],
) -> HashMap<String, Vec<String>> {
    let needed = if tokens.len() == 1 { 1 } else { 2 };
    let mut by_entry: HashMap<String, Vec<String>> = HashMap::new();
    if tokens.is_empty() {
        return by_entry;
    }
    for workflow in workflows {
        let text = workflow.searchable_text();
        let hits = tokens.iter().filter(|t| text.contains(t.as_str())).count();
        if hits < needed {
            continue;
        }
        for step in &workflow.steps {
            let slot = by_entry.entry(step.cli_slug.clone()).or_default();
            if !slot.contains(&workflow.slug) {
                slot.push(workflow.slug.clone());
            }
        }
    }
    by_entry
}

/// The search engine.
pub struct SearchEngine {
    profiles: Arc<dyn ProfileStore>,
    workflows: Arc<dyn WorkflowStore>,
    embeddings: Arc<EmbeddingService>,
    semantic: SemanticLeg,
    table: IntentTable,
    params: RankingParams,
}

impl SearchEngine {
    /// Engine with the built-in intent table, default ranking parameters and
    /// brute-force similarity.
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        workflows: Arc<dyn WorkflowStore>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        let semantic = SemanticLeg::new(embeddings.clone(), None);
        Self {
            profiles,
            workflows,
            embeddings,
            semantic,
            table: IntentTable::builtin(),
            params: RankingParams::default(),
        }
    }

    /// Use a persistent vector index as the first similarity tier.
    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.semantic = SemanticLeg::new(self.embeddings.clone(), Some(index));
        self
    }

    pub fn with_intent_table(mut self, table: IntentTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_params(mut self, params: RankingParams) -> Self {
        self.params = params;
        self
    }

    pub fn intent_table(&self) -> &IntentTable {
        &self.table
    }

    pub fn params(&self) -> &RankingParams {
        &self.params
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingService> {
        &self.embeddings
    }

    /// Whether similarity currently comes from the vector index.
    pub fn index_active(&self) -> bool {
        self.semantic.index_active()
    }

    fn prepare(&self, query: &str) -> PreparedQuery {
        let tokens = tokenize(query);
        let intents = self.table.extract_with_tokens(&query.to_lowercase(), &tokens);
        tracing::debug!(?tokens, ?intents, "prepared query");
        PreparedQuery {
            raw: query.to_string(),
            tokens,
            intents,
        }
    }

    async fn load_corpus(&self) -> Result<Corpus> {
        let entries = self.profiles.list_entries().await?;
        let workflows = self.workflows.list_workflows().await?;
        Ok(Corpus::new(entries, workflows))
    }

    /// Score entries accepted by `include`, sorted. `similarity` supplies the
    /// semantic score per slug.
    fn score_corpus(
        &self,
        q: &PreparedQuery,
        corpus: &Corpus,
        similarity: &HashMap<String, f32>,
        include: impl Fn(&str) -> bool,
        explain: bool,
    ) -> Vec<ScoredCandidate> {
        let has_evidence = !q.intents.is_empty()
            || corpus
                .texts
                .iter()
                .any(|t| lexical_score(&q.tokens, t) > 0);
        let ctx = QueryContext::new(&q.raw, &q.tokens, &q.intents, &self.table, has_evidence)
            .with_explain(explain);

        let chain = workflow_intent_coverage(
            &corpus.workflows,
            &q.intents,
            &corpus.coverage_map(),
            &self.table,
        );
        let mut workflow_matches = workflow_text_matches(&corpus.workflows, &q.tokens);

        let mut ranked: Vec<ScoredCandidate> = corpus
            .entries
            .iter()
            .zip(corpus.texts.iter())
            .filter(|(entry, _)| include(&entry.slug))
            .filter_map(|(entry, text)| {
                score_entry(
                    &ctx,
                    &self.table,
                    &self.params,
                    EntryInput {
                        entry,
                        text,
                        similarity: similarity.get(&entry.slug).copied().unwrap_or(0.0) as f64,
                        chain_boost: chain.get(&entry.slug).copied().unwrap_or(0.0),
                        matched_workflows: workflow_matches.remove(&entry.slug).unwrap_or_default(),
                    },
                )
            })
            .collect();
        sort_candidates(&mut ranked);
        ranked
    }

    /// Full lexical pipeline before top-K selection.
    async fn rank_all(&self, q: &PreparedQuery, corpus: &Corpus, explain: bool) -> Vec<ScoredCandidate> {
        let query_vec = self.embeddings.embed(&q.raw).await;
        let similarity = self
            .semantic
            .similarities(&query_vec, &corpus.slug_texts())
            .await;
        self.score_corpus(q, corpus, &similarity, |_| true, explain)
    }

    /// Ranked entries for a free-text query.
    ///
    /// Returns an empty response for a blank query or a zero limit. A
    /// non-blank query with no results carries an
    /// [`UnmetRequest`](crate::models::UnmetRequest) for the caller to record.
    pub async fn search(&self, query: &str, limit: usize, explain: bool) -> Result<SearchResponse> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(SearchResponse::empty());
        }
        let q = self.prepare(query);
        let corpus = self.load_corpus().await?;
        Ok(self.search_prepared(&q, &corpus, limit, explain).await)
    }

    async fn search_prepared(
        &self,
        q: &PreparedQuery,
        corpus: &Corpus,
        limit: usize,
        explain: bool,
    ) -> SearchResponse {
        let ranked = self.rank_all(q, corpus, explain).await;
        let results = select_top_k(
            ranked,
            limit,
            &q.intents,
            &self.table,
            self.params.coverage_repair_boost,
        );
        tracing::debug!(query = %q.raw, results = results.len(), "search complete");
        SearchResponse::from_results(&q.raw, results)
    }

    /// Semantic-first retrieval with lexical fallback and merge.
    pub async fn discover(&self, query: &str, limit: usize, explain: bool) -> Result<SearchResponse> {
        if query.trim().is_empty() || limit == 0 || !self.semantic.index_active() {
            return self.search(query, limit, explain).await;
        }

        let q = self.prepare(query);
        let corpus = self.load_corpus().await?;
        let query_vec = self.embeddings.embed(query).await;
        let fetch = (limit * 2).max(15);
        let mut neighbors = match self.semantic.nearest(&query_vec, fetch).await {
            Some(n) => n,
            None => return Ok(self.search_prepared(&q, &corpus, limit, explain).await),
        };

        // A vector indexed for older text says nothing about the entry now.
        let current: HashMap<&str, &str> = corpus
            .entries
            .iter()
            .zip(corpus.texts.iter())
            .map(|(e, t)| (e.slug.as_str(), t.hash()))
            .collect();
        neighbors.retain(|n| {
            current
                .get(n.slug.as_str())
                .is_some_and(|hash| n.is_current(hash))
        });

        let best = neighbors.first().map(|n| n.similarity as f64).unwrap_or(0.0);
        if best < self.params.discover_min_similarity {
            tracing::debug!(best, "neighbors below cutoff, using lexical pipeline");
            return Ok(self.search_prepared(&q, &corpus, limit, explain).await);
        }

        let similarity: HashMap<String, f32> = neighbors
            .into_iter()
            .map(|n| (n.slug, n.similarity))
            .collect();
        let ranked = self.score_corpus(
            &q,
            &corpus,
            &similarity,
            |slug| similarity.contains_key(slug),
            explain,
        );
        let selected = select_top_k(
            ranked.clone(),
            limit,
            &q.intents,
            &self.table,
            self.params.coverage_repair_boost,
        );

        let low_confidence = selected
            .first()
            .map(|c| c.similarity < self.params.discover_confident_similarity)
            .unwrap_or(true);
        if !low_confidence && selected.len() >= limit {
            return Ok(SearchResponse::from_results(query, selected));
        }

        tracing::debug!(
            low_confidence,
            survivors = selected.len(),
            "merging lexical results into discovery"
        );
        let lexical = self.rank_all(&q, &corpus, explain).await;
        let mut merged: HashMap<String, ScoredCandidate> = HashMap::new();
        for candidate in ranked.into_iter().chain(lexical) {
            match merged.get(&candidate.slug) {
                Some(existing) if existing.score >= candidate.score => {}
                _ => {
                    merged.insert(candidate.slug.clone(), candidate);
                }
            }
        }
        let mut merged: Vec<ScoredCandidate> = merged.into_values().collect();
        sort_candidates(&mut merged);
        let results = select_top_k(
            merged,
            limit,
            &q.intents,
            &self.table,
            self.params.coverage_repair_boost,
        );
        Ok(SearchResponse::from_results(query, results))
    }

    /// Ranked workflow chains for a free-text query.
    ///
    /// A workflow is scored from query tokens in its searchable text, the
    /// query intents it covers (directly or through its steps' entries) and
    /// the semantic similarity of its text.
    pub async fn search_workflows(&self, query: &str, limit: usize) -> Result<Vec<ScoredWorkflow>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let q = self.prepare(query);
        let corpus = self.load_corpus().await?;
        let coverage = corpus.coverage_map();
        let query_vec = self.embeddings.embed(query).await;
        let p = &self.params;

        let mut scored: Vec<ScoredWorkflow> = Vec::new();
        for workflow in &corpus.workflows {
            let text = SearchableText::from_text(&workflow.searchable_text());
            let lexical = lexical_score(&q.tokens, &text);
            let matched = workflow_intents(workflow, &q.intents, &coverage, &self.table);
            let vector = self.embeddings.embed(text.as_str()).await;
            let similarity = cosine_similarity(&query_vec, &vector).max(0.0) as f64;

            let threshold = if lexical > 0 || !q.intents.is_empty() {
                p.semantic_threshold
            } else {
                p.semantic_threshold_no_evidence
            };
            if lexical == 0 && matched.is_empty() && similarity < threshold {
                continue;
            }

            let mut score = lexical as f64 * p.lexical_weight + similarity * p.semantic_weight;
            if !q.intents.is_empty() {
                if matched.is_empty() {
                    if q.intents.len() >= 2 {
                        score -= p.missing_intent_penalty;
                    }
                } else {
                    score += p.intent_match_weight * matched.len() as f64
                        + p.intent_coverage_weight * (matched.len() as f64 / q.intents.len() as f64);
                }
            }
            if score < p.min_score {
                continue;
            }

            let mut reasons = Vec::new();
            if !matched.is_empty() {
                reasons.push(format!(
                    "covers {}",
                    matched.iter().cloned().collect::<Vec<_>>().join(", ")
                ));
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

            scored.push(ScoredWorkflow {
                workflow: workflow.clone(),
                score,
                reason: reasons.join("; "),
                matched_intents: matched.into_iter().collect(),
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.workflow.slug.cmp(&b.workflow.slug))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// One entry by slug.
    pub async fn get_entry(&self, slug: &str) -> Result<Option<CliEntry>> {
        self.profiles.get_entry(slug).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingBackend;
    use crate::models::{AuthDescriptor, Provenance, WorkflowStep};
    use crate::store::memory::{InMemoryRegistry, InMemoryVectorIndex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn entry(slug: &str, description: &str, categories: &[&str]) -> CliEntry {
        CliEntry {
            slug: slug.to_string(),
            name: slug.to_string(),
            publisher: String::new(),
            description: description.to_string(),
            categories: categories.iter().map(|s| s.to_string()).collect(),
            auth: AuthDescriptor::default(),
            commands: vec![],
            compatibility: vec![],
            trust_score: 70.0,
            popularity_score: 0.0,
            provenance: Provenance::Curated,
            publisher_verified: true,
        }
    }

    fn registry() -> Arc<InMemoryRegistry> {
        let entries = vec![
            entry("vercel", "Frontend cloud platform", &["hosting"]),
            entry("supabase", "Postgres development platform", &["database"]),
            entry("stripe", "Online payments", &["payments"]),
            entry("clerk", "User management and authentication", &["auth"]),
            entry("jq", "Command-line JSON processor", &["json"]),
        ];
        let workflows = vec![WorkflowChain {
            slug: "saas-launch".to_string(),
            title: "Launch a SaaS".to_string(),
            description: "Ship a product with billing and login".to_string(),
            tags: vec!["saas".to_string()],
            steps: ["vercel", "supabase", "stripe", "clerk"]
                .iter()
                .enumerate()
                .map(|(i, s)| WorkflowStep {
                    step_number: i as u32 + 1,
                    cli_slug: s.to_string(),
                    purpose: String::new(),
                    auth_prerequisite: false,
                })
                .collect(),
        }];
        Arc::new(InMemoryRegistry::from_parts(entries, workflows).unwrap())
    }

    fn engine() -> SearchEngine {
        let reg = registry();
        SearchEngine::new(reg.clone(), reg, Arc::new(EmbeddingService::local(128, 256)))
    }

    fn slugs(resp: &SearchResponse) -> Vec<&str> {
        resp.results.iter().map(|c| c.slug.as_str()).collect()
    }

    #[tokio::test]
    async fn test_blank_query() {
        let resp = engine().search("   ", 5, false).await.unwrap();
        assert!(resp.results.is_empty());
        assert!(resp.unmet.is_none());
    }

    #[tokio::test]
    async fn test_nonsense_query_is_unmet() {
        let resp = engine().search("zzzxqv19283", 5, false).await.unwrap();
        assert!(resp.results.is_empty());
        assert_eq!(resp.unmet.unwrap().query, "zzzxqv19283");
    }

    #[tokio::test]
    async fn test_direct_mention() {
        let resp = engine().search("vercel", 5, false).await.unwrap();
        assert_eq!(slugs(&resp)[0], "vercel");
    }

    #[tokio::test]
    async fn test_full_stack_covers_all_intents() {
        let resp = engine().search("full stack saas", 4, true).await.unwrap();
        let got = slugs(&resp);
        for slug in ["vercel", "supabase", "stripe", "clerk"] {
            assert!(got.contains(&slug), "{} missing from {:?}", slug, got);
        }
        assert!(resp.results.iter().all(|c| c.signals.is_some()));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let e = engine();
        let a = e.search("deploy postgres with payments", 5, false).await.unwrap();
        let b = e.search("deploy postgres with payments", 5, false).await.unwrap();
        assert_eq!(slugs(&a), slugs(&b));
        let scores_a: Vec<f64> = a.results.iter().map(|c| c.score).collect();
        let scores_b: Vec<f64> = b.results.iter().map(|c| c.score).collect();
        assert_eq!(scores_a, scores_b);
    }

    #[tokio::test]
    async fn test_workflow_text_match_recorded() {
        let resp = engine().search("launch billing", 5, false).await.unwrap();
        let stripe = resp.results.iter().find(|c| c.slug == "stripe").unwrap();
        assert_eq!(stripe.matched_workflows, vec!["saas-launch"]);
    }

    #[tokio::test]
    async fn test_search_workflows() {
        let found = engine().search_workflows("saas with billing and login", 3).await.unwrap();
        assert_eq!(found[0].workflow.slug, "saas-launch");
        assert!(found[0].matched_intents.contains(&"payments".to_string()));
        let none = engine().search_workflows("zzzxqv19283", 3).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_discover_without_index_matches_search() {
        let e = engine();
        let a = e.search("online payments", 3, false).await.unwrap();
        let b = e.discover("online payments", 3, false).await.unwrap();
        assert_eq!(slugs(&a), slugs(&b));
    }

    #[tokio::test]
    async fn test_discover_with_index() {
        let reg = registry();
        let embeddings = Arc::new(EmbeddingService::local(128, 256));
        let index = Arc::new(InMemoryVectorIndex::new(128));
        for e in reg.list_entries().await.unwrap() {
            let text = SearchableText::from_entry(&e);
            let v = embeddings.embed(text.as_str()).await;
            index.upsert(&e.slug, &v, text.hash()).await.unwrap();
        }
        let engine = SearchEngine::new(reg.clone(), reg, embeddings)
            .with_vector_index(index as Arc<dyn VectorIndex>);
        assert!(engine.index_active());
        let resp = engine.discover("stripe online payments", 3, false).await.unwrap();
        assert_eq!(slugs(&resp)[0], "stripe");
    }

    #[tokio::test]
    async fn test_stale_index_vector_not_used() {
        let reg = Arc::new(
            InMemoryRegistry::from_parts(
                vec![entry("jq", "Command-line JSON processor", &["json"])],
                vec![],
            )
            .unwrap(),
        );
        let embeddings = Arc::new(EmbeddingService::local(128, 256));
        let index = Arc::new(InMemoryVectorIndex::new(128));
        let old_text = "wombat ledger reconciliation";
        let old = embeddings.embed(old_text).await;
        index.upsert("jq", &old, "old-hash").await.unwrap();
        let engine = SearchEngine::new(reg.clone(), reg, embeddings)
            .with_vector_index(index as Arc<dyn VectorIndex>);

        let searched = engine.search(old_text, 5, false).await.unwrap();
        assert!(searched.results.is_empty(), "{:?}", slugs(&searched));
        let discovered = engine.discover(old_text, 5, false).await.unwrap();
        assert!(discovered.results.is_empty(), "{:?}", slugs(&discovered));
        assert!(engine.index_active());
    }

    struct DeadBackend {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingBackend for DeadBackend {
        fn model_name(&self) -> &str {
            "dead"
        }
        fn dims(&self) -> usize {
            64
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            anyhow::bail!("connection timed out")
        }
    }

    #[tokio::test]
    async fn test_dead_remote_costs_one_call_per_search() {
        let entries: Vec<CliEntry> = (0..20)
            .map(|i| entry(&format!("tool{}", i), &format!("utility number {}", i), &[]))
            .collect();
        let reg = Arc::new(InMemoryRegistry::from_parts(entries, vec![]).unwrap());
        let backend = Arc::new(DeadBackend {
            calls: AtomicUsize::new(0),
        });
        let embeddings = Arc::new(EmbeddingService::with_remote(backend.clone(), 64, 256));
        let engine = SearchEngine::new(reg.clone(), reg, embeddings);

        let started = std::time::Instant::now();
        engine.search("utility", 5, false).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(50 * 20));
    }

    #[tokio::test]
    async fn test_zero_limit_is_not_a_miss() {
        let e = engine();
        let resp = e.search("vercel", 0, false).await.unwrap();
        assert!(resp.results.is_empty());
        assert!(resp.unmet.is_none());
        let resp = e.discover("vercel", 0, false).await.unwrap();
        assert!(resp.unmet.is_none());
    }

    #[tokio::test]
    async fn test_get_entry() {
        let e = engine();
        assert_eq!(e.get_entry("jq").await.unwrap().unwrap().slug, "jq");
        assert!(e.get_entry("nope").await.unwrap().is_none());
    }
}
