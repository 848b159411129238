//! Semantic similarity sources.
//!
//! Two tiers implement [`SimilaritySource`]:
//!
//! - [`IndexSimilarity`] asks a persistent [`VectorIndex`] for an ordered
//!   nearest-neighbor list. Vectors stored for an older version of an
//!   entry's searchable text are ignored.
//! - [`BruteForceSimilarity`] embeds each entry's searchable text through the
//!   cached [`EmbeddingService`] and scans with cosine similarity.
//!
//! [`SemanticLeg`] is selected at startup with an optional index and swaps to
//! brute force permanently the first time the index errors or reports a
//! dimensionality that does not match the query vector.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::models::SearchableText;
use crate::store::{Neighbor, VectorIndex};

/// Similarity of a query vector against a set of entries, keyed by slug.
#[async_trait]
pub trait SimilaritySource: Send + Sync {
    fn name(&self) -> &str;

    async fn similarities(
        &self,
        query: &[f32],
        entries: &[(String, SearchableText)],
    ) -> Result<HashMap<String, f32>>;
}

/// Index-backed similarity.
pub struct IndexSimilarity {
    index: Arc<dyn VectorIndex>,
}

impl IndexSimilarity {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Ordered neighbors, failing on dimensionality mismatch.
    pub async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        if self.index.dims() != query.len() {
            bail!(
                "vector index has {} dims, query has {}",
                self.index.dims(),
                query.len()
            );
        }
        self.index.nearest_neighbors(query, limit).await
    }
}

#[async_trait]
impl SimilaritySource for IndexSimilarity {
    fn name(&self) -> &str {
        "index"
    }

    async fn similarities(
        &self,
        query: &[f32],
        entries: &[(String, SearchableText)],
    ) -> Result<HashMap<String, f32>> {
        let neighbors = self.nearest(query, entries.len()).await?;
        let current: HashMap<&str, &str> = entries
            .iter()
            .map(|(slug, text)| (slug.as_str(), text.hash()))
            .collect();
        let mut stale = 0usize;
        let found: HashMap<String, f32> = neighbors
            .into_iter()
            .filter(|n| match current.get(n.slug.as_str()) {
                Some(hash) if n.is_current(hash) => true,
                Some(_) => {
                    stale += 1;
                    false
                }
                None => false,
            })
            .map(|n| (n.slug, n.similarity))
            .collect();
        if stale > 0 {
            tracing::debug!(stale, "ignoring index vectors for changed entries");
        }
        Ok(found)
    }
}

/// Brute-force cosine scan over cached entry embeddings.
pub struct BruteForceSimilarity {
    embeddings: Arc<EmbeddingService>,
}

impl BruteForceSimilarity {
    pub fn new(embeddings: Arc<EmbeddingService>) -> Self {
        Self { embeddings }
    }
}

#[async_trait]
impl SimilaritySource for BruteForceSimilarity {
    fn name(&self) -> &str {
        "brute-force"
    }

    async fn similarities(
        &self,
        query: &[f32],
        entries: &[(String, SearchableText)],
    ) -> Result<HashMap<String, f32>> {
        let mut out = HashMap::with_capacity(entries.len());
        for (slug, text) in entries {
            let vector = self.embeddings.embed(text.as_str()).await;
            out.insert(slug.clone(), cosine_similarity(query, &vector));
        }
        Ok(out)
    }
}

/// Two-tier similarity with a sticky failure flag.
pub struct SemanticLeg {
    index: Option<IndexSimilarity>,
    brute: BruteForceSimilarity,
    index_failed: AtomicBool,
}

impl SemanticLeg {
    pub fn new(embeddings: Arc<EmbeddingService>, index: Option<Arc<dyn VectorIndex>>) -> Self {
        Self {
            index: index.map(IndexSimilarity::new),
            brute: BruteForceSimilarity::new(embeddings),
            index_failed: AtomicBool::new(false),
        }
    }

    /// Whether the index tier is configured and has not failed.
    pub fn index_active(&self) -> bool {
        self.index.is_some() && !self.index_failed.load(Ordering::Relaxed)
    }

    fn mark_failed(&self, err: &anyhow::Error) {
        if !self.index_failed.swap(true, Ordering::Relaxed) {
            tracing::warn!(error = %err, "vector index unavailable, using brute-force similarity");
        }
    }

    /// Similarity of every entry to `query`. Never fails.
    ///
    /// Entries the index has no current vector for are scored by brute force.
    pub async fn similarities(
        &self,
        query: &[f32],
        entries: &[(String, SearchableText)],
    ) -> HashMap<String, f32> {
        let mut scores = HashMap::new();
        if let (Some(index), true) = (&self.index, self.index_active()) {
            match index.similarities(query, entries).await {
                Ok(found) => scores = found,
                Err(e) => self.mark_failed(&e),
            }
        }

        let missing: Vec<(String, SearchableText)> = entries
            .iter()
            .filter(|(slug, _)| !scores.contains_key(slug))
            .cloned()
            .collect();
        if !missing.is_empty() {
            // brute force cannot fail
            if let Ok(found) = self.brute.similarities(query, &missing).await {
                scores.extend(found);
            }
        }
        scores
    }

    /// Nearest neighbors from the index tier, or `None` when it is not usable.
    pub async fn nearest(&self, query: &[f32], limit: usize) -> Option<Vec<Neighbor>> {
        let index = self.index.as_ref().filter(|_| self.index_active())?;
        match index.nearest(query, limit).await {
            Ok(hits) => Some(hits),
            Err(e) => {
                self.mark_failed(&e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryVectorIndex;

    fn texts(items: &[(&str, &str)]) -> Vec<(String, SearchableText)> {
        items
            .iter()
            .map(|(s, t)| (s.to_string(), SearchableText::from_text(t)))
            .collect()
    }

    #[tokio::test]
    async fn test_brute_force_scores_every_entry() {
        let service = Arc::new(EmbeddingService::local(64, 32));
        let leg = SemanticLeg::new(service.clone(), None);
        let q = service.embed("deploy frontend").await;
        let scores = leg
            .similarities(&q, &texts(&[("a", "deploy frontend"), ("b", "billing")]))
            .await;
        assert_eq!(scores.len(), 2);
        assert!(scores["a"] > scores["b"]);
        assert!(!leg.index_active());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_swaps_to_brute_force() {
        let service = Arc::new(EmbeddingService::local(64, 32));
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new(8));
        let leg = SemanticLeg::new(service.clone(), Some(index));
        assert!(leg.index_active());

        let q = service.embed("postgres").await;
        let scores = leg.similarities(&q, &texts(&[("pg", "postgres")])).await;
        assert!((scores["pg"] - 1.0).abs() < 1e-5);
        assert!(!leg.index_active());
        assert!(leg.nearest(&q, 5).await.is_none());
    }

    #[tokio::test]
    async fn test_index_scores_used_and_gaps_filled() {
        let service = Arc::new(EmbeddingService::local(16, 32));
        let index = Arc::new(InMemoryVectorIndex::new(16));
        let entries = texts(&[("stored", "stripe payments"), ("fresh", "stripe")]);
        let q = service.embed("stripe").await;
        // deliberately not the embedding of "stripe payments"
        index.upsert("stored", &q, entries[0].1.hash()).await.unwrap();
        let leg = SemanticLeg::new(service.clone(), Some(index as Arc<dyn VectorIndex>));

        let scores = leg.similarities(&q, &entries).await;
        assert!((scores["stored"] - 1.0).abs() < 1e-5);
        assert!((scores["fresh"] - 1.0).abs() < 1e-5);
        assert!(leg.index_active());
    }

    #[tokio::test]
    async fn test_stale_index_vector_ignored() {
        let service = Arc::new(EmbeddingService::local(16, 32));
        let index = Arc::new(InMemoryVectorIndex::new(16));
        let q = service.embed("wombat ledger reconciliation").await;
        // vector and hash of text the entry no longer has
        index.upsert("jq", &q, "old-hash").await.unwrap();
        let leg = SemanticLeg::new(service.clone(), Some(index as Arc<dyn VectorIndex>));

        let entries = texts(&[("jq", "command-line json processor")]);
        let scores = leg.similarities(&q, &entries).await;
        let fresh = cosine_similarity(&q, &service.embed(entries[0].1.as_str()).await);
        assert!((scores["jq"] - fresh).abs() < 1e-6);
        assert!(scores["jq"] < 0.5);
        assert!(leg.index_active());
    }
}
