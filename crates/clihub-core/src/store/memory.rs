//! In-memory store and vector index for tests and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Nearest-neighbor queries are brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{CliEntry, WorkflowChain};

use super::{Neighbor, ProfileStore, VectorIndex, WorkflowStore};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Entries and workflows held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: RwLock<Vec<CliEntry>>,
    workflows: RwLock<Vec<WorkflowChain>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded data, rejecting duplicate slugs.
    pub fn from_parts(entries: Vec<CliEntry>, workflows: Vec<WorkflowChain>) -> Result<Self> {
        let registry = Self::new();
        for e in entries {
            if registry.contains_entry(&e.slug) {
                bail!("duplicate entry slug: {}", e.slug);
            }
            registry.upsert_entry(e);
        }
        for w in workflows {
            if read(&registry.workflows).iter().any(|x| x.slug == w.slug) {
                bail!("duplicate workflow slug: {}", w.slug);
            }
            registry.upsert_workflow(w);
        }
        Ok(registry)
    }

    pub fn contains_entry(&self, slug: &str) -> bool {
        read(&self.entries).iter().any(|e| e.slug == slug)
    }

    /// Insert or replace an entry by slug.
    pub fn upsert_entry(&self, entry: CliEntry) {
        let mut entries = write(&self.entries);
        match entries.iter_mut().find(|e| e.slug == entry.slug) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Insert or replace a workflow by slug.
    pub fn upsert_workflow(&self, workflow: WorkflowChain) {
        let mut workflows = write(&self.workflows);
        match workflows.iter_mut().find(|w| w.slug == workflow.slug) {
            Some(existing) => *existing = workflow,
            None => workflows.push(workflow),
        }
    }

    pub fn entry_count(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn workflow_count(&self) -> usize {
        read(&self.workflows).len()
    }
}

#[async_trait]
impl ProfileStore for InMemoryRegistry {
    async fn list_entries(&self) -> Result<Vec<CliEntry>> {
        Ok(read(&self.entries).clone())
    }

    async fn get_entry(&self, slug: &str) -> Result<Option<CliEntry>> {
        Ok(read(&self.entries).iter().find(|e| e.slug == slug).cloned())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryRegistry {
    async fn list_workflows(&self) -> Result<Vec<WorkflowChain>> {
        Ok(read(&self.workflows).clone())
    }
}

struct StoredVector {
    vector: Vec<f32>,
    content_hash: String,
}

/// Brute-force in-memory [`VectorIndex`].
pub struct InMemoryVectorIndex {
    dims: usize,
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryVectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        if vector.len() != self.dims {
            bail!(
                "query vector has {} dims, index has {}",
                vector.len(),
                self.dims
            );
        }
        let vectors = read(&self.vectors);
        let mut hits: Vec<Neighbor> = vectors
            .iter()
            .map(|(slug, sv)| Neighbor {
                slug: slug.clone(),
                similarity: cosine_similarity(vector, &sv.vector),
                content_hash: sv.content_hash.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(&self, slug: &str, vector: &[f32], content_hash: &str) -> Result<()> {
        if vector.len() != self.dims {
            bail!("vector for {} has {} dims, index has {}", slug, vector.len(), self.dims);
        }
        write(&self.vectors).insert(
            slug.to_string(),
            StoredVector {
                vector: vector.to_vec(),
                content_hash: content_hash.to_string(),
            },
        );
        Ok(())
    }

    async fn content_hash(&self, slug: &str) -> Result<Option<String>> {
        Ok(read(&self.vectors).get(slug).map(|sv| sv.content_hash.clone()))
    }

    async fn clear(&self) -> Result<()> {
        write(&self.vectors).clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(read(&self.vectors).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthDescriptor, Provenance};

    fn entry(slug: &str) -> CliEntry {
        CliEntry {
            slug: slug.to_string(),
            name: slug.to_string(),
            publisher: String::new(),
            description: String::new(),
            categories: vec![],
            auth: AuthDescriptor::default(),
            commands: vec![],
            compatibility: vec![],
            trust_score: 50.0,
            popularity_score: 0.0,
            provenance: Provenance::Curated,
            publisher_verified: false,
        }
    }

    #[tokio::test]
    async fn test_registry_upsert_and_get() {
        let reg = InMemoryRegistry::new();
        reg.upsert_entry(entry("gh"));
        let mut updated = entry("gh");
        updated.description = "GitHub".to_string();
        reg.upsert_entry(updated);
        assert_eq!(reg.entry_count(), 1);
        let got = reg.get_entry("gh").await.unwrap().unwrap();
        assert_eq!(got.description, "GitHub");
        assert!(reg.get_entry("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = InMemoryRegistry::from_parts(vec![entry("gh"), entry("gh")], vec![]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_vector_index_orders_neighbors() {
        let index = InMemoryVectorIndex::new(2);
        index.upsert("a", &[1.0, 0.0], "h1").await.unwrap();
        index.upsert("b", &[0.0, 1.0], "h2").await.unwrap();
        index.upsert("c", &[0.7, 0.7], "h3").await.unwrap();
        let hits = index.nearest_neighbors(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].slug, "a");
        assert_eq!(hits[1].slug, "c");
        assert_eq!(index.content_hash("b").await.unwrap().as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_vector_index_rejects_dimension_mismatch() {
        let index = InMemoryVectorIndex::new(3);
        assert!(index.upsert("a", &[1.0], "h").await.is_err());
        assert!(index.nearest_neighbors(&[1.0, 0.0], 5).await.is_err());
    }
}
