//! Read-only collaborators of the search engine.
//!
//! - [`ProfileStore`] — CLI entries with identity, commands, auth, compatibility.
//! - [`WorkflowStore`] — ordered multi-CLI chains.
//! - [`VectorIndex`] — optional persistent nearest-neighbor index over entry
//!   embeddings.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. Store
//! read errors are fatal for the current request; vector-index errors are
//! absorbed by the engine, which falls back to a brute-force scan.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{CliEntry, WorkflowChain};

/// Source of registry entries.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// All entries, in store order.
    async fn list_entries(&self) -> Result<Vec<CliEntry>>;

    /// One entry by slug.
    async fn get_entry(&self, slug: &str) -> Result<Option<CliEntry>>;
}

/// Source of curated workflow chains.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn list_workflows(&self) -> Result<Vec<WorkflowChain>>;
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub slug: String,
    pub similarity: f32,
    /// Hash of the searchable text the stored vector was computed from.
    /// A hit whose hash differs from the entry's current text is stale.
    pub content_hash: String,
}

impl Neighbor {
    pub fn is_current(&self, text_hash: &str) -> bool {
        self.content_hash == text_hash
    }
}

/// Persistent entry-embedding index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`dims`](VectorIndex::dims) | Dimensionality of stored vectors |
/// | [`nearest_neighbors`](VectorIndex::nearest_neighbors) | Ordered similarity query |
/// | [`upsert`](VectorIndex::upsert) | Store a vector for an entry |
/// | [`content_hash`](VectorIndex::content_hash) | Hash of the text last embedded for an entry |
/// | [`clear`](VectorIndex::clear) | Drop every stored vector |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dims(&self) -> usize;

    /// Up to `limit` neighbors ordered by descending similarity.
    async fn nearest_neighbors(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>>;

    async fn upsert(&self, slug: &str, vector: &[f32], content_hash: &str) -> Result<()>;

    async fn content_hash(&self, slug: &str) -> Result<Option<String>>;

    async fn clear(&self) -> Result<()>;

    /// Number of stored vectors.
    async fn len(&self) -> Result<usize>;
}
