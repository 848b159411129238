//! SQLite-backed [`VectorIndex`].
//!
//! Vectors live in the `entry_vectors` table as little-endian f32 BLOBs, one
//! row per entry slug, tagged with the embedding model that produced them.
//! Nearest-neighbor queries load the model's vectors and rank them by cosine
//! similarity in Rust.
//!
//! A stored vector whose length differs from the index dimensionality is a
//! hard error, so the engine falls back to brute-force similarity instead of
//! ranking against vectors from a different model configuration.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clihub_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use clihub_core::store::{Neighbor, VectorIndex};
use sqlx::{Row, SqlitePool};
use std::time::Duration;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    model: String,
    dims: usize,
    timeout: Duration,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, model: &str, dims: usize) -> Self {
        Self {
            pool,
            model: model.to_string(),
            dims,
            timeout: Duration::from_secs(5),
        }
    }

    /// Bound every query by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn load_vectors(&self) -> Result<Vec<(String, String, Vec<f32>)>> {
        let rows = sqlx::query(
            "SELECT slug, content_hash, embedding FROM entry_vectors WHERE model = ?",
        )
        .bind(&self.model)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let slug: String = row.get("slug");
                let content_hash: String = row.get("content_hash");
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                if vector.len() != self.dims {
                    bail!(
                        "stored vector for {} has {} dims, index has {}",
                        slug,
                        vector.len(),
                        self.dims
                    );
                }
                Ok((slug, content_hash, vector))
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
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

        let stored = tokio::time::timeout(self.timeout, self.load_vectors())
            .await
            .context("vector index query timed out")??;

        let mut hits: Vec<Neighbor> = stored
            .into_iter()
            .map(|(slug, content_hash, v)| Neighbor {
                similarity: cosine_similarity(vector, &v),
                slug,
                content_hash,
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
            bail!(
                "vector for {} has {} dims, index has {}",
                slug,
                vector.len(),
                self.dims
            );
        }
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO entry_vectors (slug, model, dims, content_hash, embedding, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                model = excluded.model,
                dims = excluded.dims,
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(slug)
        .bind(&self.model)
        .bind(self.dims as i64)
        .bind(content_hash)
        .bind(vec_to_blob(vector))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn content_hash(&self, slug: &str) -> Result<Option<String>> {
        let hash: Option<String> = sqlx::query_scalar(
            "SELECT content_hash FROM entry_vectors WHERE slug = ? AND model = ? AND dims = ?",
        )
        .bind(slug)
        .bind(&self.model)
        .bind(self.dims as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(hash)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM entry_vectors")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entry_vectors WHERE model = ?")
            .bind(&self.model)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;

    async fn index(dims: usize) -> (tempfile::TempDir, SqliteVectorIndex) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("t.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        (tmp, SqliteVectorIndex::new(pool, "local-hash-v1", dims))
    }

    #[tokio::test]
    async fn test_upsert_and_neighbors() {
        let (_tmp, idx) = index(2).await;
        idx.upsert("a", &[1.0, 0.0], "h1").await.unwrap();
        idx.upsert("b", &[0.0, 1.0], "h2").await.unwrap();
        idx.upsert("a", &[0.9, 0.1], "h3").await.unwrap();

        assert_eq!(idx.len().await.unwrap(), 2);
        assert_eq!(idx.content_hash("a").await.unwrap().as_deref(), Some("h3"));

        let hits = idx.nearest_neighbors(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "a");
        assert_eq!(hits[0].content_hash, "h3");
        assert!(hits[0].is_current("h3"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_errors() {
        let (_tmp, idx) = index(3).await;
        assert!(idx.upsert("a", &[1.0], "h").await.is_err());
        assert!(idx.nearest_neighbors(&[1.0, 0.0], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_stored_vectors_from_other_dims_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("t.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        let small = SqliteVectorIndex::new(pool.clone(), "m", 2);
        small.upsert("a", &[1.0, 0.0], "h").await.unwrap();

        let large = SqliteVectorIndex::new(pool, "m", 3);
        assert!(large.content_hash("a").await.unwrap().is_none());
        assert!(large.nearest_neighbors(&[1.0, 0.0, 0.0], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let (_tmp, idx) = index(2).await;
        idx.upsert("a", &[1.0, 0.0], "h").await.unwrap();
        idx.clear().await.unwrap();
        assert_eq!(idx.len().await.unwrap(), 0);
    }
}
