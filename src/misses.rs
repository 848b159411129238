//! Unmet-request log.
//!
//! The engine never records misses itself; it attaches an
//! [`UnmetRequest`] to empty responses and the CLI and HTTP layers persist
//! it here. `clihub misses` summarizes the log so curators can see which
//! requests the registry cannot serve.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clihub_core::models::UnmetRequest;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// One aggregated miss.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MissSummary {
    pub query: String,
    pub count: i64,
    pub last_seen: String,
}

#[derive(Clone)]
pub struct UnmetRequestLog {
    pool: SqlitePool,
}

impl UnmetRequestLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a miss reported by `endpoint` (`search`, `discover`, ...).
    pub async fn record(&self, unmet: &UnmetRequest, endpoint: &str) -> Result<()> {
        sqlx::query("INSERT INTO unmet_requests (query, endpoint, created_at) VALUES (?, ?, ?)")
            .bind(unmet.query.trim())
            .bind(endpoint)
            .bind(unmet.at.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most frequent misses, case-insensitively grouped.
    pub async fn top(&self, limit: usize) -> Result<Vec<MissSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT LOWER(query) AS q, COUNT(*) AS n, MAX(created_at) AS last
            FROM unmet_requests
            GROUP BY LOWER(query)
            ORDER BY n DESC, last DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let last: i64 = row.get("last");
                MissSummary {
                    query: row.get("q"),
                    count: row.get("n"),
                    last_seen: format_ts(last),
                }
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM unmet_requests")
            .fetch_one(&self.pool)
            .await?)
    }
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// Record a miss without failing the request it came from.
pub async fn record_quietly(log: &UnmetRequestLog, unmet: &UnmetRequest, endpoint: &str) {
    if let Err(e) = log.record(unmet, endpoint).await {
        tracing::warn!(error = %e, query = %unmet.query, "failed to record unmet request");
    }
}

/// `clihub misses`: print the most frequent unmet requests.
pub async fn run_misses(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::migrate_pool(&pool).await?;
    let log = UnmetRequestLog::new(pool.clone());
    let total = log.count().await?;
    let top = log.top(limit).await?;

    println!("unmet requests: {}", total);
    if top.is_empty() {
        println!("  none recorded");
    }
    for miss in &top {
        println!("  {:>4}  {}  (last {})", miss.count, miss.query, miss.last_seen);
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;

    async fn log() -> (tempfile::TempDir, UnmetRequestLog) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("m.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        (tmp, UnmetRequestLog::new(pool))
    }

    fn unmet(query: &str, ts: i64) -> UnmetRequest {
        UnmetRequest {
            query: query.to_string(),
            at: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_record_and_aggregate() {
        let (_tmp, log) = log().await;
        log.record(&unmet("Kafka streams", 100), "search").await.unwrap();
        log.record(&unmet("kafka streams ", 200), "discover").await.unwrap();
        log.record(&unmet("zzz", 150), "search").await.unwrap();

        assert_eq!(log.count().await.unwrap(), 3);
        let top = log.top(10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].query, "kafka streams");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[0].last_seen, format_ts(200));
    }

    #[tokio::test]
    async fn test_top_respects_limit() {
        let (_tmp, log) = log().await;
        for q in ["a", "b", "c"] {
            log.record(&unmet(q, 1), "search").await.unwrap();
        }
        assert_eq!(log.top(2).await.unwrap().len(), 2);
    }
}
