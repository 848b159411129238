//! Application wiring.
//!
//! [`Hub::open`] turns a [`Config`] into a ready [`SearchEngine`]: it runs
//! migrations, loads the registry behind a [`TimedStore`], builds the
//! embedding service, and attaches the SQLite vector index when enabled.
//! The CLI commands and the HTTP server share this one code path.

use anyhow::Result;
use clihub_core::models::SearchResponse;
use clihub_core::search::SearchEngine;
use clihub_core::store::memory::InMemoryRegistry;
use clihub_core::store::VectorIndex;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{load_intent_table, Config};
use crate::db;
use crate::embedding::create_service;
use crate::migrate;
use crate::misses::{record_quietly, UnmetRequestLog};
use crate::registry::{load_registry, TimedStore};
use crate::vector_index::SqliteVectorIndex;

pub struct Hub {
    pub config: Config,
    pub engine: SearchEngine,
    pub store: Arc<TimedStore<InMemoryRegistry>>,
    pub pool: SqlitePool,
    pub index: Option<Arc<SqliteVectorIndex>>,
    pub misses: UnmetRequestLog,
}

impl Hub {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;

        let timeout = Duration::from_secs(config.registry.timeout_secs);
        let store = Arc::new(TimedStore::new(
            load_registry(&config.registry.path)?,
            timeout,
        ));
        let embeddings = Arc::new(create_service(&config.embedding)?);
        let table = load_intent_table(config)?;

        let mut engine = SearchEngine::new(store.clone(), store.clone(), embeddings.clone())
            .with_intent_table(table)
            .with_params(config.ranking.clone());

        let index = if config.retrieval.use_vector_index {
            let index = Arc::new(
                SqliteVectorIndex::new(pool.clone(), embeddings.model_name(), embeddings.dims())
                    .with_timeout(timeout),
            );
            let stored = index.len().await?;
            if stored == 0 {
                tracing::info!("vector index is empty; run `clihub index pending` to build it");
            } else {
                tracing::debug!(stored, model = index.model(), "vector index attached");
            }
            engine = engine.with_vector_index(index.clone());
            Some(index)
        } else {
            None
        };

        Ok(Self {
            config: config.clone(),
            engine,
            store,
            pool: pool.clone(),
            index,
            misses: UnmetRequestLog::new(pool),
        })
    }

    /// Run `search` and record a miss when it comes back empty.
    pub async fn search(&self, query: &str, limit: usize, explain: bool) -> Result<SearchResponse> {
        let resp = self.engine.search(query, limit, explain).await?;
        self.note_miss(&resp, "search").await;
        Ok(resp)
    }

    /// Run `discover` and record a miss when it comes back empty.
    pub async fn discover(&self, query: &str, limit: usize, explain: bool) -> Result<SearchResponse> {
        let resp = self.engine.discover(query, limit, explain).await?;
        self.note_miss(&resp, "discover").await;
        Ok(resp)
    }

    async fn note_miss(&self, resp: &SearchResponse, endpoint: &str) {
        if let Some(unmet) = &resp.unmet {
            tracing::info!(query = %unmet.query, endpoint, "unmet request");
            record_quietly(&self.misses, unmet, endpoint).await;
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
