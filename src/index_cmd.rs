//! `clihub index`: build the persistent entry-embedding index.
//!
//! `pending` embeds entries whose vector is missing or whose searchable text
//! changed since it was embedded (content-hash comparison). `rebuild` clears
//! the index first. Query-time search never writes to the index; entries not
//! yet indexed are scored by brute force.

use anyhow::{bail, Result};
use clihub_core::embedding::EmbeddingService;
use clihub_core::models::{CliEntry, SearchableText};
use clihub_core::store::{ProfileStore, VectorIndex};

use crate::config::Config;
use crate::hub::Hub;

/// Outcome of one indexing pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IndexReport {
    pub total: usize,
    pub pending: usize,
    pub embedded: usize,
}

/// Entries whose stored hash differs from their current searchable text.
pub async fn find_pending(
    index: &dyn VectorIndex,
    entries: &[CliEntry],
) -> Result<Vec<(String, SearchableText)>> {
    let mut pending = Vec::new();
    for entry in entries {
        let text = SearchableText::from_entry(entry);
        let stored = index.content_hash(&entry.slug).await?;
        if stored.as_deref() != Some(text.hash()) {
            pending.push((entry.slug.clone(), text));
        }
    }
    Ok(pending)
}

/// Embed and store every pending entry. With `rebuild`, clear first.
pub async fn sync_index(
    index: &dyn VectorIndex,
    embeddings: &EmbeddingService,
    entries: &[CliEntry],
    rebuild: bool,
    dry_run: bool,
) -> Result<IndexReport> {
    if rebuild && !dry_run {
        index.clear().await?;
    }
    let pending = if rebuild {
        entries
            .iter()
            .map(|e| (e.slug.clone(), SearchableText::from_entry(e)))
            .collect()
    } else {
        find_pending(index, entries).await?
    };

    let mut report = IndexReport {
        total: entries.len(),
        pending: pending.len(),
        embedded: 0,
    };
    if dry_run {
        return Ok(report);
    }

    for (slug, text) in &pending {
        let vector = embeddings.embed(text.as_str()).await;
        index.upsert(slug, &vector, text.hash()).await?;
        report.embedded += 1;
    }
    Ok(report)
}

pub async fn run_index(config: &Config, rebuild: bool, dry_run: bool) -> Result<()> {
    if !config.retrieval.use_vector_index {
        bail!("Vector index is disabled. Set [retrieval] use_vector_index = true in config.");
    }

    let hub = Hub::open(config).await?;
    let Some(index) = hub.index.clone() else {
        bail!("Vector index is not available");
    };
    let entries = hub.store.list_entries().await?;

    let report = sync_index(
        index.as_ref(),
        hub.engine.embeddings(),
        &entries,
        rebuild,
        dry_run,
    )
    .await?;

    let label = if rebuild { "index rebuild" } else { "index pending" };
    if dry_run {
        println!("{} (dry-run)", label);
        println!("  entries needing embeddings: {}", report.pending);
    } else if report.pending == 0 {
        println!("{}", label);
        println!("  all entries up to date");
    } else {
        println!("{}", label);
        println!("  total entries: {}", report.total);
        println!("  embedded: {}", report.embedded);
        println!("  model: {}", index.model());
    }

    hub.close().await;
    Ok(())
}
