//! CLI front-ends for `search`, `discover`, `workflows` and `show`.
//!
//! Each command opens a [`Hub`], runs one engine call, and prints either a
//! human-readable listing or, with `--json`, the serialized response.

use anyhow::{bail, Result};
use clihub_core::models::{CliEntry, ScoredCandidate, SearchResponse};

use crate::config::Config;
use crate::hub::Hub;

/// `--limit`, or `[retrieval] final_limit` when absent. Zero is rejected.
fn resolve_limit(config: &Config, limit: Option<usize>) -> Result<usize> {
    match limit {
        Some(0) => bail!("--limit must be at least 1"),
        Some(n) => Ok(n),
        None => Ok(config.retrieval.final_limit),
    }
}

/// Which engine pipeline a query runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Search,
    Discover,
}

pub async fn run_search(
    config: &Config,
    query: &str,
    pipeline: Pipeline,
    limit: Option<usize>,
    explain: bool,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let limit = resolve_limit(config, limit)?;
    let hub = Hub::open(config).await?;
    let resp = match pipeline {
        Pipeline::Search => hub.search(query, limit, explain).await?,
        Pipeline::Discover => hub.discover(query, limit, explain).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        print_response(&resp, explain);
    }

    hub.close().await;
    Ok(())
}

fn print_response(resp: &SearchResponse, explain: bool) {
    if resp.results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, c) in resp.results.iter().enumerate() {
        print_candidate(i + 1, c, explain);
    }
}

fn print_candidate(rank: usize, c: &ScoredCandidate, explain: bool) {
    println!("{}. [{:.2}] {} ({})", rank, c.score, c.name, c.slug);
    if !c.description.is_empty() {
        println!("    {}", c.description);
    }
    println!("    why: {}", c.reason);
    for cmd in &c.top_commands {
        println!("    $ {}", cmd);
    }
    if explain {
        if let Some(s) = &c.signals {
            println!(
                "    signals: lexical={:.2} semantic={:.2} workflow={:.2} intent={:.2} chain={:.2}",
                s.lexical, s.semantic, s.workflow_text, s.intent, s.chain
            );
            println!(
                "             canonical={:.2} mention={:.2} infra={:.2} trust={:.2} noise={:.2}",
                s.canonical, s.direct_mention, s.infra, s.trust, s.noise_penalty
            );
        }
    }
    println!();
}

pub async fn run_workflows(config: &Config, query: &str, limit: Option<usize>, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let limit = resolve_limit(config, limit)?;
    let hub = Hub::open(config).await?;
    let found = hub.engine.search_workflows(query, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else if found.is_empty() {
        println!("No results.");
    } else {
        for (i, w) in found.iter().enumerate() {
            println!(
                "{}. [{:.2}] {} ({})",
                i + 1,
                w.score,
                w.workflow.title,
                w.workflow.slug
            );
            println!("    why: {}", w.reason);
            for step in &w.workflow.steps {
                let auth = if step.auth_prerequisite { " [auth]" } else { "" };
                println!(
                    "    {}. {}{} {}",
                    step.step_number, step.cli_slug, auth, step.purpose
                );
            }
            println!();
        }
    }

    hub.close().await;
    Ok(())
}

pub async fn run_show(config: &Config, slug: &str, json: bool) -> Result<()> {
    let hub = Hub::open(config).await?;
    let entry = hub.engine.get_entry(slug).await?;
    hub.close().await;

    let Some(entry) = entry else {
        bail!("No entry with slug '{}'", slug);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        print_entry(&entry);
    }
    Ok(())
}

fn print_entry(e: &CliEntry) {
    println!("--- {} ---", e.name);
    println!("slug:        {}", e.slug);
    if !e.publisher.is_empty() {
        println!("publisher:   {}", e.publisher);
    }
    println!("description: {}", e.description);
    println!("categories:  {}", e.categories.join(", "));
    println!("auth:        {}", e.auth.auth_type);
    if !e.auth.env_vars.is_empty() {
        println!("env:         {}", e.auth.env_vars.join(", "));
    }
    println!(
        "trust:       {:.0}  compatibility: {:.0}%",
        e.trust_score,
        e.mean_compatibility() * 100.0
    );
    println!();
    println!("--- Commands ({}) ---", e.commands.len());
    for c in &e.commands {
        println!("$ {}", c.command);
        if !c.description.is_empty() {
            println!("  {}", c.description);
        }
    }
}
