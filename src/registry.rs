//! Registry loading and store wrappers.
//!
//! A registry is either a single JSON file:
//!
//! ```json
//! { "entries": [ { "slug": "vercel", ... } ], "workflows": [ ... ] }
//! ```
//!
//! or a directory with one JSON document per entry and per workflow:
//!
//! ```text
//! clis/
//!   vercel.json
//!   hosting/netlify.json
//! workflows/
//!   saas-launch.json
//! ```
//!
//! Loaded data is validated (unique slugs, strictly increasing step numbers)
//! and held in an [`InMemoryRegistry`]. [`TimedStore`] bounds every read so a
//! slow store fails the request instead of hanging it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clihub_core::models::{CliEntry, WorkflowChain};
use clihub_core::store::memory::InMemoryRegistry;
use clihub_core::store::{ProfileStore, WorkflowStore};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    entries: Vec<CliEntry>,
    #[serde(default)]
    workflows: Vec<WorkflowChain>,
}

/// Load and validate the registry at `path`.
pub fn load_registry(path: &Path) -> Result<InMemoryRegistry> {
    if !path.exists() {
        bail!("Registry path does not exist: {}", path.display());
    }

    let (entries, workflows) = if path.is_dir() {
        (
            read_dir_json::<CliEntry>(&path.join("clis"))?,
            read_dir_json::<WorkflowChain>(&path.join("workflows"))?,
        )
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry file: {}", path.display()))?;
        let file: RegistryFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse registry file: {}", path.display()))?;
        (file.entries, file.workflows)
    };

    validate(&entries, &workflows)?;
    let registry = InMemoryRegistry::from_parts(entries, workflows)?;
    tracing::info!(
        path = %path.display(),
        entries = registry.entry_count(),
        workflows = registry.workflow_count(),
        "registry loaded"
    );
    Ok(registry)
}

/// Every `*.json` file under `dir`, in path order. A missing directory is
/// an empty list.
fn read_dir_json<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("json")
        {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|p| {
            let content = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", p.display()))
        })
        .collect()
}

fn validate(entries: &[CliEntry], workflows: &[WorkflowChain]) -> Result<()> {
    let mut slugs = HashSet::new();
    for e in entries {
        if e.slug.trim().is_empty() {
            bail!("entry '{}' has an empty slug", e.name);
        }
        if !(0.0..=100.0).contains(&e.trust_score) {
            bail!("entry {}: trust_score must be in [0, 100]", e.slug);
        }
        slugs.insert(e.slug.as_str());
    }

    for w in workflows {
        if w.steps.is_empty() {
            bail!("workflow {} has no steps", w.slug);
        }
        for pair in w.steps.windows(2) {
            if pair[1].step_number <= pair[0].step_number {
                bail!(
                    "workflow {}: step numbers must be strictly increasing ({} after {})",
                    w.slug,
                    pair[1].step_number,
                    pair[0].step_number
                );
            }
        }
        for step in &w.steps {
            if !slugs.contains(step.cli_slug.as_str()) {
                tracing::warn!(
                    workflow = %w.slug,
                    cli = %step.cli_slug,
                    "workflow step references an unknown entry"
                );
            }
        }
    }
    Ok(())
}

/// Bounds every read of the wrapped store by `timeout`.
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => bail!("profile store timed out after {:?}", self.timeout),
        }
    }
}

#[async_trait]
impl<S: ProfileStore> ProfileStore for TimedStore<S> {
    async fn list_entries(&self) -> Result<Vec<CliEntry>> {
        self.bounded(self.inner.list_entries()).await
    }

    async fn get_entry(&self, slug: &str) -> Result<Option<CliEntry>> {
        self.bounded(self.inner.get_entry(slug)).await
    }
}

#[async_trait]
impl<S: WorkflowStore> WorkflowStore for TimedStore<S> {
    async fn list_workflows(&self) -> Result<Vec<WorkflowChain>> {
        self.bounded(self.inner.list_workflows()).await
    }
}
