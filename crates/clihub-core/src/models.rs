//! Registry data model.
//!
//! [`CliEntry`] and [`WorkflowChain`] are owned by the profile and workflow
//! stores; the search engine only reads them. [`SearchableText`] is the
//! derived, lower-cased text used both for lexical matching and as the
//! embedding input. [`ScoredCandidate`] and [`ScoredWorkflow`] live for the
//! duration of a single request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::content_hash;

/// Authentication requirements for running a CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthDescriptor {
    /// `"none"`, `"api_key"`, `"oauth"`, `"login"`, ...
    #[serde(rename = "type", default = "default_auth_type")]
    pub auth_type: String,
    /// Environment variables the CLI reads credentials from.
    #[serde(default)]
    pub env_vars: Vec<String>,
}

fn default_auth_type() -> String {
    "none".to_string()
}

/// One documented command of a CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandInfo {
    pub command: String,
    #[serde(default)]
    pub description: String,
    /// Workflow contexts this command is typically used in (`"deploy"`, `"ci"`, ...).
    #[serde(default)]
    pub workflow_context: Vec<String>,
}

/// Observed compatibility of a CLI with one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Compatibility {
    pub agent: String,
    /// Success rate in `[0, 1]`.
    pub success_rate: f64,
    #[serde(default)]
    pub status: String,
}

/// Where a listing came from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Hand-maintained profile.
    #[default]
    Curated,
    /// Submitted by a community member.
    Community,
    /// Auto-observed from package ecosystems, never reviewed.
    Observed,
}

/// A registry listing for one command-line tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CliEntry {
    /// Globally unique, immutable identifier.
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub description: String,
    /// Category tags in curator order.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub auth: AuthDescriptor,
    #[serde(default)]
    pub commands: Vec<CommandInfo>,
    #[serde(default)]
    pub compatibility: Vec<Compatibility>,
    /// Trust score in `[0, 100]`, recomputed from telemetry elsewhere.
    #[serde(default)]
    pub trust_score: f64,
    #[serde(default)]
    pub popularity_score: f64,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default)]
    pub publisher_verified: bool,
}

impl CliEntry {
    /// Observed listings whose publisher never proved ownership.
    pub fn is_low_provenance(&self) -> bool {
        self.provenance == Provenance::Observed && !self.publisher_verified
    }

    /// Mean agent success rate, or `0.0` without compatibility records.
    pub fn mean_compatibility(&self) -> f64 {
        if self.compatibility.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .compatibility
            .iter()
            .map(|c| c.success_rate.clamp(0.0, 1.0))
            .sum();
        sum / self.compatibility.len() as f64
    }

    /// The slug with common CLI suffixes removed (`vercel-cli` → `vercel`,
    /// `kubectl` → `kube`).
    pub fn base_identifier(&self) -> String {
        base_identifier(&self.slug)
    }
}

/// Strip `-cli`, `cli`, `-ctl` and `ctl` suffixes from an identifier.
pub fn base_identifier(slug: &str) -> String {
    let lower = slug.to_lowercase();
    for suffix in ["-cli", "_cli", "-ctl", "cli", "ctl"] {
        if let Some(stripped) = lower.strip_suffix(suffix) {
            if stripped.len() >= 2 {
                return stripped.to_string();
            }
        }
    }
    lower
}

/// One ordered step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub step_number: u32,
    /// Slug of the [`CliEntry`] this step runs.
    pub cli_slug: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub auth_prerequisite: bool,
}

/// A curated multi-tool recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowChain {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Steps ordered by strictly increasing `step_number`.
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowChain {
    /// Lower-cased title, description and tags.
    pub fn own_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.title, &self.description];
        parts.extend(self.tags.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }

    /// Own text plus step purposes and step slugs.
    pub fn searchable_text(&self) -> String {
        let mut text = self.own_text();
        for step in &self.steps {
            text.push(' ');
            text.push_str(&step.cli_slug.to_lowercase());
            text.push(' ');
            text.push_str(&step.purpose.to_lowercase());
        }
        text
    }

    /// Whether any step references `slug`.
    pub fn references(&self, slug: &str) -> bool {
        self.steps.iter().any(|s| s.cli_slug == slug)
    }
}

/// Lower-cased concatenation of an entry's textual fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchableText {
    text: String,
    hash: String,
}

impl SearchableText {
    /// Build from name, slug, description, categories, command strings and
    /// auth environment variables.
    pub fn from_entry(entry: &CliEntry) -> Self {
        let mut parts: Vec<&str> = vec![&entry.name, &entry.slug, &entry.description];
        parts.extend(entry.categories.iter().map(String::as_str));
        parts.extend(entry.commands.iter().map(|c| c.command.as_str()));
        parts.extend(entry.auth.env_vars.iter().map(String::as_str));
        Self::from_text(&parts.join(" "))
    }

    pub fn from_text(text: &str) -> Self {
        let text = text.to_lowercase();
        let hash = content_hash(&text);
        Self { text, hash }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// SHA-256 of the text; changes whenever the source fields change.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Per-signal breakdown of a candidate's score.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SignalBreakdown {
    pub lexical: f64,
    pub semantic: f64,
    pub workflow_text: f64,
    pub intent: f64,
    pub chain: f64,
    pub canonical: f64,
    pub direct_mention: f64,
    pub infra: f64,
    pub trust: f64,
    pub noise_penalty: f64,
}

/// One ranked registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub score: f64,
    /// Human-readable summary of why the entry ranked.
    pub reason: String,
    /// Workflows whose text matched the query and that include this entry.
    pub matched_workflows: Vec<String>,
    /// Commands most relevant to the query, best first.
    pub top_commands: Vec<String>,
    /// Detected query intents this entry satisfies.
    pub matched_intents: Vec<String>,
    /// Raw semantic similarity used for this entry.
    pub similarity: f64,
    #[serde(skip)]
    pub trust_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<SignalBreakdown>,
}

/// One ranked workflow chain.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredWorkflow {
    pub workflow: WorkflowChain,
    pub score: f64,
    pub reason: String,
    pub matched_intents: Vec<String>,
}

/// A query that produced no results, for the caller to record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnmetRequest {
    pub query: String,
    pub at: DateTime<Utc>,
}

/// Result of [`search`](crate::search::SearchEngine::search) and
/// [`discover`](crate::search::SearchEngine::discover).
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredCandidate>,
    /// Set when `results` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmet: Option<UnmetRequest>,
}

impl SearchResponse {
    /// No results and nothing to record.
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            unmet: None,
        }
    }

    pub fn from_results(query: &str, results: Vec<ScoredCandidate>) -> Self {
        let unmet = if results.is_empty() {
            Some(UnmetRequest {
                query: query.to_string(),
                at: Utc::now(),
            })
        } else {
            None
        };
        Self { results, unmet }
    }
}
