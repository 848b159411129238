//! Task-intent taxonomy and extraction.
//!
//! The taxonomy is data: an [`IntentTable`] holds one [`IntentRule`] per
//! intent (trigger terms, category matchers, environment-variable hints and
//! the canonical entries for that intent). The built-in table is returned by
//! [`IntentTable::builtin`]; applications may deserialize a replacement at
//! startup.
//!
//! # Matching rule
//!
//! A trigger term matches a query when it equals one of the query tokens, or,
//! for terms longer than three characters, when it occurs as a whole word in
//! the lower-cased query. Short terms (`pr`, `db`) therefore never match
//! inside unrelated words.

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::tokenize::{contains_word, tokenize};

/// Names of the intents detected in one query. Ordered for determinism.
pub type IntentSet = BTreeSet<String>;

/// One coarse task intent.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IntentRule {
    pub name: String,
    /// Words and phrases that signal this intent.
    pub triggers: Vec<String>,
    /// Category tags that satisfy this intent.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Environment-variable fragments (upper-case) that signal this intent.
    #[serde(default)]
    pub env_hints: Vec<String>,
    /// Hand-maintained "obviously correct" entry identifiers.
    #[serde(default)]
    pub canonical: Vec<String>,
}

impl IntentRule {
    fn new(
        name: &str,
        triggers: &[&str],
        categories: &[&str],
        env_hints: &[&str],
        canonical: &[&str],
    ) -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            name: name.to_string(),
            triggers: owned(triggers),
            categories: owned(categories),
            env_hints: owned(env_hints),
            canonical: owned(canonical),
        }
    }

    /// Whether any trigger matches the query under the token/whole-word rule.
    pub fn matches_query(&self, lower_query: &str, tokens: &[String]) -> bool {
        self.triggers
            .iter()
            .any(|term| term_matches_query(term, lower_query, tokens))
    }

    /// Whether `identifier` is canonical for this intent.
    pub fn is_canonical(&self, identifier: &str) -> bool {
        self.canonical.iter().any(|c| c == identifier)
    }
}

/// Apply the asymmetric matching rule for one term.
pub fn term_matches_query(term: &str, lower_query: &str, tokens: &[String]) -> bool {
    let term = term.to_lowercase();
    if tokens.iter().any(|t| *t == term) {
        return true;
    }
    term.chars().count() > 3 && contains_word(lower_query, &term)
}

/// Intents implied by "full stack" / "saas" queries.
pub const FULL_STACK_INTENTS: &[&str] = &["deploy", "database", "payments", "auth"];

/// The complete intent taxonomy plus infrastructure-as-code markers.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IntentTable {
    #[serde(rename = "intent")]
    pub rules: Vec<IntentRule>,
    /// Phrases that mark an explicit infrastructure-as-code request.
    #[serde(default = "default_iac_phrases")]
    pub iac_phrases: Vec<String>,
    /// Identifiers and tags that mark an IaC tool.
    #[serde(default = "default_iac_markers")]
    pub iac_markers: Vec<String>,
}

fn default_iac_phrases() -> Vec<String> {
    ["infrastructure as code", "infrastructure-as-code", "iac"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_iac_markers() -> Vec<String> {
    [
        "iac",
        "infrastructure-as-code",
        "infrastructure as code",
        "terraform",
        "pulumi",
        "opentofu",
        "tofu",
        "cdk",
        "ansible",
        "crossplane",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for IntentTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl IntentTable {
    /// The default taxonomy: deploy, database, payments, auth, monitoring,
    /// storage, infra, developer.
    pub fn builtin() -> Self {
        let rules = vec![
            IntentRule::new(
                "deploy",
                &[
                    "deploy", "deploys", "deploying", "deployment", "deployments", "hosting",
                    "host", "serverless", "release", "ship", "preview", "production", "vercel",
                    "netlify", "heroku", "railway", "fly.io", "render", "edge functions",
                ],
                &["deploy", "deployment", "hosting", "paas", "serverless", "cloud"],
                &["VERCEL_", "NETLIFY_", "FLY_", "RAILWAY_", "HEROKU_"],
                &["vercel", "netlify", "flyctl", "railway", "heroku"],
            ),
            IntentRule::new(
                "database",
                &[
                    "database", "databases", "db", "postgres", "postgresql", "mysql", "sql",
                    "sqlite", "migration", "migrations", "schema", "redis", "mongodb", "mongo",
                    "supabase", "neon", "planetscale", "orm", "query",
                ],
                &["database", "databases", "db", "sql", "data"],
                &["DATABASE_URL", "PG", "POSTGRES", "MYSQL", "REDIS_URL", "MONGODB_"],
                &["supabase", "neon", "neonctl", "psql", "planetscale", "prisma"],
            ),
            IntentRule::new(
                "payments",
                &[
                    "payment", "payments", "pay", "billing", "stripe", "checkout", "subscription",
                    "subscriptions", "invoice", "invoices", "charge", "charges", "pricing",
                    "refund", "refunds",
                ],
                &["payments", "payment", "billing", "commerce", "finance"],
                &["STRIPE_", "PADDLE_", "LEMONSQUEEZY_"],
                &["stripe", "paddle", "lemonsqueezy"],
            ),
            IntentRule::new(
                "auth",
                &[
                    "auth", "authentication", "authorization", "login", "logins", "oauth", "sso",
                    "identity", "signin", "sign in", "signup", "sign up", "jwt", "session",
                    "sessions", "users", "user management", "clerk", "auth0",
                ],
                &["auth", "authentication", "identity", "security"],
                &["CLERK_", "AUTH0_", "OKTA_", "JWT_"],
                &["clerk", "auth0", "okta", "supabase"],
            ),
            IntentRule::new(
                "monitoring",
                &[
                    "monitor", "monitoring", "observability", "logs", "logging", "metrics",
                    "alert", "alerts", "alerting", "tracing", "errors", "error tracking",
                    "uptime", "apm", "incident", "incidents", "sentry", "datadog",
                ],
                &["monitoring", "observability", "logging", "apm"],
                &["SENTRY_", "DD_", "DATADOG_", "NEW_RELIC_", "GRAFANA_"],
                &["sentry", "datadog", "grafana", "newrelic"],
            ),
            IntentRule::new(
                "storage",
                &[
                    "storage", "bucket", "buckets", "s3", "blob", "blobs", "upload", "uploads",
                    "files", "file storage", "object storage", "cdn", "assets", "backup",
                    "backups", "r2",
                ],
                &["storage", "files", "cdn", "object-storage"],
                &["AWS_S3", "S3_", "R2_", "BLOB_", "GCS_"],
                &["aws", "gsutil", "rclone", "wrangler"],
            ),
            IntentRule::new(
                "infra",
                &[
                    "infrastructure", "infra", "iac", "terraform", "provision", "provisioning",
                    "kubernetes", "k8s", "cluster", "clusters", "docker", "container",
                    "containers", "helm", "pulumi", "vpc", "networking", "dns",
                ],
                &["infrastructure", "infra", "iac", "containers", "devops", "kubernetes"],
                &["TF_", "KUBECONFIG", "PULUMI_", "DOCKER_"],
                &["terraform", "kubectl", "docker", "pulumi", "helm"],
            ),
            IntentRule::new(
                "developer",
                &[
                    "git", "github", "gitlab", "pr", "pull request", "pull requests", "review",
                    "repo", "repos", "repository", "ci", "cd", "pipeline", "pipelines", "lint",
                    "linting", "test", "tests", "testing", "code", "issue", "issues", "commit",
                    "commits", "branch", "merge",
                ],
                &["developer", "developer-tools", "devtools", "vcs", "ci", "version-control"],
                &["GITHUB_TOKEN", "GH_TOKEN", "GITLAB_TOKEN", "CI_"],
                &["gh", "git", "glab"],
            ),
        ];
        Self {
            rules,
            iac_phrases: default_iac_phrases(),
            iac_markers: default_iac_markers(),
        }
    }

    pub fn rule(&self, name: &str) -> Option<&IntentRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Detect intents in a raw query.
    pub fn extract(&self, query: &str) -> IntentSet {
        let tokens = tokenize(query);
        self.extract_with_tokens(&query.to_lowercase(), &tokens)
    }

    /// Detect intents given an already lower-cased query and its tokens.
    pub fn extract_with_tokens(&self, lower_query: &str, tokens: &[String]) -> IntentSet {
        let mut intents: IntentSet = self
            .rules
            .iter()
            .filter(|rule| rule.matches_query(lower_query, tokens))
            .map(|rule| rule.name.clone())
            .collect();

        if is_full_stack_query(lower_query) {
            for name in FULL_STACK_INTENTS {
                if self.rule(name).is_some() {
                    intents.insert(name.to_string());
                }
            }
        }
        intents
    }

    /// Names of the intents for which `identifier` is canonical, restricted
    /// to `intents`.
    pub fn canonical_intents<'a>(
        &'a self,
        identifier: &str,
        intents: &'a IntentSet,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let identifier = identifier.to_string();
        self.rules
            .iter()
            .filter(move |r| intents.contains(&r.name) && r.is_canonical(&identifier))
            .map(|r| r.name.as_str())
    }

    /// Whether the query explicitly asks for infrastructure as code.
    pub fn is_iac_query(&self, lower_query: &str, tokens: &[String]) -> bool {
        self.iac_phrases
            .iter()
            .any(|p| term_matches_query(p, lower_query, tokens))
    }
}

fn is_full_stack_query(lower_query: &str) -> bool {
    lower_query.contains("full stack")
        || lower_query.contains("full-stack")
        || lower_query.contains("fullstack")
        || contains_word(lower_query, "saas")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &IntentSet) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_single_intent() {
        let table = IntentTable::builtin();
        let intents = table.extract("deploy a nextjs site");
        assert_eq!(names(&intents), vec!["deploy"]);
    }

    #[test]
    fn test_multi_intent() {
        let table = IntentTable::builtin();
        let intents = table.extract("set up stripe billing and a postgres database");
        assert!(intents.contains("payments"));
        assert!(intents.contains("database"));
    }

    #[test]
    fn test_full_stack_adds_four_intents() {
        let table = IntentTable::builtin();
        for q in ["full stack saas", "a full-stack starter", "launch my saas"] {
            let intents = table.extract(q);
            for name in FULL_STACK_INTENTS {
                assert!(intents.contains(*name), "{} missing for {:?}", name, q);
            }
        }
    }

    #[test]
    fn test_short_terms_need_exact_token() {
        let table = IntentTable::builtin();
        // "pr" inside "improve" and "db" inside "feedback" must not count
        let intents = table.extract("improve feedback widgets");
        assert!(!intents.contains("developer"));
        assert!(!intents.contains("database"));

        let intents = table.extract("open a PR");
        assert!(intents.contains("developer"));
    }

    #[test]
    fn test_long_terms_need_word_boundary() {
        let table = IntentTable::builtin();
        let intents = table.extract("redeployment-free hosting");
        assert!(intents.contains("deploy"));
        let intents = table.extract("redeployment");
        assert!(!intents.contains("deploy"));
    }

    #[test]
    fn test_phrase_trigger() {
        let table = IntentTable::builtin();
        let intents = table.extract("review every pull request");
        assert!(intents.contains("developer"));
    }

    #[test]
    fn test_no_intents() {
        let table = IntentTable::builtin();
        assert!(table.extract("zzzxqv19283").is_empty());
    }

    #[test]
    fn test_canonical_intents() {
        let table = IntentTable::builtin();
        let intents = table.extract("full stack saas");
        let mut hits: Vec<&str> = table.canonical_intents("supabase", &intents).collect();
        hits.sort();
        assert_eq!(hits, vec!["auth", "database"]);
    }

    #[test]
    fn test_iac_query() {
        let table = IntentTable::builtin();
        let q = "provision with infrastructure as code";
        assert!(table.is_iac_query(q, &tokenize(q)));
        let q = "use iac for aws";
        assert!(table.is_iac_query(q, &tokenize(q)));
        let q = "deploy preview";
        assert!(!table.is_iac_query(q, &tokenize(q)));
    }

    #[test]
    fn test_deserialize_custom_table() {
        let json = r#"{
            "intent": [
                { "name": "chat", "triggers": ["slack", "chat"], "canonical": ["slack-cli"] }
            ]
        }"#;
        let table: IntentTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.rules.len(), 1);
        assert!(table.extract("post to slack").contains("chat"));
        assert!(!table.iac_phrases.is_empty());
    }
}
