//! Lexical scoring and per-entry query features.
//!
//! The lexical score is deliberately loose: it counts query tokens that occur
//! anywhere in the entry's [`SearchableText`] as plain substrings, so
//! `deploy` matches `deployment`. The semantic score comes from
//! [`SemanticLeg`](crate::similarity::SemanticLeg).

use std::collections::HashSet;

use crate::models::{base_identifier, CliEntry, SearchableText};

/// Number of query tokens contained in `text`.
pub fn lexical_score(tokens: &[String], text: &SearchableText) -> usize {
    tokens
        .iter()
        .filter(|t| text.as_str().contains(t.as_str()))
        .count()
}

/// Slug parts that never identify a tool on their own.
const GENERIC_SLUG_PARTS: &[&str] = &["cli", "ctl", "tool", "tools", "cmd", "bin"];

/// The one distinctive part of a hyphenated slug whose other parts are all
/// generic (`cli-vercel`, `vercel-cli-tool`), if there is exactly one.
fn distinctive_part(slug: &str) -> Option<&str> {
    let parts: Vec<&str> = slug.split(['-', '_']).filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }
    let mut specific = parts.into_iter().filter(|p| !GENERIC_SLUG_PARTS.contains(p));
    match (specific.next(), specific.next()) {
        (Some(part), None) => Some(part),
        _ => None,
    }
}

/// Whether the entry's identifier is one of the query tokens.
///
/// Checks the slug, the slug without `-cli`/`ctl` style suffixes, the name
/// with whitespace removed, and each hyphen-separated part of a multi-part
/// slug whose remaining parts are generic suffixes.
pub fn is_direct_mention(entry: &CliEntry, tokens: &HashSet<&str>) -> bool {
    let slug = entry.slug.to_lowercase();
    let base = base_identifier(&slug);
    let compact_name: String = entry
        .name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let compact_base = base_identifier(&compact_name);

    let part = distinctive_part(&slug).unwrap_or("");

    [slug.as_str(), base.as_str(), compact_name.as_str(), compact_base.as_str(), part]
        .iter()
        .any(|id| !id.is_empty() && tokens.contains(id))
}

/// Commands whose string or description mentions a query token, best first.
pub fn top_commands(entry: &CliEntry, tokens: &[String], limit: usize) -> Vec<String> {
    let mut scored: Vec<(usize, usize, &str)> = entry
        .commands
        .iter()
        .enumerate()
        .filter_map(|(pos, c)| {
            let haystack = format!("{} {}", c.command, c.description).to_lowercase();
            let contexts: Vec<String> = c.workflow_context.iter().map(|w| w.to_lowercase()).collect();
            let hits = tokens
                .iter()
                .filter(|t| haystack.contains(t.as_str()) || contexts.iter().any(|w| w == *t))
                .count();
            (hits > 0).then_some((hits, pos, c.command.as_str()))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, _, cmd)| cmd.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthDescriptor, CommandInfo, Provenance};
    use crate::tokenize::tokenize;

    fn entry(slug: &str, name: &str) -> CliEntry {
        CliEntry {
            slug: slug.to_string(),
            name: name.to_string(),
            publisher: String::new(),
            description: "Deployment platform for frontend frameworks".to_string(),
            categories: vec!["hosting".to_string()],
            auth: AuthDescriptor::default(),
            commands: vec![
                CommandInfo {
                    command: "vercel deploy --prod".to_string(),
                    description: "Deploy to production".to_string(),
                    workflow_context: vec!["release".to_string()],
                },
                CommandInfo {
                    command: "vercel env pull".to_string(),
                    description: "Download environment variables".to_string(),
                    workflow_context: vec![],
                },
                CommandInfo {
                    command: "vercel logs".to_string(),
                    description: "Stream deployment logs".to_string(),
                    workflow_context: vec![],
                },
            ],
            compatibility: vec![],
            trust_score: 0.0,
            popularity_score: 0.0,
            provenance: Provenance::Curated,
            publisher_verified: true,
        }
    }

    #[test]
    fn test_lexical_partial_match() {
        let e = entry("vercel-cli", "Vercel CLI");
        let text = SearchableText::from_entry(&e);
        let tokens = tokenize("deploy frontend quickly");
        assert_eq!(lexical_score(&tokens, &text), 2);
    }

    #[test]
    fn test_direct_mention_variants() {
        let e = entry("vercel-cli", "Vercel CLI");
        let set = |q: &'static str| -> HashSet<&'static str> {
            q.split_whitespace().collect()
        };
        assert!(is_direct_mention(&e, &set("vercel")));
        assert!(is_direct_mention(&e, &set("vercel-cli")));
        assert!(!is_direct_mention(&e, &set("netlify")));

        let named = entry("sentry", "Sentry CLI");
        assert!(is_direct_mention(&named, &set("sentrycli")));
    }

    #[test]
    fn test_direct_mention_of_slug_part() {
        let set = |q: &'static str| -> HashSet<&'static str> {
            q.split_whitespace().collect()
        };
        assert!(is_direct_mention(&entry("cli-vercel", "Deployer"), &set("vercel")));
        assert!(is_direct_mention(&entry("vercel-cli-tool", "Deployer"), &set("vercel")));
        // two distinctive parts: neither alone is the identifier
        let two = entry("aws-vault", "Vault for AWS");
        assert!(!is_direct_mention(&two, &set("aws")));
        assert!(!is_direct_mention(&two, &set("vault")));
        assert!(!is_direct_mention(&entry("vercel-cli", "Deployer"), &set("cli")));
    }

    #[test]
    fn test_top_commands_ranked() {
        let e = entry("vercel-cli", "Vercel CLI");
        let tokens = tokenize("deploy production logs");
        let cmds = top_commands(&e, &tokens, 2);
        assert_eq!(cmds, vec!["vercel deploy --prod", "vercel logs"]);
    }

    #[test]
    fn test_top_commands_by_workflow_context() {
        let e = entry("vercel-cli", "Vercel CLI");
        let tokens = tokenize("release");
        assert_eq!(top_commands(&e, &tokens, 3), vec!["vercel deploy --prod"]);
    }
}
