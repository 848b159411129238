//! Query tokenizer.
//!
//! Splits on any run of non-alphanumeric characters, lower-cases, drops
//! stop-words, and keeps tokens longer than two characters unless they are
//! on the short-token allow-list of domain acronyms. No stemming.

/// Words that carry no retrieval signal for this registry.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "for", "to", "of", "in", "on", "at", "by", "with",
    "from", "into", "onto", "via", "about", "over", "my", "our", "your", "their", "its", "is",
    "are", "was", "be", "been", "it", "this", "that", "these", "those", "i", "we", "you", "me",
    "us", "need", "needs", "want", "wants", "how", "what", "which", "do", "does", "can", "could",
    "should", "would", "will", "some", "any", "all", "app", "apps", "use", "using", "used",
    "tool", "tools", "help", "please", "something", "thing", "things", "good", "best", "way",
    "also", "then", "just", "like", "make",
];

/// Tokens of length <= 2 that survive the length filter.
pub const SHORT_TOKEN_ALLOW: &[&str] = &[
    "db", "ci", "cd", "ai", "ml", "os", "pr", "s3", "ui", "gh", "api", "sql", "dns", "aws", "gcp",
    "js",
];

/// Whether `token` is a stop-word.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokenize free text into ordered, de-duplicated, lower-case terms.
///
/// ```rust
/// use clihub_core::tokenize::tokenize;
///
/// let tokens = tokenize("PR review for db migration");
/// assert_eq!(tokens, vec!["pr", "review", "db", "migration"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens: Vec<String> = Vec::new();
    for raw in lower.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() || is_stop_word(raw) {
            continue;
        }
        let keep = raw.chars().count() > 2 || SHORT_TOKEN_ALLOW.contains(&raw);
        if keep && !tokens.iter().any(|t| t == raw) {
            tokens.push(raw.to_string());
        }
    }
    tokens
}

/// Whole-word containment: `term` occurs in `haystack` with a
/// non-alphanumeric character (or the string edge) on both sides.
///
/// `term` may contain spaces or hyphens (`"pull request"`).
pub fn contains_word(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(term) {
        let begin = start + pos;
        let end = begin + term.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        // advance by one character to find overlapping occurrences
        start = begin
            + haystack[begin..]
                .chars()
                .next()
                .map_or(1, |c| c.len_utf8());
        if start >= haystack.len() {
            break;
        }
    }
    false
}
