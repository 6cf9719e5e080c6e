//! Tokenizing and keyword extraction shared by association, chunking,
//! consolidation and lexical search.

use std::collections::HashMap;

/// Lowercase, split on anything outside `[a-z0-9]`, drop one-character tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

/// Up to `max_keywords` most frequent tokens.
///
/// Ties keep first-occurrence order, so the result is deterministic.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let tokens = tokenize(text);

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for token in &tokens {
        let count = counts.entry(token.as_str()).or_insert(0);
        if *count == 0 {
            order.push(token.as_str());
        }
        *count += 1;
    }

    // sort_by is stable
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
        .into_iter()
        .take(max_keywords)
        .map(str::to_string)
        .collect()
}

/// Distinct tokens in first-occurrence order
pub fn unique_tokens(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_short_and_punctuation() {
        assert_eq!(
            tokenize("Fixed a NullPointer in db_pool.rs!"),
            vec!["fixed", "nullpointer", "in", "db", "pool", "rs"]
        );
        assert!(tokenize("a b c - !").is_empty());
    }

    #[test]
    fn non_ascii_letters_split_tokens() {
        assert_eq!(tokenize("café latte"), vec!["caf", "latte"]);
    }

    #[test]
    fn keywords_rank_by_frequency_then_first_seen() {
        let kws = extract_keywords("deploy failed, deploy retried, cache cold, cache warm, deploy", 3);
        assert_eq!(kws, vec!["deploy", "cache", "failed"]);
    }

    #[test]
    fn keywords_respect_limit_and_empty_input() {
        assert_eq!(extract_keywords("one two three four five six", 5).len(), 5);
        assert!(extract_keywords("", 5).is_empty());
    }

    #[test]
    fn unique_tokens_keep_order() {
        assert_eq!(
            unique_tokens("checkout errors checkout timeout errors"),
            vec!["checkout", "errors", "timeout"]
        );
    }
}
