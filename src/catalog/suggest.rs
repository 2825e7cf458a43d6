//! "Did you mean" suggestions for catalog misses

/// Minimum similarity for a name to be suggested
pub const SIMILARITY_CUTOFF: f64 = 0.6;

/// Maximum number of suggestions returned
pub const MAX_SUGGESTIONS: usize = 3;

/// Levenshtein distance over chars
fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity in `[0, 1]`: one minus edit distance over the longer length
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

/// Up to three candidates closest to `name`, best first
pub fn suggest<'a>(name: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|candidate| (similarity(name, candidate), candidate))
        .filter(|(score, _)| *score >= SIMILARITY_CUTOFF)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("revenue", "revenue"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        // one deletion over seven chars
        assert!((similarity("revnue", "revenue") - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_suggest_typo() {
        let names = ["revenue", "profit", "order_count"];
        assert_eq!(suggest("revnue", names), vec!["revenue"]);
    }

    #[test]
    fn test_suggest_nothing_close() {
        let names = ["revenue", "profit", "order_count"];
        assert!(suggest("xyz123", names).is_empty());
    }

    #[test]
    fn test_suggest_ranks_and_caps() {
        let names = ["orders_a", "orders_b", "orders", "orders_ab", "customers"];
        let suggestions = suggest("orders", names);

        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(suggestions[0], "orders");
        assert_eq!(suggestions[1], "orders_a");
        assert_eq!(suggestions[2], "orders_b");
    }
}
