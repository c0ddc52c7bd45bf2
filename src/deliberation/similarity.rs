//! Task similarity helpers
//!
//! Used by breakdown consensus extraction and reward computation. Two tasks
//! are "the same" iff their word-set Jaccard similarity after normalization
//! exceeds 0.7.

use std::collections::HashSet;

pub const SAME_TASK_THRESHOLD: f64 = 0.7;

/// Lowercase, collapse whitespace, trim.
pub fn normalize(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-set Jaccard similarity after normalization.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);

    let words_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let words_b: HashSet<&str> = norm_b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

pub fn is_same_task(a: &str, b: &str) -> bool {
    similarity(a, b) > SAME_TASK_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_similarity_is_one() {
        assert_eq!(similarity("design the API schema", "design the API schema"), 1.0);
        assert_eq!(similarity("  Design   THE api Schema ", "design the api schema"), 1.0);
    }

    #[test]
    fn test_empty_similarity_is_zero() {
        assert_eq!(similarity("", "design the schema"), 0.0);
        assert_eq!(similarity("design the schema", ""), 0.0);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("   ", "x"), 0.0);
    }

    #[test]
    fn test_disjoint_similarity_is_zero() {
        assert_eq!(similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        // {build, rest, api} vs {build, graphql, api}: 2 shared of 4 total
        let s = similarity("build rest api", "build graphql api");
        assert!((s - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_task_threshold_is_strict() {
        // Four of five words shared: 4/6 is about 0.67, below the threshold
        assert!(!is_same_task(
            "write unit tests for parser",
            "write unit tests for lexer"
        ));
        // Identical after normalization, above the threshold
        assert!(is_same_task("Write Unit Tests", "write   unit tests"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello   WORLD  "), "hello world");
        assert_eq!(normalize("a\tb\nc"), "a b c");
    }
}
