//! Product entity resolution.
//!
//! Maps the raw product names of one extract onto canonical product ids.
//! Resolution runs in two passes:
//!
//! 1. **Scoring**: every distinct raw name is compared against every
//!    catalog description with a token-order-insensitive similarity on a
//!    0–100 scale. Pairs at or above the threshold become candidates.
//! 2. **Confirmation**: all candidates go to the classifier in a single
//!    prompt; only pairs it answers "yes" for count as matches.
//!
//! Raw names without a confirmed match are reported as new; the transform
//! stage creates their canonical rows. Matched names reuse the existing id
//! and never rewrite its description.
//!
//! When a raw name has several confirmed matches, the highest score wins
//! and equal scores go to the lowest canonical id. Raw names are
//! de-duplicated and sorted before scoring, so for a fixed catalog and a
//! fixed classifier answer the result depends only on the set of names.

use std::collections::{BTreeMap, BTreeSet};

use crate::classify::{confirmation_prompt, parse_confirmations, Classifier};
use crate::models::CanonicalProduct;

/// Minimum similarity (0–100) for a pair to be sent for confirmation.
pub const DEFAULT_SIMILARITY_THRESHOLD: u8 = 90;

/// Scores a pair of product names on a 0–100 scale.
///
/// Scores are compared against the threshold unrounded, so 89.9 stays
/// below a threshold of 90.
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Token-sort ratio: lower-case, sort whitespace tokens, then Levenshtein
/// similarity `(longest - distance) / longest` scaled to 0–100.
pub struct TokenSortRatio;

impl SimilarityScorer for TokenSortRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        token_sort_ratio(a, b)
    }
}

pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let a = sorted_tokens(a);
    let b = sorted_tokens(b);
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100.0;
    }
    let distance = strsim::levenshtein(&a, &b).min(longest);
    // Integer numerator keeps exact boundaries exact: 9 of 10 is 90.0.
    ((longest - distance) * 100) as f64 / longest as f64
}

fn sorted_tokens(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut tokens: Vec<&str> = lower.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// A raw name paired with a catalog entry that scored above threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub raw_name: String,
    pub product_id: i64,
    pub description: String,
    pub score: f64,
}

/// Outcome of resolving one extract's raw names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Raw name → existing canonical id.
    pub matched: BTreeMap<String, i64>,
    /// Raw names that need a new canonical product, sorted.
    pub unmatched: Vec<String>,
    /// Number of candidate pairs sent for confirmation.
    pub candidates: usize,
}

impl Resolution {
    pub fn canonical_id(&self, raw_name: &str) -> Option<i64> {
        self.matched.get(raw_name).copied()
    }
}

pub struct ProductResolver<'a> {
    classifier: &'a dyn Classifier,
    scorer: &'a dyn SimilarityScorer,
    threshold: u8,
}

impl<'a> ProductResolver<'a> {
    pub fn new(classifier: &'a dyn Classifier, threshold: u8) -> Self {
        Self {
            classifier,
            scorer: &TokenSortRatio,
            threshold,
        }
    }

    pub fn with_scorer(mut self, scorer: &'a dyn SimilarityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Score every distinct raw name against the catalog.
    ///
    /// Output order: raw names ascending, then catalog order.
    pub fn find_candidates(
        &self,
        raw_names: &BTreeSet<String>,
        catalog: &[CanonicalProduct],
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for raw_name in raw_names {
            for product in catalog {
                let score = self.scorer.score(raw_name, &product.description);
                if score >= f64::from(self.threshold) {
                    candidates.push(Candidate {
                        raw_name: raw_name.clone(),
                        product_id: product.id,
                        description: product.description.clone(),
                        score,
                    });
                }
            }
        }
        candidates
    }

    /// Ask the classifier about all candidates at once and keep the
    /// confirmed ones. A failed call confirms nothing.
    pub async fn confirm(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let pairs: Vec<(&str, &str)> = candidates
            .iter()
            .map(|c| (c.raw_name.as_str(), c.description.as_str()))
            .collect();
        let prompt = confirmation_prompt(&pairs);

        let answer = match self.classifier.complete(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(
                    candidates = candidates.len(),
                    "product confirmation failed, treating all as distinct: {}",
                    e
                );
                return Vec::new();
            }
        };

        parse_confirmations(&answer, candidates.len())
            .into_iter()
            .zip(candidates)
            .filter(|(confirmed, _)| *confirmed)
            .map(|(_, candidate)| candidate.clone())
            .collect()
    }

    pub async fn resolve<S: AsRef<str>>(
        &self,
        raw_names: &[S],
        catalog: &[CanonicalProduct],
    ) -> Resolution {
        let names: BTreeSet<String> = raw_names
            .iter()
            .map(|n| n.as_ref().to_string())
            .collect();

        let candidates = self.find_candidates(&names, catalog);
        let confirmed = self.confirm(&candidates).await;
        let matched = pick_matches(confirmed);

        for (raw_name, id) in &matched {
            tracing::info!(raw_name = %raw_name, canonical_id = id, "matched existing product");
        }

        let unmatched = names
            .into_iter()
            .filter(|n| !matched.contains_key(n))
            .collect();

        Resolution {
            matched,
            unmatched,
            candidates: candidates.len(),
        }
    }
}

/// One canonical id per raw name: highest score, then lowest id.
pub fn pick_matches(confirmed: Vec<Candidate>) -> BTreeMap<String, i64> {
    let mut best: BTreeMap<String, Candidate> = BTreeMap::new();
    for candidate in confirmed {
        let replace = match best.get(&candidate.raw_name) {
            Some(current) => {
                (candidate.score, -candidate.product_id) > (current.score, -current.product_id)
            }
            None => true,
        };
        if replace {
            best.insert(candidate.raw_name.clone(), candidate);
        }
    }
    best.into_iter()
        .map(|(name, candidate)| (name, candidate.product_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, id: i64, score: f64) -> Candidate {
        Candidate {
            raw_name: name.to_string(),
            product_id: id,
            description: format!("product {}", id),
            score,
        }
    }

    #[test]
    fn test_identical_names_score_100() {
        assert_eq!(token_sort_ratio("Chanel No5 EDP", "Chanel No5 EDP"), 100.0);
    }

    #[test]
    fn test_token_order_and_case_insensitive() {
        assert_eq!(token_sort_ratio("EDP Chanel No5", "chanel no5 edp"), 100.0);
    }

    #[test]
    fn test_one_edit_in_ten_chars_is_90() {
        assert_eq!(token_sort_ratio("abcdefghij", "abcdefghik"), 90.0);
    }

    #[test]
    fn test_one_edit_in_nine_chars_is_below_90() {
        assert!(token_sort_ratio("abcdefghi", "abcdefghz") < 89.0);
    }

    #[test]
    fn test_eleven_edits_in_a_hundred_chars_is_89() {
        let a = "a".repeat(100);
        let b = format!("{}{}", "a".repeat(89), "b".repeat(11));
        assert_eq!(token_sort_ratio(&a, &b), 89.0);
    }

    #[test]
    fn test_fractional_score_is_not_rounded_up() {
        // 26 of 29 characters agree: 89.66.
        let score = token_sort_ratio(
            "abcdefghijklmnopqrstuvwxyzABC",
            "abcdefghijklmnopqrstuvwxyzXYZ",
        );
        assert!(score > 89.6 && score < 90.0, "score was {}", score);
    }

    #[test]
    fn test_empty_names_are_identical() {
        assert_eq!(token_sort_ratio("", "  "), 100.0);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        assert!(token_sort_ratio("Chanel No5", "Dior Sauvage") < 50.0);
    }

    #[test]
    fn test_pick_matches_prefers_highest_score() {
        let picked = pick_matches(vec![
            candidate("a", 1, 91.0),
            candidate("a", 2, 97.0),
            candidate("a", 3, 93.0),
        ]);
        assert_eq!(picked.get("a"), Some(&2));
    }

    #[test]
    fn test_pick_matches_ties_go_to_lowest_id() {
        let picked = pick_matches(vec![candidate("a", 7, 95.0), candidate("a", 3, 95.0)]);
        assert_eq!(picked.get("a"), Some(&3));
        let picked = pick_matches(vec![candidate("a", 3, 95.0), candidate("a", 7, 95.0)]);
        assert_eq!(picked.get("a"), Some(&3));
    }

    #[test]
    fn test_pick_matches_independent_names() {
        let picked = pick_matches(vec![candidate("a", 1, 90.0), candidate("b", 2, 90.0)]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.get("b"), Some(&2));
    }
}
