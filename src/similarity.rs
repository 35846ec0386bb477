//! # Similarity Scoring
//!
//! Multi-signal comparison of two prepared records. Signal extraction is
//! delegated to a pluggable [`SignalProvider`]; the [`Scorer`] turns raw
//! signals into a [`SimilarityVector`] and a weighted overall score.
//!
//! Every signal is symmetric: `compare(a, b) == compare(b, a)`.

use crate::config::{ResolverConfig, ScoreWeights, YEAR_PENALTY_PER_YEAR};
use crate::model::{PreparedRecord, SimilarityVector};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Levenshtein similarity on the 0-100 scale.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    (strsim::normalized_levenshtein(a, b) * 100.0).clamp(0.0, 100.0)
}

/// Order-insensitive, subset-tolerant token ratio on the 0-100 scale.
///
/// Tokens are split on whitespace and deduplicated. When one token set
/// contains the other the score is 100. Otherwise the best of the
/// pairwise ratios between the sorted intersection and the two
/// "intersection + remainder" strings is returned.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let join = |tokens: Vec<&str>| tokens.join(" ");
    let intersection = join(tokens_a.intersection(&tokens_b).copied().collect());
    let diff_ab = join(tokens_a.difference(&tokens_b).copied().collect());
    let diff_ba = join(tokens_b.difference(&tokens_a).copied().collect());

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let combine = |rest: &str| {
        if intersection.is_empty() {
            rest.to_string()
        } else {
            format!("{intersection} {rest}")
        }
    };
    let combined_ab = combine(&diff_ab);
    let combined_ba = combine(&diff_ba);

    let mut best = ratio(&combined_ab, &combined_ba);
    if !intersection.is_empty() {
        best = best
            .max(ratio(&intersection, &combined_ab))
            .max(ratio(&intersection, &combined_ba));
    }
    best
}

/// Source of raw comparison signals.
///
/// Implementations must be symmetric in their two arguments.
pub trait SignalProvider: Send + Sync {
    /// Title similarity (0-100), `None` when either title is empty.
    fn title_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64>;

    /// Surname similarity (0-100), `None` when either surname is missing.
    fn author_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64>;

    /// Absolute year difference, `None` when either year is missing.
    fn year_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<u32> {
        match (a.year, b.year) {
            (Some(ya), Some(yb)) => Some(ya.abs_diff(yb)),
            _ => None,
        }
    }

    /// Semantic title similarity (0-1), when the provider has one.
    fn semantic_signal(&self, _a: &PreparedRecord, _b: &PreparedRecord) -> Option<f64> {
        None
    }

    fn name(&self) -> &'static str;
}

/// Default provider: token-set title ratio and surname ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzySignals;

impl SignalProvider for FuzzySignals {
    fn title_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64> {
        if !a.has_title() || !b.has_title() {
            return None;
        }
        Some(token_set_ratio(&a.title_normalized, &b.title_normalized))
    }

    fn author_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64> {
        match (&a.surname, &b.surname) {
            (Some(sa), Some(sb)) => Some(ratio(sa, sb)),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "fuzzy"
    }
}

/// Scoring parameters taken from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    pub author_match_threshold: f64,
    pub year_tolerance: u32,
    pub dedup_year_tolerance: u32,
    pub weights: ScoreWeights,
}

impl From<&ResolverConfig> for ScoringParams {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            author_match_threshold: config.author_match_threshold,
            year_tolerance: config.year_tolerance,
            dedup_year_tolerance: config.dedup_year_tolerance,
            weights: config.weights,
        }
    }
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

/// Turns provider signals into similarity vectors and overall scores.
#[derive(Clone)]
pub struct Scorer {
    provider: Arc<dyn SignalProvider>,
    params: ScoringParams,
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("provider", &self.provider.name())
            .field("params", &self.params)
            .finish()
    }
}

impl Scorer {
    pub fn new(provider: Arc<dyn SignalProvider>, params: ScoringParams) -> Self {
        Self { provider, params }
    }

    /// Fuzzy-only scorer.
    pub fn fuzzy(params: ScoringParams) -> Self {
        Self::new(Arc::new(FuzzySignals), params)
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Compare two records. Out-of-scale or non-finite signals are dropped.
    pub fn compare(&self, a: &PreparedRecord, b: &PreparedRecord) -> SimilarityVector {
        let title_score = self.checked(a, b, "title", self.provider.title_signal(a, b), 100.0);
        let author_similarity =
            self.checked(a, b, "author", self.provider.author_signal(a, b), 100.0);
        let semantic_score = self
            .provider
            .semantic_signal(a, b)
            .map(|s| s.clamp(-1.0, 1.0).max(0.0));
        let semantic_score = self.checked(a, b, "semantic", semantic_score, 1.0);
        let year_diff = self.provider.year_signal(a, b);

        SimilarityVector {
            author_match: author_similarity
                .is_some_and(|s| s >= self.params.author_match_threshold),
            year_match: year_diff.is_some_and(|d| d <= self.params.year_tolerance),
            title_score,
            author_similarity,
            year_diff,
            semantic_score,
        }
    }

    fn checked(
        &self,
        a: &PreparedRecord,
        b: &PreparedRecord,
        signal: &'static str,
        value: Option<f64>,
        max: f64,
    ) -> Option<f64> {
        match value {
            Some(v) if v.is_finite() => Some(v.clamp(0.0, max)),
            Some(v) => {
                warn!(
                    record_a = %a.id(),
                    record_b = %b.id(),
                    signal,
                    value = v,
                    "dropping non-finite signal"
                );
                None
            }
            None => None,
        }
    }

    /// Graded year similarity for dedup scoring (0-100).
    pub fn year_similarity(&self, year_diff: u32) -> f64 {
        if year_diff <= self.params.dedup_year_tolerance {
            (100.0 - YEAR_PENALTY_PER_YEAR * year_diff as f64).max(0.0)
        } else {
            0.0
        }
    }

    /// Weighted overall score (0-100), re-normalized over the signals present.
    ///
    /// Returns `None` when no weighted signal is available.
    pub fn overall_score(&self, vector: &SimilarityVector) -> Option<f64> {
        let weights = &self.params.weights;
        let mut total = 0.0;
        let mut weight_sum = 0.0;

        if let Some(title) = vector.title_score {
            total += title * weights.title;
            weight_sum += weights.title;
        }
        if let Some(author) = vector.author_similarity {
            total += author * weights.author;
            weight_sum += weights.author;
        }
        if let Some(diff) = vector.year_diff {
            total += self.year_similarity(diff) * weights.year;
            weight_sum += weights.year;
        }

        if weight_sum > 0.0 {
            Some((total / weight_sum).clamp(0.0, 100.0))
        } else {
            None
        }
    }

    /// Compare and score in one step.
    pub fn score(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64> {
        self.overall_score(&self.compare(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::normalize::YearBounds;

    fn prepared(title: &str, author: Option<&str>, year: Option<i32>) -> PreparedRecord {
        let mut record = Record::new("x", "test", title);
        record.author = author.map(str::to_string);
        record.year = year;
        PreparedRecord::prepare(&record, YearBounds::default())
    }

    #[test]
    fn test_token_set_ratio_subset_is_full_score() {
        assert_eq!(token_set_ratio("orbium coelestium", "reuolutionibus orbium coelestium"), 100.0);
        assert_eq!(token_set_ratio("a b c", "c b a"), 100.0);
        assert_eq!(token_set_ratio("", "anything"), 0.0);
    }

    #[test]
    fn test_token_set_ratio_partial_overlap() {
        let score = token_set_ratio("historia naturalis plinii", "historia naturalis secundi");
        assert!(score > 60.0 && score < 100.0, "score was {score}");
        let unrelated = token_set_ratio("physica", "grammatica");
        assert!(unrelated < 60.0, "score was {unrelated}");
    }

    #[test]
    fn test_token_set_ratio_symmetry() {
        let pairs = [
            ("historia naturalis", "naturalis historia plinii"),
            ("de anima", "de caelo et mundo"),
            ("elementa geometriae", "geometria elementorum"),
        ];
        for (a, b) in pairs {
            assert_eq!(token_set_ratio(a, b), token_set_ratio(b, a));
        }
    }

    #[test]
    fn test_overall_score_renormalizes_missing_signals() {
        let scorer = Scorer::fuzzy(ScoringParams::default());
        let a = prepared("Physica", None, None);
        let b = prepared("Physica", None, None);
        assert_eq!(scorer.score(&a, &b), Some(100.0));

        let a = prepared("", None, Some(1500));
        let b = prepared("", None, Some(1501));
        assert_eq!(scorer.score(&a, &b), Some(80.0));
    }

    #[test]
    fn test_overall_score_none_without_signals() {
        let scorer = Scorer::fuzzy(ScoringParams::default());
        let a = prepared("", None, None);
        let b = prepared("Physica", Some("Aristoteles"), Some(1500));
        assert_eq!(scorer.score(&a, &b), None);
    }

    #[test]
    fn test_year_similarity_grading() {
        let scorer = Scorer::fuzzy(ScoringParams::default());
        assert_eq!(scorer.year_similarity(0), 100.0);
        assert_eq!(scorer.year_similarity(2), 60.0);
        assert_eq!(scorer.year_similarity(3), 0.0);
    }

    #[test]
    fn test_compare_flags() {
        let scorer = Scorer::fuzzy(ScoringParams::default());
        let a = prepared("De revolutionibus", Some("Copernicus, Nicolaus"), Some(1543));
        let b = prepared("De revolutionibus", Some("Copernicus, N."), Some(1566));
        let vector = scorer.compare(&a, &b);
        assert!(vector.author_match);
        assert!(vector.year_match);
        assert_eq!(vector.year_diff, Some(23));
        assert_eq!(vector.title_score, Some(100.0));
        assert_eq!(vector, scorer.compare(&b, &a));
    }

    #[test]
    fn test_implausible_year_is_absent() {
        let scorer = Scorer::fuzzy(ScoringParams::default());
        let a = prepared("Physica", None, Some(15));
        let b = prepared("Physica", None, Some(1500));
        assert_eq!(scorer.compare(&a, &b).year_diff, None);
    }
}
