//! Confidence tiering of a scored candidate pair.

use crate::config::{ConfidenceThresholds, ResolverConfig};
use crate::model::{ConfidenceTier, SimilarityVector};
use std::cmp::Ordering;

/// Maps a similarity vector to exactly one confidence tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tiering {
    thresholds: ConfidenceThresholds,
    arbitration: bool,
}

impl Tiering {
    pub fn new(thresholds: ConfidenceThresholds, arbitration: bool) -> Self {
        Self {
            thresholds,
            arbitration,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.confidence_thresholds, config.use_arbitration)
    }

    pub fn thresholds(&self) -> &ConfidenceThresholds {
        &self.thresholds
    }

    /// Tier of the title evidence combined with author/year corroboration.
    ///
    /// Ambiguous pairs become `NeedsArbitration` when an oracle is in use
    /// and `Low` otherwise.
    pub fn classify(&self, vector: &SimilarityVector) -> ConfidenceTier {
        let t = &self.thresholds;
        let title = vector.title_strength();
        let author = vector.author_match;
        let year = vector.year_match;

        if title >= t.high && (author || year) {
            ConfidenceTier::High
        } else if title >= t.medium && author && year {
            ConfidenceTier::High
        } else if title >= t.high {
            ConfidenceTier::Medium
        } else if title >= t.medium && (author || year) {
            ConfidenceTier::Medium
        } else if title >= t.low {
            if self.arbitration {
                ConfidenceTier::NeedsArbitration
            } else {
                ConfidenceTier::Low
            }
        } else {
            ConfidenceTier::NoMatch
        }
    }
}

/// Ordering of candidates for best-match selection: higher title evidence,
/// then more corroborating signals. `Greater` means `a` is the better one.
pub fn compare_candidates(a: &SimilarityVector, b: &SimilarityVector) -> Ordering {
    a.title_strength()
        .total_cmp(&b.title_strength())
        .then(a.corroboration().cmp(&b.corroboration()))
}
