//! # Evaluation
//!
//! Quality measures of a resolution run against labeled data: precision,
//! recall and F1 of accepted matches or duplicate clusters, and the recall
//! of the blocking index over known true pairs.

use crate::cluster::{prepare_records, CanonicalMapping};
use crate::index::{BlockingConfig, BlockingIndex};
use crate::model::{MatchResult, Record, RecordId, RecordIdx};
use crate::normalize::YearBounds;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One hand-validated pair of a labeled sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledPair {
    pub source_id: RecordId,
    pub target_id: RecordId,
    pub is_same_work: bool,
}

impl LabeledPair {
    pub fn positive(source_id: impl Into<RecordId>, target_id: impl Into<RecordId>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            is_same_work: true,
        }
    }

    pub fn negative(source_id: impl Into<RecordId>, target_id: impl Into<RecordId>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            is_same_work: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Evaluation {
    pub fn from_counts(true_positives: usize, false_positives: usize, false_negatives: usize) -> Self {
        let ratio = |num: usize, den: usize| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
        }
    }
}

/// Score accepted matches against a labeled sample.
///
/// Only accepted pairs that appear in the sample are judged: a labeled
/// positive counts as a true positive, a labeled negative as a false
/// positive. Labeled positives that were not accepted are false negatives.
pub fn evaluate_matches(results: &[MatchResult], labels: &[LabeledPair]) -> Evaluation {
    let truth: HashMap<(&RecordId, &RecordId), bool> = labels
        .iter()
        .map(|label| ((&label.source_id, &label.target_id), label.is_same_work))
        .collect();

    let accepted: HashSet<(&RecordId, &RecordId)> = results
        .iter()
        .filter(|result| result.confidence.is_accepted())
        .filter_map(|result| result.target_id.as_ref().map(|t| (&result.source_id, t)))
        .collect();

    let (mut tp, mut fp) = (0, 0);
    for pair in &accepted {
        match truth.get(pair) {
            Some(true) => tp += 1,
            Some(false) => fp += 1,
            None => {}
        }
    }
    let fn_ = truth
        .iter()
        .filter(|(pair, same)| **same && !accepted.contains(*pair))
        .count();

    Evaluation::from_counts(tp, fp, fn_)
}

/// Pairwise evaluation of a dedup mapping against every true duplicate pair.
///
/// Predicted pairs are all pairs of records sharing a canonical; the truth
/// is treated as complete.
pub fn evaluate_clusters(
    mapping: &CanonicalMapping,
    true_pairs: &[(RecordId, RecordId)],
) -> Evaluation {
    let mut members: HashMap<&RecordId, Vec<&RecordId>> = HashMap::new();
    for (record, canonical) in mapping.iter() {
        members.entry(canonical).or_default().push(record);
    }
    let predicted: usize = members
        .values()
        .map(|group| group.len() * group.len().saturating_sub(1) / 2)
        .sum();

    let truth: HashSet<(&RecordId, &RecordId)> = true_pairs
        .iter()
        .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
        .collect();
    let tp = truth
        .iter()
        .filter(|(a, b)| {
            matches!(
                (mapping.canonical_of(a), mapping.canonical_of(b)),
                (Some(ca), Some(cb)) if ca == cb
            )
        })
        .count();

    Evaluation::from_counts(tp, predicted.saturating_sub(tp), truth.len() - tp)
}

/// Share of known true pairs that the blocking index proposes as candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockingRecall {
    pub true_pairs: usize,
    pub covered: usize,
    /// Candidate pairs the index emitted in total
    pub candidate_pairs: usize,
    pub recall: f64,
}

/// Measure blocking recall of `records` indexed with `config`.
///
/// True pairs naming an unknown record count as missed.
pub fn blocking_recall(
    records: &[Record],
    true_pairs: &[(RecordId, RecordId)],
    config: BlockingConfig,
    bounds: YearBounds,
) -> BlockingRecall {
    let prepared = prepare_records(records, bounds);
    let index = BlockingIndex::build(&prepared, config);
    let positions: HashMap<&RecordId, RecordIdx> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (&record.id, RecordIdx(i as u32)))
        .collect();

    let pairs: HashSet<(RecordIdx, RecordIdx)> = index.candidate_pairs().into_iter().collect();
    let covered = true_pairs
        .iter()
        .filter(|(a, b)| match (positions.get(a), positions.get(b)) {
            (Some(&i), Some(&j)) => pairs.contains(&(i.min(j), i.max(j))),
            _ => false,
        })
        .count();

    let recall = if true_pairs.is_empty() {
        1.0
    } else {
        covered as f64 / true_pairs.len() as f64
    };
    info!(
        true_pairs = true_pairs.len(),
        covered,
        candidate_pairs = pairs.len(),
        recall,
        "blocking recall measured"
    );
    BlockingRecall {
        true_pairs: true_pairs.len(),
        covered,
        candidate_pairs: pairs.len(),
        recall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfidenceTier, MatchMethod};

    fn result(source: &str, target: Option<&str>, confidence: ConfidenceTier) -> MatchResult {
        MatchResult {
            source_id: RecordId::new(source),
            target_id: target.map(RecordId::new),
            confidence,
            method: MatchMethod::BlockingFuzzy,
            title_similarity: 90.0,
            author_match: true,
            year_match: true,
            semantic_score: None,
            verdict: None,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_evaluate_matches() {
        let results = vec![
            result("s1", Some("t1"), ConfidenceTier::High),
            result("s2", Some("t9"), ConfidenceTier::Medium),
            result("s3", Some("t3"), ConfidenceTier::NeedsArbitration),
            result("s4", Some("t4"), ConfidenceTier::High),
        ];
        let labels = vec![
            LabeledPair::positive("s1", "t1"),
            LabeledPair::negative("s2", "t9"),
            LabeledPair::positive("s3", "t3"),
        ];
        let eval = evaluate_matches(&results, &labels);
        assert_eq!(eval.true_positives, 1);
        assert_eq!(eval.false_positives, 1);
        assert_eq!(eval.false_negatives, 1);
        assert!((eval.precision - 0.5).abs() < 1e-9);
        assert!((eval.recall - 0.5).abs() < 1e-9);
        assert!((eval.f1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_evaluation_is_zero() {
        let eval = evaluate_matches(&[], &[]);
        assert_eq!(eval, Evaluation::from_counts(0, 0, 0));
        assert_eq!(eval.f1, 0.0);
    }

    #[test]
    fn test_blocking_recall_counts_covered_pairs() {
        let records = vec![
            Record::new("a", "bph", "Theologia platonica de immortalitate animorum").with_year(1482),
            Record::new("b", "bph", "Platonica theologia de immortalitate").with_year(1484),
            Record::new("c", "bph", "Summa logicae").with_year(1488),
        ];
        let truth = vec![
            (RecordId::new("a"), RecordId::new("b")),
            (RecordId::new("a"), RecordId::new("c")),
        ];
        let recall = blocking_recall(&records, &truth, BlockingConfig::default(), YearBounds::default());
        assert_eq!(recall.true_pairs, 2);
        assert_eq!(recall.covered, 1);
        assert!((recall.recall - 0.5).abs() < 1e-9);
    }
}
