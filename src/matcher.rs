//! # Cross-Catalog Matching
//!
//! Finds the best target record for every source record and assigns it a
//! confidence tier. Candidates come from the blocking index and, when an
//! embedding store is present, from embedding nearest neighbours.
//!
//! Acceptance is greedy single-best: several sources may accept the same
//! target. Such collisions are reported in [`MatchStats`] and left as is.

use crate::checkpoint::Checkpoint;
use crate::cluster::prepare_records;
use crate::config::ResolverConfig;
use crate::embedding::{EmbeddingStore, NeighborIndex};
use crate::index::{BlockingConfig, BlockingIndex};
use crate::model::{
    ConfidenceTier, MatchMethod, MatchResult, PreparedRecord, Record, RecordId, RecordIdx,
    SimilarityVector,
};
use crate::normalize::YearBounds;
use crate::similarity::Scorer;
use crate::tiering::{compare_candidates, Tiering};
use anyhow::{bail, Result};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Rationale of a source record that produced no candidates.
pub const NO_CANDIDATES: &str = "no_candidates";

/// Several sources accepted the same target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collision {
    pub target_id: RecordId,
    pub source_ids: Vec<RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub sources: usize,
    /// Results taken from a checkpoint instead of recomputed
    pub resumed: usize,
    pub no_candidates: usize,
    pub by_tier: BTreeMap<ConfidenceTier, usize>,
    pub arbitrated: usize,
    pub collisions: Vec<Collision>,
    /// Arbitration was requested but ran without an oracle
    #[serde(default)]
    pub arbitration_disabled: bool,
}

impl MatchStats {
    pub fn from_results(results: &[MatchResult], resumed: usize) -> Self {
        let mut stats = MatchStats {
            sources: results.len(),
            resumed,
            ..MatchStats::default()
        };
        let mut accepted_by_target: BTreeMap<&RecordId, Vec<RecordId>> = BTreeMap::new();
        for result in results {
            *stats.by_tier.entry(result.confidence).or_insert(0) += 1;
            if result.rationale == NO_CANDIDATES {
                stats.no_candidates += 1;
            }
            if result.method == MatchMethod::LlmArbitrated {
                stats.arbitrated += 1;
            }
            if let (true, Some(target)) = (result.confidence.is_accepted(), &result.target_id) {
                accepted_by_target
                    .entry(target)
                    .or_default()
                    .push(result.source_id.clone());
            }
        }
        stats.collisions = accepted_by_target
            .into_iter()
            .filter(|(_, sources)| sources.len() > 1)
            .map(|(target, mut source_ids)| {
                source_ids.sort();
                Collision {
                    target_id: target.clone(),
                    source_ids,
                }
            })
            .collect();
        stats
    }

    pub fn tier_count(&self, tier: ConfidenceTier) -> usize {
        self.by_tier.get(&tier).copied().unwrap_or(0)
    }
}

/// Results in source order, with summary statistics.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub stats: MatchStats,
}

/// Best-match resolver from one catalog into another.
#[derive(Debug, Clone)]
pub struct Matcher {
    scorer: Scorer,
    tiering: Tiering,
    blocking: BlockingConfig,
    year_bounds: YearBounds,
    year_tolerance: u32,
    embeddings: Option<Arc<EmbeddingStore>>,
    embedding_top_k: usize,
    checkpoint_every: usize,
}

impl Matcher {
    pub fn new(config: &ResolverConfig, scorer: Scorer, tiering: Tiering) -> Self {
        Self {
            scorer,
            tiering,
            blocking: BlockingConfig::from(config),
            year_bounds: config.year_bounds,
            year_tolerance: config.year_tolerance,
            embeddings: None,
            embedding_top_k: config.embedding_top_k,
            checkpoint_every: config.checkpoint.every.max(1),
        }
    }

    /// Also draw candidates from embedding nearest neighbours.
    pub fn with_embeddings(mut self, store: Arc<EmbeddingStore>) -> Self {
        self.embeddings = Some(store);
        self
    }

    pub fn year_tolerance(&self) -> u32 {
        self.year_tolerance
    }

    /// Similarity vector of a raw source/target pair.
    pub fn signals(&self, source: &Record, target: &Record) -> SimilarityVector {
        self.scorer.compare(
            &PreparedRecord::prepare(source, self.year_bounds),
            &PreparedRecord::prepare(target, self.year_bounds),
        )
    }

    /// Match every source against `targets`.
    ///
    /// With a checkpoint, sources already stored there are not recomputed
    /// and new results are upserted every `checkpoint.every` sources.
    #[instrument(
        skip(self, sources, targets, checkpoint),
        fields(sources = sources.len(), targets = targets.len()),
        level = "debug"
    )]
    pub fn match_records(
        &self,
        sources: &[Record],
        targets: &[Record],
        checkpoint: Option<&dyn Checkpoint>,
    ) -> Result<MatchOutcome> {
        let mut seen: HashSet<&RecordId> = HashSet::with_capacity(sources.len());
        for source in sources {
            if !seen.insert(&source.id) {
                bail!("duplicate source record id: {}", source.id);
            }
        }

        let mut stored: HashMap<RecordId, MatchResult> = match checkpoint {
            Some(checkpoint) => checkpoint
                .load()?
                .into_iter()
                .map(|result| (result.source_id.clone(), result))
                .collect(),
            None => HashMap::new(),
        };

        let mut results: Vec<Option<MatchResult>> = sources
            .iter()
            .map(|source| stored.remove(&source.id))
            .collect();
        let pending: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.is_none())
            .map(|(i, _)| i)
            .collect();
        let resumed = sources.len() - pending.len();
        if resumed > 0 {
            info!(resumed, remaining = pending.len(), "resuming from checkpoint");
        }

        let prepared_targets = prepare_records(targets, self.year_bounds);
        let index = BlockingIndex::build(&prepared_targets, self.blocking);
        let neighbors = self
            .embeddings
            .as_ref()
            .map(|store| NeighborIndex::build(Arc::clone(store), &prepared_targets));

        let mut processed = 0;
        for chunk in pending.chunks(self.checkpoint_every) {
            let chunk_results: Vec<MatchResult> = chunk
                .par_iter()
                .map(|&i| {
                    let source = PreparedRecord::prepare(&sources[i], self.year_bounds);
                    self.match_one(&source, &prepared_targets, &index, neighbors.as_ref())
                })
                .collect();

            if let Some(checkpoint) = checkpoint {
                checkpoint.upsert(&chunk_results)?;
            }
            processed += chunk.len();
            debug!(processed, total = pending.len(), "match chunk complete");

            for (&i, result) in chunk.iter().zip(chunk_results) {
                results[i] = Some(result);
            }
        }

        let results: Vec<MatchResult> = results.into_iter().flatten().collect();
        let stats = MatchStats::from_results(&results, resumed);
        info!(
            sources = stats.sources,
            resumed = stats.resumed,
            high = stats.tier_count(ConfidenceTier::High),
            medium = stats.tier_count(ConfidenceTier::Medium),
            needs_arbitration = stats.tier_count(ConfidenceTier::NeedsArbitration),
            collisions = stats.collisions.len(),
            "matching complete"
        );
        Ok(MatchOutcome { results, stats })
    }

    /// Candidate target indices: blocking union embedding neighbours, ascending.
    fn candidates(
        &self,
        source: &PreparedRecord,
        index: &BlockingIndex,
        neighbors: Option<&NeighborIndex>,
    ) -> Vec<RecordIdx> {
        let mut candidates: Vec<RecordIdx> = index
            .candidates_for(source)
            .into_iter()
            .map(|candidate| candidate.idx)
            .collect();
        if let Some(neighbors) = neighbors {
            candidates.extend(
                neighbors
                    .nearest(&source.record, self.embedding_top_k)
                    .into_iter()
                    .map(|(idx, _)| idx),
            );
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    /// Resolve one source record.
    pub fn match_one(
        &self,
        source: &PreparedRecord,
        targets: &[PreparedRecord],
        index: &BlockingIndex,
        neighbors: Option<&NeighborIndex>,
    ) -> MatchResult {
        let candidates = self.candidates(source, index, neighbors);

        let best = candidates
            .iter()
            .map(|idx| {
                let target = &targets[idx.index()];
                (target, self.scorer.compare(source, target))
            })
            .max_by(|(ta, va), (tb, vb)| {
                compare_candidates(va, vb).then_with(|| tb.id().cmp(ta.id()))
            });

        let Some((target, vector)) = best else {
            return MatchResult::no_candidates(source.id().clone());
        };

        let tier = self.tiering.classify(&vector);
        let method = if vector.semantic_dominates() {
            MatchMethod::Embedding
        } else {
            MatchMethod::BlockingFuzzy
        };
        let signals = describe(&vector);
        let (target_id, rationale) = match tier {
            ConfidenceTier::High | ConfidenceTier::Medium => {
                (Some(target.id().clone()), signals)
            }
            ConfidenceTier::NeedsArbitration => (
                Some(target.id().clone()),
                format!("needs_arbitration: {signals}"),
            ),
            ConfidenceTier::Low => (
                None,
                format!("low_confidence: best candidate {} ({signals})", target.id()),
            ),
            ConfidenceTier::NoMatch => (
                None,
                format!("below_threshold: best candidate {} ({signals})", target.id()),
            ),
        };

        MatchResult {
            source_id: source.id().clone(),
            target_id,
            confidence: tier,
            method,
            title_similarity: vector.title_score.unwrap_or(0.0),
            author_match: vector.author_match,
            year_match: vector.year_match,
            semantic_score: vector.semantic_score,
            verdict: None,
            rationale,
        }
    }
}

fn describe(vector: &SimilarityVector) -> String {
    let mut text = format!("title={:.1}", vector.title_score.unwrap_or(0.0));
    if let Some(semantic) = vector.semantic_score {
        text.push_str(&format!(" semantic={semantic:.3}"));
    }
    text.push_str(if vector.author_match { " author=yes" } else { " author=no" });
    match vector.year_diff {
        Some(diff) if vector.year_match => text.push_str(&format!(" year=yes(diff {diff})")),
        Some(diff) => text.push_str(&format!(" year=no(diff {diff})")),
        None => text.push_str(" year=unknown"),
    }
    text
}
