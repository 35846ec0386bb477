//! # Duplicate Clustering
//!
//! Deduplicates one catalog: blocking candidate pairs are scored in
//! parallel, pairs at or above the similarity threshold are unioned by a
//! single writer in ascending pair order, and each resulting group gets
//! one canonical record.

use crate::config::ResolverConfig;
use crate::dsu::RecordDSU;
use crate::index::{BlockingConfig, BlockingIndex, BlockingStats};
use crate::model::{CatalogId, ClusterId, PreparedRecord, Record, RecordId, RecordIdx};
use crate::normalize::YearBounds;
use crate::similarity::Scorer;
use anyhow::{bail, Result};
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// A set of records describing the same work within one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub id: ClusterId,
    pub canonical: RecordId,
    /// Members in ascending id order, canonical included
    pub members: Vec<RecordId>,
}

impl DuplicateCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    pub fn contains(&self, record_id: &RecordId) -> bool {
        self.members.binary_search(record_id).is_ok()
    }
}

/// `record_id -> canonical_id` for every input record (identity for singletons).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalMapping(BTreeMap<RecordId, RecordId>);

impl CanonicalMapping {
    pub fn canonical_of(&self, record_id: &RecordId) -> Option<&RecordId> {
        self.0.get(record_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &RecordId)> {
        self.0.iter()
    }

    /// True when every record maps to itself.
    pub fn is_identity(&self) -> bool {
        self.0.iter().all(|(record, canonical)| record == canonical)
    }

    /// Records mapped to a canonical other than themselves.
    pub fn duplicates(&self) -> usize {
        self.0.iter().filter(|(record, canonical)| record != canonical).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub records: usize,
    pub pairs_scored: usize,
    /// Pairs with no comparable signal at all
    pub pairs_unscorable: usize,
    pub merges: usize,
    pub clusters: usize,
    pub singletons: usize,
}

/// Result of one dedup run.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// Clusters ordered by canonical id
    pub clusters: Vec<DuplicateCluster>,
    pub mapping: CanonicalMapping,
    pub stats: DedupStats,
    pub blocking: BlockingStats,
}

impl DedupOutcome {
    /// Clusters with more than one member.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &DuplicateCluster> {
        self.clusters.iter().filter(|cluster| !cluster.is_singleton())
    }
}

/// Canonical preference: more populated fields, then longer title+author
/// text, then lowest id.
pub fn canonical_order(a: &Record, b: &Record) -> Ordering {
    (a.populated_fields(), a.text_length(), Reverse(&a.id)).cmp(&(
        b.populated_fields(),
        b.text_length(),
        Reverse(&b.id),
    ))
}

/// Pick the canonical record among cluster members.
pub fn choose_canonical<'a>(members: impl IntoIterator<Item = &'a Record>) -> Option<&'a Record> {
    members.into_iter().max_by(|a, b| canonical_order(a, b))
}

/// Builds duplicate clusters for one catalog.
#[derive(Debug, Clone)]
pub struct ClusterBuilder {
    scorer: Scorer,
    blocking: BlockingConfig,
    similarity_threshold: f64,
    year_bounds: YearBounds,
}

impl ClusterBuilder {
    pub fn new(config: &ResolverConfig, scorer: Scorer) -> Self {
        Self {
            scorer,
            blocking: BlockingConfig::from(config),
            similarity_threshold: config.similarity_threshold,
            year_bounds: config.year_bounds,
        }
    }

    pub fn with_threshold(mut self, similarity_threshold: f64) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    /// Deduplicate `records`. Clusters only link records from the same catalog.
    ///
    /// Fails when an id repeats, including the same id in two catalogs.
    #[instrument(skip(self, records), fields(records = records.len()), level = "debug")]
    pub fn deduplicate(&self, records: &[Record]) -> Result<DedupOutcome> {
        // The mapping is keyed by id alone, so ids must be unique across catalogs too.
        let mut seen: HashMap<&RecordId, &CatalogId> = HashMap::with_capacity(records.len());
        for record in records {
            if let Some(catalog) = seen.insert(&record.id, &record.source_catalog) {
                if *catalog == record.source_catalog {
                    bail!("duplicate record id in dedup input: {}", record.id);
                }
                bail!(
                    "record id {} appears in catalogs {} and {}; deduplicate each catalog separately",
                    record.id,
                    catalog,
                    record.source_catalog
                );
            }
        }

        let prepared = prepare_records(records, self.year_bounds);
        let index = BlockingIndex::build(&prepared, self.blocking);
        let pairs: Vec<(RecordIdx, RecordIdx)> = index
            .candidate_pairs()
            .into_iter()
            .filter(|(i, j)| {
                prepared[i.index()].record.source_catalog
                    == prepared[j.index()].record.source_catalog
            })
            .collect();

        // Score in parallel; the order of `pairs` is preserved.
        let scores: Vec<Option<f64>> = pairs
            .par_iter()
            .map(|&(i, j)| self.scorer.score(&prepared[i.index()], &prepared[j.index()]))
            .collect();

        let mut stats = DedupStats {
            records: records.len(),
            ..DedupStats::default()
        };
        let mut dsu = RecordDSU::new(prepared.len());
        for (&(i, j), score) in pairs.iter().zip(&scores) {
            let Some(score) = score else {
                stats.pairs_unscorable += 1;
                continue;
            };
            stats.pairs_scored += 1;
            if *score >= self.similarity_threshold && dsu.union(i, j) {
                debug!(
                    record_a = %prepared[i.index()].id(),
                    record_b = %prepared[j.index()].id(),
                    score,
                    "merged duplicate pair"
                );
            }
        }
        stats.merges = dsu.merges();

        let mut clusters: Vec<DuplicateCluster> = dsu
            .groups()
            .into_iter()
            .filter_map(|group| {
                let canonical =
                    choose_canonical(group.iter().map(|idx| &records[idx.index()]))?;
                let mut members: Vec<RecordId> =
                    group.iter().map(|idx| records[idx.index()].id.clone()).collect();
                members.sort();
                Some(DuplicateCluster {
                    id: ClusterId(0),
                    canonical: canonical.id.clone(),
                    members,
                })
            })
            .collect();
        clusters.sort_by(|a, b| a.canonical.cmp(&b.canonical));

        let mut mapping = BTreeMap::new();
        for (n, cluster) in clusters.iter_mut().enumerate() {
            cluster.id = ClusterId(n as u32);
            for member in &cluster.members {
                mapping.insert(member.clone(), cluster.canonical.clone());
            }
        }

        stats.clusters = clusters.len();
        stats.singletons = clusters.iter().filter(|c| c.is_singleton()).count();
        info!(
            records = stats.records,
            pairs_scored = stats.pairs_scored,
            merges = stats.merges,
            clusters = stats.clusters,
            singletons = stats.singletons,
            "deduplication complete"
        );

        Ok(DedupOutcome {
            clusters,
            mapping: CanonicalMapping(mapping),
            stats,
            blocking: index.stats().clone(),
        })
    }
}

/// Prepare records in parallel, logging years outside the plausible range.
pub fn prepare_records(records: &[Record], bounds: YearBounds) -> Vec<PreparedRecord> {
    records
        .par_iter()
        .map(|record| {
            let prepared = PreparedRecord::prepare(record, bounds);
            if let (Some(year), None) = (record.year, prepared.year) {
                warn!(record_id = %record.id, year, "implausible year treated as missing");
            }
            prepared
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::ScoringParams;

    fn builder() -> ClusterBuilder {
        let config = ResolverConfig::default();
        ClusterBuilder::new(&config, Scorer::fuzzy(ScoringParams::from(&config)))
    }

    #[test]
    fn test_canonical_order() {
        let sparse = Record::new("b", "bph", "Physica");
        let rich = Record::new("c", "bph", "Physica").with_author("Aristoteles");
        let twin = Record::new("a", "bph", "Physica").with_author("Aristoteles");

        assert_eq!(
            choose_canonical([&sparse, &rich, &twin]).map(|r| r.id.as_str()),
            Some("a")
        );
        let longer = Record::new("z", "bph", "Physica libri octo").with_author("Aristoteles");
        assert_eq!(
            choose_canonical([&twin, &longer]).map(|r| r.id.as_str()),
            Some("z")
        );
    }

    #[test]
    fn test_transitive_merge() {
        let records = vec![
            Record::new("1", "bph", "Theologia platonica de immortalitate animorum")
                .with_author("Ficino, Marsilio")
                .with_year(1482),
            Record::new("2", "bph", "Theologia platonica de immortalitate animorum")
                .with_author("Ficino, Marsilio")
                .with_year(1483),
            Record::new("3", "bph", "Theologia platonica de immortalitate animorum")
                .with_author("Ficinus, Marsilius")
                .with_year(1484),
            Record::new("4", "bph", "Liber de vita").with_author("Ficino, Marsilio"),
        ];
        let outcome = builder().deduplicate(&records).unwrap();

        assert_eq!(outcome.stats.clusters, 2);
        assert_eq!(outcome.duplicate_groups().count(), 1);
        let group = outcome.duplicate_groups().next().unwrap();
        assert_eq!(group.members.len(), 3);
        assert_eq!(
            outcome.mapping.canonical_of(&RecordId::new("4")),
            Some(&RecordId::new("4"))
        );
    }

    #[test]
    fn test_catalogs_are_not_mixed() {
        let records = vec![
            Record::new("1", "bph", "Physica").with_year(1500),
            Record::new("2", "ia", "Physica").with_year(1500),
        ];
        let outcome = builder().deduplicate(&records).unwrap();
        assert!(outcome.mapping.is_identity());
        assert_eq!(outcome.stats.pairs_scored, 0);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let records = vec![
            Record::new("1", "bph", "Physica"),
            Record::new("1", "bph", "Metaphysica"),
        ];
        assert!(builder().deduplicate(&records).is_err());
    }

    #[test]
    fn test_rejects_id_shared_across_catalogs() {
        let records = vec![
            Record::new("1", "bph", "Physica").with_year(1500),
            Record::new("1", "ia", "Physica").with_year(1500),
        ];
        let error = builder().deduplicate(&records).unwrap_err().to_string();
        assert!(error.contains("catalogs bph and ia"), "{error}");
    }

    #[test]
    fn test_empty_input() {
        let outcome = builder().deduplicate(&[]).unwrap();
        assert!(outcome.clusters.is_empty());
        assert!(outcome.mapping.is_empty());
    }
}
