//! # Blocking Index
//!
//! Partitions prepared records into candidate buckets sharing cheap keys:
//! year bucket × title prefix, author surname, and significant title word.
//! Candidates of a record are the union of every bucket it belongs to.
//! The index is read-only after construction and shared across scoring
//! workers.

use crate::config::{ResolverConfig, YEAR_BUCKET_WIDTH};
use crate::model::{PreparedRecord, RecordIdx};
use crate::normalize::title_prefix;
use hashbrown::HashMap;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

/// A blocking key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKey {
    /// 5-year bucket start × first words of the normalized title
    YearPrefix { bucket: i32, prefix: String },
    Surname(String),
    Word(String),
}

impl BlockKey {
    fn kind(&self) -> KeyKind {
        match self {
            BlockKey::YearPrefix { .. } => KeyKind::YearPrefix,
            BlockKey::Surname(_) => KeyKind::Surname,
            BlockKey::Word(_) => KeyKind::Word,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    YearPrefix,
    Surname,
    Word,
}

/// Start year of the bucket containing `year`.
pub fn year_bucket(year: i32) -> i32 {
    year.div_euclid(YEAR_BUCKET_WIDTH) * YEAR_BUCKET_WIDTH
}

/// Blocking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingConfig {
    pub title_prefix_length: usize,
    pub max_candidates_per_record: usize,
}

impl From<&ResolverConfig> for BlockingConfig {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            title_prefix_length: config.title_prefix_length,
            max_candidates_per_record: config.max_candidates_per_record,
        }
    }
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

/// Every blocking key of a record. Empty when the record has neither a
/// title nor a plausible year.
pub fn block_keys(record: &PreparedRecord, title_prefix_length: usize) -> Vec<BlockKey> {
    if record.is_incomparable() {
        return Vec::new();
    }
    let mut keys = Vec::with_capacity(3 + 1 + record.significant_words.len());

    if let (Some(year), Some(prefix)) = (
        record.year,
        title_prefix(&record.title_normalized, title_prefix_length),
    ) {
        let bucket = year_bucket(year);
        for neighbour in [bucket - YEAR_BUCKET_WIDTH, bucket, bucket + YEAR_BUCKET_WIDTH] {
            keys.push(BlockKey::YearPrefix {
                bucket: neighbour,
                prefix: prefix.clone(),
            });
        }
    }
    if let Some(surname) = &record.surname {
        keys.push(BlockKey::Surname(surname.clone()));
    }
    keys.extend(
        record
            .significant_words
            .iter()
            .map(|word| BlockKey::Word(word.clone())),
    );
    keys
}

/// A candidate with the number of keys it shares with the query record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub idx: RecordIdx,
    pub shared_keys: u32,
}

/// Summary of an index build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockingStats {
    pub records_indexed: usize,
    /// Records with neither a title nor a plausible year
    pub records_skipped: usize,
    pub year_prefix_keys: usize,
    pub surname_keys: usize,
    pub word_keys: usize,
    pub largest_block: usize,
}

/// Inverted index from blocking keys to record indices.
#[derive(Debug, Clone)]
pub struct BlockingIndex {
    config: BlockingConfig,
    key_ids: HashMap<BlockKey, u32>,
    postings: Vec<Vec<RecordIdx>>,
    record_keys: Vec<Vec<u32>>,
    stats: BlockingStats,
}

impl BlockingIndex {
    /// Build the index over `records`; `RecordIdx(i)` refers to `records[i]`.
    #[instrument(skip(records), fields(records = records.len()), level = "debug")]
    pub fn build(records: &[PreparedRecord], config: BlockingConfig) -> Self {
        let mut key_ids: HashMap<BlockKey, u32> = HashMap::new();
        let mut postings: Vec<Vec<RecordIdx>> = Vec::new();
        let mut record_keys: Vec<Vec<u32>> = Vec::with_capacity(records.len());
        let mut stats = BlockingStats::default();

        for (i, record) in records.iter().enumerate() {
            let keys = block_keys(record, config.title_prefix_length);
            if keys.is_empty() {
                stats.records_skipped += 1;
                record_keys.push(Vec::new());
                continue;
            }
            stats.records_indexed += 1;

            let mut ids = Vec::with_capacity(keys.len());
            for key in keys {
                let next_id = postings.len() as u32;
                let id = *key_ids.entry(key).or_insert_with_key(|key| {
                    match key.kind() {
                        KeyKind::YearPrefix => stats.year_prefix_keys += 1,
                        KeyKind::Surname => stats.surname_keys += 1,
                        KeyKind::Word => stats.word_keys += 1,
                    }
                    postings.push(Vec::new());
                    next_id
                });
                postings[id as usize].push(RecordIdx(i as u32));
                ids.push(id);
            }
            record_keys.push(ids);
        }

        stats.largest_block = postings.iter().map(Vec::len).max().unwrap_or(0);
        debug!(
            indexed = stats.records_indexed,
            skipped = stats.records_skipped,
            keys = postings.len(),
            largest_block = stats.largest_block,
            "blocking index built"
        );

        Self {
            config,
            key_ids,
            postings,
            record_keys,
            stats,
        }
    }

    pub fn stats(&self) -> &BlockingStats {
        &self.stats
    }

    pub fn config(&self) -> BlockingConfig {
        self.config
    }

    /// Number of records the index was built over (indexed or not).
    pub fn len(&self) -> usize {
        self.record_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_keys.is_empty()
    }

    /// Whether the record at `idx` carries any key.
    pub fn is_indexed(&self, idx: RecordIdx) -> bool {
        self.record_keys
            .get(idx.index())
            .is_some_and(|keys| !keys.is_empty())
    }

    /// Candidates of an indexed record, excluding itself.
    pub fn candidates(&self, idx: RecordIdx) -> Vec<Candidate> {
        let Some(keys) = self.record_keys.get(idx.index()) else {
            return Vec::new();
        };
        self.rank(keys.iter().copied(), Some(idx))
    }

    /// Candidates of a record from another catalog.
    pub fn candidates_for(&self, record: &PreparedRecord) -> Vec<Candidate> {
        let keys = block_keys(record, self.config.title_prefix_length);
        let ids = keys
            .iter()
            .filter_map(|key| self.key_ids.get(key).copied())
            .collect::<Vec<_>>();
        self.rank(ids.into_iter(), None)
    }

    fn rank(&self, key_ids: impl Iterator<Item = u32>, exclude: Option<RecordIdx>) -> Vec<Candidate> {
        let mut shared: FxHashMap<RecordIdx, u32> = FxHashMap::default();
        for key_id in key_ids {
            for &other in &self.postings[key_id as usize] {
                if Some(other) != exclude {
                    *shared.entry(other).or_insert(0) += 1;
                }
            }
        }

        let mut candidates: Vec<Candidate> = shared
            .into_iter()
            .map(|(idx, shared_keys)| Candidate { idx, shared_keys })
            .collect();
        candidates.sort_unstable_by(|a, b| {
            b.shared_keys.cmp(&a.shared_keys).then(a.idx.cmp(&b.idx))
        });
        candidates.truncate(self.config.max_candidates_per_record);
        candidates
    }

    /// Every unordered candidate pair `(i, j)` with `i < j`, once, in ascending order.
    ///
    /// A pair is kept when either side lists the other within its fan-out cap.
    pub fn candidate_pairs(&self) -> Vec<(RecordIdx, RecordIdx)> {
        let mut pairs: Vec<(RecordIdx, RecordIdx)> = (0..self.record_keys.len() as u32)
            .into_par_iter()
            .flat_map_iter(|i| {
                let idx = RecordIdx(i);
                self.candidates(idx).into_iter().map(move |candidate| {
                    if candidate.idx < idx {
                        (candidate.idx, idx)
                    } else {
                        (idx, candidate.idx)
                    }
                })
            })
            .collect();
        pairs.par_sort_unstable();
        pairs.dedup();
        pairs
    }
}
