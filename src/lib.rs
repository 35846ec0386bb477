//! # Catalink
//!
//! A bibliographic entity-resolution engine.
//!
//! Records describing the same work are found within one catalog
//! (duplicate clustering) and across catalogs (best-match resolution with
//! confidence tiers). Ambiguous cross-catalog pairs can be escalated to an
//! external arbitration oracle.

pub mod arbitration;
pub mod checkpoint;
pub mod cluster;
pub mod config;
pub mod dsu;
pub mod embedding;
pub mod evaluate;
pub mod index;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod similarity;
pub mod test_support;
pub mod tiering;

// Re-export main types for convenience
pub use arbitration::{ArbitrationOracle, HttpOracle, OracleError};
pub use checkpoint::{Checkpoint, CheckpointError, FileCheckpoint, MemoryCheckpoint};
pub use cluster::{CanonicalMapping, DedupOutcome, DuplicateCluster};
pub use config::{ConfigError, ConfigOverrides, MatchProfile, ResolverConfig};
pub use embedding::EmbeddingStore;
pub use matcher::{MatchOutcome, MatchStats};
pub use model::{ConfidenceTier, MatchMethod, MatchResult, Record, RecordId, Verdict};

use anyhow::Result;
use arbitration::{apply_outcome, Arbiter, ArbitrationOutcome, ArbitrationRequest};
use cluster::ClusterBuilder;
use embedding::EmbeddingSignals;
use hashbrown::HashMap;
use matcher::Matcher;
use parking_lot::Mutex;
use similarity::{Scorer, ScoringParams};
use std::sync::Arc;
use tiering::Tiering;
use tracing::{info, warn};

/// Main API for bibliographic entity resolution
pub struct Resolver {
    config: ResolverConfig,
    embeddings: Option<Arc<EmbeddingStore>>,
    oracle: Option<Arc<dyn ArbitrationOracle>>,
    checkpoint: Option<Arc<dyn Checkpoint>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("embeddings", &self.embeddings.as_ref().map(|store| store.len()))
            .field("oracle", &self.oracle.as_ref().map(|oracle| oracle.name()))
            .field("checkpoint", &self.checkpoint.is_some())
            .finish()
    }
}

impl Resolver {
    /// Create a resolver from a validated configuration.
    ///
    /// With `use_arbitration` set, an HTTP oracle is built from the
    /// `arbitration` section; a missing API key disables arbitration with a
    /// warning, and [`MatchStats::arbitration_disabled`] is then set on
    /// every run. A configured `checkpoint.path` opens a file checkpoint.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        config.validate()?;

        let oracle: Option<Arc<dyn ArbitrationOracle>> = if config.use_arbitration {
            match HttpOracle::from_config(&config.arbitration) {
                Ok(oracle) => Some(Arc::new(oracle)),
                Err(e) => {
                    warn!(error = %e, "arbitration requested but no oracle available");
                    None
                }
            }
        } else {
            None
        };

        let checkpoint: Option<Arc<dyn Checkpoint>> = match &config.checkpoint.path {
            Some(path) => Some(Arc::new(FileCheckpoint::open(path)?)),
            None => None,
        };

        Ok(Self {
            config,
            embeddings: None,
            oracle,
            checkpoint,
        })
    }

    /// Use `oracle` for arbitration (effective when `use_arbitration` is set).
    pub fn with_oracle(mut self, oracle: Arc<dyn ArbitrationOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Add the semantic signal and embedding candidates.
    pub fn with_embeddings(mut self, store: Arc<EmbeddingStore>) -> Self {
        self.embeddings = Some(store);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Arc<dyn Checkpoint>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Whether ambiguous pairs are escalated to an oracle.
    pub fn arbitration_active(&self) -> bool {
        self.config.use_arbitration && self.oracle.is_some()
    }

    pub fn scorer(&self) -> Scorer {
        let params = ScoringParams::from(&self.config);
        match &self.embeddings {
            Some(store) => Scorer::new(Arc::new(EmbeddingSignals::new(Arc::clone(store))), params),
            None => Scorer::fuzzy(params),
        }
    }

    pub fn matcher(&self) -> Matcher {
        let tiering = Tiering::new(self.config.confidence_thresholds, self.arbitration_active());
        let matcher = Matcher::new(&self.config, self.scorer(), tiering);
        match &self.embeddings {
            Some(store) => matcher.with_embeddings(Arc::clone(store)),
            None => matcher,
        }
    }

    /// Cluster duplicate records of one catalog.
    pub fn dedupe(&self, records: &[Record]) -> Result<DedupOutcome> {
        ClusterBuilder::new(&self.config, self.scorer()).deduplicate(records)
    }

    /// Match every source record against the target catalog, then arbitrate
    /// the ambiguous results.
    ///
    /// Deterministic matching runs on the blocking pool; arbitration calls
    /// run concurrently afterwards and each verdict is checkpointed as it
    /// arrives. Results are in source order.
    pub async fn match_catalogs(
        &self,
        sources: Vec<Record>,
        targets: Vec<Record>,
    ) -> Result<MatchOutcome> {
        let matcher = self.matcher();
        let checkpoint = self.checkpoint.clone();
        let (outcome, sources, targets) = {
            let matcher = matcher.clone();
            tokio::task::spawn_blocking(move || {
                matcher
                    .match_records(&sources, &targets, checkpoint.as_deref())
                    .map(|outcome| (outcome, sources, targets))
            })
            .await??
        };

        let MatchOutcome { mut results, mut stats } = outcome;
        let arbitration_disabled = self.arbitration_disabled();
        let pending: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.confidence == ConfidenceTier::NeedsArbitration)
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            stats.arbitration_disabled = arbitration_disabled;
            return Ok(MatchOutcome { results, stats });
        }

        let source_by_id: HashMap<&RecordId, &Record> =
            sources.iter().map(|record| (&record.id, record)).collect();
        let target_by_id: HashMap<&RecordId, &Record> =
            targets.iter().map(|record| (&record.id, record)).collect();

        let mut requests = Vec::with_capacity(pending.len());
        let mut escalated = Vec::with_capacity(pending.len());
        let mut unavailable = Vec::new();
        for &i in &pending {
            let result = &results[i];
            let pair = result.target_id.as_ref().and_then(|target_id| {
                Some((
                    *source_by_id.get(&result.source_id)?,
                    *target_by_id.get(target_id)?,
                ))
            });
            match (self.oracle.as_ref(), pair) {
                (Some(_), Some((source, target))) if self.arbitration_active() => {
                    requests.push(ArbitrationRequest {
                        record_a: source.clone(),
                        record_b: target.clone(),
                        signals: matcher.signals(source, target),
                        year_tolerance: matcher.year_tolerance(),
                    });
                    escalated.push(i);
                }
                _ => {
                    let result = &mut results[i];
                    result.confidence = ConfidenceTier::Low;
                    result.target_id = None;
                    result.rationale = format!("arbitration_unavailable; {}", result.rationale);
                    unavailable.push(result.clone());
                }
            }
        }
        if let (Some(checkpoint), false) = (&self.checkpoint, unavailable.is_empty()) {
            checkpoint.upsert(&unavailable)?;
        }

        if let (Some(oracle), false) = (self.oracle.as_ref(), requests.is_empty()) {
            let arbiter = Arbiter::new(Arc::clone(oracle), &self.config.arbitration);
            info!(pairs = requests.len(), oracle = arbiter.oracle_name(), "arbitrating ambiguous pairs");

            let sink = Arc::new(DecidedSink {
                checkpoint: self.checkpoint.clone(),
                pending: escalated.iter().map(|&i| results[i].clone()).collect(),
                every: self.config.checkpoint.every.max(1),
                buffer: Mutex::new(Vec::new()),
            });
            let recorder = Arc::clone(&sink);
            let outcomes = arbiter
                .arbitrate_all_with(requests, move |i, outcome| recorder.record(i, outcome))
                .await?;
            sink.flush()?;

            for (&i, outcome) in escalated.iter().zip(&outcomes) {
                results[i] = apply_outcome(&results[i], outcome);
            }
        }

        let mut stats = MatchStats::from_results(&results, stats.resumed);
        stats.arbitration_disabled = arbitration_disabled;
        info!(
            arbitrated = stats.arbitrated,
            high = stats.tier_count(ConfidenceTier::High),
            medium = stats.tier_count(ConfidenceTier::Medium),
            low = stats.tier_count(ConfidenceTier::Low),
            "arbitration complete"
        );
        Ok(MatchOutcome { results, stats })
    }

    /// Arbitration was requested but no oracle could be built.
    fn arbitration_disabled(&self) -> bool {
        self.config.use_arbitration && self.oracle.is_none()
    }
}

/// Checkpoints arbitrated results in chunks of `every` as they are decided.
struct DecidedSink {
    checkpoint: Option<Arc<dyn Checkpoint>>,
    /// Pending results, indexed like the arbitration requests
    pending: Vec<MatchResult>,
    every: usize,
    buffer: Mutex<Vec<MatchResult>>,
}

impl DecidedSink {
    fn record(&self, i: usize, outcome: &ArbitrationOutcome) -> Result<(), CheckpointError> {
        let Some(checkpoint) = &self.checkpoint else {
            return Ok(());
        };
        let ready = {
            let mut buffer = self.buffer.lock();
            buffer.push(apply_outcome(&self.pending[i], outcome));
            if buffer.len() < self.every {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };
        checkpoint.upsert(&ready)
    }

    fn flush(&self) -> Result<(), CheckpointError> {
        let ready = std::mem::take(&mut *self.buffer.lock());
        match (&self.checkpoint, ready.is_empty()) {
            (Some(checkpoint), false) => checkpoint.upsert(&ready),
            _ => Ok(()),
        }
    }
}
