use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use catalink::arbitration::{ArbitrationOracle, ArbitrationRequest, OracleError};
use catalink::{
    Checkpoint, ConfidenceTier, MatchMethod, MatchResult, MemoryCheckpoint, Record, RecordId,
    Resolver, ResolverConfig,
};
use parking_lot::Mutex;

/// Oracle replaying canned replies in order; errors once the script runs out.
#[allow(dead_code)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<ArbitrationRequest>>,
}

#[allow(dead_code)]
impl ScriptedOracle {
    pub fn new(replies: Vec<Result<String, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<ArbitrationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ArbitrationOracle for ScriptedOracle {
    async fn decide(&self, request: &ArbitrationRequest) -> Result<String, OracleError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Transport("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Oracle that always confirms, noting before each call how many
/// arbitrated results the checkpoint already holds.
#[allow(dead_code)]
pub struct CheckpointWatchingOracle {
    checkpoint: Arc<MemoryCheckpoint>,
    seen: Mutex<Vec<usize>>,
}

#[allow(dead_code)]
impl CheckpointWatchingOracle {
    pub fn new(checkpoint: Arc<MemoryCheckpoint>) -> Arc<Self> {
        Arc::new(Self {
            checkpoint,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ArbitrationOracle for CheckpointWatchingOracle {
    async fn decide(&self, _request: &ArbitrationRequest) -> Result<String, OracleError> {
        let arbitrated = self
            .checkpoint
            .load()
            .map_err(|e| OracleError::Transport(e.to_string()))?
            .iter()
            .filter(|result| result.method == MatchMethod::LlmArbitrated)
            .count();
        self.seen.lock().push(arbitrated);
        Ok(r#"{"verdict": "SAME_WORK", "confidence": "high", "reasoning": "same treatise"}"#.to_string())
    }

    fn name(&self) -> &str {
        "checkpoint-watching"
    }
}

/// A result left undecided by an interrupted run.
#[allow(dead_code)]
pub fn pending_result(source_id: &str, target_id: &str) -> MatchResult {
    MatchResult {
        source_id: RecordId::new(source_id),
        target_id: Some(RecordId::new(target_id)),
        confidence: ConfidenceTier::NeedsArbitration,
        method: MatchMethod::BlockingFuzzy,
        title_similarity: 70.0,
        author_match: false,
        year_match: false,
        semantic_score: None,
        verdict: None,
        rationale: "needs_arbitration: title=70.0".to_string(),
    }
}

/// Configuration with arbitration on and no rate-limit waits.
#[allow(dead_code)]
pub fn arbitration_config() -> ResolverConfig {
    let mut config = ResolverConfig::default();
    config.use_arbitration = true;
    config.arbitration.requests_per_second = 1000;
    config
}

#[allow(dead_code)]
pub fn resolver_with_oracle(config: ResolverConfig, oracle: Arc<ScriptedOracle>) -> Resolver {
    Resolver::new(config)
        .expect("valid config")
        .with_oracle(oracle)
}

/// A source/target pair whose titles agree only partly and which carry no
/// author or year, so the matcher cannot decide it alone.
#[allow(dead_code)]
pub fn ambiguous_pair() -> (Record, Record) {
    (
        Record::new("bph-1", "bph", "Pimander Mercurii Trismegisti"),
        Record::new("ia-1", "ia", "Asclepius Mercurii Trismegisti"),
    )
}

#[allow(dead_code)]
pub fn copernicus_pair() -> (Record, Record) {
    (
        Record::new("bph-7", "bph", "De revolutionibus orbium coelestium")
            .with_author("Copernicus, Nicolaus")
            .with_year(1543)
            .with_place("Norimbergae"),
        Record::new("ustc-7", "ustc", "DE REVOLVTIONIBVS ORBIVM COELESTIVM")
            .with_author("N. Copernicus")
            .with_year(1543),
    )
}
