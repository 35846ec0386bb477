//! # Arbitration Oracle Adapter
//!
//! Escalates ambiguous candidate pairs to an external reasoning service.
//! Calls run on a bounded worker pool behind a rate limiter, each with a
//! timeout and a retry budget. A failed call never aborts the batch: the
//! pair falls back to the deterministic `Low` tier.

mod http;
mod parse;
mod prompt;

pub use http::HttpOracle;
pub use parse::{parse_response, OracleConfidence, OracleDecision};
pub use prompt::render_prompt;

use crate::config::ArbitrationConfig;
use crate::model::{ConfidenceTier, MatchMethod, MatchResult, Record, SimilarityVector, Verdict};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use std::convert::Infallible;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle transport error: {0}")]
    Transport(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle response had no text content")]
    MissingContent,
    #[error("oracle not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Decision request for one ambiguous pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrationRequest {
    pub record_a: Record,
    pub record_b: Record,
    #[serde(rename = "computed_signals")]
    pub signals: SimilarityVector,
    /// Year window behind `signals.year_match`
    pub year_tolerance: u32,
}

/// External decision service for ambiguous pairs.
#[async_trait]
pub trait ArbitrationOracle: Send + Sync {
    /// Return the raw response text for a decision request.
    async fn decide(&self, request: &ArbitrationRequest) -> Result<String, OracleError>;

    fn name(&self) -> &str;
}

/// Result of arbitrating one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbitrationOutcome {
    Decided(OracleDecision),
    /// Every attempt failed; carries the last error
    Failed(String),
}

/// Runs oracle calls with bounded concurrency, rate limiting, timeout and retry.
#[derive(Clone)]
pub struct Arbiter {
    oracle: Arc<dyn ArbitrationOracle>,
    permits: Arc<Semaphore>,
    limiter: Arc<DefaultDirectRateLimiter>,
    timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("oracle", &self.oracle.name())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Arbiter {
    pub fn new(oracle: Arc<dyn ArbitrationOracle>, config: &ArbitrationConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            oracle,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Arbitrate one pair. Malformed responses are decided (as `DIFFERENT`)
    /// and not retried; transport errors and timeouts are.
    pub async fn arbitrate(&self, request: &ArbitrationRequest) -> ArbitrationOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return pool_closed();
        };
        self.call_with_retry(request).await
    }

    async fn call_with_retry(&self, request: &ArbitrationRequest) -> ArbitrationOutcome {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            self.limiter.until_ready().await;
            let call = tokio::time::timeout(self.timeout, self.oracle.decide(request)).await;
            let error = match call {
                Ok(Ok(text)) => {
                    let decision = parse_response(&text);
                    debug!(
                        source_id = %request.record_a.id,
                        target_id = %request.record_b.id,
                        verdict = ?decision.verdict,
                        parsed = decision.parsed,
                        "oracle decided"
                    );
                    return ArbitrationOutcome::Decided(decision);
                }
                Ok(Err(e)) => e,
                Err(_) => OracleError::Timeout(self.timeout),
            };
            warn!(
                source_id = %request.record_a.id,
                target_id = %request.record_b.id,
                attempt,
                error = %error,
                "oracle call failed"
            );
            last_error = error.to_string();
        }
        ArbitrationOutcome::Failed(last_error)
    }

    /// Arbitrate many pairs concurrently; outcomes are in request order.
    pub async fn arbitrate_all(&self, requests: Vec<ArbitrationRequest>) -> Vec<ArbitrationOutcome> {
        match self
            .arbitrate_all_with(requests, |_, _| Ok::<(), Infallible>(()))
            .await
        {
            Ok(outcomes) => outcomes,
            Err(never) => match never {},
        }
    }

    /// Like [`Arbiter::arbitrate_all`], handing each outcome to `on_decided`
    /// (with its request index) while the worker slot is still held.
    ///
    /// The first error from `on_decided` stops the batch and aborts the
    /// calls still in flight.
    pub async fn arbitrate_all_with<F, E>(
        &self,
        requests: Vec<ArbitrationRequest>,
        on_decided: F,
    ) -> Result<Vec<ArbitrationOutcome>, E>
    where
        F: Fn(usize, &ArbitrationOutcome) -> Result<(), E> + Send + Sync + 'static,
        E: Send + 'static,
    {
        let on_decided = Arc::new(on_decided);
        let mut outcomes: Vec<Option<ArbitrationOutcome>> = vec![None; requests.len()];
        let mut tasks = JoinSet::new();
        for (i, request) in requests.into_iter().enumerate() {
            let arbiter = self.clone();
            let on_decided = Arc::clone(&on_decided);
            tasks.spawn(async move {
                let Ok(_permit) = arbiter.permits.acquire().await else {
                    let outcome = pool_closed();
                    let recorded = on_decided(i, &outcome);
                    return (i, outcome, recorded);
                };
                let outcome = arbiter.call_with_retry(&request).await;
                let recorded = on_decided(i, &outcome);
                (i, outcome, recorded)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, outcome, recorded)) => {
                    recorded?;
                    outcomes[i] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "arbitration task failed"),
            }
        }
        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    ArbitrationOutcome::Failed("arbitration task failed".to_string())
                })
            })
            .collect())
    }
}

fn pool_closed() -> ArbitrationOutcome {
    ArbitrationOutcome::Failed("arbitration pool closed".to_string())
}

/// Apply an arbitration outcome to a pending `NeedsArbitration` result.
pub fn apply_outcome(pending: &MatchResult, outcome: &ArbitrationOutcome) -> MatchResult {
    let mut result = pending.clone();
    match outcome {
        ArbitrationOutcome::Decided(decision) => {
            result.method = MatchMethod::LlmArbitrated;
            result.verdict = Some(decision.verdict);
            result.rationale = format!(
                "{}; oracle confidence {}: {}",
                verdict_label(decision.verdict),
                decision.confidence,
                decision.reasoning
            );
            result.confidence = match (decision.verdict, decision.confidence) {
                (Verdict::Different, OracleConfidence::High) => ConfidenceTier::NoMatch,
                (Verdict::Different, _) => ConfidenceTier::Low,
                (_, OracleConfidence::High) => ConfidenceTier::High,
                (_, OracleConfidence::Medium) => ConfidenceTier::Medium,
                (_, OracleConfidence::Low) => ConfidenceTier::Low,
            };
            if !result.confidence.is_accepted() {
                result.target_id = None;
            }
        }
        ArbitrationOutcome::Failed(error) => {
            result.confidence = ConfidenceTier::Low;
            result.target_id = None;
            result.rationale = format!("arbitration_failed: {error}; {}", pending.rationale);
        }
    }
    result
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::SameEdition => "SAME_EDITION",
        Verdict::SameWork => "SAME_WORK",
        Verdict::Different => "DIFFERENT",
    }
}
