//! Parsing of free-text oracle responses into decisions.

use crate::model::Verdict;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence label attached to an oracle verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleConfidence {
    High,
    Medium,
    Low,
}

impl OracleConfidence {
    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for OracleConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        })
    }
}

/// A parsed oracle decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleDecision {
    pub verdict: Verdict,
    pub confidence: OracleConfidence,
    pub reasoning: String,
    /// False when the response could not be understood
    pub parsed: bool,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    verdict: String,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn parse_verdict(label: &str) -> Option<Verdict> {
    let label = label.trim().to_ascii_uppercase().replace(|c: char| c == ' ' || c == '-', "_");
    match label.as_str() {
        "SAME_EDITION" => Some(Verdict::SameEdition),
        "SAME_WORK" => Some(Verdict::SameWork),
        "DIFFERENT" => Some(Verdict::Different),
        _ => None,
    }
}

/// First JSON value starting at `start`, ignoring any text after it.
fn decode_at(text: &str, start: usize) -> Option<RawDecision> {
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<RawDecision>()
        .next()?
        .ok()
}

/// Extract a decision from the first JSON object in `text` that carries a
/// known verdict. Fields besides verdict, confidence and reasoning are
/// ignored, nested or not. Anything else yields `DIFFERENT` with low
/// confidence and the raw text as reasoning.
pub fn parse_response(text: &str) -> OracleDecision {
    for (start, _) in text.match_indices('{') {
        let Some(raw) = decode_at(text, start) else {
            continue;
        };
        let Some(verdict) = parse_verdict(&raw.verdict) else {
            continue;
        };
        return OracleDecision {
            verdict,
            confidence: raw
                .confidence
                .as_deref()
                .and_then(OracleConfidence::parse)
                .unwrap_or(OracleConfidence::Low),
            reasoning: raw.reasoning.unwrap_or_default(),
            parsed: true,
        };
    }

    OracleDecision {
        verdict: Verdict::Different,
        confidence: OracleConfidence::Low,
        reasoning: format!("could not parse oracle response: {}", text.trim()),
        parsed: false,
    }
}
