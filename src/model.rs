//! # Data Model
//!
//! Core data structures for bibliographic entity resolution.
//! Raw records, their derived blocking/scoring keys, similarity vectors,
//! confidence tiers and match results.

use crate::normalize::{self, YearBounds};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-scoped opaque identifier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Tag identifying the catalog a record came from (e.g. "ustc", "istc", "ia").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub String);

impl CatalogId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dense index of a record inside one resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordIdx(pub u32);

impl RecordIdx {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RecordIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a duplicate cluster (local to one dedup run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u32);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// One bibliographic entry as supplied by the normalization stage.
///
/// Only raw fields are stored. Every derived key (normalized title,
/// surname, significant words) is recomputed from these fields by
/// [`PreparedRecord::prepare`], so the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub place: Option<String>,
    pub source_catalog: CatalogId,
}

impl Record {
    /// Create a record with the mandatory fields.
    pub fn new(
        id: impl Into<String>,
        source_catalog: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId(id.into()),
            title: title.into(),
            author: None,
            year: None,
            place: None,
            source_catalog: CatalogId(source_catalog.into()),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    /// Normalized title, derived on demand.
    pub fn title_normalized(&self) -> String {
        normalize::normalize_title(&self.title)
    }

    /// Surname extracted from the author string.
    pub fn author_surname(&self) -> Option<String> {
        self.author.as_deref().and_then(normalize::extract_surname)
    }

    /// Number of populated descriptive fields (title, author, year, place).
    pub fn populated_fields(&self) -> usize {
        let mut count = 0;
        if !self.title.trim().is_empty() {
            count += 1;
        }
        if self.author.as_deref().is_some_and(|a| !a.trim().is_empty()) {
            count += 1;
        }
        if self.year.is_some() {
            count += 1;
        }
        if self.place.as_deref().is_some_and(|p| !p.trim().is_empty()) {
            count += 1;
        }
        count
    }

    /// Combined length of the title and author strings, used as a completeness tiebreaker.
    pub fn text_length(&self) -> usize {
        self.title.trim().chars().count()
            + self
                .author
                .as_deref()
                .map(|a| a.trim().chars().count())
                .unwrap_or(0)
    }
}

/// A record together with its derived comparison keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub record: Record,
    pub title_normalized: String,
    pub significant_words: Vec<String>,
    pub surname: Option<String>,
    /// Year, or `None` when missing or outside the plausible range.
    pub year: Option<i32>,
}

impl PreparedRecord {
    pub fn prepare(record: &Record, bounds: YearBounds) -> Self {
        let title_normalized = normalize::normalize_title(&record.title);
        let significant_words = normalize::significant_words(&record.title);
        Self {
            surname: record.author_surname(),
            year: record.year.filter(|year| bounds.contains(*year)),
            title_normalized,
            significant_words,
            record: record.clone(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.record.id
    }

    pub fn has_title(&self) -> bool {
        !self.title_normalized.is_empty()
    }

    /// True when the record has neither a usable title nor a usable year.
    pub fn is_incomparable(&self) -> bool {
        !self.has_title() && self.year.is_none()
    }
}

/// Multi-signal comparison of two records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityVector {
    /// Token-set title ratio (0–100); `None` when either title is empty.
    pub title_score: Option<f64>,
    /// Surname ratio (0–100); `None` when either surname is missing.
    pub author_similarity: Option<f64>,
    pub author_match: bool,
    /// Absolute year difference; `None` when either year is missing.
    pub year_diff: Option<u32>,
    pub year_match: bool,
    /// Cosine similarity of title embeddings (0–1).
    pub semantic_score: Option<f64>,
}

impl SimilarityVector {
    /// Title evidence on the 0–100 scale: the better of the fuzzy and semantic signals.
    pub fn title_strength(&self) -> f64 {
        let fuzzy = self.title_score.unwrap_or(0.0);
        let semantic = self.semantic_score.map(|s| s * 100.0).unwrap_or(0.0);
        fuzzy.max(semantic)
    }

    /// True when the semantic signal carried the title evidence.
    pub fn semantic_dominates(&self) -> bool {
        match self.semantic_score {
            Some(semantic) => semantic * 100.0 >= self.title_score.unwrap_or(0.0),
            None => false,
        }
    }

    /// Number of agreeing metadata signals (author, year).
    pub fn corroboration(&self) -> u8 {
        u8::from(self.author_match) + u8::from(self.year_match)
    }
}

/// Discrete confidence classification of a candidate match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    NeedsArbitration,
    NoMatch,
}

impl ConfidenceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
            ConfidenceTier::NeedsArbitration => "needs_arbitration",
            ConfidenceTier::NoMatch => "no_match",
        }
    }

    /// Whether a result in this tier names an accepted target.
    pub fn is_accepted(self) -> bool {
        matches!(self, ConfidenceTier::High | ConfidenceTier::Medium)
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a match result was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMethod {
    #[serde(rename = "blocking+fuzzy")]
    BlockingFuzzy,
    #[serde(rename = "embedding")]
    Embedding,
    #[serde(rename = "probabilistic")]
    Probabilistic,
    #[serde(rename = "llm-arbitrated")]
    LlmArbitrated,
}

impl MatchMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMethod::BlockingFuzzy => "blocking+fuzzy",
            MatchMethod::Embedding => "embedding",
            MatchMethod::Probabilistic => "probabilistic",
            MatchMethod::LlmArbitrated => "llm-arbitrated",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oracle verdict on an ambiguous pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    SameEdition,
    SameWork,
    Different,
}

impl Verdict {
    pub fn is_match(self) -> bool {
        !matches!(self, Verdict::Different)
    }
}

/// Outcome of cross-catalog resolution for one source record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub source_id: RecordId,
    pub target_id: Option<RecordId>,
    pub confidence: ConfidenceTier,
    pub method: MatchMethod,
    pub title_similarity: f64,
    pub author_match: bool,
    pub year_match: bool,
    #[serde(default)]
    pub semantic_score: Option<f64>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    pub rationale: String,
}

impl MatchResult {
    /// Result for a source record that produced no candidates at all.
    pub fn no_candidates(source_id: RecordId) -> Self {
        Self {
            source_id,
            target_id: None,
            confidence: ConfidenceTier::NoMatch,
            method: MatchMethod::BlockingFuzzy,
            title_similarity: 0.0,
            author_match: false,
            year_match: false,
            semantic_score: None,
            verdict: None,
            rationale: "no_candidates".to_string(),
        }
    }
}
