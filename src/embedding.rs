//! # Title Embeddings
//!
//! Precomputed title embeddings keyed by catalog and record id, a flat
//! cosine nearest-neighbour index over one catalog, and a
//! [`SignalProvider`] that adds the semantic signal on top of the fuzzy ones.

use crate::model::{CatalogId, PreparedRecord, Record, RecordId, RecordIdx};
use crate::similarity::{FuzzySignals, SignalProvider};
use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use serde::Deserialize;
use std::io::BufRead;
use std::sync::Arc;

/// Unit-normalized embeddings of a fixed dimension.
///
/// Ids are only unique within their catalog, so vectors are stored per
/// catalog and two catalogs may embed the same id differently.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    dimension: Option<usize>,
    vectors: HashMap<CatalogId, HashMap<RecordId, Vec<f32>>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingLine {
    source_catalog: CatalogId,
    id: RecordId,
    vector: Vec<f32>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `{"source_catalog": ..., "id": ..., "vector": [...]}` JSON Lines.
    pub fn from_jsonl(reader: impl BufRead) -> Result<Self> {
        let mut store = Self::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: EmbeddingLine = serde_json::from_str(&line)
                .with_context(|| format!("invalid embedding on line {}", line_no + 1))?;
            store.insert(entry.source_catalog, entry.id, entry.vector)?;
        }
        Ok(store)
    }

    /// Store a vector. All vectors must share one dimension; zero vectors are rejected.
    pub fn insert(&mut self, catalog: CatalogId, id: RecordId, mut vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            bail!("empty embedding for {catalog}/{id}");
        }
        match self.dimension {
            Some(dim) if dim != vector.len() => {
                bail!(
                    "embedding for {catalog}/{id} has dimension {}, expected {dim}",
                    vector.len()
                );
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if !norm.is_finite() || norm == 0.0 {
            bail!("embedding for {catalog}/{id} has no direction");
        }
        vector.iter_mut().for_each(|v| *v /= norm);
        self.vectors.entry(catalog).or_default().insert(id, vector);
        Ok(())
    }

    pub fn get(&self, catalog: &CatalogId, id: &RecordId) -> Option<&[f32]> {
        self.vectors.get(catalog)?.get(id).map(Vec::as_slice)
    }

    /// Embedding of a record, looked up in its own catalog.
    pub fn vector_of(&self, record: &Record) -> Option<&[f32]> {
        self.get(&record.source_catalog, &record.id)
    }

    pub fn len(&self) -> usize {
        self.vectors.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Cosine similarity of two records' stored embeddings.
    pub fn cosine(&self, a: &Record, b: &Record) -> Option<f64> {
        Some(dot(self.vector_of(a)?, self.vector_of(b)?))
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Flat nearest-neighbour index over the embedded records of one catalog.
#[derive(Debug, Clone)]
pub struct NeighborIndex {
    store: Arc<EmbeddingStore>,
    rows: Vec<(RecordIdx, CatalogId, RecordId)>,
}

impl NeighborIndex {
    /// Index the records that have an embedding; others are skipped.
    pub fn build(store: Arc<EmbeddingStore>, records: &[PreparedRecord]) -> Self {
        let rows = records
            .iter()
            .enumerate()
            .filter(|(_, prepared)| store.vector_of(&prepared.record).is_some())
            .map(|(i, prepared)| {
                (
                    RecordIdx(i as u32),
                    prepared.record.source_catalog.clone(),
                    prepared.record.id.clone(),
                )
            })
            .collect();
        Self { store, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Top-`k` neighbours of `query`'s embedding, best first (ties by index).
    pub fn nearest(&self, query: &Record, k: usize) -> Vec<(RecordIdx, f64)> {
        let Some(query) = self.store.vector_of(query) else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(RecordIdx, f64)> = self
            .rows
            .iter()
            .filter_map(|(idx, catalog, id)| {
                self.store.get(catalog, id).map(|v| (*idx, dot(query, v)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}

/// Fuzzy signals plus cosine similarity of title embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingSignals {
    fuzzy: FuzzySignals,
    store: Arc<EmbeddingStore>,
}

impl EmbeddingSignals {
    pub fn new(store: Arc<EmbeddingStore>) -> Self {
        Self {
            fuzzy: FuzzySignals,
            store,
        }
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }
}

impl SignalProvider for EmbeddingSignals {
    fn title_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64> {
        self.fuzzy.title_signal(a, b)
    }

    fn author_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64> {
        self.fuzzy.author_signal(a, b)
    }

    fn semantic_signal(&self, a: &PreparedRecord, b: &PreparedRecord) -> Option<f64> {
        self.store.cosine(&a.record, &b.record)
    }

    fn name(&self) -> &'static str {
        "embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::YearBounds;

    fn key(catalog: &str, id: &str) -> (CatalogId, RecordId) {
        (CatalogId::new(catalog), RecordId::new(id))
    }

    fn store() -> EmbeddingStore {
        let mut store = EmbeddingStore::new();
        for (id, vector) in [
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![2.0, 2.0, 0.0]),
            ("c", vec![0.0, 0.0, 3.0]),
        ] {
            let (catalog, id) = key("ia", id);
            store.insert(catalog, id, vector).unwrap();
        }
        store
    }

    fn record(catalog: &str, id: &str) -> Record {
        Record::new(id, catalog, "t")
    }

    #[test]
    fn test_cosine_is_normalized() {
        let store = store();
        let cos = store.cosine(&record("ia", "a"), &record("ia", "b")).unwrap();
        assert!((cos - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(store.cosine(&record("ia", "a"), &record("ia", "zz")), None);
    }

    #[test]
    fn test_rejects_bad_vectors() {
        let mut store = store();
        let (catalog, id) = key("ia", "d");
        assert!(store.insert(catalog, id, vec![1.0, 2.0]).is_err());
        let (catalog, id) = key("ia", "e");
        assert!(store.insert(catalog, id, vec![0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_same_id_in_two_catalogs_keeps_both_vectors() {
        let mut store = EmbeddingStore::new();
        let (catalog, id) = key("bph", "1");
        store.insert(catalog, id, vec![1.0, 0.0]).unwrap();
        let (catalog, id) = key("ia", "1");
        store.insert(catalog, id, vec![0.0, 1.0]).unwrap();

        assert_eq!(store.len(), 2);
        let cos = store.cosine(&record("bph", "1"), &record("ia", "1")).unwrap();
        assert!(cos.abs() < 1e-9);
        assert_eq!(store.vector_of(&record("ustc", "1")), None);
    }

    #[test]
    fn test_nearest_orders_by_cosine() {
        let store = Arc::new(store());
        let records: Vec<PreparedRecord> = ["c", "b", "a", "missing"]
            .iter()
            .map(|id| PreparedRecord::prepare(&record("ia", id), YearBounds::default()))
            .collect();
        let index = NeighborIndex::build(store, &records);
        assert_eq!(index.len(), 3);

        let nearest = index.nearest(&record("ia", "a"), 2);
        assert_eq!(nearest.len(), 2);
        assert_eq!(nearest[0].0, RecordIdx(2));
        assert_eq!(nearest[1].0, RecordIdx(1));
        assert!(index.nearest(&record("bph", "a"), 2).is_empty());
    }

    #[test]
    fn test_from_jsonl() {
        let input = concat!(
            "{\"source_catalog\":\"bph\",\"id\":\"x\",\"vector\":[0.5,0.5]}\n\n",
            "{\"source_catalog\":\"ia\",\"id\":\"x\",\"vector\":[1,0]}\n",
        );
        let store = EmbeddingStore::from_jsonl(input.as_bytes()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.dimension(), Some(2));
        assert!(EmbeddingStore::from_jsonl("{\"id\":\"x\",\"vector\":[1]}".as_bytes()).is_err());
    }
}
