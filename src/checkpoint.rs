//! # Checkpointing
//!
//! Upsert-by-source-id storage of decided match results, so an interrupted
//! cross-catalog run can resume where it stopped. Re-emitting a result for
//! the same source id replaces the earlier one.

use crate::model::{MatchResult, RecordId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("checkpoint snapshot version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Store of decided match results keyed by source id.
pub trait Checkpoint: Send + Sync {
    /// Every stored result, in source id order.
    fn load(&self) -> Result<Vec<MatchResult>, CheckpointError>;

    /// Insert or replace results by source id and make them durable.
    fn upsert(&self, results: &[MatchResult]) -> Result<(), CheckpointError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    results: Vec<MatchResult>,
}

/// Snapshot file written with bincode and atomically renamed into place.
#[derive(Debug)]
pub struct FileCheckpoint {
    path: PathBuf,
    results: Mutex<BTreeMap<RecordId, MatchResult>>,
}

impl FileCheckpoint {
    /// Open a checkpoint file, reading the existing snapshot if there is one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let results = if path.exists() {
            read_snapshot(&path)?
                .into_iter()
                .map(|result| (result.source_id.clone(), result))
                .collect()
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), stored = results.len(), "checkpoint opened");
        Ok(Self {
            path,
            results: Mutex::new(results),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<MatchResult>, CheckpointError> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: Snapshot = bincode::deserialize_from(reader)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(CheckpointError::Version {
            found: snapshot.version,
            expected: SNAPSHOT_VERSION,
        });
    }
    Ok(snapshot.results)
}

fn write_snapshot(path: &Path, results: Vec<MatchResult>) -> Result<(), CheckpointError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        bincode::serialize_into(
            &mut writer,
            &Snapshot {
                version: SNAPSHOT_VERSION,
                results,
            },
        )?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl Checkpoint for FileCheckpoint {
    fn load(&self) -> Result<Vec<MatchResult>, CheckpointError> {
        Ok(self.results.lock().values().cloned().collect())
    }

    fn upsert(&self, results: &[MatchResult]) -> Result<(), CheckpointError> {
        let mut stored = self.results.lock();
        for result in results {
            stored.insert(result.source_id.clone(), result.clone());
        }
        write_snapshot(&self.path, stored.values().cloned().collect())?;
        debug!(path = %self.path.display(), stored = stored.len(), "checkpoint flushed");
        Ok(())
    }
}

/// In-memory checkpoint.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    results: Mutex<BTreeMap<RecordId, MatchResult>>,
    flushes: Mutex<usize>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated checkpoint, as left behind by an interrupted run.
    pub fn with_results(results: impl IntoIterator<Item = MatchResult>) -> Self {
        let checkpoint = Self::new();
        {
            let mut stored = checkpoint.results.lock();
            for result in results {
                stored.insert(result.source_id.clone(), result);
            }
        }
        checkpoint
    }

    /// Number of upsert calls so far.
    pub fn flushes(&self) -> usize {
        *self.flushes.lock()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

impl Checkpoint for MemoryCheckpoint {
    fn load(&self) -> Result<Vec<MatchResult>, CheckpointError> {
        Ok(self.results.lock().values().cloned().collect())
    }

    fn upsert(&self, results: &[MatchResult]) -> Result<(), CheckpointError> {
        let mut stored = self.results.lock();
        for result in results {
            stored.insert(result.source_id.clone(), result.clone());
        }
        *self.flushes.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConfidenceTier, MatchMethod, Verdict};
    use tempfile::tempdir;

    fn result(source: &str, target: Option<&str>, tier: ConfidenceTier) -> MatchResult {
        MatchResult {
            source_id: RecordId::new(source),
            target_id: target.map(RecordId::new),
            confidence: tier,
            method: MatchMethod::BlockingFuzzy,
            title_similarity: 91.5,
            author_match: true,
            year_match: false,
            semantic_score: None,
            verdict: None,
            rationale: "title=91.5".to_string(),
        }
    }

    #[test]
    fn test_file_checkpoint_persists_and_upserts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("match.ckpt");

        let checkpoint = FileCheckpoint::open(&path).unwrap();
        assert!(checkpoint.is_empty());
        checkpoint
            .upsert(&[
                result("b", Some("t1"), ConfidenceTier::High),
                result("a", None, ConfidenceTier::NoMatch),
            ])
            .unwrap();

        let mut arbitrated = result("b", Some("t2"), ConfidenceTier::Medium);
        arbitrated.method = MatchMethod::LlmArbitrated;
        arbitrated.verdict = Some(Verdict::SameWork);
        arbitrated.semantic_score = Some(0.8);
        checkpoint.upsert(&[arbitrated.clone()]).unwrap();

        let reopened = FileCheckpoint::open(&path).unwrap();
        let stored = reopened.load().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].source_id, RecordId::new("a"));
        assert_eq!(stored[1], arbitrated);
    }

    #[test]
    fn test_file_checkpoint_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.ckpt");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(FileCheckpoint::open(&path).is_err());
    }

    #[test]
    fn test_memory_checkpoint_counts_flushes() {
        let checkpoint = MemoryCheckpoint::new();
        checkpoint.upsert(&[result("a", None, ConfidenceTier::Low)]).unwrap();
        checkpoint.upsert(&[result("a", Some("t"), ConfidenceTier::High)]).unwrap();
        assert_eq!(checkpoint.flushes(), 2);
        assert_eq!(checkpoint.len(), 1);
        assert_eq!(checkpoint.load().unwrap()[0].confidence, ConfidenceTier::High);
    }
}
