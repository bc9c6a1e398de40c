// crates/core/src/store.rs

//! Persistence of raw trial results.
//!
//! Trials are keyed by (candidate, query index): recording a pair again
//! replaces the earlier record, so a store never holds duplicates.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::SinkError;
use crate::types::{CandidateId, TrialResult};

pub const TRIALS_FILE: &str = "trials.jsonl";

type TrialKey = (CandidateId, usize);

/// Where the oracle records every trial it runs.
pub trait TrialSink: Send + Sync {
    fn record(&self, trial: &TrialResult) -> Result<(), SinkError>;

    /// Make everything recorded so far durable.
    fn checkpoint(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTrialStore {
    trials: Mutex<BTreeMap<TrialKey, TrialResult>>,
}

impl MemoryTrialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(&self) -> Vec<TrialResult> {
        lock(&self.trials).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.trials).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrialSink for MemoryTrialStore {
    fn record(&self, trial: &TrialResult) -> Result<(), SinkError> {
        lock(&self.trials).insert((trial.candidate_id.clone(), trial.query_index), trial.clone());
        Ok(())
    }
}

/// JSONL-backed store. `checkpoint` rewrites the file atomically.
#[derive(Debug)]
pub struct JsonlTrialStore {
    path: PathBuf,
    trials: Mutex<BTreeMap<TrialKey, TrialResult>>,
}

impl JsonlTrialStore {
    /// Open the store in `dir`, keeping any trials already on disk.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        let path = dir.join(TRIALS_FILE);

        let trials = if path.exists() {
            Self::load(&path)?
                .into_iter()
                .map(|t| ((t.candidate_id.clone(), t.query_index), t))
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            trials: Mutex::new(trials),
        })
    }

    /// Read a trials file back. Later records for the same pair win.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<TrialResult>, SinkError> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|e| io_error(path, e))?;

        let mut trials: BTreeMap<TrialKey, TrialResult> = BTreeMap::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| io_error(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let trial: TrialResult = serde_json::from_str(&line)?;
            trials.insert((trial.candidate_id.clone(), trial.query_index), trial);
        }
        Ok(trials.into_values().collect())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trials(&self) -> Vec<TrialResult> {
        lock(&self.trials).values().cloned().collect()
    }
}

impl TrialSink for JsonlTrialStore {
    fn record(&self, trial: &TrialResult) -> Result<(), SinkError> {
        lock(&self.trials).insert((trial.candidate_id.clone(), trial.query_index), trial.clone());
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), SinkError> {
        let trials = lock(&self.trials);
        let tmp = self.path.with_extension("jsonl.tmp");

        {
            let file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            for trial in trials.values() {
                serde_json::to_writer(&mut writer, trial)?;
                writer.write_all(b"\n").map_err(|e| io_error(&tmp, e))?;
            }
            writer.flush().map_err(|e| io_error(&tmp, e))?;
        }

        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> SinkError {
    SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}
