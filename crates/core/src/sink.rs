// crates/core/src/sink.rs

//! Run-level result sinks: one record per generation plus a final report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::SinkError;
use crate::history::{GenerationRecord, RunHistory, TerminationRecord};
use crate::population::RankedCandidate;
use crate::store::io_error;
use crate::types::{Origin, Strategy};

pub const GENERATIONS_FILE: &str = "generations.jsonl";
pub const REPORT_FILE: &str = "report.json";

/// Final outcome of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Best distinct candidates across every complete generation, best first.
    pub best: Vec<RankedCandidate>,
    /// The unmodified baseline as scored in generation 0, if it was evaluated.
    pub baseline: Option<RankedCandidate>,
    pub termination: Option<TerminationRecord>,
    pub generations: usize,
    pub complete_generations: usize,
    /// Best rate reached by each strategy tag.
    pub strategy_best: BTreeMap<Strategy, f64>,
    pub seed: u64,
    pub query_fingerprint: String,
    pub finished_at: DateTime<Utc>,
}

impl SearchReport {
    pub fn from_history(history: &RunHistory, top: usize, seed: u64, query_fingerprint: u64) -> Self {
        let complete: Vec<&GenerationRecord> = history.records().iter().filter(|r| r.complete).collect();

        let mut strategy_best: BTreeMap<Strategy, f64> = BTreeMap::new();
        for ranked in complete.iter().flat_map(|r| r.ranked.iter()) {
            let entry = strategy_best.entry(ranked.candidate.strategy()).or_insert(0.0);
            *entry = entry.max(ranked.rate());
        }

        let baseline = complete
            .iter()
            .flat_map(|r| r.ranked.iter())
            .find(|r| r.candidate.origin() == Origin::Baseline)
            .cloned();

        Self {
            best: history.global_best(top),
            baseline,
            termination: history.termination(),
            generations: history.len(),
            complete_generations: complete.len(),
            strategy_best,
            seed,
            query_fingerprint: format!("{:016x}", query_fingerprint),
            finished_at: Utc::now(),
        }
    }

    pub fn champion(&self) -> Option<&RankedCandidate> {
        self.best.first()
    }
}

#[async_trait]
pub trait RunSink: Send + Sync {
    /// Called once per generation, complete or not.
    async fn generation(&self, record: &GenerationRecord) -> Result<(), SinkError>;

    async fn report(&self, report: &SearchReport) -> Result<(), SinkError>;
}

/// Writes `generations.jsonl` and `report.json` under a directory.
#[derive(Debug, Clone)]
pub struct JsonlRunSink {
    dir: PathBuf,
}

impl JsonlRunSink {
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RunSink for JsonlRunSink {
    async fn generation(&self, record: &GenerationRecord) -> Result<(), SinkError> {
        let path = self.dir.join(GENERATIONS_FILE);
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.write_all(&line).await.map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))
    }

    async fn report(&self, report: &SearchReport) -> Result<(), SinkError> {
        let path = self.dir.join(REPORT_FILE);
        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_error(&path, e))
    }
}

/// Keeps everything in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRunSink {
    generations: Mutex<Vec<GenerationRecord>>,
    report: Mutex<Option<SearchReport>>,
}

impl MemoryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generations(&self) -> Vec<GenerationRecord> {
        self.generations
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn report(&self) -> Option<SearchReport> {
        self.report.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl RunSink for MemoryRunSink {
    async fn generation(&self, record: &GenerationRecord) -> Result<(), SinkError> {
        if let Ok(mut generations) = self.generations.lock() {
            generations.push(record.clone());
        }
        Ok(())
    }

    async fn report(&self, report: &SearchReport) -> Result<(), SinkError> {
        if let Ok(mut slot) = self.report.lock() {
            *slot = Some(report.clone());
        }
        Ok(())
    }
}

/// Read a `generations.jsonl` file back.
pub fn load_generations(path: impl AsRef<Path>) -> Result<Vec<GenerationRecord>, SinkError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(SinkError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::{Candidate, Fitness, FitnessScore, TerminationReason};

    fn history() -> RunHistory {
        let baseline = Candidate::baseline("cand-0000", "get-forecast", "Get forecast.").unwrap();
        let seed = Candidate::new(
            "cand-0001",
            "get-forecast",
            "Trusted by experts. Get forecast.",
            Strategy::Authority,
            0,
            Vec::new(),
            Origin::Seed,
        )
        .unwrap();
        let scores: HashMap<_, _> = [("cand-0000", 0.25), ("cand-0001", 0.75)]
            .into_iter()
            .map(|(id, rate)| {
                (
                    id.to_string(),
                    FitnessScore {
                        candidate_id: id.to_string(),
                        fitness: Fitness::Measured(rate),
                        trials: 4,
                        chosen: (rate * 4.0) as usize,
                        failures: 0,
                        generation: 0,
                    },
                )
            })
            .collect();

        let mut history = RunHistory::new();
        history.push(GenerationRecord::new(0, true, vec![baseline, seed], &scores));
        history.terminate(0, TerminationReason::MaxGenerations);
        history
    }

    #[test]
    fn test_report_summarizes_history() {
        let report = SearchReport::from_history(&history(), 5, 42, 0xabc);
        assert_eq!(report.champion().unwrap().candidate.id(), "cand-0001");
        assert_eq!(report.baseline.as_ref().unwrap().rate(), 0.25);
        assert_eq!(report.strategy_best.get(&Strategy::Authority), Some(&0.75));
        assert_eq!(report.strategy_best.get(&Strategy::None), Some(&0.25));
        assert_eq!(report.query_fingerprint, "0000000000000abc");
        assert_eq!(report.complete_generations, 1);
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_generations_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlRunSink::create(dir.path().join("run")).await.unwrap();
        let history = history();

        sink.generation(&history.records()[0]).await.unwrap();
        sink.generation(&history.records()[0]).await.unwrap();
        sink.report(&SearchReport::from_history(&history, 3, 7, 1)).await.unwrap();

        let generations = load_generations(sink.dir().join(GENERATIONS_FILE)).unwrap();
        assert_eq!(generations.len(), 2);
        assert_eq!(generations[0], history.records()[0]);

        let report: SearchReport =
            serde_json::from_slice(&std::fs::read(sink.dir().join(REPORT_FILE)).unwrap()).unwrap();
        assert_eq!(report.seed, 7);
        assert_eq!(report.best.len(), 2);
    }
}
