// crates/core/src/history.rs

//! Append-only record of every generation in a run.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::population::{self, RankedCandidate};
use crate::types::{Candidate, CandidateId, FitnessScore, TerminationReason};

/// Snapshot of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: u32,
    /// False when evaluation was interrupted. Incomplete generations never
    /// contribute to best-candidate selection.
    pub complete: bool,
    /// Every member, in the order the driver built them.
    pub population: Vec<Candidate>,
    /// Scores for members that were evaluated, including sentinels.
    pub scores: Vec<FitnessScore>,
    /// Evaluated members, best first.
    pub ranked: Vec<RankedCandidate>,
    /// Best rate over all complete generations up to and including this one.
    pub best_so_far: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
}

impl GenerationRecord {
    /// Build a record, ranking the population by the given scores.
    pub fn new(
        generation: u32,
        complete: bool,
        population: Vec<Candidate>,
        scores: &HashMap<CandidateId, FitnessScore>,
    ) -> Self {
        let ranked = population::rank(&population, scores);
        let scores = population
            .iter()
            .filter_map(|c| scores.get(c.id()).cloned())
            .collect();
        Self {
            generation,
            complete,
            population,
            scores,
            ranked,
            best_so_far: None,
            termination: None,
        }
    }

    pub fn best(&self) -> Option<&RankedCandidate> {
        self.ranked.first()
    }

    pub fn unevaluated(&self) -> usize {
        self.scores.iter().filter(|s| !s.fitness.is_evaluated()).count()
    }

    pub fn failed_trials(&self) -> usize {
        self.scores.iter().map(|s| s.failures).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationRecord {
    pub generation: u32,
    pub reason: TerminationReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    records: Vec<GenerationRecord>,
    termination: Option<TerminationRecord>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a generation, filling in its `best_so_far`.
    pub fn push(&mut self, mut record: GenerationRecord) -> &GenerationRecord {
        let previous = self.records.last().and_then(|r| r.best_so_far);
        let current = if record.complete {
            record.best().map(RankedCandidate::rate)
        } else {
            None
        };
        record.best_so_far = match (previous, current) {
            (Some(p), Some(c)) => Some(p.max(c)),
            (p, c) => p.or(c),
        };
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Record why the run stopped and tag the generation it stopped at.
    pub fn terminate(&mut self, generation: u32, reason: TerminationReason) {
        if let Some(record) = self.records.iter_mut().rev().find(|r| r.generation == generation) {
            record.termination = Some(reason);
        }
        self.termination = Some(TerminationRecord { generation, reason });
    }

    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&GenerationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn termination(&self) -> Option<TerminationRecord> {
        self.termination
    }

    /// `best_so_far` of every complete generation, in order.
    pub fn best_so_far_series(&self) -> Vec<Option<f64>> {
        self.records
            .iter()
            .filter(|r| r.complete)
            .map(|r| r.best_so_far)
            .collect()
    }

    /// The `n` best distinct candidates across all complete generations.
    ///
    /// A candidate scored in several generations appears once, with the
    /// score from the earliest one.
    pub fn global_best(&self, n: usize) -> Vec<RankedCandidate> {
        let mut seen = HashSet::new();
        let mut all: Vec<RankedCandidate> = self
            .records
            .iter()
            .filter(|r| r.complete)
            .flat_map(|r| r.ranked.iter())
            .filter(|r| seen.insert(r.candidate.id().to_string()))
            .cloned()
            .collect();
        all.sort_by(population::compare);
        all.truncate(n);
        all
    }

    /// Look up any candidate that has appeared in the run.
    pub fn candidate(&self, id: &str) -> Option<&Candidate> {
        self.records
            .iter()
            .flat_map(|r| r.population.iter())
            .find(|c| c.id() == id)
    }
}
