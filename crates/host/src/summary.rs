// crates/host/src/summary.rs

//! Offline summary of a finished (or interrupted) run directory.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};

use toolpref_core::history::GenerationRecord;
use toolpref_core::sink::{load_generations, GENERATIONS_FILE};
use toolpref_core::store::{JsonlTrialStore, TRIALS_FILE};
use toolpref_core::types::{Strategy, TrialOutcome, TrialResult};

use crate::log;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyStats {
    pub candidates: usize,
    /// Completed trials.
    pub trials: usize,
    pub chosen: usize,
    pub failures: usize,
}

impl StrategyStats {
    pub fn rate(&self) -> Option<f64> {
        (self.trials > 0).then(|| self.chosen as f64 / self.trials as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStats {
    pub generation: u32,
    pub complete: bool,
    pub evaluated: usize,
    pub best: Option<f64>,
    pub mean: Option<f64>,
    pub best_so_far: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub strategies: BTreeMap<Strategy, StrategyStats>,
    pub generations: Vec<GenerationStats>,
    /// Trials whose candidate appears in no generation record.
    pub orphan_trials: usize,
}

/// Read `trials.jsonl` and `generations.jsonl` from a run directory.
pub fn summarize(dir: &Path) -> Result<RunSummary> {
    let generations = load_generations(dir.join(GENERATIONS_FILE))
        .with_context(|| format!("failed to read {} in {}", GENERATIONS_FILE, dir.display()))?;
    let trials = JsonlTrialStore::load(dir.join(TRIALS_FILE))
        .with_context(|| format!("failed to read {} in {}", TRIALS_FILE, dir.display()))?;
    Ok(build(&generations, &trials))
}

pub fn build(generations: &[GenerationRecord], trials: &[TrialResult]) -> RunSummary {
    let strategy_of: HashMap<&str, Strategy> = generations
        .iter()
        .flat_map(|r| r.population.iter())
        .map(|c| (c.id(), c.strategy()))
        .collect();

    let mut summary = RunSummary::default();
    for strategy in strategy_of.values() {
        summary.strategies.entry(*strategy).or_default().candidates += 1;
    }

    for trial in trials {
        let Some(strategy) = strategy_of.get(trial.candidate_id.as_str()) else {
            summary.orphan_trials += 1;
            continue;
        };
        let stats = summary.strategies.entry(*strategy).or_default();
        match &trial.outcome {
            TrialOutcome::Chosen { service_id } => {
                stats.trials += 1;
                if service_id == &trial.candidate_id {
                    stats.chosen += 1;
                }
            }
            TrialOutcome::NoChoice => stats.trials += 1,
            TrialOutcome::Failed { .. } => stats.failures += 1,
        }
    }

    summary.generations = generations
        .iter()
        .map(|record| {
            let rates: Vec<f64> = record.ranked.iter().map(|r| r.rate()).collect();
            GenerationStats {
                generation: record.generation,
                complete: record.complete,
                evaluated: rates.len(),
                best: rates.first().copied(),
                mean: (!rates.is_empty()).then(|| rates.iter().sum::<f64>() / rates.len() as f64),
                best_so_far: record.best_so_far,
            }
        })
        .collect();

    summary
}

pub fn print(summary: &RunSummary) {
    log::section("Preference by strategy");
    for (strategy, stats) in &summary.strategies {
        let rate = stats.rate().map(log::format_rate).unwrap_or_else(|| "-".to_string());
        log::row(
            strategy.as_str(),
            &format!(
                "{:>7}  chosen {}/{} trials, {} failed, {} candidates",
                rate, stats.chosen, stats.trials, stats.failures, stats.candidates
            ),
        );
    }
    if summary.orphan_trials > 0 {
        log::warn(&format!("{} trials belong to no recorded generation", summary.orphan_trials));
    }

    log::section("Fitness by generation");
    let fmt = |rate: Option<f64>| rate.map(log::format_rate).unwrap_or_else(|| "-".to_string());
    for g in &summary.generations {
        log::row(
            &format!("generation {}{}", g.generation, if g.complete { "" } else { " (incomplete)" }),
            &format!(
                "best {:>7}  mean {:>7}  best so far {:>7}  ({} evaluated)",
                fmt(g.best),
                fmt(g.mean),
                fmt(g.best_so_far),
                g.evaluated
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use toolpref_core::types::{Candidate, FitnessScore, Origin};

    use super::*;

    fn trial(candidate: &str, query_index: usize, outcome: TrialOutcome) -> TrialResult {
        TrialResult {
            candidate_id: candidate.to_string(),
            query_index,
            query: format!("q{}", query_index),
            competitors: vec!["weather-competitor-1".to_string()],
            outcome,
            raw: None,
            attempts: 1,
            recorded_at: Utc::now(),
        }
    }

    fn chosen(id: &str) -> TrialOutcome {
        TrialOutcome::Chosen {
            service_id: id.to_string(),
        }
    }

    fn fixture() -> (Vec<GenerationRecord>, Vec<TrialResult>) {
        let baseline = Candidate::baseline("cand-0000", "get-forecast", "Get forecast.").unwrap();
        let seed = Candidate::new(
            "cand-0001",
            "get-forecast",
            "Experts rely on it. Get forecast.",
            Strategy::Authority,
            0,
            Vec::new(),
            Origin::Seed,
        )
        .unwrap();

        let trials = vec![
            trial("cand-0000", 0, chosen("weather-competitor-1")),
            trial("cand-0000", 1, chosen("cand-0000")),
            trial("cand-0001", 0, chosen("cand-0001")),
            trial("cand-0001", 1, TrialOutcome::Failed { reason: "timeout".to_string() }),
            trial("cand-0099", 0, TrialOutcome::NoChoice),
        ];

        let scores: HashMap<_, _> = ["cand-0000", "cand-0001"]
            .into_iter()
            .map(|id| (id.to_string(), FitnessScore::from_trials(id, 0, &trials)))
            .collect();
        let record = GenerationRecord::new(0, true, vec![baseline, seed], &scores);
        (vec![record], trials)
    }

    #[test]
    fn test_build_counts_per_strategy() {
        let (generations, trials) = fixture();
        let summary = build(&generations, &trials);

        let none = &summary.strategies[&Strategy::None];
        assert_eq!((none.trials, none.chosen, none.failures), (2, 1, 0));
        assert_eq!(none.rate(), Some(0.5));

        let authority = &summary.strategies[&Strategy::Authority];
        assert_eq!((authority.trials, authority.chosen, authority.failures), (1, 1, 1));
        assert_eq!(summary.orphan_trials, 1);

        let g = &summary.generations[0];
        assert_eq!(g.best, Some(1.0));
        assert_eq!(g.mean, Some(0.75));
        assert_eq!(g.evaluated, 2);
    }

    #[test]
    fn test_summarize_reads_run_directory() {
        let (generations, trials) = fixture();
        let dir = tempfile::tempdir().unwrap();

        let lines: Vec<String> = generations.iter().map(|g| serde_json::to_string(g).unwrap()).collect();
        std::fs::write(dir.path().join(GENERATIONS_FILE), lines.join("\n")).unwrap();
        let lines: Vec<String> = trials.iter().map(|t| serde_json::to_string(t).unwrap()).collect();
        std::fs::write(dir.path().join(TRIALS_FILE), lines.join("\n")).unwrap();

        let summary = summarize(dir.path()).unwrap();
        assert_eq!(summary, build(&generations, &trials));
    }

    #[test]
    fn test_summarize_missing_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(summarize(dir.path()).is_err());
    }
}
