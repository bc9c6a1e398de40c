// crates/core/src/population.rs

//! Ranking, elitism, parent selection and the termination policy.

use std::cmp::Ordering;
use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{SearchConfig, SelectionScheme};
use crate::types::{Candidate, CandidateId, FitnessScore, TerminationReason};

/// An evaluated candidate with the score it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub score: FitnessScore,
}

impl RankedCandidate {
    /// Preference rate. Ranked candidates are always evaluated.
    pub fn rate(&self) -> f64 {
        self.score.rate().unwrap_or(0.0)
    }
}

/// Total order used for ranking: rate desc, generation asc, failures asc, id asc.
pub fn compare(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.rate()
        .total_cmp(&a.rate())
        .then_with(|| a.candidate.generation().cmp(&b.candidate.generation()))
        .then_with(|| a.score.failures.cmp(&b.score.failures))
        .then_with(|| a.candidate.id().cmp(b.candidate.id()))
}

/// Rank the evaluated members of a population, best first.
///
/// Candidates without a score, or with the unevaluated sentinel, are left out.
pub fn rank(
    population: &[Candidate],
    scores: &HashMap<CandidateId, FitnessScore>,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = population
        .iter()
        .filter_map(|candidate| {
            let score = scores.get(candidate.id())?;
            score.fitness.is_evaluated().then(|| RankedCandidate {
                candidate: candidate.clone(),
                score: score.clone(),
            })
        })
        .collect();
    ranked.sort_by(compare);
    ranked
}

/// The top `k` ranked candidates.
pub fn elites(ranked: &[RankedCandidate], k: usize) -> &[RankedCandidate] {
    &ranked[..k.min(ranked.len())]
}

/// Pick one parent from a ranked list. `None` only when `ranked` is empty.
///
/// Both schemes look at rank position only, never at the raw rate.
pub fn select_parent<'a, R: Rng + ?Sized>(
    ranked: &'a [RankedCandidate],
    scheme: SelectionScheme,
    rng: &mut R,
) -> Option<&'a RankedCandidate> {
    let n = ranked.len();
    if n <= 1 {
        return ranked.first();
    }

    let index = match scheme {
        SelectionScheme::RankRoulette { pressure } => {
            let weights = rank_weights(n, pressure);
            match WeightedIndex::new(&weights) {
                Ok(dist) => dist.sample(rng),
                Err(_) => rng.gen_range(0..n),
            }
        }
        SelectionScheme::Tournament { size } => {
            let entrants = size.clamp(1, n);
            rand::seq::index::sample(rng, n, entrants)
                .into_iter()
                .min()
                .unwrap_or(0)
        }
    };
    ranked.get(index)
}

/// Linear ranking weights, best rank first.
fn rank_weights(n: usize, pressure: f64) -> Vec<f64> {
    let span = (n - 1) as f64;
    (0..n)
        .map(|i| (2.0 - pressure) + 2.0 * (pressure - 1.0) * ((n - 1 - i) as f64) / span)
        .collect()
}

/// Stop conditions, checked after every evaluated generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminationPolicy {
    pub max_generations: u32,
    pub fitness_threshold: Option<f64>,
    pub stagnation_limit: Option<u32>,
}

impl TerminationPolicy {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            max_generations: config.max_generations,
            fitness_threshold: config.fitness_threshold,
            stagnation_limit: config.stagnation_limit,
        }
    }

    /// Decide whether to stop after `generation`.
    ///
    /// `best_so_far[g]` is the best rate observed over generations `0..=g`
    /// (`None` while nothing has been evaluated) and must end at `generation`.
    /// Threshold is checked first, then stagnation, then the generation cap.
    pub fn check(&self, generation: u32, best_so_far: &[Option<f64>]) -> Option<TerminationReason> {
        let best = best_so_far.last().copied().flatten();

        if let (Some(threshold), Some(best)) = (self.fitness_threshold, best) {
            if best >= threshold {
                return Some(TerminationReason::Threshold);
            }
        }

        if let Some(limit) = self.stagnation_limit {
            if stagnant_generations(best_so_far) >= limit {
                return Some(TerminationReason::Stagnation);
            }
        }

        if generation + 1 >= self.max_generations {
            return Some(TerminationReason::MaxGenerations);
        }

        None
    }
}

/// Consecutive trailing generations in which the best rate did not strictly improve.
pub fn stagnant_generations(best_so_far: &[Option<f64>]) -> u32 {
    let mut count = 0;
    for pair in best_so_far.windows(2).rev() {
        if improved(pair[0], pair[1]) {
            break;
        }
        count += 1;
    }
    count
}

fn improved(previous: Option<f64>, current: Option<f64>) -> bool {
    match (previous, current) {
        (None, Some(_)) => true,
        (Some(prev), Some(cur)) => cur > prev,
        _ => false,
    }
}
