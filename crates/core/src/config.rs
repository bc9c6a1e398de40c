// crates/core/src/config.rs

//! Immutable search configuration, passed into the driver at construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Strategy;

/// Which attribute of a candidate mutation rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationTarget {
    #[default]
    Description,
    Name,
    Both,
}

/// Parent selection scheme for the non-elite slots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum SelectionScheme {
    /// Linear ranking roulette. `pressure` in [1, 2]: 1 is uniform, 2 gives the worst rank zero weight.
    RankRoulette { pressure: f64 },
    /// Best of `size` distinct entrants drawn uniformly.
    Tournament { size: usize },
}

impl Default for SelectionScheme {
    fn default() -> Self {
        SelectionScheme::RankRoulette { pressure: 1.7 }
    }
}

/// Bounded retry with jitter around the evaluation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidates per generation (N).
    pub population_size: usize,
    /// Top-ranked candidates carried over unmodified (K < N).
    pub elite_count: usize,
    /// Generations to evaluate, counting generation 0.
    pub max_generations: u32,
    /// Stop once the best observed preference rate reaches this value.
    pub fitness_threshold: Option<f64>,
    /// Stop after this many consecutive generations without improvement.
    pub stagnation_limit: Option<u32>,
    /// Probability of each extra edit after the first one in a mutation.
    pub mutation_rate: f64,
    /// Probability that an offspring slot is filled by crossover rather than mutation.
    pub crossover_rate: f64,
    pub strategies: Vec<Strategy>,
    pub seed: u64,
    pub trial_timeout_ms: u64,
    /// Maximum in-flight agent calls across the whole generation.
    pub concurrency: usize,
    pub selection: SelectionScheme,
    pub mutation_target: MutationTarget,
    pub max_operator_attempts: u32,
    /// Extra evaluation passes for candidates that came back unevaluated.
    pub unevaluated_retries: u32,
    /// Re-score elites in every generation instead of reusing their memoized score.
    pub reevaluate_elites: bool,
    pub max_description_len: usize,
    /// Reject offspring that no longer contain the baseline description verbatim.
    pub require_anchor: bool,
    pub retry: RetryConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            elite_count: 2,
            max_generations: 5,
            fitness_threshold: None,
            stagnation_limit: Some(3),
            mutation_rate: 0.3,
            crossover_rate: 0.5,
            strategies: vec![
                Strategy::Authority,
                Strategy::Emotion,
                Strategy::Exaggeration,
                Strategy::Subliminal,
            ],
            seed: 42,
            trial_timeout_ms: 60_000,
            concurrency: 4,
            selection: SelectionScheme::default(),
            mutation_target: MutationTarget::default(),
            max_operator_attempts: 8,
            unevaluated_retries: 1,
            reevaluate_elites: false,
            max_description_len: 600,
            require_anchor: false,
            retry: RetryConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn trial_timeout(&self) -> Duration {
        Duration::from_millis(self.trial_timeout_ms)
    }

    /// Validate parameter combinations. Called before any evaluation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::InvalidPopulationSize(self.population_size));
        }
        if self.elite_count >= self.population_size {
            return Err(ConfigError::EliteCountTooLarge {
                elite_count: self.elite_count,
                population_size: self.population_size,
            });
        }

        if self.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }
        for (i, strategy) in self.strategies.iter().enumerate() {
            if !strategy.is_persuasion() {
                return Err(ConfigError::NonPersuasionStrategy(strategy.to_string()));
            }
            if self.strategies[..i].contains(strategy) {
                return Err(ConfigError::DuplicateStrategy(strategy.to_string()));
            }
        }
        if self.population_size < 1 + self.strategies.len() {
            return Err(ConfigError::PopulationTooSmallForSeeds {
                population_size: self.population_size,
                strategies: self.strategies.len(),
            });
        }

        if self.max_generations == 0 {
            return Err(ConfigError::InvalidMaxGenerations(self.max_generations));
        }
        if let Some(threshold) = self.fitness_threshold {
            check_rate("fitness_threshold", threshold)?;
        }
        if self.stagnation_limit == Some(0) {
            return Err(ConfigError::ZeroStagnationLimit);
        }
        check_rate("mutation_rate", self.mutation_rate)?;
        check_rate("crossover_rate", self.crossover_rate)?;

        match self.selection {
            SelectionScheme::RankRoulette { pressure } => {
                if !(1.0..=2.0).contains(&pressure) {
                    return Err(ConfigError::InvalidSelectionPressure(pressure));
                }
            }
            SelectionScheme::Tournament { size } => {
                if size == 0 {
                    return Err(ConfigError::InvalidTournamentSize(size));
                }
            }
        }

        if self.trial_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_operator_attempts == 0 {
            return Err(ConfigError::ZeroOperatorAttempts);
        }
        if self.max_description_len < 16 {
            return Err(ConfigError::InvalidDescriptionLimit(self.max_description_len));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidBackoff(
                self.retry.base_delay_ms,
                self.retry.max_delay_ms,
            ));
        }

        Ok(())
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange { name, value })
    }
}
