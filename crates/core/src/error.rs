// crates/core/src/error.rs

//! Error taxonomy for the search engine.

use std::time::Duration;

use thiserror::Error;

use crate::types::CandidateId;

/// Invalid parameter combination. Raised before any evaluation begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid population_size: {0}. Must be at least 2")]
    InvalidPopulationSize(usize),

    #[error("Invalid elite_count: {elite_count}. Must be less than population_size ({population_size})")]
    EliteCountTooLarge {
        elite_count: usize,
        population_size: usize,
    },

    #[error("population_size ({population_size}) cannot hold the baseline plus {strategies} strategy seeds")]
    PopulationTooSmallForSeeds {
        population_size: usize,
        strategies: usize,
    },

    #[error("Strategy set cannot be empty")]
    NoStrategies,

    #[error("Strategy '{0}' cannot drive a mutation")]
    NonPersuasionStrategy(String),

    #[error("Strategy '{0}' listed more than once")]
    DuplicateStrategy(String),

    #[error("Invalid max_generations: {0}. Must be at least 1")]
    InvalidMaxGenerations(u32),

    #[error("Invalid {name}: {value}. Must be within [0, 1]")]
    RateOutOfRange { name: &'static str, value: f64 },

    #[error("Invalid stagnation_limit: 0. Omit it to disable stagnation checks")]
    ZeroStagnationLimit,

    #[error("Invalid selection pressure: {0}. Must be within [1, 2]")]
    InvalidSelectionPressure(f64),

    #[error("Invalid tournament size: {0}. Must be at least 1")]
    InvalidTournamentSize(usize),

    #[error("Invalid trial_timeout_ms: 0")]
    ZeroTimeout,

    #[error("Invalid concurrency: 0. Must be at least 1")]
    ZeroConcurrency,

    #[error("Invalid max_operator_attempts: 0. Must be at least 1")]
    ZeroOperatorAttempts,

    #[error("Invalid max_description_len: {0}. Must be at least 16")]
    InvalidDescriptionLimit(usize),

    #[error("Invalid retry attempts: 0. Must be at least 1")]
    ZeroRetryAttempts,

    #[error("Invalid retry backoff: base_delay_ms ({0}) must not exceed max_delay_ms ({1})")]
    InvalidBackoff(u64, u64),

    #[error("Query set is empty")]
    EmptyQuerySet,

    #[error("At least one competitor is required")]
    NoCompetitors,

    #[error("Duplicate service id '{0}'")]
    DuplicateServiceId(String),

    #[error("Baseline candidate is invalid: {0}")]
    InvalidBaseline(DegenerateCandidate),
}

/// A candidate that violates the data-model invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DegenerateCandidate {
    #[error("candidate id is empty")]
    EmptyId,

    #[error("name is empty")]
    EmptyName,

    #[error("description is empty")]
    EmptyDescription,

    #[error("description is {len} chars, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("lineage of '{0}' references itself")]
    SelfReference(CandidateId),

    #[error("lineage repeats parent '{0}'")]
    RepeatedParent(CandidateId),

    #[error("text is identical to parent '{0}'")]
    Unchanged(CandidateId),

    #[error("original service wording was lost")]
    LostAnchor,

    #[error("no {strategy} edit can change parent '{parent}'")]
    Saturated { strategy: String, parent: CandidateId },
}

/// A genetic operator could not produce a valid candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    #[error("{operator} rejected a degenerate candidate: {reason}")]
    Degenerate {
        operator: &'static str,
        reason: DegenerateCandidate,
    },

    #[error("{operator} gave up after {attempts} attempts, last rejection: {last}")]
    Exhausted {
        operator: &'static str,
        attempts: u32,
        last: DegenerateCandidate,
    },

    #[error("strategy '{0}' has no mutation templates")]
    UnsupportedStrategy(String),

    #[error("no evaluated candidates to select parents from")]
    NoParents,
}

/// A single (candidate, query) trial failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrialError {
    #[error("agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed agent response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl TrialError {
    /// Timeouts and transport errors are worth another attempt; malformed replies are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrialError::Timeout(_) | TrialError::Transport(_))
    }
}

/// Failure persisting trial results or run records.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The oracle could not produce a score for a candidate.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("failed to persist trials: {0}")]
    Sink(#[from] SinkError),
}

/// Run-level failure. The run history stays readable on the driver after any of these.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("generation {generation}: every candidate failed evaluation ({candidates} candidates, {failed_trials} failed trials)")]
    Generation {
        generation: u32,
        candidates: usize,
        failed_trials: usize,
    },

    #[error("generation {generation}: operator failed for candidate {candidate_id}: {source}")]
    Operator {
        generation: u32,
        candidate_id: CandidateId,
        #[source]
        source: OperatorError,
    },

    #[error("generation {generation} cancelled before evaluation completed")]
    Cancelled { generation: u32 },

    #[error("result sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("fitness oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("search has not been initialized")]
    NotInitialized,

    #[error("generation {generation} has no complete evaluation to breed from")]
    NotEvaluated { generation: u32 },
}
