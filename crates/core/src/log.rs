// crates/core/src/log.rs

//! Structured log events for the search loop.
//!
//! Thin helpers over `tracing` so every event for the same thing carries the
//! same field names. The subscriber is installed by the binary.

use std::fmt::Display;

use tracing::{debug, error, info, warn};

use crate::types::{Candidate, FitnessScore, Strategy, TerminationReason, TrialOutcome};

/// Log the start of a generation's evaluation pass.
pub fn generation_start(generation: u32, population: usize, pending: usize) {
    info!(
        generation,
        population,
        pending,
        "evaluating generation"
    );
}

/// Log a freshly created candidate.
pub fn candidate_created(candidate: &Candidate) {
    debug!(
        candidate = candidate.id(),
        generation = candidate.generation(),
        strategy = %candidate.strategy(),
        origin = ?candidate.origin(),
        parents = ?candidate.lineage(),
        name = candidate.name(),
        "candidate created"
    );
}

/// Log a candidate's score.
pub fn candidate_scored(score: &FitnessScore) {
    info!(
        candidate = %score.candidate_id,
        generation = score.generation,
        fitness = %score.fitness,
        trials = score.trials,
        chosen = score.chosen,
        failures = score.failures,
        "candidate scored"
    );
}

/// Log one trial result at debug level.
pub fn trial_done(candidate_id: &str, query_index: usize, outcome: &TrialOutcome) {
    debug!(candidate = candidate_id, query_index, outcome = ?outcome, "trial done");
}

/// Log a failed trial. Failed trials are excluded from the denominator.
pub fn trial_failed(candidate_id: &str, query_index: usize, attempts: u32, reason: impl Display) {
    warn!(
        candidate = candidate_id,
        query_index,
        attempts,
        reason = %reason,
        "trial failed"
    );
}

/// Log a retry of the evaluation collaborator.
pub fn trial_retry(candidate_id: &str, query_index: usize, attempt: u32, delay_ms: u64, reason: impl Display) {
    debug!(
        candidate = candidate_id,
        query_index,
        attempt,
        delay_ms,
        reason = %reason,
        "retrying trial"
    );
}

/// Log a candidate that came back without any completed trial.
pub fn candidate_unevaluated(candidate_id: &str, generation: u32, pass: u32) {
    warn!(
        candidate = candidate_id,
        generation,
        pass,
        "candidate unevaluated"
    );
}

/// Log an operator rejection that will be retried.
pub fn operator_rejected(operator: &str, candidate_id: &str, attempt: u32, reason: impl Display) {
    debug!(
        operator,
        candidate = candidate_id,
        attempt,
        reason = %reason,
        "operator produced degenerate candidate"
    );
}

/// Log a mutation that gave up on one (parent, strategy) pair and moves on.
pub fn mutation_fallback(candidate_id: &str, parent: &str, strategy: Strategy, reason: impl Display) {
    debug!(
        candidate = candidate_id,
        parent,
        strategy = %strategy,
        reason = %reason,
        "mutation falling back"
    );
}

/// Log the end-of-generation summary.
pub fn generation_summary(
    generation: u32,
    best: Option<(&str, f64)>,
    best_so_far: Option<f64>,
    unevaluated: usize,
) {
    match best {
        Some((candidate, rate)) => info!(
            generation,
            best = candidate,
            rate,
            best_so_far = best_so_far.unwrap_or(rate),
            unevaluated,
            "generation complete"
        ),
        None => warn!(generation, unevaluated, "generation complete without evaluated candidates"),
    }
}

/// Log a termination decision.
pub fn terminated(generation: u32, reason: TerminationReason) {
    info!(generation, reason = %reason, "search terminated");
}

/// Log a fatal error.
pub fn fatal(message: impl Display) {
    error!(error = %message, "search aborted");
}
