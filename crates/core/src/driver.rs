// crates/core/src/driver.rs

//! The search driver.
//!
//! Initialize -> EvaluateGeneration -> CheckTermination ->
//! {Select + Recombine -> EvaluateGeneration | Finalize}.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{ConfigError, OperatorError, SearchError};
use crate::history::{GenerationRecord, RunHistory};
use crate::log;
use crate::operators::{crossover, mutate, with_attempts, OperatorSettings};
use crate::oracle::Oracle;
use crate::population::{self, RankedCandidate, TerminationPolicy};
use crate::sink::{MemoryRunSink, RunSink, SearchReport};
use crate::types::{Candidate, CandidateId, FitnessScore, Origin, QuerySet, Strategy, TerminationReason};

const ID_PREFIX: &str = "cand-";

/// Candidates listed in the final report.
const REPORT_TOP: usize = 5;

/// A pre-written variant used as a generation-0 seed for its strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedVariant {
    pub strategy: Strategy,
    /// Replaces the baseline name when set.
    pub name: Option<String>,
    pub description: String,
}

/// The service under optimization and the fixed world it is measured in.
#[derive(Debug, Clone)]
pub struct SearchProblem {
    pub name: String,
    pub description: String,
    pub competitors: Vec<Candidate>,
    pub queries: QuerySet,
    pub seeds: Vec<SeedVariant>,
}

impl SearchProblem {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        competitors: Vec<Candidate>,
        queries: QuerySet,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            competitors,
            queries,
            seeds: Vec::new(),
        }
    }

    pub fn with_seed(mut self, strategy: Strategy, description: impl Into<String>) -> Self {
        self.seeds.push(SeedVariant {
            strategy,
            name: None,
            description: description.into(),
        });
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queries.is_empty() {
            return Err(ConfigError::EmptyQuerySet);
        }
        if self.competitors.is_empty() {
            return Err(ConfigError::NoCompetitors);
        }
        let mut ids = HashSet::new();
        for competitor in &self.competitors {
            if competitor.id().starts_with(ID_PREFIX) || !ids.insert(competitor.id()) {
                return Err(ConfigError::DuplicateServiceId(competitor.id().to_string()));
            }
        }
        Ok(())
    }
}

/// (candidate, query-set fingerprint, generation when elites are re-scored)
type MemoKey = (CandidateId, u64, Option<u32>);

pub struct SearchDriver<O: Oracle> {
    config: SearchConfig,
    policy: TerminationPolicy,
    settings: OperatorSettings,
    oracle: O,
    sink: Arc<dyn RunSink>,
    problem: SearchProblem,
    fingerprint: u64,
    baseline: Candidate,
    rng: StdRng,
    next_id: u32,
    generation: u32,
    population: Vec<Candidate>,
    memo: HashMap<MemoKey, FitnessScore>,
    history: RunHistory,
}

impl<O: Oracle> SearchDriver<O> {
    /// Validate everything up front. No evaluation happens here.
    pub fn new(config: SearchConfig, problem: SearchProblem, oracle: O) -> Result<Self, SearchError> {
        config.validate()?;
        problem.validate()?;

        let baseline = Candidate::baseline(format_id(0), &problem.name, &problem.description)
            .map_err(ConfigError::InvalidBaseline)?;

        let mut settings = OperatorSettings::from_config(&config);
        if config.require_anchor {
            settings = settings.with_anchor(baseline.description());
        }

        Ok(Self {
            policy: TerminationPolicy::from_config(&config),
            rng: StdRng::seed_from_u64(config.seed),
            fingerprint: problem.queries.fingerprint(),
            settings,
            oracle,
            sink: Arc::new(MemoryRunSink::new()),
            problem,
            baseline,
            next_id: 1,
            generation: 0,
            population: Vec::new(),
            memo: HashMap::new(),
            history: RunHistory::new(),
            config,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn RunSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    /// Everything committed so far. Still readable after a failed run.
    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Run to termination.
    ///
    /// On error the partial report is still written to the sink.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<SearchReport, SearchError> {
        if self.population.is_empty() {
            self.initialize()?;
        }

        match self.run_loop(cancel).await {
            Ok(report) => Ok(report),
            Err(err) => {
                log::fatal(&err);
                if let Err(sink_err) = self.sink.report(&self.report()).await {
                    log::fatal(&sink_err);
                }
                Err(err)
            }
        }
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<SearchReport, SearchError> {
        loop {
            let record = self.evaluate_generation(cancel).await?;
            if self.commit(record).await?.is_some() {
                return self.finalize().await;
            }
            self.advance()?;
        }
    }

    /// Build generation 0: the baseline plus at least one candidate per strategy.
    ///
    /// A strategy with a pre-written seed uses it; otherwise the baseline is
    /// mutated with that strategy. Remaining slots cycle through the strategies.
    pub fn initialize(&mut self) -> Result<(), SearchError> {
        self.generation = 0;
        self.population = vec![self.baseline.clone()];
        log::candidate_created(&self.baseline);

        let strategies = self.config.strategies.clone();
        for strategy in &strategies {
            let id = self.allocate_id();
            let candidate = match self.seed_for(*strategy, &id) {
                Some(seed) => seed,
                None => self.mutate_baseline(*strategy, id)?,
            };
            log::candidate_created(&candidate);
            self.population.push(candidate);
        }

        for strategy in strategies.iter().cycle() {
            if self.population.len() >= self.config.population_size {
                break;
            }
            let id = self.allocate_id();
            let candidate = self.mutate_baseline(*strategy, id)?;
            log::candidate_created(&candidate);
            self.population.push(candidate);
        }

        Ok(())
    }

    fn seed_for(&self, strategy: Strategy, id: &str) -> Option<Candidate> {
        let seed = self.problem.seeds.iter().find(|s| s.strategy == strategy)?;
        let name = seed.name.as_deref().unwrap_or(&self.problem.name);
        let checked = Candidate::new(id, name, &seed.description, strategy, 0, Vec::new(), Origin::Seed)
            .and_then(|candidate| {
                self.settings
                    .check(&candidate, &[&self.baseline])
                    .map(|()| candidate)
            });
        match checked {
            Ok(candidate) => Some(candidate),
            Err(reason) => {
                log::operator_rejected("seed", id, 1, &reason);
                None
            }
        }
    }

    fn mutate_baseline(&mut self, strategy: Strategy, id: CandidateId) -> Result<Candidate, SearchError> {
        let baseline = &self.baseline;
        let settings = &self.settings;
        let rng = &mut self.rng;
        with_attempts("mutation", &id, self.config.max_operator_attempts, || {
            mutate(baseline, strategy, id.clone(), 0, settings, &mut *rng)
        })
        .map_err(|source| SearchError::Operator {
            generation: 0,
            candidate_id: id.clone(),
            source,
        })
    }

    /// Score every member of the current generation that lacks a memoized score.
    ///
    /// Returns the generation's record without committing it. A cancelled or
    /// wholly failed generation is committed as incomplete and surfaces as an error.
    pub async fn evaluate_generation(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<GenerationRecord, SearchError> {
        if self.population.is_empty() {
            return Err(SearchError::NotInitialized);
        }
        let generation = self.generation;

        let pending: Vec<Candidate> = self
            .population
            .iter()
            .filter(|c| !self.memo.contains_key(&self.memo_key(c)))
            .cloned()
            .collect();
        log::generation_start(generation, self.population.len(), pending.len());

        let mut batch = pending.clone();
        let mut pass = 0;
        while !batch.is_empty() {
            let (scored, cancelled) = self.evaluate_batch(&batch, cancel).await?;

            let mut retry = Vec::new();
            for (candidate, score) in scored {
                if !score.fitness.is_evaluated() {
                    log::candidate_unevaluated(candidate.id(), generation, pass + 1);
                    if pass < self.config.unevaluated_retries {
                        retry.push(candidate);
                        continue;
                    }
                }
                let key = self.memo_key(&candidate);
                self.memo.insert(key, score);
            }

            if cancelled {
                let record = GenerationRecord::new(generation, false, self.population.clone(), &self.scores());
                self.commit_quietly(record).await;
                return Err(SearchError::Cancelled { generation });
            }

            batch = retry;
            pass += 1;
        }

        let record = GenerationRecord::new(generation, true, self.population.clone(), &self.scores());

        let all_failed = !pending.is_empty()
            && pending.iter().all(|c| {
                self.memo
                    .get(&self.memo_key(c))
                    .map_or(true, |s| !s.fitness.is_evaluated())
            });
        if all_failed {
            let failed_trials = record.failed_trials();
            let record = GenerationRecord {
                complete: false,
                ..record
            };
            self.commit_quietly(record).await;
            return Err(SearchError::Generation {
                generation,
                candidates: pending.len(),
                failed_trials,
            });
        }

        Ok(record)
    }

    /// Evaluate a batch concurrently. The flag is set when cancellation cut it short.
    async fn evaluate_batch(
        &self,
        batch: &[Candidate],
        cancel: &CancellationToken,
    ) -> Result<(Vec<(Candidate, FitnessScore)>, bool), SearchError> {
        let oracle = &self.oracle;
        let queries = &self.problem.queries;
        let competitors = self.problem.competitors.as_slice();
        let generation = self.generation;

        let mut evaluations = stream::iter(batch.iter().cloned())
            .map(|candidate| async move {
                let score = oracle.evaluate(&candidate, queries, competitors, generation).await;
                (candidate, score)
            })
            .buffer_unordered(self.config.concurrency);

        let mut scored = Vec::with_capacity(batch.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok((scored, true)),
                next = evaluations.next() => match next {
                    Some((candidate, Ok(score))) => scored.push((candidate, score)),
                    Some((_, Err(err))) => return Err(err.into()),
                    None => break,
                },
            }
        }

        // Completion order is not deterministic; creation order is.
        scored.sort_by(|a, b| a.0.id().cmp(b.0.id()));
        Ok((scored, false))
    }

    /// Append a generation record, decide termination, and flush it to the sinks.
    pub async fn commit(&mut self, record: GenerationRecord) -> Result<Option<TerminationReason>, SearchError> {
        let generation = record.generation;
        let complete = record.complete;
        self.history.push(record);

        let reason = if complete { self.check_termination() } else { None };
        if let Some(reason) = reason {
            self.history.terminate(generation, reason);
            log::terminated(generation, reason);
        }

        if let Some(last) = self.history.last() {
            log::generation_summary(
                generation,
                last.best().map(|b| (b.candidate.id(), b.rate())),
                last.best_so_far,
                last.unevaluated(),
            );
            self.sink.generation(last).await?;
        }
        self.oracle.checkpoint().await?;
        Ok(reason)
    }

    /// Commit on an abort path, where the original error matters more than a sink failure.
    async fn commit_quietly(&mut self, record: GenerationRecord) {
        if let Err(err) = self.commit(record).await {
            log::fatal(&err);
        }
    }

    /// Apply the termination policy to the last committed generation.
    pub fn check_termination(&self) -> Option<TerminationReason> {
        let last = self.history.last()?;
        if !last.complete {
            return None;
        }
        self.policy.check(last.generation, &self.history.best_so_far_series())
    }

    /// Build the next generation from the last committed one.
    ///
    /// The top `elite_count` carry over unchanged; every other slot is
    /// bred from rank-selected parents.
    pub fn advance(&mut self) -> Result<(), SearchError> {
        let ranked = match self.history.last() {
            Some(record) if record.complete && record.generation == self.generation => record.ranked.clone(),
            _ => {
                return Err(SearchError::NotEvaluated {
                    generation: self.generation,
                })
            }
        };

        let next_generation = self.generation + 1;
        let mut next: Vec<Candidate> = population::elites(&ranked, self.config.elite_count)
            .iter()
            .map(|r| r.candidate.clone())
            .collect();

        while next.len() < self.config.population_size {
            let id = self.allocate_id();
            let child = breed(
                &self.config,
                &self.settings,
                &mut self.rng,
                &ranked,
                &id,
                next_generation,
            )
            .map_err(|source| SearchError::Operator {
                generation: next_generation,
                candidate_id: id.clone(),
                source,
            })?;
            log::candidate_created(&child);
            next.push(child);
        }

        self.population = next;
        self.generation = next_generation;
        Ok(())
    }

    /// Write the final report: global best across the whole history.
    pub async fn finalize(&mut self) -> Result<SearchReport, SearchError> {
        let report = self.report();
        self.sink.report(&report).await?;
        Ok(report)
    }

    pub fn report(&self) -> SearchReport {
        SearchReport::from_history(&self.history, REPORT_TOP, self.config.seed, self.fingerprint)
    }

    fn allocate_id(&mut self) -> CandidateId {
        let id = format_id(self.next_id);
        self.next_id += 1;
        id
    }

    fn memo_key(&self, candidate: &Candidate) -> MemoKey {
        (
            candidate.id().to_string(),
            self.fingerprint,
            self.config.reevaluate_elites.then_some(self.generation),
        )
    }

    /// Memoized scores for the current population.
    fn scores(&self) -> HashMap<CandidateId, FitnessScore> {
        self.population
            .iter()
            .filter_map(|c| {
                self.memo
                    .get(&self.memo_key(c))
                    .map(|s| (c.id().to_string(), s.clone()))
            })
            .collect()
    }
}

fn format_id(n: u32) -> CandidateId {
    format!("{}{:04}", ID_PREFIX, n)
}

/// Fill one offspring slot.
///
/// Crossover is tried with probability `crossover_rate` when two distinct
/// parents exist; an exhausted crossover falls back to mutating the first parent.
/// A parent whose strategy can no longer change it is mutated with the other
/// strategies, then the remaining ranked candidates stand in as parents.
fn breed(
    config: &SearchConfig,
    settings: &OperatorSettings,
    rng: &mut StdRng,
    ranked: &[RankedCandidate],
    id: &str,
    generation: u32,
) -> Result<Candidate, OperatorError> {
    let attempts = config.max_operator_attempts;
    let first = population::select_parent(ranked, config.selection, rng).ok_or(OperatorError::NoParents)?;

    if ranked.len() >= 2 && rng.gen_bool(config.crossover_rate) {
        if let Some(second) = distinct_mate(ranked, first, config, rng) {
            let crossed = with_attempts("crossover", id, attempts, || {
                crossover(
                    &first.candidate,
                    &second.candidate,
                    id.to_string(),
                    generation,
                    settings,
                    &mut *rng,
                )
            });
            match crossed {
                Ok(child) => return Ok(child),
                Err(OperatorError::Exhausted { .. }) => {}
                Err(other) => return Err(other),
            }
        }
    }

    let strategies = mutation_order(&config.strategies, first.candidate.strategy(), rng);
    if strategies.is_empty() {
        return Err(OperatorError::UnsupportedStrategy(first.candidate.strategy().to_string()));
    }

    let others = ranked
        .iter()
        .map(|r| &r.candidate)
        .filter(|c| c.id() != first.candidate.id());
    let mut last = None;
    for parent in std::iter::once(&first.candidate).chain(others) {
        for &strategy in &strategies {
            let mutated = with_attempts("mutation", id, attempts, || {
                mutate(parent, strategy, id.to_string(), generation, settings, &mut *rng)
            });
            match mutated {
                Err(exhausted @ OperatorError::Exhausted { .. }) => {
                    log::mutation_fallback(id, parent.id(), strategy, &exhausted);
                    last = Some(exhausted);
                }
                done => return done,
            }
        }
    }
    Err(last.unwrap_or(OperatorError::NoParents))
}

/// Configured strategies in the order mutation tries them: the parent's own
/// strategy first when it is configured, the rest shuffled.
fn mutation_order(configured: &[Strategy], parent: Strategy, rng: &mut StdRng) -> Vec<Strategy> {
    let mut order = configured.to_vec();
    order.shuffle(rng);
    if let Some(pos) = order.iter().position(|s| *s == parent) {
        order[..=pos].rotate_right(1);
    }
    order
}

fn distinct_mate<'a>(
    ranked: &'a [RankedCandidate],
    first: &RankedCandidate,
    config: &SearchConfig,
    rng: &mut StdRng,
) -> Option<&'a RankedCandidate> {
    (0..config.max_operator_attempts)
        .filter_map(|_| population::select_parent(ranked, config.selection, rng))
        .find(|mate| mate.candidate.id() != first.candidate.id())
}
