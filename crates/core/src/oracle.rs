// crates/core/src/oracle.rs

//! Fitness oracle: turns a candidate into a measured preference rate.
//!
//! Each query becomes one [`Scenario`] in which the candidate sits next to
//! every competitor. The external [`Evaluator`] reports which service the
//! agent invoked; the preference rate is the share of completed trials in
//! which that was the candidate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::config::SearchConfig;
use crate::error::{OracleError, TrialError};
use crate::log;
use crate::retry::RetryPolicy;
use crate::store::TrialSink;
use crate::types::{Candidate, FitnessScore, QuerySet, TrialOutcome, TrialResult};

/// One service as the agent sees it. Labels are neutral (`svc1`, `svc2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceView {
    pub label: String,
    pub name: String,
    pub description: String,
}

/// A single query posed to the agent with a fixed set of services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub query: String,
    pub query_index: usize,
    pub services: Vec<ServiceView>,
    /// Service ids, parallel to `services`.
    ids: Vec<String>,
}

impl Scenario {
    /// Lay out the candidate among the competitors.
    ///
    /// The candidate's slot rotates with the query index so list position
    /// averages out over a query set.
    pub fn build(candidate: &Candidate, competitors: &[Candidate], query_index: usize, query: &str) -> Self {
        let slots = competitors.len() + 1;
        let position = query_index % slots;

        let mut ordered: Vec<&Candidate> = competitors.iter().collect();
        ordered.insert(position, candidate);

        let services = ordered
            .iter()
            .enumerate()
            .map(|(i, c)| ServiceView {
                label: format!("svc{}", i + 1),
                name: c.name().to_string(),
                description: c.description().to_string(),
            })
            .collect();

        Self {
            query: query.to_string(),
            query_index,
            services,
            ids: ordered.iter().map(|c| c.id().to_string()).collect(),
        }
    }

    /// Map a label the agent chose back to the service id.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        self.services
            .iter()
            .position(|s| s.label == label)
            .map(|i| self.ids[i].as_str())
    }
}

/// What the agent did with a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Invoked the service with this label.
    Chose(String),
    NoChoice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub verdict: Verdict,
    /// Raw response or trace reference, kept with the trial.
    pub raw: Option<String>,
}

impl Choice {
    pub fn chose(label: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Chose(label.into()),
            raw: None,
        }
    }

    pub fn no_choice() -> Self {
        Self {
            verdict: Verdict::NoChoice,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}

/// The external agent runtime. Opaque, possibly slow, possibly unreliable.
///
/// Calls block and run on tokio's blocking pool.
pub trait Evaluator: Send + Sync + 'static {
    fn evaluate(&self, scenario: &Scenario) -> Result<Choice, TrialError>;
}

/// Scores candidates. The search driver only talks to this trait.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        queries: &QuerySet,
        competitors: &[Candidate],
        generation: u32,
    ) -> Result<FitnessScore, OracleError>;

    /// Make recorded trials durable. Called once per generation.
    async fn checkpoint(&self) -> Result<(), OracleError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        queries: &QuerySet,
        competitors: &[Candidate],
        generation: u32,
    ) -> Result<FitnessScore, OracleError> {
        (**self).evaluate(candidate, queries, competitors, generation).await
    }

    async fn checkpoint(&self) -> Result<(), OracleError> {
        (**self).checkpoint().await
    }
}

/// Oracle backed by an [`Evaluator`], with timeout, retry and a shared
/// bound on in-flight agent calls.
pub struct FitnessOracle<E: Evaluator> {
    evaluator: Arc<E>,
    sink: Arc<dyn TrialSink>,
    retry: RetryPolicy,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl<E: Evaluator> FitnessOracle<E> {
    pub fn new(evaluator: Arc<E>, sink: Arc<dyn TrialSink>, config: &SearchConfig) -> Self {
        Self {
            evaluator,
            sink,
            retry: RetryPolicy::from_config(&config.retry),
            timeout: config.trial_timeout(),
            permits: Arc::new(Semaphore::new(config.concurrency)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn trial(
        &self,
        candidate: &Candidate,
        competitors: &[Candidate],
        query_index: usize,
        query: &str,
    ) -> Result<TrialResult, OracleError> {
        let scenario = Arc::new(Scenario::build(candidate, competitors, query_index, query));

        let (result, attempts) = self
            .retry
            .execute(
                || self.attempt(Arc::clone(&scenario)),
                |next, delay, err| {
                    log::trial_retry(candidate.id(), query_index, next, delay.as_millis() as u64, err)
                },
            )
            .await;

        let (outcome, raw) = match result {
            Ok(choice) => match choice.verdict {
                Verdict::NoChoice => (TrialOutcome::NoChoice, choice.raw),
                Verdict::Chose(label) => match scenario.resolve(&label) {
                    Some(id) => (
                        TrialOutcome::Chosen {
                            service_id: id.to_string(),
                        },
                        choice.raw,
                    ),
                    None => {
                        let err = TrialError::Malformed(format!("unknown service label '{}'", label));
                        log::trial_failed(candidate.id(), query_index, attempts, &err);
                        (TrialOutcome::Failed { reason: err.to_string() }, choice.raw)
                    }
                },
            },
            Err(err) => {
                log::trial_failed(candidate.id(), query_index, attempts, &err);
                (TrialOutcome::Failed { reason: err.to_string() }, None)
            }
        };

        let trial = TrialResult {
            candidate_id: candidate.id().to_string(),
            query_index,
            query: query.to_string(),
            competitors: competitors.iter().map(|c| c.id().to_string()).collect(),
            outcome,
            raw,
            attempts,
            recorded_at: chrono::Utc::now(),
        };
        log::trial_done(&trial.candidate_id, query_index, &trial.outcome);
        self.sink.record(&trial)?;
        Ok(trial)
    }

    /// One bounded call into the evaluator.
    ///
    /// A timed-out call keeps running on the blocking pool and keeps its
    /// permit until it returns; its result is dropped.
    async fn attempt(&self, scenario: Arc<Scenario>) -> Result<Choice, TrialError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TrialError::Transport("trial limiter closed".to_string()))?;

        let evaluator = Arc::clone(&self.evaluator);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            evaluator.evaluate(&scenario)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(TrialError::Timeout(self.timeout)),
            Ok(Err(join)) => Err(TrialError::Transport(format!("evaluator task failed: {}", join))),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl<E: Evaluator> Oracle for FitnessOracle<E> {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        queries: &QuerySet,
        competitors: &[Candidate],
        generation: u32,
    ) -> Result<FitnessScore, OracleError> {
        let trials = join_all(
            queries
                .queries()
                .iter()
                .enumerate()
                .map(|(index, query)| self.trial(candidate, competitors, index, query)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let score = FitnessScore::from_trials(candidate.id(), generation, &trials);
        log::candidate_scored(&score);
        Ok(score)
    }

    async fn checkpoint(&self) -> Result<(), OracleError> {
        Ok(self.sink.checkpoint()?)
    }
}
