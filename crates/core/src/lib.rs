// crates/core/src/lib.rs

//! Evolutionary search for tool descriptions that agents prefer.
//!
//! The [`driver::SearchDriver`] evolves candidate name/description pairs
//! for one service. Fitness comes from an [`oracle::Oracle`], normally a
//! [`oracle::FitnessOracle`] that poses each query to an agent with the
//! candidate listed next to fixed competitors.

pub mod ai_client;
pub mod config;
pub mod driver;
pub mod error;
pub mod history;
pub mod log;
pub mod openai_client;
pub mod operators;
pub mod oracle;
pub mod population;
pub mod retry;
pub mod sink;
pub mod store;
pub mod types;

pub use config::{MutationTarget, RetryConfig, SearchConfig, SelectionScheme};
pub use driver::{SearchDriver, SearchProblem, SeedVariant};
pub use error::{ConfigError, OperatorError, OracleError, SearchError, SinkError, TrialError};
pub use history::{GenerationRecord, RunHistory};
pub use oracle::{Choice, Evaluator, FitnessOracle, Oracle, Scenario, ServiceView, Verdict};
pub use sink::{JsonlRunSink, MemoryRunSink, RunSink, SearchReport};
pub use store::{JsonlTrialStore, MemoryTrialStore, TrialSink};
pub use types::{Candidate, CandidateId, Fitness, FitnessScore, Origin, QuerySet, Strategy, TerminationReason, TrialOutcome, TrialResult};
