// crates/core/src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DegenerateCandidate;

/// Unique identifier for a candidate (e.g. "cand-0007").
pub type CandidateId = String;

/// Persuasion technique a candidate's text was generated with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Baseline or competitor text, no manipulation applied.
    #[default]
    None,
    /// Framed as expert advice or a trusted recommendation.
    Authority,
    /// Emotional framing that appeals to the reader's needs.
    Emotion,
    /// Implies extraordinary results and exceptional value.
    Exaggeration,
    /// Subconscious cues and gentle suggestion.
    Subliminal,
    /// Direct "best tool" claims on name and description.
    Superlative,
    /// Offspring of two parents with different persuasion strategies.
    Hybrid,
}

impl Strategy {
    /// Strategies that can drive a mutation.
    pub const PERSUASION: [Strategy; 5] = [
        Strategy::Authority,
        Strategy::Emotion,
        Strategy::Exaggeration,
        Strategy::Subliminal,
        Strategy::Superlative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::None => "none",
            Strategy::Authority => "authority",
            Strategy::Emotion => "emotion",
            Strategy::Exaggeration => "exaggeration",
            Strategy::Subliminal => "subliminal",
            Strategy::Superlative => "superlative",
            Strategy::Hybrid => "hybrid",
        }
    }

    pub fn is_persuasion(&self) -> bool {
        !matches!(self, Strategy::None | Strategy::Hybrid)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "baseline" | "original" => Ok(Strategy::None),
            "au" | "authority" => Ok(Strategy::Authority),
            "em" | "emotion" => Ok(Strategy::Emotion),
            "ex" | "exaggeration" => Ok(Strategy::Exaggeration),
            "su" | "subliminal" => Ok(Strategy::Subliminal),
            "superlative" | "best" => Ok(Strategy::Superlative),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// How a candidate came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Baseline,
    Seed,
    Mutation,
    Crossover,
    Competitor,
}

/// One proposed name + description pair.
///
/// Immutable once created: operators always build a new candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    id: CandidateId,
    name: String,
    description: String,
    strategy: Strategy,
    generation: u32,
    /// Immediate parents, in operator order.
    #[serde(default)]
    lineage: Vec<CandidateId>,
    origin: Origin,
}

impl Candidate {
    /// Build a candidate, rejecting anything that violates the data-model invariants.
    pub fn new(
        id: impl Into<CandidateId>,
        name: impl Into<String>,
        description: impl Into<String>,
        strategy: Strategy,
        generation: u32,
        lineage: Vec<CandidateId>,
        origin: Origin,
    ) -> Result<Self, DegenerateCandidate> {
        let candidate = Self {
            id: id.into(),
            name: name.into().trim().to_string(),
            description: description.into().trim().to_string(),
            strategy,
            generation,
            lineage,
            origin,
        };
        candidate.check()?;
        Ok(candidate)
    }

    /// The unmodified service text every search starts from.
    pub fn baseline(
        id: impl Into<CandidateId>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, DegenerateCandidate> {
        Self::new(id, name, description, Strategy::None, 0, Vec::new(), Origin::Baseline)
    }

    /// A fixed competing service. Competitors never evolve.
    pub fn competitor(
        id: impl Into<CandidateId>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, DegenerateCandidate> {
        Self::new(id, name, description, Strategy::None, 0, Vec::new(), Origin::Competitor)
    }

    fn check(&self) -> Result<(), DegenerateCandidate> {
        if self.id.trim().is_empty() {
            return Err(DegenerateCandidate::EmptyId);
        }
        if self.name.is_empty() {
            return Err(DegenerateCandidate::EmptyName);
        }
        if self.description.is_empty() {
            return Err(DegenerateCandidate::EmptyDescription);
        }
        if self.lineage.iter().any(|p| p == &self.id) {
            return Err(DegenerateCandidate::SelfReference(self.id.clone()));
        }
        for (i, parent) in self.lineage.iter().enumerate() {
            if self.lineage[..i].contains(parent) {
                return Err(DegenerateCandidate::RepeatedParent(parent.clone()));
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn lineage(&self) -> &[CandidateId] {
        &self.lineage
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// True if `other` carries exactly the same text.
    pub fn same_text(&self, other: &Candidate) -> bool {
        self.name == other.name && self.description == other.description
    }
}

/// Ordered, read-only set of natural-language tasks used to measure preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySet {
    queries: Vec<String>,
}

impl QuerySet {
    pub fn new<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries
                .into_iter()
                .map(Into::into)
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
        }
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Stable content fingerprint (FNV-1a over the queries in order).
    ///
    /// Stable across builds, so it is safe to persist next to trial records.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for query in &self.queries {
            for byte in query.as_bytes().iter().chain(std::iter::once(&0u8)) {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(PRIME);
            }
        }
        hash
    }
}

/// What the agent did in one trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialOutcome {
    /// The agent invoked this service.
    Chosen { service_id: String },
    /// The agent answered without invoking any service.
    NoChoice,
    /// The trial could not be completed.
    Failed { reason: String },
}

impl TrialOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TrialOutcome::Failed { .. })
    }
}

/// One (candidate, query) evaluation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    pub candidate_id: CandidateId,
    pub query_index: usize,
    pub query: String,
    /// Competitor service ids the candidate was shown next to.
    pub competitors: Vec<String>,
    pub outcome: TrialOutcome,
    /// Raw agent response or trace, if the collaborator returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub attempts: u32,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Preference rate, or the sentinel for a candidate with no successful trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fitness {
    Measured(f64),
    Unevaluated,
}

impl Fitness {
    pub fn rate(&self) -> Option<f64> {
        match self {
            Fitness::Measured(rate) => Some(*rate),
            Fitness::Unevaluated => None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self, Fitness::Measured(_))
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fitness::Measured(rate) => write!(f, "{:.3}", rate),
            Fitness::Unevaluated => f.write_str("unevaluated"),
        }
    }
}

/// Fitness of one candidate, derived from its trials. Superseded, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessScore {
    pub candidate_id: CandidateId,
    pub fitness: Fitness,
    /// Trials that completed (the denominator).
    pub trials: usize,
    /// Trials in which the agent chose the candidate.
    pub chosen: usize,
    /// Trials that failed and were excluded from the denominator.
    pub failures: usize,
    pub generation: u32,
}

impl FitnessScore {
    /// Derive a score from the trial results recorded for `candidate_id`.
    pub fn from_trials(candidate_id: &str, generation: u32, trials: &[TrialResult]) -> Self {
        let mut completed = 0;
        let mut chosen = 0;
        let mut failures = 0;

        for trial in trials.iter().filter(|t| t.candidate_id == candidate_id) {
            match &trial.outcome {
                TrialOutcome::Chosen { service_id } => {
                    completed += 1;
                    if service_id == candidate_id {
                        chosen += 1;
                    }
                }
                TrialOutcome::NoChoice => completed += 1,
                TrialOutcome::Failed { .. } => failures += 1,
            }
        }

        let fitness = if completed == 0 {
            Fitness::Unevaluated
        } else {
            Fitness::Measured(chosen as f64 / completed as f64)
        };

        Self {
            candidate_id: candidate_id.to_string(),
            fitness,
            trials: completed,
            chosen,
            failures,
            generation,
        }
    }

    /// Score for a candidate that could not be evaluated at all.
    pub fn unevaluated(candidate_id: &str, generation: u32, failures: usize) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            fitness: Fitness::Unevaluated,
            trials: 0,
            chosen: 0,
            failures,
            generation,
        }
    }

    pub fn rate(&self) -> Option<f64> {
        self.fitness.rate()
    }
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxGenerations,
    Threshold,
    Stagnation,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::MaxGenerations => f.write_str("max_generations"),
            TerminationReason::Threshold => f.write_str("threshold"),
            TerminationReason::Stagnation => f.write_str("stagnation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(candidate: &str, outcome: TrialOutcome) -> TrialResult {
        TrialResult {
            candidate_id: candidate.to_string(),
            query_index: 0,
            query: "q".to_string(),
            competitors: vec!["competitor-1".to_string()],
            outcome,
            raw: None,
            attempts: 1,
            recorded_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_candidate_rejects_empty_description() {
        let err = Candidate::baseline("cand-0000", "weather", "   ").unwrap_err();
        assert_eq!(err, DegenerateCandidate::EmptyDescription);
    }

    #[test]
    fn test_candidate_rejects_self_lineage() {
        let err = Candidate::new(
            "cand-0003",
            "weather",
            "Get forecasts.",
            Strategy::Emotion,
            1,
            vec!["cand-0001".into(), "cand-0003".into()],
            Origin::Mutation,
        )
        .unwrap_err();
        assert_eq!(err, DegenerateCandidate::SelfReference("cand-0003".into()));
    }

    #[test]
    fn test_candidate_rejects_repeated_parent() {
        let err = Candidate::new(
            "cand-0004",
            "weather",
            "Get forecasts.",
            Strategy::Hybrid,
            1,
            vec!["cand-0001".into(), "cand-0001".into()],
            Origin::Crossover,
        )
        .unwrap_err();
        assert_eq!(err, DegenerateCandidate::RepeatedParent("cand-0001".into()));
    }

    #[test]
    fn test_strategy_parses_short_codes() {
        assert_eq!("Au".parse::<Strategy>().unwrap(), Strategy::Authority);
        assert_eq!("em".parse::<Strategy>().unwrap(), Strategy::Emotion);
        assert_eq!("Ex".parse::<Strategy>().unwrap(), Strategy::Exaggeration);
        assert_eq!("SU".parse::<Strategy>().unwrap(), Strategy::Subliminal);
        assert!("flattery".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_rejects_unknown() {
        let parsed: Result<Strategy, _> = serde_json::from_str("\"flattery\"");
        assert!(parsed.is_err());
        let ok: Strategy = serde_json::from_str("\"subliminal\"").unwrap();
        assert_eq!(ok, Strategy::Subliminal);
    }

    #[test]
    fn test_fitness_excludes_failures_from_denominator() {
        let trials = vec![
            trial("cand-0001", TrialOutcome::Chosen { service_id: "cand-0001".into() }),
            trial("cand-0001", TrialOutcome::Chosen { service_id: "competitor-1".into() }),
            trial("cand-0001", TrialOutcome::NoChoice),
            trial("cand-0001", TrialOutcome::Failed { reason: "timeout".into() }),
            trial("cand-0002", TrialOutcome::Chosen { service_id: "cand-0002".into() }),
        ];
        let score = FitnessScore::from_trials("cand-0001", 0, &trials);
        assert_eq!(score.trials, 3);
        assert_eq!(score.chosen, 1);
        assert_eq!(score.failures, 1);
        let rate = score.rate().unwrap();
        assert!((rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_failed_trials_give_sentinel_not_zero() {
        let trials = vec![
            trial("cand-0001", TrialOutcome::Failed { reason: "timeout".into() }),
            trial("cand-0001", TrialOutcome::Failed { reason: "timeout".into() }),
        ];
        let score = FitnessScore::from_trials("cand-0001", 0, &trials);
        assert_eq!(score.fitness, Fitness::Unevaluated);
        assert_eq!(score.rate(), None);
        assert_eq!(score.failures, 2);
    }

    #[test]
    fn test_query_set_fingerprint_is_order_sensitive() {
        let a = QuerySet::new(["forecast for Paris", "alerts in CA"]);
        let b = QuerySet::new(["alerts in CA", "forecast for Paris"]);
        let c = QuerySet::new(["forecast for Paris", "alerts in CA", "  "]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
        assert_eq!(c.len(), 2);
    }
}
