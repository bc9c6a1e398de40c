// crates/core/src/operators/mod.rs

//! Genetic operators over candidates.
//!
//! Both operators are pure functions of (parents, random source, settings):
//! no I/O, no fitness evaluation. Each call makes one attempt; callers go
//! through [`with_attempts`] to retry degenerate draws.

mod crossover;
mod mutation;
pub mod templates;

pub use crossover::{crossover, inherited_strategy};
pub use mutation::mutate;

use crate::config::{MutationTarget, SearchConfig};
use crate::error::{DegenerateCandidate, OperatorError};
use crate::log;
use crate::types::Candidate;

/// The slice of configuration operators read.
#[derive(Debug, Clone)]
pub struct OperatorSettings {
    pub target: MutationTarget,
    pub mutation_rate: f64,
    pub max_description_len: usize,
    /// Whitespace-normalized text every offspring must still contain.
    anchor: Option<String>,
}

impl OperatorSettings {
    pub fn new(target: MutationTarget, mutation_rate: f64, max_description_len: usize) -> Self {
        Self {
            target,
            mutation_rate,
            max_description_len,
            anchor: None,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.mutation_target,
            config.mutation_rate,
            config.max_description_len,
        )
    }

    pub fn with_anchor(mut self, anchor: &str) -> Self {
        let anchor = normalize_ws(anchor);
        self.anchor = if anchor.is_empty() { None } else { Some(anchor) };
        self
    }

    /// Checks shared by every operator and by stored seeds, on top of
    /// [`Candidate::new`].
    pub(crate) fn check(&self, child: &Candidate, parents: &[&Candidate]) -> Result<(), DegenerateCandidate> {
        let len = child.description().chars().count();
        if len > self.max_description_len {
            return Err(DegenerateCandidate::TooLong {
                len,
                max: self.max_description_len,
            });
        }
        if let Some(parent) = parents.iter().find(|p| p.same_text(child)) {
            return Err(DegenerateCandidate::Unchanged(parent.id().to_string()));
        }
        if let Some(anchor) = &self.anchor {
            if !normalize_ws(child.description()).contains(anchor.as_str()) {
                return Err(DegenerateCandidate::LostAnchor);
            }
        }
        Ok(())
    }
}

/// Run `attempt` until it yields a valid candidate or `max_attempts` is reached.
///
/// Only degenerate results are retried; every attempt draws fresh randomness
/// from whatever source the closure captured.
pub fn with_attempts<F>(
    operator: &'static str,
    candidate_id: &str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<Candidate, OperatorError>
where
    F: FnMut() -> Result<Candidate, OperatorError>,
{
    let mut last = DegenerateCandidate::EmptyDescription;
    for n in 1..=max_attempts.max(1) {
        match attempt() {
            Ok(candidate) => return Ok(candidate),
            Err(OperatorError::Degenerate { reason, .. }) => {
                log::operator_rejected(operator, candidate_id, n, &reason);
                last = reason;
            }
            Err(other) => return Err(other),
        }
    }
    Err(OperatorError::Exhausted {
        operator,
        attempts: max_attempts.max(1),
        last,
    })
}

/// Split text into sentences, keeping terminal punctuation.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let terminal = matches!(c, '.' | '!' | '?');
        let boundary = chars.peek().map_or(true, |next| next.is_whitespace());
        if terminal && boundary {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let sentence = normalize_ws(raw);
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}

pub(crate) fn join_sentences(sentences: &[String]) -> String {
    sentences.join(" ")
}

pub(crate) fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
