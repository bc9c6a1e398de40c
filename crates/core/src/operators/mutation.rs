// crates/core/src/operators/mutation.rs

use rand::seq::SliceRandom;
use rand::Rng;

use super::templates::{self, PhraseBank};
use super::{join_sentences, split_sentences, OperatorSettings};
use crate::config::MutationTarget;
use crate::error::{DegenerateCandidate, OperatorError};
use crate::types::{Candidate, CandidateId, Origin, Strategy};

/// Extra edits on top of the first one.
const MAX_EXTRA_EDITS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    LeadIn,
    Closing,
    Interjection,
    ToneDown,
    NamePrefix,
    NameToneDown,
}

const DESCRIPTION_EDITS: [(Edit, u32); 4] = [
    (Edit::LeadIn, 3),
    (Edit::Closing, 3),
    (Edit::Interjection, 2),
    (Edit::ToneDown, 1),
];

const NAME_EDITS: [(Edit, u32); 2] = [(Edit::NamePrefix, 3), (Edit::NameToneDown, 1)];

const ALL_EDITS: [(Edit, u32); 6] = [
    (Edit::LeadIn, 3),
    (Edit::Closing, 3),
    (Edit::Interjection, 2),
    (Edit::ToneDown, 1),
    (Edit::NamePrefix, 1),
    (Edit::NameToneDown, 1),
];

/// Rewrite `parent` according to `strategy`'s phrase bank.
///
/// One attempt: a degenerate result comes back as
/// [`OperatorError::Degenerate`] so the caller can retry with a fresh draw.
pub fn mutate<R: Rng + ?Sized>(
    parent: &Candidate,
    strategy: Strategy,
    id: CandidateId,
    generation: u32,
    settings: &OperatorSettings,
    rng: &mut R,
) -> Result<Candidate, OperatorError> {
    let bank = templates::bank(strategy)
        .ok_or_else(|| OperatorError::UnsupportedStrategy(strategy.to_string()))?;

    let mut name = parent.name().to_string();
    let mut sentences = split_sentences(parent.description());

    let mut edits = 1;
    while edits <= MAX_EXTRA_EDITS && rng.gen_bool(settings.mutation_rate) {
        edits += 1;
    }

    for n in 0..edits {
        let Some(edit) = pick_edit(settings.target, &name, &sentences, bank, rng) else {
            if n == 0 {
                return Err(OperatorError::Degenerate {
                    operator: "mutation",
                    reason: DegenerateCandidate::Saturated {
                        strategy: strategy.to_string(),
                        parent: parent.id().to_string(),
                    },
                });
            }
            break;
        };
        match edit {
            Edit::LeadIn => insert_unique(&mut sentences, bank.lead_ins, Position::Front, rng),
            Edit::Closing => insert_unique(&mut sentences, bank.closings, Position::Back, rng),
            Edit::Interjection => {
                insert_unique(&mut sentences, bank.interjections, Position::Interior, rng)
            }
            Edit::ToneDown => tone_down(&mut sentences, rng),
            Edit::NamePrefix => name = prefixed_name(&name, bank, rng),
            Edit::NameToneDown => name = stripped_name(&name),
        }
    }

    Candidate::new(
        id,
        name,
        join_sentences(&sentences),
        strategy,
        generation,
        vec![parent.id().to_string()],
        Origin::Mutation,
    )
    .and_then(|child| settings.check(&child, &[parent]).map(|()| child))
    .map_err(|reason| OperatorError::Degenerate {
        operator: "mutation",
        reason,
    })
}

/// Draw an edit that can still change the text. `None` when the bank is
/// used up for both the name and the description.
fn pick_edit<R: Rng + ?Sized>(
    target: MutationTarget,
    name: &str,
    sentences: &[String],
    bank: &PhraseBank,
    rng: &mut R,
) -> Option<Edit> {
    let table: &[(Edit, u32)] = match target {
        MutationTarget::Description => &DESCRIPTION_EDITS,
        MutationTarget::Name => &NAME_EDITS,
        MutationTarget::Both => &ALL_EDITS,
    };
    let open: Vec<(Edit, u32)> = table
        .iter()
        .copied()
        .filter(|(edit, _)| applies(*edit, name, sentences, bank))
        .collect();
    open.choose_weighted(rng, |(_, weight)| *weight)
        .ok()
        .map(|(edit, _)| *edit)
}

fn applies(edit: Edit, name: &str, sentences: &[String], bank: &PhraseBank) -> bool {
    match edit {
        Edit::LeadIn => !fresh_phrases(sentences, bank.lead_ins).is_empty(),
        Edit::Closing => !fresh_phrases(sentences, bank.closings).is_empty(),
        Edit::Interjection => !fresh_phrases(sentences, bank.interjections).is_empty(),
        Edit::ToneDown => sentences.len() > 1 && sentences.iter().any(|s| templates::is_bank_phrase(s)),
        Edit::NamePrefix => !fresh_prefixes(name, bank).is_empty(),
        Edit::NameToneDown => templates::name_prefix_of(name).is_some(),
    }
}

fn fresh_phrases<'a>(sentences: &[String], phrases: &[&'a str]) -> Vec<&'a str> {
    phrases
        .iter()
        .copied()
        .filter(|p| !sentences.iter().any(|s| s == p))
        .collect()
}

/// Prefixes that would rename `name` to something new.
fn fresh_prefixes(name: &str, bank: &PhraseBank) -> Vec<&'static str> {
    let base = stripped_name(name);
    bank.name_prefixes
        .iter()
        .copied()
        .filter(|prefix| format!("{}{}", prefix, base) != name)
        .collect()
}

enum Position {
    Front,
    Back,
    Interior,
}

/// Insert a phrase not already present.
fn insert_unique<R: Rng + ?Sized>(
    sentences: &mut Vec<String>,
    phrases: &[&str],
    position: Position,
    rng: &mut R,
) {
    let fresh = fresh_phrases(sentences, phrases);
    let Some(phrase) = fresh.choose(rng) else {
        return;
    };

    let index = match position {
        Position::Front => 0,
        Position::Back => sentences.len(),
        Position::Interior if sentences.len() < 2 => sentences.len(),
        Position::Interior => rng.gen_range(1..sentences.len()),
    };
    sentences.insert(index, phrase.to_string());
}

/// Remove one previously inserted bank phrase, if any.
fn tone_down<R: Rng + ?Sized>(sentences: &mut Vec<String>, rng: &mut R) {
    let removable: Vec<usize> = sentences
        .iter()
        .enumerate()
        .filter(|(_, s)| templates::is_bank_phrase(s))
        .map(|(i, _)| i)
        .collect();
    // Never strip the text down to nothing.
    if removable.len() == sentences.len() && sentences.len() <= 1 {
        return;
    }
    if let Some(&index) = removable.choose(rng) {
        sentences.remove(index);
    }
}

fn prefixed_name<R: Rng + ?Sized>(name: &str, bank: &PhraseBank, rng: &mut R) -> String {
    match fresh_prefixes(name, bank).choose(rng) {
        Some(prefix) => format!("{}{}", prefix, stripped_name(name)),
        None => name.to_string(),
    }
}

fn stripped_name(name: &str) -> String {
    match templates::name_prefix_of(name) {
        Some(prefix) => name[prefix.len()..].to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    const FORECAST: &str = "Get weather forecast for a location.";

    fn baseline() -> Candidate {
        Candidate::baseline("cand-0000", "get-forecast", FORECAST).unwrap()
    }

    fn settings(target: MutationTarget) -> OperatorSettings {
        OperatorSettings::new(target, 0.5, 400).with_anchor(FORECAST)
    }

    #[test]
    fn test_mutation_is_deterministic_for_a_seed() {
        let parent = baseline();
        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (1..6)
                .map(|i| {
                    mutate(
                        &parent,
                        Strategy::Authority,
                        format!("cand-{:04}", i),
                        1,
                        &settings(MutationTarget::Both),
                        &mut rng,
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_mutation_preserves_original_wording_and_lineage() {
        let parent = baseline();
        let mut rng = StdRng::seed_from_u64(11);
        for i in 1..20 {
            let Ok(child) = mutate(
                &parent,
                Strategy::Exaggeration,
                format!("cand-{:04}", i),
                1,
                &settings(MutationTarget::Description),
                &mut rng,
            ) else {
                continue;
            };
            assert!(child.description().contains(FORECAST));
            assert_eq!(child.lineage(), ["cand-0000".to_string()]);
            assert_eq!(child.strategy(), Strategy::Exaggeration);
            assert_eq!(child.origin(), Origin::Mutation);
            assert_eq!(child.name(), "get-forecast");
        }
    }

    #[test]
    fn test_superlative_name_mutation_adds_best_prefix() {
        let parent = baseline();
        let mut rng = StdRng::seed_from_u64(3);
        let child = super::super::with_attempts("mutation", "cand-0001", 10, || {
            mutate(
                &parent,
                Strategy::Superlative,
                "cand-0001".into(),
                1,
                &settings(MutationTarget::Name),
                &mut rng,
            )
        })
        .unwrap();
        assert_eq!(child.name(), "best-get-forecast");
        assert_eq!(child.description(), FORECAST);
    }

    #[test]
    fn test_name_prefix_replaces_existing_strategy_prefix() {
        let mut rng = StdRng::seed_from_u64(5);
        let renamed = prefixed_name("best-get-forecast", templates::bank(Strategy::Superlative).unwrap(), &mut rng);
        assert_eq!(renamed, "best-get-forecast");
        assert_eq!(stripped_name("ultra-get-forecast"), "get-forecast");
    }

    #[test]
    fn test_used_up_bank_still_yields_a_change() {
        let parent = Candidate::new(
            "cand-0007",
            "best-get-forecast",
            format!(
                "This is the best tool in the world. {} The best option available. No other tool comes close.",
                FORECAST
            ),
            Strategy::Superlative,
            3,
            vec!["cand-0000".to_string()],
            Origin::Mutation,
        )
        .unwrap();

        for target in [MutationTarget::Description, MutationTarget::Name, MutationTarget::Both] {
            let single_edit = OperatorSettings::new(target, 0.0, 400).with_anchor(FORECAST);
            for seed in 0..20 {
                let mut rng = StdRng::seed_from_u64(seed);
                let child = mutate(&parent, Strategy::Superlative, "cand-0042".into(), 4, &single_edit, &mut rng)
                    .unwrap_or_else(|e| panic!("{:?} seed {}: {}", target, seed, e));
                assert!(!child.same_text(&parent));
                assert!(child.description().contains(FORECAST));
            }
        }
    }

    #[test]
    fn test_only_edits_that_change_the_text_are_drawn() {
        let bank = templates::bank(Strategy::Superlative).unwrap();
        let full: Vec<String> = [
            "This is the best tool in the world.",
            FORECAST,
            "The best option available.",
            "No other tool comes close.",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            assert_eq!(
                pick_edit(MutationTarget::Description, "get-forecast", &full, bank, &mut rng),
                Some(Edit::ToneDown)
            );
            assert_eq!(
                pick_edit(MutationTarget::Name, "best-get-forecast", &full, bank, &mut rng),
                Some(Edit::NameToneDown)
            );
        }

        let bare = vec![FORECAST.to_string()];
        assert!(fresh_prefixes("best-get-forecast", bank).is_empty());
        assert_eq!(fresh_prefixes("ultra-get-forecast", bank), vec!["best-"]);
        assert!(!applies(Edit::ToneDown, "get-forecast", &bare, bank));
        assert!(applies(Edit::LeadIn, "get-forecast", &bare, bank));
    }

    #[test]
    fn test_unsupported_strategy_is_an_error() {
        let parent = baseline();
        let mut rng = StdRng::seed_from_u64(1);
        let err = mutate(
            &parent,
            Strategy::Hybrid,
            "cand-0001".into(),
            1,
            &settings(MutationTarget::Description),
            &mut rng,
        )
        .unwrap_err();
        assert_eq!(err, OperatorError::UnsupportedStrategy("hybrid".into()));
    }

    #[test]
    fn test_tone_down_removes_only_bank_phrases() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut sentences = vec![
            "This is the best tool in the world.".to_string(),
            FORECAST.to_string(),
        ];
        tone_down(&mut sentences, &mut rng);
        assert_eq!(sentences, vec![FORECAST.to_string()]);
        tone_down(&mut sentences, &mut rng);
        assert_eq!(sentences, vec![FORECAST.to_string()]);
    }

    #[test]
    fn test_too_long_child_is_degenerate() {
        let parent = baseline();
        let mut rng = StdRng::seed_from_u64(2);
        let tight = OperatorSettings::new(MutationTarget::Description, 0.0, FORECAST.len());
        let result = mutate(
            &parent,
            Strategy::Authority,
            "cand-0001".into(),
            1,
            &tight,
            &mut rng,
        );
        assert!(matches!(
            result,
            Err(OperatorError::Degenerate {
                reason: DegenerateCandidate::TooLong { .. } | DegenerateCandidate::Unchanged(_),
                ..
            })
        ));
    }
}
