//! Trait fusion engine: merge per-turn observations into the session's
//! cumulative personality estimate.
//!
//! The fusion rule is a per-dimension exponential moving average with the
//! new observation weighted at 0.6, so the estimate tracks recent behavior
//! while smoothing noise. Order of application matters; the session engine
//! applies these functions exactly once per completed turn.

use crate::types::{RevealedTraits, TraitObservation, TraitSignal};

/// Weight of the newest observation in the convex combination.
pub const RECENCY_WEIGHT: f64 = 0.6;

/// Maximum retained trait-signal records; oldest evicted first.
pub const SIGNAL_LOG_CAP: usize = 20;

/// Fuse a new observation into the prior estimate.
///
/// First observation of a dimension is adopted outright; afterwards
/// `updated = prior * 0.4 + observed * 0.6`. Dimensions absent from the
/// observation are left unchanged.
pub fn fuse(prior: &RevealedTraits, observation: &TraitObservation) -> RevealedTraits {
    let mut updated = prior.clone();
    for (&dimension, &observed) in observation {
        let next = match prior.get(dimension) {
            Some(previous) => previous * (1.0 - RECENCY_WEIGHT) + observed * RECENCY_WEIGHT,
            None => observed,
        };
        updated.set(dimension, next);
    }
    updated
}

/// Build the signal records for one turn: one per observed dimension.
///
/// All records of the turn share the first reported signal string; when the
/// model reported none, a generic fallback names the dimension. (Faithful to
/// the source behavior: the per-dimension association is intentionally lossy.)
pub fn signals_for_turn(
    observation: &TraitObservation,
    signal_texts: &[String],
) -> Vec<TraitSignal> {
    observation
        .iter()
        .map(|(&dimension, &value)| {
            let note = signal_texts
                .first()
                .cloned()
                .unwrap_or_else(|| format!("Tratto {} rilevato", dimension.code()));
            TraitSignal {
                dimension,
                value,
                note,
            }
        })
        .collect()
}

/// Append new signals and truncate to the most recent `SIGNAL_LOG_CAP`.
pub fn push_signals(log: &mut Vec<TraitSignal>, new_signals: Vec<TraitSignal>) {
    log.extend(new_signals);
    if log.len() > SIGNAL_LOG_CAP {
        let excess = log.len() - SIGNAL_LOG_CAP;
        log.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TraitDimension;

    fn obs(pairs: &[(TraitDimension, f64)]) -> TraitObservation {
        pairs.iter().copied().collect()
    }

    #[test]
    fn first_observation_is_adopted_exactly() {
        let prior = RevealedTraits::new();
        let updated = fuse(&prior, &obs(&[(TraitDimension::Openness, 0.8)]));
        assert_eq!(updated.get(TraitDimension::Openness), Some(0.8));
        assert_eq!(updated.len(), 1);
    }

    #[test]
    fn recency_weighted_combination() {
        let mut prior = RevealedTraits::new();
        prior.set(TraitDimension::Openness, 0.5);
        let updated = fuse(&prior, &obs(&[(TraitDimension::Openness, 1.0)]));
        let fused = updated.get(TraitDimension::Openness).unwrap();
        assert!((fused - 0.8).abs() < 1e-12, "expected 0.8, got {fused}");
    }

    #[test]
    fn unobserved_dimensions_unchanged() {
        let mut prior = RevealedTraits::new();
        prior.set(TraitDimension::Openness, 0.5);
        prior.set(TraitDimension::Conscientiousness, 0.5);
        let updated = fuse(&prior, &obs(&[(TraitDimension::Openness, 0.9)]));
        assert_eq!(updated.get(TraitDimension::Conscientiousness), Some(0.5));
        assert!((updated.get(TraitDimension::Openness).unwrap() - 0.74).abs() < 1e-12);
    }

    #[test]
    fn fusion_does_not_mutate_prior() {
        let mut prior = RevealedTraits::new();
        prior.set(TraitDimension::Extraversion, 0.3);
        let _ = fuse(&prior, &obs(&[(TraitDimension::Extraversion, 0.9)]));
        assert_eq!(prior.get(TraitDimension::Extraversion), Some(0.3));
    }

    #[test]
    fn shared_signal_text_per_turn() {
        let observation = obs(&[
            (TraitDimension::Extraversion, 0.7),
            (TraitDimension::Conscientiousness, 0.6),
        ]);
        let texts = vec!["Comunicazione diretta".to_string(), "Altro segnale".to_string()];
        let signals = signals_for_turn(&observation, &texts);
        assert_eq!(signals.len(), 2);
        for signal in &signals {
            assert_eq!(signal.note, "Comunicazione diretta");
        }
    }

    #[test]
    fn fallback_signal_names_the_dimension() {
        let observation = obs(&[(TraitDimension::Neuroticism, 0.8)]);
        let signals = signals_for_turn(&observation, &[]);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].note, "Tratto N rilevato");
        assert_eq!(signals[0].value, 0.8);
    }

    #[test]
    fn signal_log_is_bounded_fifo() {
        let mut log = Vec::new();
        for i in 0..30 {
            let signal = TraitSignal {
                dimension: TraitDimension::Openness,
                value: 0.5,
                note: format!("segnale {i}"),
            };
            push_signals(&mut log, vec![signal]);
            assert!(log.len() <= SIGNAL_LOG_CAP);
        }
        assert_eq!(log.len(), SIGNAL_LOG_CAP);
        // Oldest evicted first: the first retained entry is number 10.
        assert_eq!(log[0].note, "segnale 10");
        assert_eq!(log.last().unwrap().note, "segnale 29");
    }

    #[test]
    fn bulk_append_still_respects_cap() {
        let mut log = Vec::new();
        let batch: Vec<TraitSignal> = (0..25)
            .map(|i| TraitSignal {
                dimension: TraitDimension::Agreeableness,
                value: 0.4,
                note: format!("n{i}"),
            })
            .collect();
        push_signals(&mut log, batch);
        assert_eq!(log.len(), SIGNAL_LOG_CAP);
        assert_eq!(log[0].note, "n5");
    }
}
