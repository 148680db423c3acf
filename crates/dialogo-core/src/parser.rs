//! Response parser: split a raw model reply into human-readable content and
//! the trailing structured trait payload.
//!
//! The parser never fails: a missing delimiter means "content only", and a
//! malformed payload degrades to the same, so the reply text is always
//! preserved. Pure and deterministic.

use crate::types::{TraitDimension, TraitObservation};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Literal line marker separating the reply from the JSON trait block.
pub const TRAIT_DELIMITER: &str = "---TRAITS---";

/// Result of parsing one model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    /// In-character reply text, trimmed.
    pub content: String,
    /// Trait dimensions the model reports having demonstrated, values in [0,1].
    pub traits: TraitObservation,
    /// Short behavioral-signal strings, in reported order.
    pub signals: Vec<String>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    traits: BTreeMap<String, f64>,
    #[serde(default)]
    signals: Vec<String>,
}

/// Keep only known dimensions with finite values, clamped to [0,1].
/// Out-of-range values from a misbehaving model are clamped rather than
/// rejected so the observation is not lost.
fn sanitize_traits(raw: BTreeMap<String, f64>) -> TraitObservation {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let dimension = TraitDimension::from_code(&key)?;
            if !value.is_finite() {
                debug!(dimension = key, "dropping non-finite trait value");
                return None;
            }
            Some((dimension, value.clamp(0.0, 1.0)))
        })
        .collect()
}

/// Parse a raw model reply.
///
/// Everything before the first `---TRAITS---` (trimmed) is the content;
/// everything after is decoded as `{"traits": {...}, "signals": [...]}`.
/// Absent delimiter or malformed payload yields empty traits and signals.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let Some(index) = raw.find(TRAIT_DELIMITER) else {
        return ParsedReply {
            content: raw.trim().to_string(),
            ..ParsedReply::default()
        };
    };

    let content = raw[..index].trim().to_string();
    let blob = raw[index + TRAIT_DELIMITER.len()..].trim();

    match serde_json::from_str::<RawPayload>(blob) {
        Ok(payload) => ParsedReply {
            content,
            traits: sanitize_traits(payload.traits),
            signals: payload.signals,
        },
        Err(err) => {
            debug!(error = %err, "malformed trait payload; keeping content only");
            ParsedReply {
                content,
                ..ParsedReply::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delimiter_is_content_only() {
        let parsed = parse_reply("  Buongiorno, mi dica pure.  ");
        assert_eq!(parsed.content, "Buongiorno, mi dica pure.");
        assert!(parsed.traits.is_empty());
        assert!(parsed.signals.is_empty());
    }

    #[test]
    fn well_formed_payload_round_trips() {
        let raw = format!(
            "Mi faccia un riassunto in due minuti.\n\n{}\n{{\"traits\":{{\"E\":0.7,\"C\":0.6}},\"signals\":[\"Comunicazione diretta\",\"Orientamento all'efficienza\"]}}",
            TRAIT_DELIMITER
        );
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.content, "Mi faccia un riassunto in due minuti.");
        assert_eq!(parsed.traits.get(&TraitDimension::Extraversion), Some(&0.7));
        assert_eq!(parsed.traits.get(&TraitDimension::Conscientiousness), Some(&0.6));
        assert_eq!(parsed.traits.len(), 2);
        assert_eq!(
            parsed.signals,
            vec!["Comunicazione diretta", "Orientamento all'efficienza"]
        );
    }

    #[test]
    fn malformed_payload_keeps_content() {
        let raw = format!("Certo, capisco.\n{}\n{{not json at all", TRAIT_DELIMITER);
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.content, "Certo, capisco.");
        assert!(parsed.traits.is_empty());
        assert!(parsed.signals.is_empty());
    }

    #[test]
    fn missing_fields_are_empty_not_errors() {
        let raw = format!("Va bene.\n{}\n{{}}", TRAIT_DELIMITER);
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.content, "Va bene.");
        assert!(parsed.traits.is_empty());
        assert!(parsed.signals.is_empty());

        let raw = format!("Va bene.\n{}\n{{\"signals\":[\"Tono calmo\"]}}", TRAIT_DELIMITER);
        let parsed = parse_reply(&raw);
        assert!(parsed.traits.is_empty());
        assert_eq!(parsed.signals, vec!["Tono calmo"]);
    }

    #[test]
    fn unknown_trait_keys_are_ignored() {
        let raw = format!(
            "Ok.\n{}\n{{\"traits\":{{\"O\":0.4,\"X\":0.9,\"honesty\":0.5}}}}",
            TRAIT_DELIMITER
        );
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.traits.len(), 1);
        assert_eq!(parsed.traits.get(&TraitDimension::Openness), Some(&0.4));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let raw = format!(
            "Ok.\n{}\n{{\"traits\":{{\"A\":1.7,\"N\":-0.3}}}}",
            TRAIT_DELIMITER
        );
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.traits.get(&TraitDimension::Agreeableness), Some(&1.0));
        assert_eq!(parsed.traits.get(&TraitDimension::Neuroticism), Some(&0.0));
    }

    #[test]
    fn only_first_delimiter_splits() {
        let raw = format!(
            "Prima parte.\n{d}\n{{\"traits\":{{\"E\":0.5}},\"signals\":[]}}\n{d}\nresto",
            d = TRAIT_DELIMITER
        );
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.content, "Prima parte.");
        // Trailing garbage after the JSON object makes the payload malformed;
        // content survives regardless.
        assert!(parsed.traits.is_empty());
    }

    #[test]
    fn delimiter_with_empty_payload_text() {
        let raw = format!("Solo testo.\n{}", TRAIT_DELIMITER);
        let parsed = parse_reply(&raw);
        assert_eq!(parsed.content, "Solo testo.");
        assert!(parsed.traits.is_empty());
    }
}
