//! Shared domain types: OCEAN traits, personas, messages, and the session aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One of the Big Five (OCEAN) personality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TraitDimension {
    #[serde(rename = "O")]
    Openness,
    #[serde(rename = "C")]
    Conscientiousness,
    #[serde(rename = "E")]
    Extraversion,
    #[serde(rename = "A")]
    Agreeableness,
    #[serde(rename = "N")]
    Neuroticism,
}

impl TraitDimension {
    pub const ALL: [TraitDimension; 5] = [
        Self::Openness,
        Self::Conscientiousness,
        Self::Extraversion,
        Self::Agreeableness,
        Self::Neuroticism,
    ];

    /// Single-letter wire code used in the trait payload and prompt contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Openness => "O",
            Self::Conscientiousness => "C",
            Self::Extraversion => "E",
            Self::Agreeableness => "A",
            Self::Neuroticism => "N",
        }
    }

    /// Parse a wire code ("O".."N"). Unknown keys yield `None` and are ignored upstream.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "O" => Some(Self::Openness),
            "C" => Some(Self::Conscientiousness),
            "E" => Some(Self::Extraversion),
            "A" => Some(Self::Agreeableness),
            "N" => Some(Self::Neuroticism),
            _ => None,
        }
    }

    /// Italian display label, as rendered in the compiled prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Openness => "Apertura mentale",
            Self::Conscientiousness => "Coscienziosità",
            Self::Extraversion => "Estroversione",
            Self::Agreeableness => "Amicalità",
            Self::Neuroticism => "Nevroticismo",
        }
    }
}

impl std::fmt::Display for TraitDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Baseline Big Five scores for a persona, each in [0, 1]. Immutable once defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OceanTraits {
    #[serde(rename = "O")]
    pub openness: f64,
    #[serde(rename = "C")]
    pub conscientiousness: f64,
    #[serde(rename = "E")]
    pub extraversion: f64,
    #[serde(rename = "A")]
    pub agreeableness: f64,
    #[serde(rename = "N")]
    pub neuroticism: f64,
}

impl OceanTraits {
    pub fn new(o: f64, c: f64, e: f64, a: f64, n: f64) -> Self {
        Self {
            openness: o,
            conscientiousness: c,
            extraversion: e,
            agreeableness: a,
            neuroticism: n,
        }
    }

    pub fn get(&self, dimension: TraitDimension) -> f64 {
        match dimension {
            TraitDimension::Openness => self.openness,
            TraitDimension::Conscientiousness => self.conscientiousness,
            TraitDimension::Extraversion => self.extraversion,
            TraitDimension::Agreeableness => self.agreeableness,
            TraitDimension::Neuroticism => self.neuroticism,
        }
    }
}

/// Partial per-turn trait observation extracted from a model reply.
pub type TraitObservation = BTreeMap<TraitDimension, f64>;

/// The session's cumulative belief about the persona's personality, built
/// solely from fused observations. Dimensions appear when first observed and
/// are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevealedTraits(BTreeMap<TraitDimension, f64>);

impl RevealedTraits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dimension: TraitDimension) -> Option<f64> {
        self.0.get(&dimension).copied()
    }

    pub fn set(&mut self, dimension: TraitDimension, value: f64) {
        self.0.insert(dimension, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TraitDimension, f64)> + '_ {
        self.0.iter().map(|(d, v)| (*d, *v))
    }
}

/// One behavioral observation: which dimension, the observed value, and the
/// justification string reported by the model for that turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitSignal {
    pub dimension: TraitDimension,
    pub value: f64,
    pub note: String,
}

/// A synthetic customer persona. Defined once in the registry, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    /// Short initials for UI display (e.g. "AB").
    pub avatar: String,
    pub description: String,
    pub background: String,
    pub traits: OceanTraits,
    pub behaviors: Vec<String>,
    pub objections: Vec<String>,
}

/// Message author within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn of the transcript. Immutable once created; order is replayed
/// verbatim to the model as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Lifecycle status of a training session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

/// Aggregate root for one training session.
///
/// Invariants: a persona is present exactly while the session is not idle;
/// the message log is append-only; `started_at` is set iff active or ended;
/// `ended_at` is set iff ended; the signal log never exceeds its cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub persona: Option<Persona>,
    pub messages: Vec<Message>,
    pub revealed_traits: RevealedTraits,
    pub trait_signals: Vec<TraitSignal>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Fresh idle session: no persona, empty transcript, empty trait state.
    pub fn idle() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Idle,
            persona: None,
            messages: Vec::new(),
            revealed_traits: RevealedTraits::new(),
            trait_signals: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}
