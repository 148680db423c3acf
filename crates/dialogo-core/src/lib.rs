//! # dialogo-core: conversation and trait-revelation engine
//!
//! A trainee practices a sales conversation with a synthetic customer
//! persona role-played by a language model. Each reply carries a trailing
//! machine-parseable trait block; the engine parses it and fuses the
//! observations into a session-wide personality estimate the trainee must
//! otherwise infer from behavior.
//!
//! ```text
//! user turn ──> SessionEngine ──> ChatBackend (history + compiled prompt)
//!                    │                   │
//!                    │             raw reply text
//!                    │                   ▼
//!                    │            parse_reply() ──> content + observation
//!                    │                   │
//!                    ◄── fuse() / signal log ◄──────┘
//! ```

mod client;
mod config;
mod error;
mod fusion;
mod parser;
mod prompt;
mod registry;
mod session;
mod types;

pub use client::{
    ChatBackend, FragmentStream, HttpChatClient, LiveReply, ScriptedChat, TurnRequest,
};
pub use config::{
    provider_from_env, Provider, TrainerConfig, DEFAULT_LANGUAGE, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
pub use error::{CoreError, CoreResult};
pub use fusion::{fuse, push_signals, signals_for_turn, RECENCY_WEIGHT, SIGNAL_LOG_CAP};
pub use parser::{parse_reply, ParsedReply, TRAIT_DELIMITER};
pub use prompt::{opening_greeting, system_prompt, trait_description, trait_level};
pub use registry::{PersonaRegistry, BUILTIN_REGISTRY};
pub use session::{SessionEngine, TurnOutcome};
pub use types::{
    Message, OceanTraits, Persona, RevealedTraits, Role, Session, SessionStatus, TraitDimension,
    TraitObservation, TraitSignal,
};
