//! Error types for the conversation engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the conversation/trait engine.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid session transition: {0}")]
    InvalidTransition(String),

    #[error("a turn is already in flight")]
    TurnInFlight,

    #[error("empty user turn")]
    EmptyTurn,

    #[error("persona registry is empty")]
    EmptyRegistry,

    #[error("channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
