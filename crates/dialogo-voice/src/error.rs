//! Error types for the voice subsystem, with per-cause user-facing messages.

use thiserror::Error;

/// Result type alias for voice operations.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in voice capture, recognition, synthesis or playback.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("no speech detected")]
    NoSpeech,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("voice features unsupported: {0}")]
    Unsupported(String),

    #[error("channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Italian user-facing message for this failure, per cause.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Accesso al microfono negato. Controlla le impostazioni di sistema.".to_string()
            }
            Self::NoSpeech => "Nessun audio rilevato. Riprova a parlare.".to_string(),
            Self::Network(_) => "Errore di rete. Controlla la connessione.".to_string(),
            Self::Synthesis(e) => format!("Errore sintesi vocale: {e}"),
            Self::Unsupported(_) => {
                "Funzioni vocali non disponibili su questo dispositivo.".to_string()
            }
            other => format!("Errore: {other}"),
        }
    }
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                VoiceError::AudioDevice("input device not available".to_string())
            }
            other => VoiceError::AudioDevice(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_cause_specific() {
        assert!(VoiceError::PermissionDenied.user_message().contains("microfono"));
        assert!(VoiceError::NoSpeech.user_message().contains("Nessun audio"));
        assert!(VoiceError::Network("x".into()).user_message().contains("rete"));
        assert!(VoiceError::Synthesis("boom".into()).user_message().contains("boom"));
    }
}
