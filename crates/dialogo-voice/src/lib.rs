//! # dialogo-voice: spoken turn-taking for the conversation trainer
//!
//! Half-duplex voice exchange: the trainee pushes to talk, the utterance is
//! transcribed, the persona's reply is synthesized and played. A single
//! controller owns the phase machine so the microphone and the speaker are
//! never active at the same time.
//!
//! ```text
//! Idle ──try_start_listening──> Listening ──stop_listening──> Processing
//!   ▲                                                              │
//!   └──── ReplyFinished ◄── Speaking ◄───────── speak(reply) ──────┘
//! ```

mod audio;
mod controller;
mod error;
mod recognizer;
mod synthesizer;

pub use audio::{pcm_to_wav, AudioCapture, AudioChunk, AudioConfig};
pub use controller::{VoiceController, VoiceEvent, VoicePhase};
pub use error::{VoiceError, VoiceResult};
pub use recognizer::{
    RecognitionHandle, ScriptedRecognizer, SpeechRecognizer, TranscriptFragment,
    WhisperApiRecognizer,
};
pub use synthesizer::{Playback, SilentTts, SpeechApiTts, SpeechSynthesizer};
