//! Speech synthesis seam and rodio playback with completion notification.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

/// Backend that turns text into audio bytes (WAV/MP3). Async because the
/// production path is a network call.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize text in the given BCP-47 language. Return an empty vec to
    /// skip playback entirely.
    async fn synthesize(&self, text: &str, language: &str) -> VoiceResult<Vec<u8>>;
}

/// Silent synthesizer for tests and keyboard-only runs: nothing plays, so
/// spoken turns complete immediately.
#[derive(Debug, Default)]
pub struct SilentTts;

#[async_trait]
impl SpeechSynthesizer for SilentTts {
    async fn synthesize(&self, _text: &str, _language: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Pick an OpenAI TTS voice for a conversation language. Italian sessions get
/// the warmer voice.
fn language_to_voice(language: &str) -> &'static str {
    let primary = language.split('-').next().unwrap_or(language);
    if primary.eq_ignore_ascii_case("it") {
        "shimmer"
    } else {
        "alloy"
    }
}

/// Production synthesizer: OpenAI-compatible `/audio/speech` endpoint.
#[derive(Debug, Clone)]
pub struct SpeechApiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// Fixed voice; if None, derived from the session language.
    pub voice_override: Option<String>,
    client: reqwest::Client,
}

impl SpeechApiTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice_override: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build from environment: `DIALOGO_TTS_API_URL` (default OpenAI),
    /// `DIALOGO_TTS_API_KEY` or `DIALOGO_API_KEY`, `DIALOGO_TTS_MODEL`
    /// (default tts-1), optional `DIALOGO_TTS_VOICE`.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("DIALOGO_TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("DIALOGO_TTS_API_KEY")
            .or_else(|_| std::env::var("DIALOGO_API_KEY"))
            .map_err(|_| {
                VoiceError::Config(
                    "synthesis requires DIALOGO_TTS_API_KEY or DIALOGO_API_KEY".to_string(),
                )
            })?;
        let model = std::env::var("DIALOGO_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice_override = std::env::var("DIALOGO_TTS_VOICE").ok();
        Ok(Self {
            base_url,
            api_key,
            model,
            voice_override,
            client: reqwest::Client::new(),
        })
    }

    /// Set a fixed voice (e.g. "nova") instead of deriving from language.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice_override = Some(voice.into());
        self
    }

    fn voice_id(&self, language: &str) -> String {
        match &self.voice_override {
            Some(v) => v.clone(),
            None => language_to_voice(language).to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechApiTts {
    async fn synthesize(&self, text: &str, language: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice_id(language),
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Network(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "TTS API error {status}: {body}"
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        debug!(bytes = bytes.len(), "speech synthesized");
        Ok(bytes.to_vec())
    }
}

/// Playback of synthesized audio on the default output device.
///
/// The rodio output stream is not Send, so `Playback` stays on the thread
/// that created it; completion waits run on a blocking thread over the
/// shared `Sink`.
pub struct Playback {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Arc<Sink>,
}

impl Playback {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink =
            Sink::try_new(&stream_handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
        info!("audio output ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink: Arc::new(sink),
        })
    }

    /// Queue decoded audio bytes (WAV/MP3) for playback. No-op on empty input.
    pub fn play_bytes(&self, bytes: &[u8]) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let cursor = Cursor::new(bytes.to_vec());
        let source = rodio::Decoder::new(cursor)
            .map_err(|e| VoiceError::Playback(format!("decode failed: {e}")))?;
        self.sink.append(source.convert_samples::<f32>());
        Ok(())
    }

    /// Stop playback immediately and clear the queue.
    pub fn stop(&self) {
        self.sink.stop();
    }

    /// Whether the sink currently has queued samples.
    pub fn is_playing(&self) -> bool {
        !self.sink.empty()
    }

    /// Invoke `notify` from a background task once all queued audio has
    /// played out (or was stopped).
    pub fn notify_when_done(&self, notify: impl FnOnce() + Send + 'static) {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            sink.sleep_until_end();
            notify();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn silent_tts_returns_empty() {
        let tts = SilentTts;
        let out = tts.synthesize("buongiorno", "it-IT").await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn italian_gets_warm_voice() {
        assert_eq!(language_to_voice("it-IT"), "shimmer");
        assert_eq!(language_to_voice("it"), "shimmer");
        assert_eq!(language_to_voice("en-US"), "alloy");
    }

    #[test]
    fn override_beats_language() {
        let tts = SpeechApiTts::new("http://localhost", "k", "tts-1").with_voice("nova");
        assert_eq!(tts.voice_id("it-IT"), "nova");
    }
}
