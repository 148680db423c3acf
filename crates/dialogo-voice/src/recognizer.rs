//! Speech recognition seam: push-to-talk capture feeding an
//! OpenAI-compatible transcription API, plus a scripted backend for tests.

use crate::audio::{pcm_to_wav, AudioCapture, AudioChunk, AudioConfig};
use crate::error::{VoiceError, VoiceResult};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A piece of recognized speech. Interim fragments may be revised;
/// the final fragment closes the utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptFragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Live handle to an in-progress recognition.
///
/// Fragments arrive on `fragments`; calling [`RecognitionHandle::stop`]
/// ends capture and triggers the final fragment. The handle keeps the
/// platform audio stream alive; dropping it aborts capture.
pub struct RecognitionHandle {
    pub fragments: mpsc::UnboundedReceiver<VoiceResult<TranscriptFragment>>,
    stop: Option<oneshot::Sender<()>>,
    // Keeps the cpal input stream (not Send) alive for the capture duration.
    _anchor: Option<Box<dyn std::any::Any>>,
}

impl RecognitionHandle {
    pub fn new(
        fragments: mpsc::UnboundedReceiver<VoiceResult<TranscriptFragment>>,
        stop: oneshot::Sender<()>,
        anchor: Option<Box<dyn std::any::Any>>,
    ) -> Self {
        Self {
            fragments,
            stop: Some(stop),
            _anchor: anchor,
        }
    }

    /// Signal end of utterance. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }

    /// Receive the next fragment, or `None` once the recognizer is done.
    pub async fn recv(&mut self) -> Option<VoiceResult<TranscriptFragment>> {
        self.fragments.recv().await
    }
}

/// Backend seam for speech recognition.
pub trait SpeechRecognizer {
    /// Begin listening in the given BCP-47 language. Returns a handle the
    /// caller stops when the speaker is done.
    fn begin(&self, language: &str) -> VoiceResult<RecognitionHandle>;
}

/// Whisper-style transcription over an OpenAI-compatible `/audio/transcriptions`
/// endpoint. Capture runs locally; the buffered utterance is uploaded as WAV
/// when the handle is stopped, so the single fragment it yields is final.
pub struct WhisperApiRecognizer {
    base_url: String,
    api_key: String,
    model: String,
    capture: AudioConfig,
    client: reqwest::Client,
}

impl WhisperApiRecognizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            capture: AudioConfig::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from environment: `DIALOGO_STT_API_URL` (default OpenAI),
    /// `DIALOGO_STT_API_KEY` or `DIALOGO_API_KEY`, `DIALOGO_STT_MODEL`
    /// (default whisper-1).
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("DIALOGO_STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("DIALOGO_STT_API_KEY")
            .or_else(|_| std::env::var("DIALOGO_API_KEY"))
            .map_err(|_| {
                VoiceError::Config(
                    "transcription requires DIALOGO_STT_API_KEY or DIALOGO_API_KEY".to_string(),
                )
            })?;
        let model =
            std::env::var("DIALOGO_STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Ok(Self::new(base_url, api_key, model))
    }

    async fn transcribe(&self, samples: Vec<f32>, language: &str) -> VoiceResult<String> {
        if samples.is_empty() {
            return Err(VoiceError::NoSpeech);
        }
        let wav = pcm_to_wav(&samples, self.capture.sample_rate);
        let url = format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        // Whisper wants the bare ISO-639 code, not the full BCP-47 tag.
        let lang = language.split('-').next().unwrap_or(language).to_string();
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", lang);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Network(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Recognition(format!(
                "transcription API error {status}: {body}"
            )));
        }
        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| VoiceError::Recognition(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(VoiceError::NoSpeech);
        }
        Ok(text)
    }
}

impl SpeechRecognizer for WhisperApiRecognizer {
    fn begin(&self, language: &str) -> VoiceResult<RecognitionHandle> {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let (fragment_tx, fragment_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let capture = AudioCapture::new(self.capture.clone())?;
        let stream = capture.start(chunk_tx)?;
        info!(language, "listening started");

        let recognizer = Self {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            capture: self.capture.clone(),
            client: self.client.clone(),
        };
        let language = language.to_string();

        tokio::spawn(async move {
            let mut samples: Vec<f32> = Vec::new();
            loop {
                tokio::select! {
                    chunk = chunk_rx.recv() => match chunk {
                        Some(chunk) => samples.extend_from_slice(&chunk.samples),
                        // Capture stream dropped; treat as stop.
                        None => break,
                    },
                    _ = &mut stop_rx => break,
                }
            }
            drop(chunk_rx);
            debug!(samples = samples.len(), "utterance captured, transcribing");
            let outcome = recognizer
                .transcribe(samples, &language)
                .await
                .map(TranscriptFragment::final_text);
            if fragment_tx.send(outcome).is_err() {
                warn!("transcript receiver dropped before result arrived");
            }
        });

        Ok(RecognitionHandle::new(
            fragment_rx,
            stop_tx,
            Some(Box::new(stream)),
        ))
    }
}

/// Scripted recognizer for tests and keyboard-only runs. Each script is a
/// list of fragments; all but the last are emitted immediately as interim,
/// and the last is emitted as final once the handle is stopped.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<VecDeque<Vec<String>>>,
    fail_next: Mutex<Option<String>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, fragments: Vec<String>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(fragments);
        }
    }

    /// Make the next `begin` call yield a recognition failure.
    pub fn fail_next(&self, reason: impl Into<String>) {
        if let Ok(mut fail) = self.fail_next.lock() {
            *fail = Some(reason.into());
        }
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn begin(&self, _language: &str) -> VoiceResult<RecognitionHandle> {
        let (fragment_tx, fragment_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let failure = self.fail_next.lock().ok().and_then(|mut f| f.take());
        let mut script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| vec!["Buongiorno, vorrei informazioni.".to_string()]);

        let final_text = script.pop().unwrap_or_default();
        for interim in script {
            let _ = fragment_tx.send(Ok(TranscriptFragment::interim(interim)));
        }

        tokio::spawn(async move {
            let _ = stop_rx.await;
            let outcome = match failure {
                Some(reason) => Err(VoiceError::Recognition(reason)),
                None if final_text.is_empty() => Err(VoiceError::NoSpeech),
                None => Ok(TranscriptFragment::final_text(final_text)),
            };
            let _ = fragment_tx.send(outcome);
        });

        Ok(RecognitionHandle::new(fragment_rx, stop_tx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_interim_then_final() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec![
            "Buon".to_string(),
            "Buongiorno".to_string(),
            "Buongiorno, mi dica.".to_string(),
        ]);

        let mut handle = recognizer.begin("it-IT").unwrap();
        let first = handle.recv().await.unwrap().unwrap();
        assert_eq!(first, TranscriptFragment::interim("Buon"));
        let second = handle.recv().await.unwrap().unwrap();
        assert!(!second.is_final);

        handle.stop();
        let last = handle.recv().await.unwrap().unwrap();
        assert!(last.is_final);
        assert_eq!(last.text, "Buongiorno, mi dica.");
        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_after_stop() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Pronto?".to_string()]);
        recognizer.fail_next("service unavailable");

        let mut handle = recognizer.begin("it-IT").unwrap();
        handle.stop();
        let err = handle.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, VoiceError::Recognition(_)));
    }

    #[tokio::test]
    async fn empty_final_maps_to_no_speech() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec![String::new()]);

        let mut handle = recognizer.begin("it-IT").unwrap();
        handle.stop();
        let err = handle.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, VoiceError::NoSpeech));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Va bene.".to_string()]);
        let mut handle = recognizer.begin("it-IT").unwrap();
        handle.stop();
        handle.stop();
        let last = handle.recv().await.unwrap().unwrap();
        assert_eq!(last.text, "Va bene.");
    }
}
