//! Turn-taking controller: one phase at a time, never mic and speaker together.

use crate::error::{VoiceError, VoiceResult};
use crate::recognizer::{RecognitionHandle, SpeechRecognizer, TranscriptFragment};
use crate::synthesizer::{Playback, SpeechApiTts, SpeechSynthesizer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Phase of the voice exchange. The controller enforces mutual exclusion:
/// the microphone is only open in `Listening`, audio only plays in `Speaking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePhase {
    Idle,
    Listening,
    Processing,
    Speaking,
}

/// Events surfaced to the application loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Partial transcript while the trainee is still talking.
    InterimTranscript(String),
    /// Final transcript; submit this as the trainee's turn.
    TurnReady(String),
    /// The spoken reply finished playing (or was skipped).
    ReplyFinished,
    /// A voice stage failed; carries the user-facing message.
    Failed(String),
}

enum PumpEvent {
    PlaybackDone(u64),
}

/// Drives one voice exchange at a time over pluggable recognition,
/// synthesis and playback backends.
///
/// Holds platform audio handles that are not Send, so the controller lives
/// on the thread that created it.
pub struct VoiceController {
    recognizer: Box<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    playback: Option<Playback>,
    language: String,
    phase: VoicePhase,
    listening: Option<RecognitionHandle>,
    pump_tx: mpsc::UnboundedSender<PumpEvent>,
    pump_rx: mpsc::UnboundedReceiver<PumpEvent>,
    // Bumped on every speak/interrupt so a completion notice from a
    // cancelled playback cannot close a newer one.
    generation: u64,
}

impl VoiceController {
    /// Build with explicit backends. `playback: None` skips audio output and
    /// reports every spoken reply as finished immediately.
    pub fn with_parts(
        recognizer: Box<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        playback: Option<Playback>,
        language: impl Into<String>,
    ) -> Self {
        let (pump_tx, pump_rx) = mpsc::unbounded_channel();
        Self {
            recognizer,
            synthesizer,
            playback,
            language: language.into(),
            phase: VoicePhase::Idle,
            listening: None,
            pump_tx,
            pump_rx,
            generation: 0,
        }
    }

    /// Build the production controller from the environment: Whisper-style
    /// transcription, OpenAI-compatible synthesis, default output device.
    pub fn from_env(language: impl Into<String>) -> VoiceResult<Self> {
        if !crate::audio::AudioCapture::is_available() {
            return Err(VoiceError::Unsupported(
                "no default input device".to_string(),
            ));
        }
        let recognizer = crate::recognizer::WhisperApiRecognizer::from_env()?;
        let synthesizer = SpeechApiTts::from_env()?;
        let playback = Playback::new()?;
        info!("voice controller ready");
        Ok(Self::with_parts(
            Box::new(recognizer),
            Arc::new(synthesizer),
            Some(playback),
            language,
        ))
    }

    pub fn phase(&self) -> VoicePhase {
        self.phase
    }

    /// Open the microphone. Returns `Ok(false)` without side effects when a
    /// voice exchange is already underway.
    pub fn try_start_listening(&mut self) -> VoiceResult<bool> {
        if self.phase != VoicePhase::Idle {
            debug!(phase = ?self.phase, "listening request ignored");
            return Ok(false);
        }
        let handle = self.recognizer.begin(&self.language)?;
        self.listening = Some(handle);
        self.phase = VoicePhase::Listening;
        Ok(true)
    }

    /// Close the microphone and wait for the final transcript. No-op unless
    /// currently listening.
    pub fn stop_listening(&mut self) {
        if self.phase != VoicePhase::Listening {
            return;
        }
        if let Some(handle) = self.listening.as_mut() {
            handle.stop();
        }
        self.phase = VoicePhase::Processing;
    }

    /// Synthesize and play a reply. Refused while the microphone is open;
    /// an already-playing reply is cut off first.
    pub async fn speak(&mut self, text: &str) -> VoiceResult<()> {
        if self.phase == VoicePhase::Listening {
            return Err(VoiceError::Playback(
                "speech output refused while the microphone is open".to_string(),
            ));
        }
        if self.phase == VoicePhase::Speaking {
            self.cut_playback();
        }
        self.generation += 1;
        let generation = self.generation;
        self.phase = VoicePhase::Speaking;

        // Any failure past this point must not strand the phase in Speaking:
        // no completion event will arrive for a reply that never queued.
        if let Err(e) = self.render(text, generation).await {
            self.generation += 1;
            self.phase = VoicePhase::Idle;
            return Err(e);
        }
        Ok(())
    }

    /// Synthesize and queue one reply; arranges the completion notice for
    /// `generation`.
    async fn render(&self, text: &str, generation: u64) -> VoiceResult<()> {
        let bytes = self.synthesizer.synthesize(text, &self.language).await?;
        let queued = match (&self.playback, bytes.is_empty()) {
            (Some(playback), false) => {
                playback.play_bytes(&bytes)?;
                let pump = self.pump_tx.clone();
                playback.notify_when_done(move || {
                    let _ = pump.send(PumpEvent::PlaybackDone(generation));
                });
                true
            }
            _ => false,
        };
        if !queued {
            // Nothing to play; close the exchange on the next pump.
            let _ = self.pump_tx.send(PumpEvent::PlaybackDone(generation));
        }
        Ok(())
    }

    /// Abort whatever is in progress and return to idle.
    pub fn interrupt(&mut self) {
        if let Some(handle) = self.listening.as_mut() {
            handle.stop();
        }
        self.listening = None;
        self.cut_playback();
        self.phase = VoicePhase::Idle;
    }

    /// Reset after the text turn behind a `TurnReady` failed, so the next
    /// exchange can start.
    pub fn reply_failed(&mut self) {
        self.phase = VoicePhase::Idle;
    }

    fn cut_playback(&mut self) {
        if let Some(playback) = &self.playback {
            playback.stop();
        }
        self.generation += 1;
    }

    /// Wait for the next voice event. Returns `None` only if the internal
    /// channel closed, which does not happen while the controller is alive.
    pub async fn next_event(&mut self) -> Option<VoiceEvent> {
        loop {
            tokio::select! {
                fragment = Self::next_fragment(&mut self.listening) => {
                    match fragment {
                        Some(Ok(TranscriptFragment { text, is_final: false })) => {
                            return Some(VoiceEvent::InterimTranscript(text));
                        }
                        Some(Ok(TranscriptFragment { text, is_final: true })) => {
                            self.listening = None;
                            self.phase = VoicePhase::Processing;
                            return Some(VoiceEvent::TurnReady(text));
                        }
                        Some(Err(e)) => {
                            warn!("recognition failed: {e}");
                            self.listening = None;
                            self.phase = VoicePhase::Idle;
                            return Some(VoiceEvent::Failed(e.user_message()));
                        }
                        None => {
                            // Recognizer went away without a final transcript.
                            self.listening = None;
                            if self.phase != VoicePhase::Idle {
                                self.phase = VoicePhase::Idle;
                                return Some(VoiceEvent::Failed(
                                    VoiceError::NoSpeech.user_message(),
                                ));
                            }
                        }
                    }
                }
                pump = self.pump_rx.recv() => {
                    match pump {
                        Some(PumpEvent::PlaybackDone(generation)) => {
                            if generation == self.generation
                                && self.phase == VoicePhase::Speaking
                            {
                                self.phase = VoicePhase::Idle;
                                return Some(VoiceEvent::ReplyFinished);
                            }
                            // Stale notice from an interrupted playback.
                        }
                        None => return None,
                    }
                }
            }
        }
    }

    async fn next_fragment(
        listening: &mut Option<RecognitionHandle>,
    ) -> Option<VoiceResult<TranscriptFragment>> {
        match listening.as_mut() {
            Some(handle) => handle.recv().await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::ScriptedRecognizer;
    use crate::synthesizer::SilentTts;
    use async_trait::async_trait;

    struct BrokenTts;

    #[async_trait]
    impl crate::synthesizer::SpeechSynthesizer for BrokenTts {
        async fn synthesize(&self, _text: &str, _language: &str) -> VoiceResult<Vec<u8>> {
            Err(VoiceError::Synthesis("endpoint returned garbage".to_string()))
        }
    }

    fn controller(recognizer: ScriptedRecognizer) -> VoiceController {
        VoiceController::with_parts(
            Box::new(recognizer),
            Arc::new(SilentTts),
            None,
            "it-IT",
        )
    }

    #[tokio::test]
    async fn full_exchange_walks_the_phases() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec![
            "Le propongo".to_string(),
            "Le propongo una polizza vita.".to_string(),
        ]);
        let mut vc = controller(recognizer);

        assert_eq!(vc.phase(), VoicePhase::Idle);
        assert!(vc.try_start_listening().unwrap());
        assert_eq!(vc.phase(), VoicePhase::Listening);

        let interim = vc.next_event().await.unwrap();
        assert_eq!(interim, VoiceEvent::InterimTranscript("Le propongo".into()));

        vc.stop_listening();
        assert_eq!(vc.phase(), VoicePhase::Processing);

        let ready = vc.next_event().await.unwrap();
        assert_eq!(
            ready,
            VoiceEvent::TurnReady("Le propongo una polizza vita.".into())
        );

        vc.speak("Interessante, mi dica di più.").await.unwrap();
        assert_eq!(vc.phase(), VoicePhase::Speaking);
        assert_eq!(vc.next_event().await.unwrap(), VoiceEvent::ReplyFinished);
        assert_eq!(vc.phase(), VoicePhase::Idle);
    }

    #[tokio::test]
    async fn listening_is_not_reentrant() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Pronto.".to_string()]);
        let mut vc = controller(recognizer);

        assert!(vc.try_start_listening().unwrap());
        assert!(!vc.try_start_listening().unwrap());
        assert_eq!(vc.phase(), VoicePhase::Listening);
    }

    #[tokio::test]
    async fn listening_refused_while_speaking() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Pronto.".to_string()]);
        let mut vc = controller(recognizer);

        vc.speak("Buongiorno, mi dica.").await.unwrap();
        assert_eq!(vc.phase(), VoicePhase::Speaking);
        assert!(!vc.try_start_listening().unwrap());
        assert_eq!(vc.phase(), VoicePhase::Speaking);

        assert_eq!(vc.next_event().await.unwrap(), VoiceEvent::ReplyFinished);
        assert!(vc.try_start_listening().unwrap());
    }

    #[tokio::test]
    async fn failed_reply_rendering_returns_to_idle() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Domanda.".to_string()]);
        let mut vc = VoiceController::with_parts(
            Box::new(recognizer),
            Arc::new(BrokenTts),
            None,
            "it-IT",
        );

        let err = vc.speak("Le spiego subito.").await.unwrap_err();
        assert!(matches!(err, VoiceError::Synthesis(_)));
        // No completion event is coming for the failed reply; the phase must
        // not stay stuck in Speaking.
        assert_eq!(vc.phase(), VoicePhase::Idle);
        assert!(vc.try_start_listening().unwrap());
    }

    #[tokio::test]
    async fn speaking_refused_while_listening() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Pronto.".to_string()]);
        let mut vc = controller(recognizer);

        vc.try_start_listening().unwrap();
        let err = vc.speak("Buongiorno").await.unwrap_err();
        assert!(matches!(err, VoiceError::Playback(_)));
        assert_eq!(vc.phase(), VoicePhase::Listening);
    }

    #[tokio::test]
    async fn stale_playback_notice_is_ignored() {
        let recognizer = ScriptedRecognizer::new();
        let mut vc = controller(recognizer);

        vc.speak("Prima risposta").await.unwrap();
        vc.interrupt();
        assert_eq!(vc.phase(), VoicePhase::Idle);

        vc.speak("Seconda risposta").await.unwrap();
        // The first queued completion belongs to the cancelled playback and
        // must not close the second one prematurely.
        assert_eq!(vc.next_event().await.unwrap(), VoiceEvent::ReplyFinished);
        assert_eq!(vc.phase(), VoicePhase::Idle);
        vc.speak("Terza").await.unwrap();
        assert_eq!(vc.next_event().await.unwrap(), VoiceEvent::ReplyFinished);
    }

    #[tokio::test]
    async fn recognition_failure_returns_to_idle_with_message() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Pronto.".to_string()]);
        recognizer.fail_next("service down");
        let mut vc = controller(recognizer);

        vc.try_start_listening().unwrap();
        vc.stop_listening();
        match vc.next_event().await.unwrap() {
            VoiceEvent::Failed(msg) => assert!(msg.starts_with("Errore")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(vc.phase(), VoicePhase::Idle);
        assert!(vc.try_start_listening().unwrap());
    }

    #[tokio::test]
    async fn reply_failed_unblocks_next_exchange() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.push_script(vec!["Domanda.".to_string()]);
        recognizer.push_script(vec!["Seconda domanda.".to_string()]);
        let mut vc = controller(recognizer);

        vc.try_start_listening().unwrap();
        vc.stop_listening();
        assert!(matches!(
            vc.next_event().await.unwrap(),
            VoiceEvent::TurnReady(_)
        ));
        assert_eq!(vc.phase(), VoicePhase::Processing);
        assert!(!vc.try_start_listening().unwrap());

        vc.reply_failed();
        assert!(vc.try_start_listening().unwrap());
    }
}
