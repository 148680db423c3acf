//! Session state machine: owns the training-session lifecycle and
//! orchestrates prompt compilation, turn generation and trait fusion.
//!
//! Transitions: idle -> active (`start`), active -> ended (`end`),
//! ended -> active (`start` again, fresh persona). Turn submission is valid
//! only while active and is strictly one-at-a-time; fusion order matters, so
//! a completed turn is fully applied before the next may begin.

use crate::client::{ChatBackend, LiveReply, TurnRequest};
use crate::error::{CoreError, CoreResult};
use crate::fusion;
use crate::parser::{self, ParsedReply};
use crate::prompt;
use crate::registry::PersonaRegistry;
use crate::types::{Message, Session, SessionStatus};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of one successfully completed user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The assistant message appended to the transcript.
    pub reply: Message,
    /// What the parser extracted from the raw reply.
    pub parsed: ParsedReply,
}

/// Clears the in-flight flag when the turn finishes, errors, or is dropped.
struct FlightGuard(Arc<AtomicBool>);

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> CoreResult<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(CoreError::TurnInFlight);
        }
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns one session and all mutations to it.
pub struct SessionEngine {
    registry: Arc<PersonaRegistry>,
    backend: Arc<dyn ChatBackend>,
    temperature: f32,
    max_tokens: u32,
    session: Session,
    in_flight: Arc<AtomicBool>,
}

impl SessionEngine {
    pub fn new(
        registry: Arc<PersonaRegistry>,
        backend: Arc<dyn ChatBackend>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            registry,
            backend,
            temperature,
            max_tokens,
            session: Session::idle(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read-only view of the current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.session.status == SessionStatus::Active
    }

    /// Whether a turn submission is currently pending (input should be
    /// disabled by the caller during this window).
    pub fn is_turn_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start a session: idle -> active, or ended -> active (restart with a
    /// freshly drawn persona). Seeds the transcript with the persona's
    /// opening greeting.
    pub fn start(&mut self) -> CoreResult<&Session> {
        if self.session.status == SessionStatus::Active {
            return Err(CoreError::InvalidTransition(
                "start is not valid while a session is active".to_string(),
            ));
        }
        let persona = self.registry.pick_random()?.clone();
        let greeting = prompt::opening_greeting(&persona);
        info!(persona = %persona.id, "session started");

        self.session = Session {
            id: Uuid::new_v4(),
            status: SessionStatus::Active,
            persona: Some(persona),
            messages: vec![Message::assistant(greeting)],
            revealed_traits: Default::default(),
            trait_signals: Vec::new(),
            started_at: Some(Utc::now()),
            ended_at: None,
        };
        Ok(&self.session)
    }

    /// End the session: active -> ended. Transcript and trait state are
    /// frozen thereafter; only `start` is valid from here.
    pub fn end(&mut self) -> CoreResult<&Session> {
        if self.session.status != SessionStatus::Active {
            return Err(CoreError::InvalidTransition(format!(
                "end is not valid from status {}",
                self.session.status.as_str()
            )));
        }
        self.session.status = SessionStatus::Ended;
        self.session.ended_at = Some(Utc::now());
        info!(session = %self.session.id, "session ended");
        Ok(&self.session)
    }

    /// Submit one user turn in blocking mode.
    ///
    /// The user message is appended before the model call and retained even
    /// on failure; the assistant message and trait update happen only on
    /// success. A second submission while one is pending is rejected.
    pub async fn submit_turn(&mut self, text: &str) -> CoreResult<TurnOutcome> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        let request = self.begin_turn(text)?;
        let raw = self.backend.complete(&request).await?;
        Ok(self.finish_turn(&raw))
    }

    /// Submit one user turn in incremental mode. `on_visible` observes the
    /// delimiter-suppressed running reply text after each visible change.
    pub async fn submit_turn_live(
        &mut self,
        text: &str,
        mut on_visible: impl FnMut(&str),
    ) -> CoreResult<TurnOutcome> {
        let _guard = FlightGuard::acquire(&self.in_flight)?;
        let request = self.begin_turn(text)?;

        let mut fragments = self.backend.stream(&request).await?;
        let mut live = LiveReply::new();
        while let Some(item) = fragments.recv().await {
            let fragment = item?;
            if live.push(&fragment) {
                on_visible(live.visible());
            }
        }
        Ok(self.finish_turn(live.full_text()))
    }

    /// Validate, append the user message, and build the model request.
    fn begin_turn(&mut self, text: &str) -> CoreResult<TurnRequest> {
        if self.session.status != SessionStatus::Active {
            return Err(CoreError::InvalidTransition(format!(
                "cannot submit a turn from status {}",
                self.session.status.as_str()
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::EmptyTurn);
        }
        // Persona is guaranteed present while active.
        let persona = self
            .session
            .persona
            .as_ref()
            .ok_or_else(|| CoreError::InvalidTransition("active session without persona".into()))?;
        let system = prompt::system_prompt(persona);

        self.session.messages.push(Message::user(text));
        Ok(TurnRequest::from_transcript(
            system,
            &self.session.messages,
            self.temperature,
            self.max_tokens,
        ))
    }

    /// Apply a completed reply: append the assistant message and, when the
    /// turn carried trait data, fuse it into the revealed estimate.
    fn finish_turn(&mut self, raw: &str) -> TurnOutcome {
        let parsed = parser::parse_reply(raw);
        let reply = Message::assistant(parsed.content.clone());
        self.session.messages.push(reply.clone());

        if !parsed.traits.is_empty() {
            self.session.revealed_traits =
                fusion::fuse(&self.session.revealed_traits, &parsed.traits);
            let new_signals = fusion::signals_for_turn(&parsed.traits, &parsed.signals);
            fusion::push_signals(&mut self.session.trait_signals, new_signals);
            debug!(
                revealed = self.session.revealed_traits.len(),
                signals = self.session.trait_signals.len(),
                "trait estimate updated"
            );
        }

        TurnOutcome { reply, parsed }
    }
}
