//! Generative turn client: obtain role-played replies from an
//! OpenAI-compatible chat endpoint, in blocking or incremental mode.
//!
//! The client holds no session state; the session engine passes the full
//! ordered transcript plus the compiled system instruction on every turn.

use crate::config::TrainerConfig;
use crate::error::{CoreError, CoreResult};
use crate::parser::TRAIT_DELIMITER;
use crate::types::{Message, Role};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One turn's worth of input for the model.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Compiled persona instruction.
    pub system: String,
    /// Full ordered transcript, replayed verbatim.
    pub messages: Vec<(Role, String)>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl TurnRequest {
    pub fn from_transcript(
        system: String,
        transcript: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            system,
            messages: transcript
                .iter()
                .map(|m| (m.role, m.content.clone()))
                .collect(),
            temperature,
            max_tokens,
        }
    }
}

/// Ordered, finite, non-restartable sequence of reply fragments.
/// An `Err` item ends the stream; to regenerate, issue a new request.
pub type FragmentStream = mpsc::UnboundedReceiver<CoreResult<String>>;

/// Text-generation capability consumed by the session engine.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Blocking mode: suspend until the complete reply text is available.
    async fn complete(&self, request: &TurnRequest) -> CoreResult<String>;

    /// Incremental mode: fragments are delivered in arrival order as they
    /// become available.
    async fn stream(&self, request: &TurnRequest) -> CoreResult<FragmentStream>;
}

// OpenAI-compatible wire format.
#[derive(Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// HTTP client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl HttpChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            model: model.into(),
            client,
        })
    }

    /// Build from a resolved trainer configuration. Requires an API key.
    pub fn from_config(config: &TrainerConfig) -> CoreResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            CoreError::Config(format!(
                "no API key: set DIALOGO_API_KEY or {}",
                config.provider.key_env()
            ))
        })?;
        Self::new(config.provider.base_url(), api_key, config.model.clone())
    }

    fn body(&self, request: &TurnRequest, stream: bool) -> ChatRequestBody {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: request.system.clone(),
        });
        messages.extend(request.messages.iter().map(|(role, content)| WireMessage {
            role: role.as_str().to_string(),
            content: content.clone(),
        }));
        ChatRequestBody {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }

    async fn post(&self, body: &ChatRequestBody) -> CoreResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Provider(format!("chat request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(CoreError::Provider(format!("chat API error {status}: {text}")));
        }
        Ok(res)
    }
}

/// Extract the delta fragment from one SSE `data:` payload, if any.
fn sse_delta(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn complete(&self, request: &TurnRequest) -> CoreResult<String> {
        debug!(messages = request.messages.len(), model = %self.model, "chat completion");
        let res = self.post(&self.body(request, false)).await?;
        let parsed: ChatResponseBody = res
            .json()
            .await
            .map_err(|e| CoreError::Provider(format!("chat response parse failed: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CoreError::Provider("chat response had no choices".to_string()))
    }

    async fn stream(&self, request: &TurnRequest) -> CoreResult<FragmentStream> {
        let res = self.post(&self.body(request, true)).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut bytes = res.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            'recv: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(CoreError::Provider(format!(
                            "stream interrupted: {e}"
                        ))));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        break 'recv;
                    }
                    if let Some(delta) = sse_delta(payload) {
                        if tx.send(Ok(delta)).is_err() {
                            return; // consumer gone
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Running reply buffer for the incremental path.
///
/// Observers must never see raw trailer text: once the trait delimiter (or a
/// partial suffix of it) starts appearing, the visible view is frozen to the
/// pre-delimiter portion, trimmed. The full buffer is kept for parsing.
#[derive(Debug, Default)]
pub struct LiveReply {
    buffer: String,
    visible: String,
    sealed: bool,
}

impl LiveReply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the longest tail of `buffer` that is a proper prefix of the
    /// delimiter. Those bytes are withheld until they resolve either way.
    fn pending_delimiter_bytes(buffer: &str) -> usize {
        let max = TRAIT_DELIMITER.len().min(buffer.len());
        for k in (1..=max).rev() {
            if buffer.ends_with(&TRAIT_DELIMITER[..k]) {
                return k;
            }
        }
        0
    }

    /// Append a fragment. Returns true when the visible view changed.
    pub fn push(&mut self, fragment: &str) -> bool {
        self.buffer.push_str(fragment);
        if self.sealed {
            return false;
        }
        if let Some(index) = self.buffer.find(TRAIT_DELIMITER) {
            self.sealed = true;
            self.visible = self.buffer[..index].trim().to_string();
            return true;
        }
        let held_back = Self::pending_delimiter_bytes(&self.buffer);
        let next = self.buffer[..self.buffer.len() - held_back].trim().to_string();
        if next != self.visible {
            self.visible = next;
            true
        } else {
            false
        }
    }

    /// The user-facing portion of the reply so far.
    pub fn visible(&self) -> &str {
        &self.visible
    }

    /// Whether the delimiter has been observed (updates have stopped).
    pub fn delimiter_seen(&self) -> bool {
        self.sealed
    }

    /// The complete raw buffer, for parsing once the stream ends.
    pub fn full_text(&self) -> &str {
        &self.buffer
    }
}

/// Scripted backend: canned replies and injectable failures. Used by tests
/// and by the trainer when no API key is configured.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
    fail_next: Mutex<Option<String>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fail_next: Mutex::new(None),
        }
    }

    /// Queue one more canned reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().expect("scripted replies lock").push_back(reply.into());
    }

    /// Make the next call fail with a provider error.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock().expect("scripted fail lock") = Some(message.into());
    }

    fn next_reply(&self) -> CoreResult<String> {
        if let Some(message) = self.fail_next.lock().expect("scripted fail lock").take() {
            return Err(CoreError::Provider(message));
        }
        Ok(self
            .replies
            .lock()
            .expect("scripted replies lock")
            .pop_front()
            .unwrap_or_else(default_scripted_reply))
    }
}

fn default_scripted_reply() -> String {
    format!(
        "Capisco. Prima di decidere vorrei vedere qualche dato concreto sulle coperture.\n\n{}\n{{\"traits\":{{\"C\":0.7,\"O\":0.5}},\"signals\":[\"Richiesta di dati concreti\"]}}",
        TRAIT_DELIMITER
    )
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(&self, _request: &TurnRequest) -> CoreResult<String> {
        self.next_reply()
    }

    async fn stream(&self, _request: &TurnRequest) -> CoreResult<FragmentStream> {
        let reply = self.next_reply()?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for fragment in reply.split_inclusive(' ') {
                if tx.send(Ok(fragment.to_string())).is_err() {
                    warn!("scripted stream consumer dropped");
                    return;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_reply_plain_text_is_fully_visible() {
        let mut live = LiveReply::new();
        assert!(live.push("Buongiorno, "));
        assert!(live.push("mi dica pure."));
        assert_eq!(live.visible(), "Buongiorno, mi dica pure.");
        assert!(!live.delimiter_seen());
    }

    #[test]
    fn live_reply_freezes_at_delimiter() {
        let mut live = LiveReply::new();
        live.push("Va bene.\n");
        live.push(TRAIT_DELIMITER);
        assert!(live.delimiter_seen());
        assert_eq!(live.visible(), "Va bene.");
        // Trailer fragments never reach the visible view.
        assert!(!live.push("{\"traits\":{\"E\":0.9}}"));
        assert_eq!(live.visible(), "Va bene.");
        assert!(live.full_text().contains("{\"traits\""));
    }

    #[test]
    fn live_reply_withholds_partial_delimiter() {
        let mut live = LiveReply::new();
        live.push("Certo.");
        live.push("\n---TRA");
        // The partial marker must not flash to the user.
        assert_eq!(live.visible(), "Certo.");
        live.push("ITS---\n{\"traits\":{}}");
        assert!(live.delimiter_seen());
        assert_eq!(live.visible(), "Certo.");
    }

    #[test]
    fn live_reply_releases_false_partial() {
        let mut live = LiveReply::new();
        live.push("Prezzo: 100 ");
        live.push("---");
        assert_eq!(live.visible(), "Prezzo: 100");
        live.push(" al mese.");
        assert_eq!(live.visible(), "Prezzo: 100 --- al mese.");
        assert!(!live.delimiter_seen());
    }

    #[test]
    fn sse_delta_extraction() {
        let payload = r#"{"choices":[{"delta":{"content":"ciao"}}]}"#;
        assert_eq!(sse_delta(payload), Some("ciao".to_string()));
        assert_eq!(sse_delta(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(sse_delta("not json"), None);
    }

    #[tokio::test]
    async fn scripted_backend_replies_in_order() {
        let backend = ScriptedChat::with_replies(vec!["uno".into(), "due".into()]);
        let request = TurnRequest {
            system: String::new(),
            messages: Vec::new(),
            temperature: 0.8,
            max_tokens: 500,
        };
        assert_eq!(backend.complete(&request).await.unwrap(), "uno");
        assert_eq!(backend.complete(&request).await.unwrap(), "due");
    }

    #[tokio::test]
    async fn scripted_failure_is_provider_error() {
        let backend = ScriptedChat::new();
        backend.fail_next("connessione rifiutata");
        let request = TurnRequest {
            system: String::new(),
            messages: Vec::new(),
            temperature: 0.8,
            max_tokens: 500,
        };
        let err = backend.complete(&request).await.unwrap_err();
        assert!(matches!(err, CoreError::Provider(_)));
    }

    #[tokio::test]
    async fn scripted_stream_preserves_order() {
        let backend = ScriptedChat::with_replies(vec!["uno due tre".into()]);
        let request = TurnRequest {
            system: String::new(),
            messages: Vec::new(),
            temperature: 0.8,
            max_tokens: 500,
        };
        let mut rx = backend.stream(&request).await.unwrap();
        let mut collected = String::new();
        while let Some(item) = rx.recv().await {
            collected.push_str(&item.unwrap());
        }
        assert_eq!(collected, "uno due tre");
    }
}
