//! Trainer configuration loaded from the environment.
//!
//! Provider selection is configuration, not part of the engine contract: all
//! providers speak the OpenAI-compatible chat wire format, so swapping one
//! for another changes only base URL, model name and key.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default sampling temperature for the role-play model.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Default maximum output tokens per reply.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Default conversation language hint (speech and prompt instructions).
pub const DEFAULT_LANGUAGE: &str = "it-IT";

/// Interchangeable text-generation backends.
///
/// | Env value | Endpoint | Default model |
/// |-----------|----------|---------------|
/// | openai | api.openai.com | gpt-4o |
/// | google | generativelanguage.googleapis.com (OpenAI-compat) | gemini-2.0-flash |
/// | groq | api.groq.com | llama-3.3-70b-versatile |
/// | openrouter | openrouter.ai | meta-llama/llama-3.3-70b-instruct |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Google,
    Groq,
    OpenRouter,
}

impl Provider {
    /// Parse an env value; case-insensitive. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "google" => Some(Self::Google),
            "groq" => Some(Self::Groq),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    /// Base URL without trailing slash, OpenAI-compatible surface.
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Google => "gemini-2.0-flash",
            Self::Groq => "llama-3.3-70b-versatile",
            Self::OpenRouter => "meta-llama/llama-3.3-70b-instruct",
        }
    }

    /// Provider-native API key variable, consulted after `DIALOGO_API_KEY`.
    pub fn key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GEMINI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Google => "Google Gemini",
            Self::Groq => "Groq",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::OpenAi
    }
}

/// Resolve the provider from `DIALOGO_PROVIDER`.
///
/// Unset selects OpenAI; an unrecognized value warns and falls back to
/// Google rather than failing the whole system.
pub fn provider_from_env() -> Provider {
    match std::env::var("DIALOGO_PROVIDER") {
        Err(_) => Provider::default(),
        Ok(raw) if raw.trim().is_empty() => Provider::default(),
        Ok(raw) => Provider::parse(&raw).unwrap_or_else(|| {
            warn!(provider = %raw, "unknown provider, falling back to Google");
            Provider::Google
        }),
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Full trainer configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | DIALOGO_PROVIDER | openai | Text-generation backend. |
/// | DIALOGO_MODEL | per provider | Model override. |
/// | DIALOGO_API_KEY | provider-native var | Bearer key. |
/// | DIALOGO_LANG | it-IT | Conversation/speech language hint. |
/// | DIALOGO_TEMPERATURE | 0.8 | Sampling temperature. |
/// | DIALOGO_MAX_TOKENS | 500 | Max reply tokens. |
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub language: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl TrainerConfig {
    pub fn from_env() -> Self {
        let provider = provider_from_env();
        let model = env_opt("DIALOGO_MODEL").unwrap_or_else(|| provider.default_model().to_string());
        let api_key = env_opt("DIALOGO_API_KEY").or_else(|| env_opt(provider.key_env()));
        Self {
            provider,
            model,
            api_key,
            language: env_opt("DIALOGO_LANG").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            temperature: env_f32("DIALOGO_TEMPERATURE", DEFAULT_TEMPERATURE),
            max_tokens: env_u32("DIALOGO_MAX_TOKENS", DEFAULT_MAX_TOKENS),
        }
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        let provider = Provider::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: None,
            language: DEFAULT_LANGUAGE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}
