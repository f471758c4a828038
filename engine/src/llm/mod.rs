//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the language-model providers
//! the research engine talks to (Ollama, OpenAI-compatible, Anthropic,
//! Gemini). Providers produce plain text; structured decisions are parsed on
//! top of that by [`decision`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::LLMConfig;
use crate::secrets::SecretCache;
use sdk::errors::EngineError;

pub mod anthropic;
pub mod decision;
pub mod gemini;
pub mod ollama;
pub mod openai;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl LLMError {
    /// Map a reqwest transport error, naming the provider in connect failures
    pub fn from_transport(provider: &str, base_url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LLMError::Timeout
        } else if e.is_connect() {
            LLMError::ProviderUnavailable(format!(
                "Cannot connect to {} at {}",
                provider, base_url
            ))
        } else {
            LLMError::NetworkError(crate::secrets::scrub_secrets(&e.to_string()))
        }
    }

    /// Map a non-success HTTP status and its body
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body = crate::secrets::scrub_secrets(body);
        match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(body),
            429 => LLMError::RateLimitExceeded,
            400 | 404 | 422 => LLMError::InvalidRequest(body),
            _ => LLMError::ProviderUnavailable(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<LLMError> for EngineError {
    fn from(e: LLMError) -> Self {
        match e {
            LLMError::AuthenticationFailed(msg) => EngineError::Config(msg),
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

impl From<&sdk::types::ConversationMessage> for Message {
    fn from(m: &sdk::types::ConversationMessage) -> Self {
        match m.role {
            sdk::types::Role::User => Message::user(m.content.clone()),
            sdk::types::Role::Assistant => Message::assistant(m.content.clone()),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Callback receiving each streamed fragment
pub type TokenSink<'a> = dyn for<'t> Fn(&'t str) + Send + Sync + 'a;

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Returns true if the model runs on this machine
    fn is_local(&self) -> bool;

    /// Generate a complete response
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Generate a response, handing each fragment to `on_token` as it arrives.
    ///
    /// Returns the full text. Providers without native streaming emit the
    /// whole response as a single fragment.
    async fn stream(
        &self,
        messages: &[Message],
        on_token: &TokenSink,
    ) -> Result<String> {
        let text = self.generate(messages).await?;
        on_token(&text);
        Ok(text)
    }

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

/// Build the provider named by `config.default_provider`
pub fn create_provider(
    config: &LLMConfig,
    secrets: &SecretCache,
) -> std::result::Result<Arc<dyn LLMProvider>, EngineError> {
    let provider: Arc<dyn LLMProvider> = match config.default_provider.as_str() {
        "ollama" => Arc::new(ollama::OllamaProvider::new(
            config.ollama.base_url.clone(),
            config.ollama.model.clone(),
        )?),
        "openai" => Arc::new(openai::OpenAIProvider::new(
            config.openai.clone(),
            secrets.get_secret("openai_api_key")?,
        )?),
        "anthropic" => Arc::new(anthropic::AnthropicProvider::new(
            config.anthropic.clone(),
            secrets.get_secret("anthropic_api_key")?,
        )?),
        "gemini" => Arc::new(gemini::GeminiProvider::new(
            config.gemini.clone(),
            secrets.get_secret("gemini_api_key")?,
        )?),
        other => {
            return Err(EngineError::Config(format!(
                "Unknown LLM provider '{}'",
                other
            )))
        }
    };

    tracing::info!("Using LLM provider: {}", provider.name());
    Ok(provider)
}

/// Build a reqwest client with the given overall timeout
pub(crate) fn http_client(
    timeout: std::time::Duration,
) -> std::result::Result<reqwest::Client, EngineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Locate the JSON object in model output.
///
/// Handles three shapes:
/// 1. The whole content is a JSON object
/// 2. A fenced code block (with or without trailing prose)
/// 3. An object embedded in prose, found by brace matching
pub fn extract_json_object(content: &str) -> Option<&str> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        let inner = inner.trim();
        if inner.starts_with('{') {
            return Some(inner);
        }
    }

    let start = trimmed.find('{')?;
    extract_balanced_json(&trimmed[start..])
}

/// Extract the body of the first markdown code fence in the text.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        assert_eq!(Message::user("Hello").role, MessageRole::User);
        assert_eq!(Message::assistant("Hi").role, MessageRole::Assistant);
        assert_eq!(Message::system("Be brief").role, MessageRole::System);
    }

    #[test]
    fn test_conversation_message_conversion() {
        let m = sdk::types::ConversationMessage::assistant("done");
        let converted = Message::from(&m);
        assert_eq!(converted.role, MessageRole::Assistant);
        assert_eq!(converted.content, "done");
    }

    #[test]
    fn test_extract_raw_json() {
        let content = r#"  {"type": "answer"}  "#;
        assert_eq!(extract_json_object(content), Some(r#"{"type": "answer"}"#));
    }

    #[test]
    fn test_extract_fenced_json_with_trailing_prose() {
        let content = "Here you go:\n```json\n{\"type\": \"search\", \"query\": \"x\"}\n```\nHope that helps";
        let json = extract_json_object(content).unwrap();
        assert!(json.contains("\"search\""));
    }

    #[test]
    fn test_extract_embedded_json_respects_strings() {
        let content = r#"I think {"type": "search", "query": "a } brace"} is best"#;
        assert_eq!(
            extract_json_object(content),
            Some(r#"{"type": "search", "query": "a } brace"}"#)
        );
    }

    #[test]
    fn test_extract_none_for_prose() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            LLMError::from_status(reqwest::StatusCode::UNAUTHORIZED, "bad key"),
            LLMError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            LLMError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            LLMError::RateLimitExceeded
        ));
        assert!(matches!(
            LLMError::from_status(reqwest::StatusCode::BAD_GATEWAY, ""),
            LLMError::ProviderUnavailable(_)
        ));
    }
}
