//! Ollama LLM Provider
//!
//! Implements [`LLMProvider`] for Ollama, a local model server typically at
//! http://localhost:11434.
//!
//! Key features:
//! - Local execution (no API keys required)
//! - Native streaming: `/api/chat` with `stream: true` returns one JSON
//!   object per line, each carrying a content fragment

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LLMError, LLMProvider, Message, Result, TokenSink};
use sdk::errors::EngineError;

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llama3.1:8b")
    model: String,

    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> std::result::Result<Self, EngineError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: super::http_client(Duration::from_secs(300))?,
        })
    }

    /// Convert our Message format to Ollama's format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    async fn send(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response> {
        let ollama_messages = self.convert_messages(messages);

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}, stream={}",
            self.model,
            ollama_messages.len(),
            ollama_messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>(),
            stream
        );

        let request = OllamaRequest {
            model: self.model.clone(),
            messages: ollama_messages,
            stream,
        };

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::from_transport("Ollama", &self.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Parse one NDJSON line of a streaming chat response
fn parse_stream_line(line: &str) -> Result<Option<OllamaStreamChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: OllamaStreamChunk = serde_json::from_str(line)
        .map_err(|e| LLMError::ParseError(format!("Bad Ollama stream line: {}", e)))?;
    if let Some(error) = chunk.error.as_deref() {
        return Err(LLMError::StreamInterrupted(error.to_string()));
    }
    Ok(Some(chunk))
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let start = std::time::Instant::now();
        let response = self.send(messages, false).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::info!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(ollama_response.message.content)
    }

    async fn stream(
        &self,
        messages: &[Message],
        on_token: &TokenSink,
    ) -> Result<String> {
        let response = self.send(messages, true).await?;
        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut full = String::new();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| LLMError::StreamInterrupted(e.to_string()))?;
            pending.extend_from_slice(&bytes);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(chunk) = parse_stream_line(&line)? {
                    if !chunk.message.content.is_empty() {
                        on_token(&chunk.message.content);
                        full.push_str(&chunk.message.content);
                    }
                    if chunk.done {
                        return Ok(full);
                    }
                }
            }
        }

        // Final line without trailing newline
        let rest = String::from_utf8_lossy(&pending).to_string();
        if let Some(chunk) = parse_stream_line(&rest)? {
            if !chunk.message.content.is_empty() {
                on_token(&chunk.message.content);
                full.push_str(&chunk.message.content);
            }
        }

        Ok(full)
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

/// One line of a streaming response
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_properties() {
        let provider = OllamaProvider::new("http://localhost:11434/", "llama3.1:8b").unwrap();

        assert_eq!(provider.name(), "ollama");
        assert!(provider.is_local());
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_message_conversion() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3.1:8b").unwrap();

        let messages = vec![
            Message::system("You are a research assistant"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ];

        let ollama_messages = provider.convert_messages(&messages);

        assert_eq!(ollama_messages.len(), 3);
        assert_eq!(ollama_messages[0].role, "system");
        assert_eq!(ollama_messages[1].role, "user");
        assert_eq!(ollama_messages[2].role, "assistant");
    }

    #[test]
    fn test_parse_stream_line() {
        let line = r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let chunk = parse_stream_line(line).unwrap().unwrap();
        assert_eq!(chunk.message.content, "Hel");
        assert!(!chunk.done);

        let done = parse_stream_line(r#"{"done":true}"#).unwrap().unwrap();
        assert!(done.done);

        assert!(parse_stream_line("   ").unwrap().is_none());
        assert!(matches!(
            parse_stream_line(r#"{"error":"model not found"}"#),
            Err(LLMError::StreamInterrupted(_))
        ));
    }
}
