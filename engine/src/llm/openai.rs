//! OpenAI-compatible chat completions provider
//!
//! Streams with server-sent events: each `data:` line carries a JSON delta,
//! and `data: [DONE]` terminates the stream.

use super::{LLMError, LLMProvider, Message, Result, TokenSink};
use crate::config::OpenAIConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use futures::StreamExt;
use sdk::errors::EngineError;
use serde_json::json;
use std::time::Duration;

pub struct OpenAIProvider {
    config: OpenAIConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(
        config: OpenAIConfig,
        api_key: SecretString,
    ) -> std::result::Result<Self, EngineError> {
        Ok(Self {
            config,
            api_key,
            client: super::http_client(Duration::from_secs(300))?,
        })
    }

    async fn send(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let api_messages: Vec<_> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let payload = json!({
            "model": self.config.model,
            "messages": api_messages,
            "stream": stream,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::from_transport("OpenAI", &self.config.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, &text));
        }

        Ok(response)
    }
}

/// Splits a byte stream into complete SSE `data:` payloads
#[derive(Default)]
pub(crate) struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// Feed bytes; returns the `data:` payloads of every completed line
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim().strip_prefix("data:") {
                out.push(data.trim().to_string());
            }
        }
        out
    }
}

/// Text delta carried by one streamed chat completion chunk
fn delta_content(data: &str) -> Result<Option<String>> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| LLMError::ParseError(e.to_string()))?;
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .map(str::to_string))
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let response = self.send(messages, false).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        data.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("No message content in response".to_string()))
    }

    async fn stream(
        &self,
        messages: &[Message],
        on_token: &TokenSink,
    ) -> Result<String> {
        let response = self.send(messages, true).await?;
        let mut body = response.bytes_stream();
        let mut sse = SseBuffer::default();
        let mut full = String::new();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| LLMError::StreamInterrupted(e.to_string()))?;
            for data in sse.push(&bytes) {
                if data == "[DONE]" {
                    return Ok(full);
                }
                if let Some(text) = delta_content(&data)? {
                    on_token(&text);
                    full.push_str(&text);
                }
            }
        }

        Ok(full)
    }
}
