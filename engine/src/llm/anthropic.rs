use super::openai::SseBuffer;
use super::{LLMError, LLMProvider, Message, MessageRole, Result, TokenSink};
use crate::config::AnthropicConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use futures::StreamExt;
use sdk::errors::EngineError;
use serde_json::json;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    config: AnthropicConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        config: AnthropicConfig,
        api_key: SecretString,
    ) -> std::result::Result<Self, EngineError> {
        Ok(Self {
            config,
            api_key,
            client: super::http_client(Duration::from_secs(300))?,
        })
    }

    /// System messages go in the top-level `system` field
    fn build_payload(&self, messages: &[Message], stream: bool) -> serde_json::Value {
        let mut system_prompt = String::new();
        let mut api_messages = Vec::new();
        for msg in messages {
            if msg.role == MessageRole::System {
                system_prompt.push_str(&msg.content);
                system_prompt.push('\n');
                continue;
            }
            api_messages.push(json!({
                "role": if msg.role == MessageRole::Assistant { "assistant" } else { "user" },
                "content": msg.content
            }));
        }

        json!({
            "model": self.config.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt.trim_end(),
            "messages": api_messages,
            "stream": stream,
        })
    }

    async fn send(&self, messages: &[Message], stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&self.build_payload(messages, stream))
            .send()
            .await
            .map_err(|e| LLMError::from_transport("Anthropic", &self.config.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, &text));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LLMError::ParseError("No content array in response".to_string()))?;

        Ok(content_arr
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect())
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
                let event: serde_json::Value = serde_json::from_str(&data)
                    .map_err(|e| LLMError::ParseError(e.to_string()))?;
                match event.get("type").and_then(|t| t.as_str()) {
                    Some("content_block_delta") => {
                        if let Some(text) = event.pointer("/delta/text").and_then(|t| t.as_str())
                        {
                            on_token(text);
                            full.push_str(text);
                        }
                    }
                    Some("message_stop") => return Ok(full),
                    Some("error") => {
                        let msg = event
                            .pointer("/error/message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown error");
                        return Err(LLMError::StreamInterrupted(msg.to_string()));
                    }
                    _ => {}
                }
            }
        }

        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_is_lifted() {
        let provider =
            AnthropicProvider::new(AnthropicConfig::default(), SecretString::new("k")).unwrap();
        let payload = provider.build_payload(
            &[Message::system("Be precise"), Message::user("Question?")],
            false,
        );
        assert_eq!(payload["system"], "Be precise");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
    }
}
