use super::{LLMError, LLMProvider, Message, MessageRole, Result};
use crate::config::GeminiConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use sdk::errors::EngineError;
use serde_json::json;
use std::time::Duration;

/// Gemini `generateContent` provider. Streams through the trait's
/// single-fragment default.
pub struct GeminiProvider {
    config: GeminiConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(
        config: GeminiConfig,
        api_key: SecretString,
    ) -> std::result::Result<Self, EngineError> {
        Ok(Self {
            config,
            api_key,
            client: super::http_client(Duration::from_secs(300))?,
        })
    }

    fn build_payload(messages: &[Message]) -> serde_json::Value {
        let mut contents = Vec::new();
        let mut system_text = String::new();

        for msg in messages {
            if msg.role == MessageRole::System {
                system_text.push_str(&msg.content);
                system_text.push('\n');
                continue;
            }

            contents.push(json!({
                "role": if msg.role == MessageRole::Assistant { "model" } else { "user" },
                "parts": [{"text": msg.content}]
            }));
        }

        let mut payload = serde_json::Map::new();
        payload.insert("contents".to_string(), json!(contents));
        if !system_text.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{"text": system_text.trim_end()}] }),
            );
        }
        serde_json::Value::Object(payload)
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose())
            .header("Content-Type", "application/json")
            .json(&Self::build_payload(messages))
            .send()
            .await
            .map_err(|e| LLMError::from_transport("Gemini", &self.config.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, &text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let parts = data
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| LLMError::ParseError("No parts in candidate content".to_string()))?;

        Ok(parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roles() {
        let payload = GeminiProvider::build_payload(&[
            Message::system("rules"),
            Message::user("q"),
            Message::assistant("a"),
        ]);
        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(payload["contents"][1]["role"], "model");
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "rules");
    }
}
