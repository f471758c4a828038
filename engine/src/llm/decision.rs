//! Structured next-action decisions
//!
//! The planner asks a [`DecisionService`] for the next [`Decision`]. The
//! LLM-backed implementation sends the prompt, extracts the JSON object from
//! the reply and validates it against the [`Action`] schema.

use async_trait::async_trait;
use sdk::types::{Action, Decision};
use std::sync::Arc;

use super::{extract_json_object, LLMError, LLMProvider, Message};

/// Action tags the engine can execute
const KNOWN_ACTION_TYPES: [&str; 3] = ["search", "scrape", "answer"];

/// Why a decision call produced nothing usable
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    /// The call itself failed (network, provider, timeout)
    #[error("decision call failed: {0}")]
    Transport(#[from] LLMError),

    /// The reply did not match the action schema
    #[error("invalid decision output: {0}")]
    Invalid(String),

    /// The reply named an action type the engine has no handler for
    #[error("unknown action type '{0}'")]
    UnknownAction(String),
}

impl DecisionError {
    /// Transport and schema failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DecisionError::UnknownAction(_))
    }
}

/// Produces the next research action for a prompt
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn decide(&self, prompt: &str) -> Result<Decision, DecisionError>;
}

/// Decision service backed by any [`LLMProvider`]
pub struct LlmDecisionService {
    provider: Arc<dyn LLMProvider>,
}

impl LlmDecisionService {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl DecisionService for LlmDecisionService {
    async fn decide(&self, prompt: &str) -> Result<Decision, DecisionError> {
        let reply = self.provider.generate(&[Message::user(prompt)]).await?;
        tracing::debug!("Decision reply from {}: {} chars", self.provider.name(), reply.len());
        parse_decision(&reply)
    }
}

/// Parse and validate a decision from raw model output
pub fn parse_decision(content: &str) -> Result<Decision, DecisionError> {
    let json = extract_json_object(content)
        .ok_or_else(|| DecisionError::Invalid("no JSON object in reply".to_string()))?;

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| DecisionError::Invalid(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| DecisionError::Invalid("missing \"type\" field".to_string()))?;

    if !KNOWN_ACTION_TYPES.contains(&kind) {
        return Err(DecisionError::UnknownAction(kind.to_string()));
    }

    let action: Action = serde_json::from_value(value.clone())
        .map_err(|e| DecisionError::Invalid(e.to_string()))?;
    action
        .validate()
        .map_err(|e| DecisionError::Invalid(e.to_string()))?;

    let text_field = |name: &str| {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let mut decision = Decision::bare(action);
    let title = text_field("title");
    if !title.is_empty() {
        decision.title = title;
    }
    decision.description = text_field("description");

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_with_reasoning() {
        let reply = r#"```json
{"type": "search", "query": "tokio runtime internals", "title": "Initial search", "description": "Need an overview"}
```"#;
        let decision = parse_decision(reply).unwrap();
        assert_eq!(
            decision.action,
            Action::Search {
                query: "tokio runtime internals".to_string()
            }
        );
        assert_eq!(decision.title, "Initial search");
        assert_eq!(decision.description, "Need an overview");
    }

    #[test]
    fn test_parse_answer_gets_default_title() {
        let decision = parse_decision(r#"{"type":"answer"}"#).unwrap();
        assert_eq!(decision.action, Action::Answer);
        assert!(!decision.title.is_empty());
    }

    #[test]
    fn test_unknown_type_is_not_retryable() {
        let err = parse_decision(r#"{"type":"research","query":"x"}"#).unwrap_err();
        assert!(matches!(err, DecisionError::UnknownAction(ref t) if t == "research"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_schema_violations_are_retryable() {
        for reply in [
            "I will search now",
            r#"{"query":"missing type"}"#,
            r#"{"type":"search"}"#,
            r#"{"type":"search","query":"   "}"#,
            r#"{"type":"scrape","urls":[]}"#,
        ] {
            let err = parse_decision(reply).unwrap_err();
            assert!(
                matches!(err, DecisionError::Invalid(_)),
                "expected Invalid for {}",
                reply
            );
            assert!(err.is_retryable());
        }
    }
}
