//! Research data model
//!
//! Types shared between the engine and anything that consumes its output:
//! the actions the decision service can choose, the evidence the executor
//! collects, and the conversation transcript.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The next step chosen by the decision service
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "search", "query": "rust async"}` or `{"type": "answer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Run one web search
    Search { query: String },
    /// Extract the content of pages returned by earlier searches
    Scrape { urls: Vec<String> },
    /// Stop researching and synthesize the answer
    Answer,
}

impl Action {
    /// Short lowercase name of the variant
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Search { .. } => ActionKind::Search,
            Self::Scrape { .. } => ActionKind::Scrape,
            Self::Answer => ActionKind::Answer,
        }
    }

    /// Check the payload carried by the action
    pub fn validate(&self) -> Result<(), ActionError> {
        match self {
            Self::Search { query } => {
                if query.trim().is_empty() {
                    return Err(ActionError::EmptyQuery);
                }
                Ok(())
            }
            Self::Scrape { urls } => {
                if urls.is_empty() {
                    return Err(ActionError::NoUrls);
                }
                if let Some(bad) = urls.iter().find(|u| u.trim().is_empty()) {
                    return Err(ActionError::InvalidUrl(bad.clone()));
                }
                Ok(())
            }
            Self::Answer => Ok(()),
        }
    }
}

/// A validated action together with the reasoning the decision service gave for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Decision {
    /// A decision with a generated title and no description
    pub fn bare(action: Action) -> Self {
        let title = match &action {
            Action::Search { query } => format!("Searching for \"{}\"", query),
            Action::Scrape { urls } => format!("Reading {} page(s)", urls.len()),
            Action::Answer => "Answering".to_string(),
        };
        Self {
            action,
            title,
            description: String::new(),
        }
    }
}

/// Discriminant of [`Action`], used for traces and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Search,
    Scrape,
    Answer,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Scrape => "scrape",
            Self::Answer => "answer",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failures for an [`Action`] payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("search query is empty")]
    EmptyQuery,

    #[error("scrape action has no URLs")]
    NoUrls,

    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),
}

/// A single organic search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Publication date as reported by the provider, RFC 3339 when defaulted
    pub date: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// The hits returned for one search query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// Text extracted from one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub extracted_text: String,
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of the conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One entry of the action trace recorded for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: u32,
    pub kind: ActionKind,
    pub title: String,
    pub description: String,
    /// True when the action came from the fallback path rather than the decision service
    #[serde(default)]
    pub fallback: bool,
}
