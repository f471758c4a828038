//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the DeepSearch
//! engine. All errors implement the `ResearchErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Containment
//!
//! - Provider and persistence errors are contained at their own layer and
//!   logged; they never abort a research run.
//! - Planner and synthesis errors have deterministic fallbacks.
//! - Relay expiry is reported to the reader immediately.
//!
//! Messages never include API keys; provider error text is scrubbed before
//! it reaches this type.

use thiserror::Error;

/// Trait for DeepSearch error extensions
pub trait ResearchErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and carries no secrets or
    /// internal details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors require a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ResearchErrorExt};
///
/// let error = EngineError::Provider("search returned 503".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("missing SERPER_API_KEY".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Decision service produced no usable action
    #[error("Planner decision error: {0}")]
    PlannerDecision(String),

    // Decision output named an action type the engine does not know
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    // Search or extraction provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    // Answer generation failure
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    // Transcript or session metadata write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Stream handle is completed, expired or unknown
    #[error("Stream expired: {0}")]
    RelayExpired(String),

    // Run was cancelled by the caller
    #[error("Research run cancelled")]
    Cancelled,

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResearchErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file and API keys",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::PlannerDecision(_) => "Could not decide the next research step",
            Self::UnknownAction(_) => "The model requested an unsupported action",
            Self::Provider(_) => "Search provider failed. Results may be incomplete",
            Self::Synthesis(_) => "Answer generation failed. Please try again",
            Self::Persistence(_) => "Conversation could not be saved",
            Self::RelayExpired(_) => "This answer stream is no longer available",
            Self::Cancelled => "The request was cancelled",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::KeyringError(_) | Self::UnknownAction(_) => false,
            _ => true,
        }
    }
}
