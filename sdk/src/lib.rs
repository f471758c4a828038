//! DeepSearch SDK
//!
//! Shared types and errors for the DeepSearch research engine.
//! This crate is used by the engine and by anything that consumes its output.

/// Error types and handling
pub mod errors;

/// Research data model
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ResearchErrorExt};
pub use types::{
    Action, ActionError, ActionKind, ConversationMessage, Decision, QueryResult, Role,
    ScrapeResult, SearchHit, TraceEntry,
};
