//! DeepSearch Engine Library
//!
//! Research orchestration for the `deepsearch` binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// Progress events for observers of a research run
pub mod message_bus;

/// LLM provider abstraction layer
pub mod llm;

/// Web search and page extraction providers
pub mod providers;

/// Research loop, planning and synthesis
pub mod research;

/// Resumable answer streams
pub mod relay;

/// Inbound ask/resume operations
pub mod service;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
