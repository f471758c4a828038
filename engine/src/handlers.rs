//! Command handlers for CLI operations
//!
//! - ask: research a question and stream the answer to stdout
//! - resume: report a session's answer after a disconnect
//! - history: list recent sessions
//! - show: print a session's transcript and research trace

use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::{Database, SessionRepository};
use crate::message_bus::{EventType, MessageBus, ProgressEvent};
use crate::relay::StreamRegistry;
use crate::service::{AskRequest, Outcome, ResearchService};
use sdk::errors::{EngineError, ResearchErrorExt};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Research a question and stream the answer
pub async fn handle_ask(
    question: String,
    session: Option<String>,
    config: &Config,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let sessions = Arc::new(database.sessions());

    let relay = Arc::new(StreamRegistry::new(config.relay.retention()));
    let sweeper = relay.start_sweeper(config.relay.sweep_interval());
    let bus = Arc::new(MessageBus::new());

    let service = match ResearchService::from_config(config, Arc::clone(&relay), Arc::clone(&sessions)) {
        Ok(service) => service.with_bus(Arc::clone(&bus)),
        Err(e) => {
            let outcome = Outcome::from_error(&e);
            tracing::error!("{:?}: {}", outcome, e);
            relay.shutdown();
            anyhow::bail!("{} ({})", e.user_hint(), e);
        }
    };

    let prior_messages = match &session {
        Some(id) => sessions
            .get_messages(id)
            .await
            .context("Failed to load conversation")?
            .into_iter()
            .map(|m| m.message)
            .collect(),
        None => Vec::new(),
    };

    let progress = match format {
        OutputFormat::Text => Some(tokio::spawn(print_progress(
            bus.subscribe(EventType::Decision),
        ))),
        OutputFormat::Json => None,
    };

    let request = AskRequest {
        question,
        prior_messages,
        session_id: session,
    };
    let response = match service.ask(request, cancel).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("{:?}: {}", Outcome::from_error(&e), e);
            relay.shutdown();
            anyhow::bail!("{} ({})", e.user_hint(), e);
        }
    };

    let mut reader = response.reader;
    if let OutputFormat::Text = format {
        println!();
    }
    while let Some(token) = reader.next().await {
        if let OutputFormat::Text = format {
            print!("{}", token);
            std::io::stdout().flush().ok();
        }
    }

    let outcome = response
        .answer
        .await
        .context("Answer stream ended without an outcome")?;
    if response.persisted.await.is_err() {
        tracing::warn!("Persistence task panicked");
    }

    match format {
        OutputFormat::Text => {
            println!();
            println!();
            if outcome.cancelled {
                println!("Cancelled.");
            }
            println!(
                "Session: {} ({} step(s), {})",
                response.session_id,
                response.trace.len(),
                outcome.mode.as_str()
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "session_id": response.session_id,
                "stream_id": response.stream_id,
                "outcome": Outcome::from_synthesis(&outcome),
                "mode": outcome.mode,
                "answer": outcome.text,
                "trace": response.trace,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    drop(service);
    relay.shutdown();
    sweeper.await.ok();
    if let Some(progress) = progress {
        progress.abort();
    }
    database.close().await?;

    Ok(())
}

async fn print_progress(mut rx: tokio::sync::mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        if let ProgressEvent::Decision {
            step,
            kind,
            title,
            fallback,
            ..
        } = event
        {
            eprintln!(
                "[step {}] {}: {}{}",
                step,
                kind,
                title,
                if fallback { " (fallback)" } else { "" }
            );
        }
    }
}

/// Show where a session's answer stands after a disconnect
///
/// Live stream buffers belong to the process that is writing them, so from
/// here the stored transcript is the source of truth. A session whose stream
/// pointer is still set is reported as in progress.
pub async fn handle_resume(session_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let ResumeReport {
        in_progress,
        last_answer,
    } = resume_report(&database.sessions(), &session_id).await?;

    match format {
        OutputFormat::Text => {
            match &in_progress {
                Some(stream_id) => {
                    println!("An answer is still streaming in another process ({}).", stream_id);
                    println!("Run `deepsearch show {}` once it completes.", session_id);
                }
                None => println!("Stream expired."),
            }
            if let Some(answer) = &last_answer {
                println!();
                println!("Last stored answer:");
                println!("{}", answer);
            }
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "session_id": session_id,
                "in_progress": in_progress,
                "expired": in_progress.is_none(),
                "last_answer": last_answer,
            }))?
        ),
    }

    database.close().await?;
    Ok(())
}

/// Stored state of a session's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeReport {
    /// Stream still being written by the process that started it
    pub in_progress: Option<String>,
    pub last_answer: Option<String>,
}

pub async fn resume_report(sessions: &SessionRepository, session_id: &str) -> Result<ResumeReport> {
    let session = sessions
        .get_session(session_id)
        .await
        .context("Failed to fetch session")?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;
    if session.active_stream_id.is_none() {
        tracing::info!("{}", EngineError::RelayExpired(session_id.to_string()));
    }

    let last_answer = sessions
        .get_messages(session_id)
        .await
        .context("Failed to fetch messages")?
        .into_iter()
        .rev()
        .find(|m| m.message.role == sdk::types::Role::Assistant)
        .map(|m| m.message.content);

    Ok(ResumeReport {
        in_progress: session.active_stream_id,
        last_answer,
    })
}

/// Show recent sessions
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let sessions = database
        .sessions()
        .list_sessions(limit as i64)
        .await
        .context("Failed to fetch session history")?;

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No conversations in history");
                return Ok(());
            }

            println!("Conversations (last {}):", limit);
            println!();

            for session in sessions {
                println!("Session: {}", session.id);
                println!("  Title: {}", session.title);
                println!("  Messages: {}", session.message_count);

                let last = chrono::DateTime::from_timestamp(session.last_activity, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "Unknown".to_string());
                println!("  Last activity: {}", last);
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": sessions,
                "count": sessions.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

/// Show a session's transcript with the research trace of each answer
pub async fn handle_show(session_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let repo = database.sessions();

    let session = repo
        .get_session(&session_id)
        .await
        .context("Failed to fetch session")?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;

    let messages = repo
        .get_messages(&session_id)
        .await
        .context("Failed to fetch messages")?;
    let searches = repo
        .count_search_queries(&session_id)
        .await
        .context("Failed to count searches")?;

    match format {
        OutputFormat::Text => {
            println!("{} ({})", session.title, session.id);
            println!("{} message(s), {} search(es)", messages.len(), searches);
            println!();

            for stored in &messages {
                println!("[{}] {}:", stored.sequence, stored.message.role);
                println!("{}", stored.message.content);
                if !stored.trace.is_empty() {
                    println!();
                    println!("  Research trace:");
                    for entry in &stored.trace {
                        println!(
                            "    {}. {} - {}{}",
                            entry.step,
                            entry.kind,
                            entry.title,
                            if entry.fallback { " (fallback)" } else { "" }
                        );
                    }
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "session": session,
                "messages": messages,
                "search_count": searches,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TranscriptMetadata;
    use sdk::types::ConversationMessage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resume_report_reflects_stored_state() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(&dir.path().join("deepsearch.db")).await.unwrap();
        let sessions = database.sessions();

        let (id, _) = sessions.create_or_get_session(None).await.unwrap();
        sessions.set_active_stream(&id, Some("stream_live")).await.unwrap();

        let report = resume_report(&sessions, &id).await.unwrap();
        assert_eq!(report.in_progress.as_deref(), Some("stream_live"));
        assert_eq!(report.last_answer, None);

        let transcript = vec![
            ConversationMessage::user("What is Rust?"),
            ConversationMessage::assistant("A systems language."),
        ];
        let metadata = TranscriptMetadata {
            is_new: true,
            trace: vec![],
            active_stream_id: None,
        };
        sessions.persist_transcript(&id, &transcript, &metadata).await.unwrap();

        let report = resume_report(&sessions, &id).await.unwrap();
        assert_eq!(report.in_progress, None);
        assert_eq!(report.last_answer.as_deref(), Some("A systems language."));
    }

    #[tokio::test]
    async fn test_resume_report_unknown_session() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(&dir.path().join("deepsearch.db")).await.unwrap();

        let err = resume_report(&database.sessions(), "chat_missing").await.unwrap_err();
        assert!(err.to_string().contains("chat_missing"));
    }
}
