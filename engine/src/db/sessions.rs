/// Session and transcript persistence
///
/// Messages are keyed by `(session_id, sequence)`, where the sequence is the
/// message's position in the transcript. Every write is an upsert on that
/// key, so persisting the same transcript twice leaves one row per position.
use anyhow::{Context, Result};
use sdk::types::{ConversationMessage, Role, TraceEntry};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Title given to a session until its first user message is known
pub const PLACEHOLDER_TITLE: &str = "New Conversation";

const TITLE_MAX_CHARS: usize = 50;

const UPSERT_MESSAGE: &str = "INSERT INTO messages (session_id, sequence, role, content, metadata, created_at, updated_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT(session_id, sequence) DO UPDATE SET \
     role = excluded.role, content = excluded.content, \
     metadata = COALESCE(excluded.metadata, messages.metadata), updated_at = excluded.updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub message_count: i64,
    pub active_stream_id: Option<String>,
    pub created_at: i64,
    pub last_activity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub sequence: i64,
    pub message: ConversationMessage,
    /// Action trace attached to the answer that concluded a run
    pub trace: Vec<TraceEntry>,
}

/// Session-level data written alongside a transcript
#[derive(Debug, Clone, Default)]
pub struct TranscriptMetadata {
    /// Derive the title from the first user message
    pub is_new: bool,
    /// Attached to the last assistant message
    pub trace: Vec<TraceEntry>,
    pub active_stream_id: Option<String>,
}

/// Title from the first user message: 50 characters, then "..."
pub fn session_title(messages: &[ConversationMessage]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == Role::User) else {
        return PLACEHOLDER_TITLE.to_string();
    };
    let content = first.content.trim();
    if content.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = content.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        content.to_string()
    }
}

fn now_secs() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

fn session_from_row(r: &SqliteRow) -> Session {
    Session {
        id: r.get("id"),
        title: r.get("title"),
        message_count: r.get("message_count"),
        active_stream_id: r.get("active_stream_id"),
        created_at: r.get("created_at"),
        last_activity: r.get("last_activity"),
    }
}

/// Repository for sessions, messages and search analytics
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return `(session_id, is_new)`. A missing id, or one not yet stored,
    /// creates a session with the placeholder title.
    pub async fn create_or_get_session(&self, id: Option<&str>) -> Result<(String, bool)> {
        if let Some(id) = id {
            if self.get_session(id).await?.is_some() {
                return Ok((id.to_string(), false));
            }
        }

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("chat_{}", Uuid::new_v4().simple()));
        let now = now_secs()?;

        sqlx::query(
            "INSERT INTO sessions (id, title, message_count, created_at, last_activity) VALUES (?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(PLACEHOLDER_TITLE)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create session")?;

        tracing::debug!("Created session {}", id);
        Ok((id, true))
    }

    /// Insert or replace the message at `sequence`
    pub async fn upsert_message(
        &self,
        session_id: &str,
        sequence: i64,
        message: &ConversationMessage,
    ) -> Result<()> {
        let now = now_secs()?;
        sqlx::query(UPSERT_MESSAGE)
            .bind(session_id)
            .bind(sequence)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(None::<String>)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to upsert message")?;
        Ok(())
    }

    /// Write a whole transcript and the session metadata in one transaction
    pub async fn persist_transcript(
        &self,
        session_id: &str,
        messages: &[ConversationMessage],
        metadata: &TranscriptMetadata,
    ) -> Result<()> {
        let now = now_secs()?;
        let trace_position = messages.iter().rposition(|m| m.role == Role::Assistant);
        let trace_json = if metadata.trace.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&metadata.trace).context("Failed to encode trace")?)
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        for (sequence, message) in messages.iter().enumerate() {
            let message_metadata = if Some(sequence) == trace_position {
                trace_json.clone()
            } else {
                None
            };
            sqlx::query(UPSERT_MESSAGE)
                .bind(session_id)
                .bind(sequence as i64)
                .bind(message.role.as_str())
                .bind(&message.content)
                .bind(message_metadata)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to upsert message {}", sequence))?;
        }

        let message_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to count messages")?;

        if metadata.is_new {
            sqlx::query("UPDATE sessions SET title = ? WHERE id = ?")
                .bind(session_title(messages))
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .context("Failed to set session title")?;
        }

        sqlx::query(
            "UPDATE sessions SET message_count = ?, last_activity = ?, active_stream_id = ? WHERE id = ?",
        )
        .bind(message_count)
        .bind(now)
        .bind(&metadata.active_stream_id)
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update session metadata")?;

        tx.commit().await.context("Failed to commit transcript")?;

        tracing::debug!(
            "Persisted {} message(s) for session {}",
            messages.len(),
            session_id
        );
        Ok(())
    }

    /// Point the session at a live answer stream, or clear the pointer
    pub async fn set_active_stream(&self, session_id: &str, stream_id: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE sessions SET active_stream_id = ?, last_activity = ? WHERE id = ?")
            .bind(stream_id)
            .bind(now_secs()?)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to set active stream")?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, title, message_count, active_stream_id, created_at, last_activity FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        Ok(row.as_ref().map(session_from_row))
    }

    /// Messages in transcript order
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT sequence, role, content, metadata FROM messages WHERE session_id = ? ORDER BY sequence ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages")?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let role = Role::parse(&r.get::<String, _>("role")).unwrap_or(Role::User);
                let trace = r
                    .get::<Option<String>, _>("metadata")
                    .and_then(|m| serde_json::from_str(&m).ok())
                    .unwrap_or_default();
                StoredMessage {
                    sequence: r.get("sequence"),
                    message: ConversationMessage {
                        role,
                        content: r.get("content"),
                    },
                    trace,
                }
            })
            .collect())
    }

    /// Most recently active sessions first
    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT id, title, message_count, active_stream_id, created_at, last_activity FROM sessions ORDER BY last_activity DESC, created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        Ok(rows.iter().map(session_from_row).collect())
    }

    pub async fn record_search_query(
        &self,
        session_id: Option<&str>,
        query: &str,
        result_count: usize,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_queries (session_id, query, result_count, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(query)
        .bind(result_count as i64)
        .bind(now_secs()?)
        .execute(&self.pool)
        .await
        .context("Failed to record search query")?;
        Ok(())
    }

    pub async fn count_search_queries(&self, session_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM search_queries WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count search queries")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_title_truncates() {
        let long = "x".repeat(80);
        let title = session_title(&[
            ConversationMessage::assistant("greeting"),
            ConversationMessage::user(long),
        ]);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));

        assert_eq!(
            session_title(&[ConversationMessage::user("  short question  ")]),
            "short question"
        );
        assert_eq!(session_title(&[]), PLACEHOLDER_TITLE);
    }

    #[test]
    fn test_session_title_counts_characters_not_bytes() {
        let question = "é".repeat(50);
        assert_eq!(session_title(&[ConversationMessage::user(question.clone())]), question);
    }
}
