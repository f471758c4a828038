//! Resumable answer streams
//!
//! A [`StreamRegistry`] holds one append-only token buffer per answer stream.
//! The synthesizer writes through a [`StreamWriter`]; clients read through a
//! [`StreamReader`] that acknowledges every delivered token back to the
//! stream's stored cursor. A client that disconnects can call
//! [`StreamRegistry::resume`] and continue right after the last token it
//! received, for as long as the stream is active and inside the retention
//! window. Completed streams are retired immediately; resuming them reports
//! [`ResumeOutcome::Expired`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default retention window (24 hours)
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle of a stream handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLifecycle {
    Active,
    Completed,
    Expired,
}

/// Point-in-time view of a registered stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: String,
    /// Index of the next token the client has not yet received
    pub cursor: usize,
    pub buffered: usize,
    pub lifecycle: StreamLifecycle,
}

/// Result of asking to reattach to a stream
pub enum ResumeOutcome {
    Attached(StreamReader),
    Expired,
}

impl ResumeOutcome {
    pub fn is_expired(&self) -> bool {
        matches!(self, ResumeOutcome::Expired)
    }
}

impl std::fmt::Debug for ResumeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResumeOutcome::Attached(reader) => write!(f, "Attached({})", reader.id),
            ResumeOutcome::Expired => write!(f, "Expired"),
        }
    }
}

struct Buffer {
    tokens: Vec<String>,
    cursor: usize,
    lifecycle: StreamLifecycle,
}

struct StreamState {
    id: String,
    created_at: Instant,
    buffer: Mutex<Buffer>,
    notify: Notify,
}

impl StreamState {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Instant::now(),
            buffer: Mutex::new(Buffer {
                tokens: Vec::new(),
                cursor: 0,
                lifecycle: StreamLifecycle::Active,
            }),
            notify: Notify::new(),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, Buffer> {
        lock(&self.buffer)
    }

    /// Move out of `Active`. Later transitions are ignored.
    fn close(&self, lifecycle: StreamLifecycle) {
        {
            let mut buffer = self.buffer();
            if buffer.lifecycle != StreamLifecycle::Active {
                return;
            }
            buffer.lifecycle = lifecycle;
        }
        self.notify.notify_waiters();
    }

    fn snapshot(&self) -> StreamHandle {
        let buffer = self.buffer();
        StreamHandle {
            id: self.id.clone(),
            cursor: buffer.cursor,
            buffered: buffer.tokens.len(),
            lifecycle: buffer.lifecycle,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry of live answer streams
pub struct StreamRegistry {
    retention: Duration,
    streams: Arc<Mutex<HashMap<String, Arc<StreamState>>>>,
    shutdown: CancellationToken,
}

impl StreamRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            streams: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Register a new active stream. An existing stream with the same id is
    /// expired and replaced.
    pub fn create(&self, id: &str) -> StreamWriter {
        let state = Arc::new(StreamState::new(id));
        let previous = lock(&self.streams).insert(id.to_string(), Arc::clone(&state));
        if let Some(previous) = previous {
            previous.close(StreamLifecycle::Expired);
        }
        debug!("Stream {} created", id);

        StreamWriter {
            state,
            streams: Arc::clone(&self.streams),
            finished: false,
        }
    }

    /// Reattach to a stream at its stored cursor
    pub fn resume(&self, id: &str) -> ResumeOutcome {
        let mut streams = lock(&self.streams);
        let Some(state) = streams.get(id).cloned() else {
            debug!("Resume of unknown stream {}", id);
            return ResumeOutcome::Expired;
        };

        if state.created_at.elapsed() >= self.retention {
            streams.remove(id);
            drop(streams);
            state.close(StreamLifecycle::Expired);
            info!("Stream {} expired on resume", id);
            return ResumeOutcome::Expired;
        }

        let cursor = {
            let buffer = state.buffer();
            if buffer.lifecycle != StreamLifecycle::Active {
                return ResumeOutcome::Expired;
            }
            buffer.cursor
        };

        debug!("Stream {} resumed at token {}", id, cursor);
        ResumeOutcome::Attached(StreamReader::new(state, cursor))
    }

    pub fn status(&self, id: &str) -> Option<StreamHandle> {
        lock(&self.streams).get(id).map(|state| state.snapshot())
    }

    pub fn active_count(&self) -> usize {
        lock(&self.streams).len()
    }

    /// Expire every stream older than the retention window. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        let expired: Vec<Arc<StreamState>> = {
            let mut streams = lock(&self.streams);
            let stale: Vec<String> = streams
                .iter()
                .filter(|(_, state)| state.created_at.elapsed() >= self.retention)
                .map(|(id, _)| id.clone())
                .collect();
            stale.iter().filter_map(|id| streams.remove(id)).collect()
        };

        for state in &expired {
            state.close(StreamLifecycle::Expired);
        }
        if !expired.is_empty() {
            info!("Swept {} expired stream(s)", expired.len());
        }
        expired.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until [`shutdown`](Self::shutdown)
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.sweep();
                    }
                }
            }
            debug!("Stream sweeper stopped");
        })
    }

    /// Stop the sweeper and expire all streams
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<Arc<StreamState>> =
            lock(&self.streams).drain().map(|(_, state)| state).collect();
        for state in &drained {
            state.close(StreamLifecycle::Expired);
        }
        info!("Stream registry shut down ({} stream(s) expired)", drained.len());
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

/// Producer side of a stream. Dropping an unfinished writer finishes it.
pub struct StreamWriter {
    state: Arc<StreamState>,
    streams: Arc<Mutex<HashMap<String, Arc<StreamState>>>>,
    finished: bool,
}

impl StreamWriter {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    /// Append a token. Never waits for readers; ignored once the stream
    /// has left `Active`.
    pub fn push(&self, token: &str) {
        {
            let mut buffer = self.state.buffer();
            if buffer.lifecycle != StreamLifecycle::Active {
                return;
            }
            buffer.tokens.push(token.to_string());
        }
        self.state.notify.notify_waiters();
    }

    /// A reader starting at the first token
    pub fn reader(&self) -> StreamReader {
        StreamReader::new(Arc::clone(&self.state), 0)
    }

    /// Mark the stream completed and retire it from the registry
    pub fn finish(mut self) {
        self.retire();
    }

    fn retire(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.state.close(StreamLifecycle::Completed);

        let mut streams = lock(&self.streams);
        if streams
            .get(&self.state.id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.state))
        {
            streams.remove(&self.state.id);
        }
        debug!("Stream {} retired", self.state.id);
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.retire();
    }
}

/// Consumer side of a stream
pub struct StreamReader {
    id: String,
    state: Arc<StreamState>,
    position: usize,
}

impl StreamReader {
    fn new(state: Arc<StreamState>, position: usize) -> Self {
        Self {
            id: state.id.clone(),
            state,
            position,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next token, or `None` once the stream is closed and drained
    pub async fn next(&mut self) -> Option<String> {
        loop {
            let notified = self.state.notify.notified();
            {
                let mut buffer = self.state.buffer();
                if let Some(token) = buffer.tokens.get(self.position).cloned() {
                    self.position += 1;
                    buffer.cursor = buffer.cursor.max(self.position);
                    return Some(token);
                }
                if buffer.lifecycle != StreamLifecycle::Active {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Drain the stream into a single string
    pub async fn read_to_end(mut self) -> String {
        let mut text = String::new();
        while let Some(token) = self.next().await {
            text.push_str(&token);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_sees_tokens_then_ends() {
        let registry = StreamRegistry::default();
        let writer = registry.create("s1");
        let reader = writer.reader();

        writer.push("Hello");
        writer.push(", world");
        writer.finish();

        assert_eq!(reader.read_to_end().await, "Hello, world");
    }

    #[tokio::test]
    async fn test_reader_waits_for_writer() {
        let registry = StreamRegistry::default();
        let writer = registry.create("s2");
        let mut reader = writer.reader();

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.push("late");
        });

        assert_eq!(reader.next().await.as_deref(), Some("late"));
        producer.await.unwrap();
        assert_eq!(reader.next().await, None);
    }

    #[tokio::test]
    async fn test_resume_continues_after_last_delivered_token() {
        let registry = StreamRegistry::default();
        let writer = registry.create("s3");
        for token in ["a", "b", "c", "d"] {
            writer.push(token);
        }

        let mut first = writer.reader();
        assert_eq!(first.next().await.as_deref(), Some("a"));
        assert_eq!(first.next().await.as_deref(), Some("b"));
        drop(first);

        assert_eq!(registry.status("s3").unwrap().cursor, 2);

        let ResumeOutcome::Attached(mut second) = registry.resume("s3") else {
            panic!("expected an attached reader");
        };
        writer.push("e");
        writer.finish();

        let mut rest = Vec::new();
        while let Some(token) = second.next().await {
            rest.push(token);
        }
        assert_eq!(rest, vec!["c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_retired_and_unknown_streams_are_expired() {
        let registry = StreamRegistry::default();
        let writer = registry.create("s4");
        writer.push("x");
        writer.finish();

        assert!(registry.resume("s4").is_expired());
        assert!(registry.resume("never-created").is_expired());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_writer_completes_stream() {
        let registry = StreamRegistry::default();
        let writer = registry.create("s5");
        let reader = writer.reader();
        writer.push("partial");
        drop(writer);

        assert_eq!(reader.read_to_end().await, "partial");
        assert!(registry.resume("s5").is_expired());
    }

    #[tokio::test]
    async fn test_sweep_expires_old_streams() {
        let registry = StreamRegistry::new(Duration::from_millis(10));
        let writer = registry.create("s6");
        let mut reader = writer.reader();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.sweep(), 1);
        assert!(registry.resume("s6").is_expired());

        writer.push("ignored");
        assert_eq!(reader.next().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_expires_everything() {
        let registry = Arc::new(StreamRegistry::default());
        let sweeper = registry.start_sweeper(Duration::from_millis(5));
        let _writer = registry.create("s7");

        registry.shutdown();
        sweeper.await.unwrap();

        assert_eq!(registry.active_count(), 0);
        assert!(registry.resume("s7").is_expired());
    }
}
