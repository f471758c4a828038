//! Inbound research operations
//!
//! [`ResearchService::ask`] runs the research loop for one question, starts
//! streaming the answer and hands back a reader plus the final outcome.
//! Persistence happens in a spawned task once the answer is complete, so a
//! database problem never breaks the in-flight response.

use anyhow::Context;
use sdk::errors::EngineError;
use sdk::types::{ConversationMessage, TraceEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, ResearchConfig};
use crate::db::{SessionRepository, TranscriptMetadata};
use crate::llm::decision::{DecisionService, LlmDecisionService};
use crate::llm::{self, LLMProvider};
use crate::message_bus::MessageBus;
use crate::providers::{ContentExtractor, FirecrawlScraper, SearchProvider, SerperSearch};
use crate::relay::{ResumeOutcome, StreamReader, StreamRegistry};
use crate::research::{
    ActionPlanner, AnswerSynthesizer, Orchestrator, ResearchContext, ResearchExecutor,
    SearchObserver, SynthesisMode, SynthesisOutcome,
};
use crate::secrets::{SecretCache, SecretManager};

/// How a request ended, for callers that report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Answered after the step budget ran out
    SuccessDegraded,
    /// An upstream service failed and a fallback answer was sent
    UpstreamProviderError,
    /// Missing credentials or bad configuration; nothing ran
    FatalConfigurationError,
    /// The caller aborted before the answer was complete
    Cancelled,
}

impl Outcome {
    pub fn from_synthesis(outcome: &SynthesisOutcome) -> Self {
        if outcome.cancelled {
            Outcome::Cancelled
        } else if outcome.fell_back || outcome.interrupted {
            Outcome::UpstreamProviderError
        } else if outcome.mode == SynthesisMode::Degraded {
            Outcome::SuccessDegraded
        } else {
            Outcome::Success
        }
    }

    pub fn from_error(error: &EngineError) -> Self {
        match error {
            EngineError::Config(_) | EngineError::KeyringError(_) => {
                Outcome::FatalConfigurationError
            }
            EngineError::Cancelled => Outcome::Cancelled,
            _ => Outcome::UpstreamProviderError,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub question: String,
    pub prior_messages: Vec<ConversationMessage>,
    pub session_id: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }
}

pub struct AskResponse {
    pub session_id: String,
    pub stream_id: String,
    pub reader: StreamReader,
    pub answer: oneshot::Receiver<SynthesisOutcome>,
    pub trace: Vec<TraceEntry>,
    pub mode: SynthesisMode,
    /// Completes once the transcript has been written, skipped after a
    /// cancellation, or failed
    pub persisted: JoinHandle<()>,
}

/// Records each search in the analytics table without blocking the loop
struct SearchAnalytics {
    sessions: Arc<SessionRepository>,
    session_id: String,
}

impl SearchObserver for SearchAnalytics {
    fn search_completed(&self, query: &str, result_count: usize) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = self.session_id.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            if let Err(e) = sessions
                .record_search_query(Some(&session_id), &query, result_count)
                .await
            {
                warn!("Search analytics not recorded: {:#}", e);
            }
        });
    }
}

pub struct ResearchService {
    decisions: Arc<dyn DecisionService>,
    answers: Arc<dyn LLMProvider>,
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ContentExtractor>,
    relay: Arc<StreamRegistry>,
    sessions: Arc<SessionRepository>,
    bus: Option<Arc<MessageBus>>,
    research: ResearchConfig,
    decision_timeout: Duration,
}

impl ResearchService {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ContentExtractor>,
        relay: Arc<StreamRegistry>,
        sessions: Arc<SessionRepository>,
    ) -> Self {
        Self {
            decisions: Arc::new(LlmDecisionService::new(Arc::clone(&llm))),
            answers: llm,
            search,
            extractor,
            relay,
            sessions,
            bus: None,
            research: ResearchConfig::default(),
            decision_timeout: Duration::from_secs(60),
        }
    }

    /// Build every collaborator from configuration and stored credentials
    pub fn from_config(
        config: &Config,
        relay: Arc<StreamRegistry>,
        sessions: Arc<SessionRepository>,
    ) -> Result<Self, EngineError> {
        let secrets = SecretCache::new(Arc::new(SecretManager::default()));
        let llm = llm::create_provider(&config.llm, &secrets)?;
        let search = SerperSearch::new(&config.search, secrets.get_secret("serper_api_key")?)?;
        let extractor =
            FirecrawlScraper::new(&config.scrape, secrets.get_secret("firecrawl_api_key")?)?;

        Ok(
            Self::new(llm, Arc::new(search), Arc::new(extractor), relay, sessions)
                .with_settings(
                    config.research.clone(),
                    Duration::from_secs(config.llm.decision_timeout_secs),
                ),
        )
    }

    /// Use a separate decision service instead of the answer LLM
    pub fn with_decision_service(mut self, decisions: Arc<dyn DecisionService>) -> Self {
        self.decisions = decisions;
        self
    }

    pub fn with_settings(mut self, research: ResearchConfig, decision_timeout: Duration) -> Self {
        self.research = research;
        self.decision_timeout = decision_timeout;
        self
    }

    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Research `request.question` and start streaming the answer
    pub async fn ask(
        &self,
        request: AskRequest,
        cancel: CancellationToken,
    ) -> Result<AskResponse, EngineError> {
        let question = request.question.trim().to_string();
        if question.is_empty() {
            return Err(EngineError::Config("question must not be empty".to_string()));
        }

        let (session_id, is_new) = match self
            .sessions
            .create_or_get_session(request.session_id.as_deref())
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!("Session lookup failed, continuing unsaved: {:#}", e);
                let id = request
                    .session_id
                    .clone()
                    .unwrap_or_else(|| format!("chat_{}", Uuid::new_v4().simple()));
                (id, true)
            }
        };
        info!("Ask in session {} (new: {})", session_id, is_new);

        let mut ctx = ResearchContext::with_limits(
            question.clone(),
            self.research.max_steps,
            self.research.scrape_excerpt_chars,
        );
        for message in request.prior_messages {
            ctx.add_message(message);
        }
        ctx.add_message(ConversationMessage::user(question));

        let summary = self
            .orchestrator(&session_id, cancel.clone())
            .run(ctx)
            .await?;

        let stream_id = format!("stream_{}", Uuid::new_v4().simple());
        let writer = self.relay.create(&stream_id);
        if let Err(e) = self
            .sessions
            .set_active_stream(&session_id, Some(&stream_id))
            .await
        {
            warn!("Could not record active stream: {:#}", e);
        }

        let synthesizer = AnswerSynthesizer::new(Arc::clone(&self.answers));
        let stream = synthesizer.synthesize(summary.context, summary.mode, writer, cancel);

        let (answer_tx, answer_rx) = oneshot::channel();
        let persisted = tokio::spawn(persist_when_done(
            Arc::clone(&self.sessions),
            session_id.clone(),
            is_new,
            summary.trace.clone(),
            stream.outcome,
            answer_tx,
        ));

        Ok(AskResponse {
            session_id,
            stream_id,
            reader: stream.reader,
            answer: answer_rx,
            trace: summary.trace,
            mode: summary.mode,
            persisted,
        })
    }

    /// Reattach to the session's live answer stream
    pub async fn resume(&self, session_id: &str) -> Result<ResumeOutcome, EngineError> {
        resume_session(&self.sessions, &self.relay, session_id).await
    }

    fn orchestrator(&self, session_id: &str, cancel: CancellationToken) -> Orchestrator {
        let planner = ActionPlanner::new(
            Arc::clone(&self.decisions),
            self.research.retry_policy(),
            self.decision_timeout,
        );
        let executor = ResearchExecutor::new(Arc::clone(&self.search), Arc::clone(&self.extractor))
            .with_observer(Arc::new(SearchAnalytics {
                sessions: Arc::clone(&self.sessions),
                session_id: session_id.to_string(),
            }));

        let orchestrator = Orchestrator::new(planner, executor).with_cancellation(cancel);
        match &self.bus {
            Some(bus) => orchestrator.with_bus(Arc::clone(bus)),
            None => orchestrator,
        }
    }
}

/// Look up the session's active stream pointer and reattach through `relay`
async fn resume_session(
    sessions: &SessionRepository,
    relay: &StreamRegistry,
    session_id: &str,
) -> Result<ResumeOutcome, EngineError> {
    let session = sessions
        .get_session(session_id)
        .await
        .map_err(|e| EngineError::Persistence(format!("{:#}", e)))?;

    match session.and_then(|s| s.active_stream_id) {
        Some(stream_id) => Ok(relay.resume(&stream_id)),
        None => Ok(ResumeOutcome::Expired),
    }
}

/// Forward the outcome to the caller, then write the transcript
async fn persist_when_done(
    sessions: Arc<SessionRepository>,
    session_id: String,
    is_new: bool,
    trace: Vec<TraceEntry>,
    outcome: oneshot::Receiver<SynthesisOutcome>,
    answer_tx: oneshot::Sender<SynthesisOutcome>,
) {
    let outcome = match outcome.await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("Synthesis ended without an outcome for session {}", session_id);
            return;
        }
    };
    let transcript = outcome.transcript.clone();
    let cancelled = outcome.cancelled;
    let _ = answer_tx.send(outcome);

    if cancelled {
        info!("Answer cancelled, session {} keeps its earlier transcript", session_id);
        if let Err(e) = sessions.set_active_stream(&session_id, None).await {
            warn!("Could not clear active stream: {:#}", e);
        }
        return;
    }

    let metadata = TranscriptMetadata {
        is_new,
        trace,
        active_stream_id: None,
    };
    let result = sessions
        .persist_transcript(&session_id, &transcript, &metadata)
        .await
        .with_context(|| format!("Failed to persist session {}", session_id));

    if let Err(e) = result {
        warn!("{}", EngineError::Persistence(format!("{:#}", e)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            Outcome::from_error(&EngineError::Config("missing key".to_string())),
            Outcome::FatalConfigurationError
        );
        assert_eq!(
            Outcome::from_error(&EngineError::LLMProvider("down".to_string())),
            Outcome::UpstreamProviderError
        );
    }

    #[test]
    fn test_outcome_from_synthesis() {
        let outcome = |mode, fell_back| SynthesisOutcome {
            text: String::new(),
            mode,
            fell_back,
            interrupted: false,
            cancelled: false,
            transcript: vec![],
        };
        assert_eq!(
            Outcome::from_synthesis(&outcome(SynthesisMode::Standard, false)),
            Outcome::Success
        );
        assert_eq!(
            Outcome::from_synthesis(&outcome(SynthesisMode::Degraded, false)),
            Outcome::SuccessDegraded
        );
        assert_eq!(
            Outcome::from_synthesis(&outcome(SynthesisMode::Degraded, true)),
            Outcome::UpstreamProviderError
        );

        let broken_off = SynthesisOutcome {
            interrupted: true,
            ..outcome(SynthesisMode::Standard, false)
        };
        assert_eq!(
            Outcome::from_synthesis(&broken_off),
            Outcome::UpstreamProviderError
        );

        let aborted = SynthesisOutcome {
            cancelled: true,
            ..outcome(SynthesisMode::Standard, false)
        };
        assert_eq!(Outcome::from_synthesis(&aborted), Outcome::Cancelled);
        assert_eq!(
            Outcome::from_error(&EngineError::Cancelled),
            Outcome::Cancelled
        );
    }
}
