//! Answer synthesis
//!
//! Streams the final answer from the LLM into a relay stream. The caller gets
//! a live [`StreamReader`] plus a oneshot receiver that resolves to the full
//! [`SynthesisOutcome`] once the stream is finished.

use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::ConversationMessage;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::ResearchContext;
use super::prompts;
use crate::llm::{LLMProvider, Message};
use crate::relay::{StreamReader, StreamWriter};

/// Appended to a partial answer when the stream breaks off
pub const INTERRUPTION_NOTE: &str =
    "\n\n_The answer was interrupted before it was complete. Please ask again for the full answer._";

/// How the answer should treat the collected research
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    /// The planner chose to answer
    Standard,
    /// The step budget ran out; the answer must disclose its gaps
    Degraded,
}

impl SynthesisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisMode::Standard => "standard",
            SynthesisMode::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub text: String,
    pub mode: SynthesisMode,
    /// Generation failed before any token and the apology was sent instead
    pub fell_back: bool,
    /// Generation failed part way through
    pub interrupted: bool,
    /// The caller cancelled while the answer was streaming
    pub cancelled: bool,
    /// The run's transcript with the answer appended
    pub transcript: Vec<ConversationMessage>,
}

/// A running synthesis
pub struct AnswerStream {
    pub reader: StreamReader,
    pub outcome: oneshot::Receiver<SynthesisOutcome>,
}

pub struct AnswerSynthesizer {
    provider: Arc<dyn LLMProvider>,
}

impl AnswerSynthesizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Start streaming the answer for `ctx` into `writer`
    ///
    /// Cancelling `cancel` drops the provider call, closes the stream and
    /// reports whatever was generated so far with `cancelled` set.
    pub fn synthesize(
        &self,
        ctx: ResearchContext,
        mode: SynthesisMode,
        writer: StreamWriter,
        cancel: CancellationToken,
    ) -> AnswerStream {
        let reader = writer.reader();
        let (tx, rx) = oneshot::channel();
        let provider = Arc::clone(&self.provider);

        tokio::spawn(async move {
            let outcome = generate(provider, ctx, mode, &writer, &cancel).await;
            writer.finish();
            if tx.send(outcome).is_err() {
                warn!("Synthesis outcome dropped: receiver went away");
            }
        });

        AnswerStream {
            reader,
            outcome: rx,
        }
    }
}

fn build_messages(ctx: &ResearchContext, mode: SynthesisMode) -> Vec<Message> {
    let mut messages = vec![Message::system(prompts::answer_system_prompt(
        mode,
        Utc::now(),
    ))];
    messages.extend(ctx.messages().iter().map(Message::from));
    messages.push(Message::user(prompts::answer_user_prompt(ctx)));
    messages
}

async fn generate(
    provider: Arc<dyn LLMProvider>,
    mut ctx: ResearchContext,
    mode: SynthesisMode,
    writer: &StreamWriter,
    cancel: &CancellationToken,
) -> SynthesisOutcome {
    info!(
        "Synthesizing {} answer with {} after {} step(s)",
        mode.as_str(),
        provider.name(),
        ctx.step()
    );

    let messages = build_messages(&ctx, mode);
    let partial = Mutex::new(String::new());
    let on_token = |token: &str| {
        writer.push(token);
        partial
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_str(token);
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = provider.stream(&messages, &on_token) => Some(result),
    };
    let partial = partial
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let Some(result) = result else {
        info!("{} (after {} chars of answer)", EngineError::Cancelled, partial.len());
        ctx.add_message(ConversationMessage::assistant(partial.clone()));
        return SynthesisOutcome {
            text: partial,
            mode,
            fell_back: false,
            interrupted: false,
            cancelled: true,
            transcript: ctx.messages().to_vec(),
        };
    };

    let (text, fell_back, interrupted) = match result {
        Ok(full) => {
            info!("Answer complete ({} chars)", full.len());
            (full, false, false)
        }
        Err(e) if partial.is_empty() => {
            warn!("{}", EngineError::Synthesis(e.to_string()));
            writer.push(prompts::APOLOGY_TEXT);
            (prompts::APOLOGY_TEXT.to_string(), true, false)
        }
        Err(e) => {
            warn!(
                "{} (after {} chars)",
                EngineError::Synthesis(e.to_string()),
                partial.len()
            );
            writer.push(INTERRUPTION_NOTE);
            (format!("{}{}", partial, INTERRUPTION_NOTE), false, true)
        }
    };

    ctx.add_message(ConversationMessage::assistant(text.clone()));

    SynthesisOutcome {
        text,
        mode,
        fell_back,
        interrupted,
        cancelled: false,
        transcript: ctx.messages().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMError, TokenSink};
    use crate::relay::StreamRegistry;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Emits the given tokens, then optionally fails
    struct Tokens {
        tokens: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl LLMProvider for Tokens {
        fn name(&self) -> &str {
            "tokens"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, _messages: &[Message]) -> crate::llm::Result<String> {
            Ok(self.tokens.concat())
        }

        async fn stream(
            &self,
            _messages: &[Message],
            on_token: &TokenSink,
        ) -> crate::llm::Result<String> {
            for token in &self.tokens {
                on_token(token);
            }
            if self.fail {
                return Err(LLMError::StreamInterrupted("connection reset".to_string()));
            }
            Ok(self.tokens.concat())
        }
    }

    fn context() -> ResearchContext {
        let mut ctx = ResearchContext::new("What is Rust?");
        ctx.add_message(ConversationMessage::user("What is Rust?"));
        ctx
    }

    async fn run(provider: Tokens, mode: SynthesisMode) -> (String, SynthesisOutcome) {
        let registry = StreamRegistry::default();
        let synthesizer = AnswerSynthesizer::new(Arc::new(provider));
        let stream = synthesizer.synthesize(
            context(),
            mode,
            registry.create("answer"),
            CancellationToken::new(),
        );
        let streamed = stream.reader.read_to_end().await;
        (streamed, stream.outcome.await.unwrap())
    }

    #[tokio::test]
    async fn test_streams_answer_and_appends_to_transcript() {
        let (streamed, outcome) = run(
            Tokens {
                tokens: vec!["Rust is ", "a systems language."],
                fail: false,
            },
            SynthesisMode::Standard,
        )
        .await;

        assert_eq!(streamed, "Rust is a systems language.");
        assert_eq!(outcome.text, streamed);
        assert!(!outcome.fell_back);
        assert_eq!(outcome.transcript.len(), 2);
        assert_eq!(outcome.transcript[1], ConversationMessage::assistant(streamed));
    }

    #[tokio::test]
    async fn test_failure_before_first_token_sends_apology() {
        let (streamed, outcome) = run(
            Tokens {
                tokens: vec![],
                fail: true,
            },
            SynthesisMode::Degraded,
        )
        .await;

        assert!(outcome.fell_back);
        assert_eq!(outcome.mode, SynthesisMode::Degraded);
        assert_eq!(streamed, prompts::APOLOGY_TEXT);
        assert_eq!(outcome.text, prompts::APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_text() {
        let (streamed, outcome) = run(
            Tokens {
                tokens: vec!["Rust was created ", "at Mozilla"],
                fail: true,
            },
            SynthesisMode::Standard,
        )
        .await;

        assert!(!outcome.fell_back);
        assert!(outcome.interrupted);
        assert!(outcome.text.starts_with("Rust was created at Mozilla"));
        assert!(outcome.text.ends_with(INTERRUPTION_NOTE));
        assert_eq!(streamed, outcome.text);
    }

    /// Emits one token, then stalls until dropped
    struct Stalls;

    #[async_trait]
    impl LLMProvider for Stalls {
        fn name(&self) -> &str {
            "stalls"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, _messages: &[Message]) -> crate::llm::Result<String> {
            Ok(String::new())
        }

        async fn stream(
            &self,
            _messages: &[Message],
            on_token: &TokenSink,
        ) -> crate::llm::Result<String> {
            on_token("Rust ");
            tokio::time::sleep(Duration::from_secs(30)).await;
            on_token("never arrives");
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_streaming_answer() {
        let registry = StreamRegistry::default();
        let cancel = CancellationToken::new();
        let synthesizer = AnswerSynthesizer::new(Arc::new(Stalls));
        let stream = synthesizer.synthesize(
            context(),
            SynthesisMode::Standard,
            registry.create("answer"),
            cancel.clone(),
        );

        let mut reader = stream.reader;
        assert_eq!(reader.next().await.as_deref(), Some("Rust "));
        cancel.cancel();

        let rest = tokio::time::timeout(Duration::from_secs(2), reader.read_to_end())
            .await
            .unwrap();
        assert_eq!(rest, "");

        let outcome = stream.outcome.await.unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.interrupted);
        assert_eq!(outcome.text, "Rust ");
    }

    #[test]
    fn test_degraded_messages_carry_disclosure_prompt() {
        let messages = build_messages(&context(), SynthesisMode::Degraded);
        assert!(messages[0].content.contains("limited information"));
        assert_eq!(messages.len(), 3);
        assert!(messages[2].content.contains("What is Rust?"));
    }
}
