//! Action planner
//!
//! Asks the decision service for the next action with a per-call timeout and
//! retry-with-backoff. Scrape requests are restricted to URLs earlier searches
//! returned. When every attempt fails, a deterministic fallback is used:
//! search for the question on the first step, answer afterwards.

use chrono::Utc;
use sdk::errors::EngineError;
use sdk::types::{Action, Decision};
use std::sync::Arc;
use std::time::Duration;

use super::context::ResearchContext;
use super::prompts;
use super::retry::{retry_with_backoff, RetryPolicy};
use crate::llm::decision::{DecisionError, DecisionService};
use crate::llm::LLMError;

/// A decision plus how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDecision {
    pub decision: Decision,
    /// True when the decision service gave nothing usable
    pub fallback: bool,
}

pub struct ActionPlanner {
    decisions: Arc<dyn DecisionService>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl ActionPlanner {
    pub fn new(
        decisions: Arc<dyn DecisionService>,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            decisions,
            policy,
            call_timeout,
        }
    }

    /// Decide the next action for `ctx`. Never fails.
    pub async fn next_decision(&self, ctx: &ResearchContext) -> PlannedDecision {
        let prompt = prompts::next_action_prompt(ctx, Utc::now());

        let result = retry_with_backoff(&self.policy, DecisionError::is_retryable, |attempt| {
            let prompt = prompt.as_str();
            async move {
                tracing::debug!("Decision attempt {} at step {}", attempt, ctx.step());
                let decision =
                    match tokio::time::timeout(self.call_timeout, self.decisions.decide(prompt))
                        .await
                    {
                        Ok(result) => result?,
                        Err(_) => return Err(DecisionError::Transport(LLMError::Timeout)),
                    };
                restrict_scrape_urls(decision, ctx)
            }
        })
        .await;

        match result {
            Ok(decision) => PlannedDecision {
                decision,
                fallback: false,
            },
            Err(e) => {
                match e {
                    DecisionError::UnknownAction(kind) => {
                        tracing::error!("{}", EngineError::UnknownAction(kind));
                    }
                    other => {
                        tracing::error!(
                            "All {} decision attempts failed at step {}: {}",
                            self.policy.max_attempts,
                            ctx.step(),
                            EngineError::PlannerDecision(other.to_string())
                        );
                    }
                }
                PlannedDecision {
                    decision: fallback_decision(ctx),
                    fallback: true,
                }
            }
        }
    }
}

/// Deterministic decision used when the decision service gives nothing usable
pub fn fallback_decision(ctx: &ResearchContext) -> Decision {
    let action = if ctx.step() <= 1 {
        Action::Search {
            query: ctx.question().to_string(),
        }
    } else {
        Action::Answer
    };
    let mut decision = Decision::bare(action);
    decision.description = "Decision service unavailable, using fallback action".to_string();
    decision
}

/// Drop scrape URLs that no earlier search returned. A scrape left with no
/// eligible URL is invalid output.
fn restrict_scrape_urls(
    mut decision: Decision,
    ctx: &ResearchContext,
) -> Result<Decision, DecisionError> {
    if let Action::Scrape { urls } = &mut decision.action {
        let requested = urls.len();
        urls.retain(|u| ctx.is_known_url(u));
        if urls.len() < requested {
            tracing::warn!(
                "Dropped {} scrape URL(s) not returned by any prior search",
                requested - urls.len()
            );
        }
        if urls.is_empty() {
            return Err(DecisionError::Invalid(
                "scrape requested only URLs that no search returned".to_string(),
            ));
        }
    }
    Ok(decision)
}
