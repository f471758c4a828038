//! Research loop
//!
//! Drives one question through `Idle → Looping → Concluding → Done`. Each
//! iteration advances the step counter, asks the planner for a decision and
//! dispatches it. An `Answer` decision concludes in standard mode; running
//! out of steps concludes in degraded mode.

use sdk::errors::EngineError;
use sdk::types::{Action, TraceEntry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::context::ResearchContext;
use super::executor::ResearchExecutor;
use super::planner::{ActionPlanner, PlannedDecision};
use super::synthesizer::SynthesisMode;
use crate::message_bus::{MessageBus, ProgressEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Looping,
    Concluding(SynthesisMode),
    Done,
}

/// What a finished loop hands to synthesis
#[derive(Debug)]
pub struct RunSummary {
    pub context: ResearchContext,
    pub mode: SynthesisMode,
    pub trace: Vec<TraceEntry>,
    pub steps_taken: u32,
}

pub struct Orchestrator {
    planner: ActionPlanner,
    executor: ResearchExecutor,
    bus: Option<Arc<MessageBus>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(planner: ActionPlanner, executor: ResearchExecutor) -> Self {
        Self {
            planner,
            executor,
            bus: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the loop to conclusion. Fails only on cancellation.
    pub async fn run(&self, mut ctx: ResearchContext) -> Result<RunSummary, EngineError> {
        let mut state = RunState::Idle;
        let mut trace = Vec::new();

        info!(
            "Research started: \"{}\" ({} step budget)",
            ctx.question(),
            ctx.max_steps()
        );
        self.publish(ProgressEvent::RunStarted {
            question: ctx.question().to_string(),
            max_steps: ctx.max_steps(),
        });
        transition(&mut state, RunState::Looping);

        while state == RunState::Looping {
            if ctx.should_stop() {
                info!("Step budget exhausted without an answer decision");
                transition(&mut state, RunState::Concluding(SynthesisMode::Degraded));
                break;
            }

            ctx.increment_step();
            let step = ctx.step();

            let planned = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(cancelled(step)),
                planned = self.planner.next_decision(&ctx) => planned,
            };
            self.record(step, &planned, &mut trace);

            match planned.decision.action {
                Action::Search { query } => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(cancelled(step)),
                        _ = self.executor.execute_search(&mut ctx, &query) => {}
                    }
                }
                Action::Scrape { urls } => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(cancelled(step)),
                        _ = self.executor.execute_scrape(&mut ctx, &urls) => {}
                    }
                }
                Action::Answer => {
                    transition(&mut state, RunState::Concluding(SynthesisMode::Standard));
                }
            }
        }

        let mode = match state {
            RunState::Concluding(mode) => mode,
            _ => SynthesisMode::Degraded,
        };
        transition(&mut state, RunState::Done);

        let steps_taken = ctx.step();
        info!(
            "Research concluded after {} step(s): {} queries, {} hits, {} pages, {} mode",
            steps_taken,
            ctx.query_history().len(),
            ctx.hit_count(),
            ctx.scrape_history().len(),
            mode.as_str()
        );
        self.publish(ProgressEvent::RunCompleted {
            steps_taken,
            degraded: mode == SynthesisMode::Degraded,
        });

        Ok(RunSummary {
            context: ctx,
            mode,
            trace,
            steps_taken,
        })
    }

    fn record(&self, step: u32, planned: &PlannedDecision, trace: &mut Vec<TraceEntry>) {
        let decision = &planned.decision;
        debug!(
            "Step {}: {} \"{}\"{}",
            step,
            decision.action.kind(),
            decision.title,
            if planned.fallback { " (fallback)" } else { "" }
        );

        trace.push(TraceEntry {
            step,
            kind: decision.action.kind(),
            title: decision.title.clone(),
            description: decision.description.clone(),
            fallback: planned.fallback,
        });

        self.publish(ProgressEvent::Decision {
            step,
            kind: decision.action.kind(),
            title: decision.title.clone(),
            description: decision.description.clone(),
            fallback: planned.fallback,
        });
    }

    fn publish(&self, event: ProgressEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!("Run state {:?} -> {:?}", state, next);
    *state = next;
}

fn cancelled(step: u32) -> EngineError {
    info!("Research cancelled at step {}", step);
    EngineError::Cancelled
}
