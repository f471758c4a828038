//! Research orchestration: context accumulation, planning, execution and
//! answer synthesis.

pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod retry;
pub mod synthesizer;

pub use context::ResearchContext;
pub use executor::{ResearchExecutor, SearchObserver};
pub use orchestrator::{Orchestrator, RunState, RunSummary};
pub use planner::{ActionPlanner, PlannedDecision};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use synthesizer::{AnswerStream, AnswerSynthesizer, SynthesisMode, SynthesisOutcome};
