//! Prompt construction
//!
//! Every prompt carries the current date so the model can judge how fresh
//! its sources are.

use chrono::{DateTime, Datelike, Utc};

use super::context::ResearchContext;
use super::synthesizer::SynthesisMode;

/// Steps left at which the model is told to answer
pub const ANSWER_WHEN_REMAINING: u32 = 3;

/// Text returned to the user when answer generation fails outright
pub const APOLOGY_TEXT: &str = "I'm sorry, but I wasn't able to generate an answer this time. \
The research step completed, but the answer service failed. Please try asking again.";

/// Human-readable date, e.g. "Saturday, October 17, 2026"
pub fn format_current_date(now: DateTime<Utc>) -> String {
    now.format("%A, %B %-d, %Y").to_string()
}

fn temporal_awareness(now: DateTime<Utc>) -> String {
    let date = format_current_date(now);
    format!(
        "## Temporal Awareness\n\
         \n\
         Current date: {date}. The current year is {year}.\n\
         - Prefer the most recent sources for anything time-sensitive.\n\
         - Mention publication dates when citing sources.\n\
         - If the best available information is more than a year or two old, say so.\n",
        date = date,
        year = now.year()
    )
}

/// Prompt asking for the next research action
pub fn next_action_prompt(ctx: &ResearchContext, now: DateTime<Utc>) -> String {
    format!(
        r#"You are a research assistant that decides the next action to take to answer a user's question thoroughly and accurately.

{temporal}
## User Question
{question}

## Current Research State
{summary}

## Progress
Step {step} of {max_steps}.

## Available Actions

1. Search the web:
   {{"type": "search", "query": "your search query", "title": "short title", "description": "why"}}

2. Read pages returned by earlier searches:
   {{"type": "scrape", "urls": ["url1", "url2"], "title": "short title", "description": "why"}}

3. Answer the question:
   {{"type": "answer", "title": "short title", "description": "why"}}

## Rules
- On step 1, search first.
- Only scrape URLs that appear in the search results above.
- Answer when you have sufficient information, or when {remaining} or fewer steps remain.

Return exactly one JSON object with a "type" field."#,
        temporal = temporal_awareness(now),
        question = ctx.question(),
        summary = ctx.context_summary(),
        step = ctx.step(),
        max_steps = ctx.max_steps(),
        remaining = ANSWER_WHEN_REMAINING,
    )
}

/// System instructions for the final answer
pub fn answer_system_prompt(mode: SynthesisMode, now: DateTime<Utc>) -> String {
    let guidance = match mode {
        SynthesisMode::Standard => {
            "You are answering a question based on thorough research.\n\
             Provide a comprehensive answer with citations from the sources found.\n\
             Format citations as [Source Title](URL)."
        }
        SynthesisMode::Degraded => {
            "You are answering a question with limited information.\n\
             The maximum number of research steps was reached before the research was complete.\n\
             Give your best attempt based on what was gathered.\n\
             Be explicit about any uncertainty or gaps in the information, and say which parts \
             of the question could not be verified."
        }
    };

    format!("{}\n\n{}", guidance, temporal_awareness(now))
}

/// User turn for the final answer: the question plus all collected research
pub fn answer_user_prompt(ctx: &ResearchContext) -> String {
    format!(
        "Question: {}\n\nResearch collected:\n{}\n\nProvide a comprehensive answer with citations.",
        ctx.question(),
        ctx.context_summary()
    )
}
