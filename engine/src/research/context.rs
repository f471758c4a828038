//! Research context accumulator
//!
//! Holds everything a single research run has learned: the step counter,
//! every search and scrape result in the order they arrived, and the
//! conversation transcript. All mutation is append-only and the step counter
//! is monotonic and capped at the run's budget.

use sdk::types::{ConversationMessage, QueryResult, ScrapeResult};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Default number of loop iterations a run may take
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// Default per-page character budget in the context summary
pub const DEFAULT_SCRAPE_EXCERPT_CHARS: usize = 2000;

/// Summary returned before any evidence has been collected
pub const EMPTY_SUMMARY: &str = "no research collected yet";

/// Accumulated state of one research run
#[derive(Debug, Clone)]
pub struct ResearchContext {
    question: String,
    step: u32,
    max_steps: u32,
    scrape_excerpt_chars: usize,
    query_history: Vec<QueryResult>,
    scrape_history: Vec<ScrapeResult>,
    messages: Vec<ConversationMessage>,
    /// URLs of every search hit seen so far
    known_urls: HashSet<String>,
}

impl ResearchContext {
    /// Create a context with the default step budget and excerpt size
    pub fn new(question: impl Into<String>) -> Self {
        Self::with_limits(question, DEFAULT_MAX_STEPS, DEFAULT_SCRAPE_EXCERPT_CHARS)
    }

    pub fn with_limits(
        question: impl Into<String>,
        max_steps: u32,
        scrape_excerpt_chars: usize,
    ) -> Self {
        Self {
            question: question.into(),
            step: 0,
            max_steps,
            scrape_excerpt_chars,
            query_history: Vec::new(),
            scrape_history: Vec::new(),
            messages: Vec::new(),
            known_urls: HashSet::new(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Steps left before the budget is exhausted
    pub fn remaining_steps(&self) -> u32 {
        self.max_steps.saturating_sub(self.step)
    }

    /// Advance the step counter. Saturates at the budget.
    pub fn increment_step(&mut self) {
        if self.step < self.max_steps {
            self.step += 1;
        }
    }

    pub fn should_stop(&self) -> bool {
        self.step >= self.max_steps
    }

    /// Append search results in arrival order
    pub fn report_queries(&mut self, results: impl IntoIterator<Item = QueryResult>) {
        for result in results {
            for hit in &result.hits {
                self.known_urls.insert(hit.url.clone());
            }
            self.query_history.push(result);
        }
    }

    /// Append scrape results in arrival order
    pub fn report_scrapes(&mut self, results: impl IntoIterator<Item = ScrapeResult>) {
        self.scrape_history.extend(results);
    }

    pub fn query_history(&self) -> &[QueryResult] {
        &self.query_history
    }

    pub fn scrape_history(&self) -> &[ScrapeResult] {
        &self.scrape_history
    }

    /// Every URL returned by any earlier search
    pub fn known_urls(&self) -> &HashSet<String> {
        &self.known_urls
    }

    /// Whether `url` was returned by any earlier search
    pub fn is_known_url(&self, url: &str) -> bool {
        self.known_urls.contains(url)
    }

    /// Total number of search hits accumulated
    pub fn hit_count(&self) -> usize {
        self.query_history.iter().map(|q| q.hits.len()).sum()
    }

    pub fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Bounded textual digest of the accumulated evidence
    ///
    /// Each scraped page contributes at most `scrape_excerpt_chars`
    /// characters. Returns [`EMPTY_SUMMARY`] when nothing has been collected.
    pub fn context_summary(&self) -> String {
        if self.query_history.is_empty() && self.scrape_history.is_empty() {
            return EMPTY_SUMMARY.to_string();
        }

        let mut out = String::new();

        if !self.query_history.is_empty() {
            out.push_str("## Search Results\n");
            for result in &self.query_history {
                let _ = writeln!(out, "\n### Query: \"{}\"", result.query);
                if result.hits.is_empty() {
                    out.push_str("(no results)\n");
                }
                for (i, hit) in result.hits.iter().enumerate() {
                    let _ = writeln!(out, "{}. {} ({})", i + 1, hit.title, hit.date);
                    let _ = writeln!(out, "   URL: {}", hit.url);
                    let _ = writeln!(out, "   {}", hit.snippet);
                }
            }
        }

        if !self.scrape_history.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("## Scraped Content\n");
            for page in &self.scrape_history {
                let _ = writeln!(out, "\n### {}", page.url);
                out.push_str(&truncate_chars(&page.extracted_text, self.scrape_excerpt_chars));
                out.push('\n');
            }
        }

        out
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with an ellipsis
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
