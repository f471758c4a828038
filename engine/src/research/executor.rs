//! Research executor
//!
//! Runs search and scrape actions against the providers and records what
//! succeeded in the context. Provider failures are logged and contained:
//! a failed search appends nothing, a failed page is skipped.

use chrono::{SecondsFormat, Utc};
use sdk::types::{QueryResult, ScrapeResult};
use std::sync::Arc;

use super::context::ResearchContext;
use crate::providers::{ContentExtractor, SearchProvider};

/// Analytics hook called after every search attempt that reached the provider
pub trait SearchObserver: Send + Sync {
    fn search_completed(&self, query: &str, result_count: usize);
}

pub struct ResearchExecutor {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ContentExtractor>,
    observer: Option<Arc<dyn SearchObserver>>,
}

impl ResearchExecutor {
    pub fn new(search: Arc<dyn SearchProvider>, extractor: Arc<dyn ContentExtractor>) -> Self {
        Self {
            search,
            extractor,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one search and append its hits. Returns the appended result.
    pub async fn execute_search(
        &self,
        ctx: &mut ResearchContext,
        query: &str,
    ) -> Option<QueryResult> {
        match self.search.search(query).await {
            Ok(raw_hits) => {
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                let hits: Vec<_> = raw_hits.into_iter().map(|h| h.into_hit(&now)).collect();
                tracing::info!("Search \"{}\" returned {} hits", query, hits.len());

                if let Some(observer) = &self.observer {
                    observer.search_completed(query, hits.len());
                }

                let result = QueryResult {
                    query: query.to_string(),
                    hits,
                };
                ctx.report_queries(vec![result.clone()]);
                Some(result)
            }
            Err(e) => {
                tracing::warn!("Search \"{}\" failed: {}", query, e);
                None
            }
        }
    }

    /// Extract each URL in order. Only non-empty successful extractions are
    /// appended; a failure on one URL does not affect the others. Returns the
    /// pages this call appended.
    pub async fn execute_scrape<'c>(
        &self,
        ctx: &'c mut ResearchContext,
        urls: &[String],
    ) -> &'c [ScrapeResult] {
        let mut scraped = Vec::new();

        for url in urls {
            match self.extractor.extract(url).await {
                Ok(extraction) if extraction.success => {
                    tracing::debug!(
                        "Scraped {} ({} chars{})",
                        url,
                        extraction.text.len(),
                        extraction
                            .title()
                            .map(|t| format!(", \"{}\"", t))
                            .unwrap_or_default()
                    );
                    scraped.push(ScrapeResult {
                        url: url.clone(),
                        extracted_text: extraction.text,
                    });
                }
                Ok(_) => {
                    tracing::warn!("Scrape of {} returned no content", url);
                }
                Err(e) => {
                    tracing::warn!("Scrape of {} failed: {}", url, e);
                }
            }
        }

        tracing::info!("Scraped {}/{} URLs", scraped.len(), urls.len());
        let start = ctx.scrape_history().len();
        ctx.report_scrapes(scraped);
        &ctx.scrape_history()[start..]
    }
}
