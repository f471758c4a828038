//! External research providers
//!
//! Two seams, each a trait with one HTTP implementation:
//! - [`search::SearchProvider`]: web search (Serper-compatible)
//! - [`scrape::ContentExtractor`]: page content extraction (Firecrawl-compatible)

use sdk::errors::EngineError;

pub mod scrape;
pub mod search;

pub use scrape::{ContentExtractor, Extraction, FirecrawlScraper};
pub use search::{SearchProvider, SerperSearch};

/// Errors from search and extraction providers
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("{0} rejected the API key")]
    Authentication(String),

    #[error("{0} rate limit exceeded")]
    RateLimited(String),

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    #[error("{0} request timed out")]
    Timeout(String),
}

impl ProviderError {
    pub(crate) fn from_transport(provider: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(provider.to_string())
        } else {
            ProviderError::Unavailable {
                provider: provider.to_string(),
                message: crate::secrets::scrub_secrets(&e.to_string()),
            }
        }
    }

    pub(crate) fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => ProviderError::Authentication(provider.to_string()),
            429 => ProviderError::RateLimited(provider.to_string()),
            _ => ProviderError::Unavailable {
                provider: provider.to_string(),
                message: format!("HTTP {}: {}", status, crate::secrets::scrub_secrets(body)),
            },
        }
    }
}

impl From<ProviderError> for EngineError {
    fn from(e: ProviderError) -> Self {
        EngineError::Provider(e.to_string())
    }
}
