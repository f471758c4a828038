//! Page content extraction
//!
//! [`FirecrawlScraper`] posts to `{base_url}/v1/scrape` asking for markdown
//! and returns the extracted text with the page metadata.

use async_trait::async_trait;
use sdk::errors::EngineError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::ProviderError;
use crate::config::ScrapeConfig;
use crate::secrets::SecretString;

const PROVIDER: &str = "scrape";

/// Result of extracting one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub success: bool,
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Extraction {
    /// Page title from metadata, when the provider reported one
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(|v| v.as_str())
    }
}

/// Extracts the readable content of one URL
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<Extraction, ProviderError>;
}

pub struct FirecrawlScraper {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl FirecrawlScraper {
    pub fn new(config: &ScrapeConfig, api_key: SecretString) -> Result<Self, EngineError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client: crate::llm::http_client(Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FirecrawlResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<FirecrawlData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[async_trait]
impl ContentExtractor for FirecrawlScraper {
    async fn extract(&self, url: &str) -> Result<Extraction, ProviderError> {
        tracing::debug!("Starting web scrape for URL: {}", url);

        let endpoint = format!("{}/v1/scrape", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&serde_json::json!({ "url": url, "formats": ["markdown"] }))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(PROVIDER, status, &body));
        }

        let parsed: FirecrawlResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                })?;

        if !parsed.success {
            return Err(ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                message: parsed
                    .error
                    .unwrap_or_else(|| "scrape reported failure".to_string()),
            });
        }

        let data = parsed.data.ok_or_else(|| ProviderError::InvalidResponse {
            provider: PROVIDER.to_string(),
            message: "missing data".to_string(),
        })?;

        let text = data.markdown.unwrap_or_default();
        Ok(Extraction {
            success: !text.trim().is_empty(),
            text,
            metadata: data.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firecrawl_response_shape() {
        let body = r##"{"success":true,"data":{"markdown":"# Hi","metadata":{"title":"Hi","sourceURL":"https://a.dev"}}}"##;
        let parsed: FirecrawlResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.success);
        let data = parsed.data.unwrap();
        assert_eq!(data.markdown.as_deref(), Some("# Hi"));
        assert_eq!(data.metadata["title"], "Hi");
    }

    #[test]
    fn test_extraction_title() {
        let mut metadata = HashMap::new();
        metadata.insert("title".to_string(), serde_json::json!("Rust Book"));
        let extraction = Extraction {
            success: true,
            text: "body".to_string(),
            metadata,
        };
        assert_eq!(extraction.title(), Some("Rust Book"));
    }
}
