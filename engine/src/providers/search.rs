//! Web search provider
//!
//! [`SerperSearch`] posts `{"q": query}` to `{base_url}/search` with an
//! `X-API-KEY` header and maps the `organic` results to [`SearchHit`]s.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::SearchHit;
use serde::Deserialize;
use std::time::Duration;

use super::ProviderError;
use crate::config::SearchConfig;
use crate::secrets::SecretString;

const PROVIDER: &str = "search";

/// A raw hit as returned by the provider, before date defaulting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub date: Option<String>,
}

impl RawSearchHit {
    /// Fill in a missing date with `now`
    pub fn into_hit(self, now: &str) -> SearchHit {
        SearchHit {
            date: self
                .date
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| now.to_string()),
            title: self.title,
            url: self.url,
            snippet: self.snippet,
        }
    }
}

/// Runs one web search
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<RawSearchHit>, ProviderError>;
}

pub struct SerperSearch {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(config: &SearchConfig, api_key: SecretString) -> Result<Self, EngineError> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client: crate::llm::http_client(Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

#[async_trait]
impl SearchProvider for SerperSearch {
    async fn search(&self, query: &str) -> Result<Vec<RawSearchHit>, ProviderError> {
        tracing::debug!("Performing web search for query: {}", query);

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", self.api_key.expose())
            .json(&serde_json::json!({ "q": query }))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(PROVIDER, status, &body));
        }

        let parsed: SerperResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    message: e.to_string(),
                })?;

        tracing::debug!("Search returned {} organic results", parsed.organic.len());

        Ok(parsed
            .organic
            .into_iter()
            .map(|o| RawSearchHit {
                title: o.title,
                url: o.link,
                snippet: o.snippet,
                date: o.date,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_date_defaults_to_now() {
        let raw = RawSearchHit {
            title: "t".to_string(),
            url: "https://a.dev".to_string(),
            snippet: "s".to_string(),
            date: None,
        };
        assert_eq!(raw.into_hit("2026-10-17T00:00:00Z").date, "2026-10-17T00:00:00Z");
    }

    #[test]
    fn test_present_date_is_kept() {
        let raw = RawSearchHit {
            title: "t".to_string(),
            url: "https://a.dev".to_string(),
            snippet: "s".to_string(),
            date: Some("Mar 3, 2026".to_string()),
        };
        assert_eq!(raw.into_hit("now").date, "Mar 3, 2026");
    }

    #[test]
    fn test_serper_response_shape() {
        let body = r#"{"organic":[{"title":"A","link":"https://a.dev","snippet":"x","position":1}]}"#;
        let parsed: SerperResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.organic.len(), 1);
        assert_eq!(parsed.organic[0].link, "https://a.dev");
        assert!(parsed.organic[0].date.is_none());
    }
}
