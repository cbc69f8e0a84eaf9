//! Tavily-compatible search client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use super::{ResearchProvider, ResearchQuery, SearchHit};
use crate::error::SearchError;

/// Default search endpoint base.
pub const DEFAULT_API_BASE: &str = "https://api.tavily.com";

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Client for the Tavily search API.
pub struct TavilyClient {
    api_base: String,
    api_key: String,
    search_depth: String,
    http_client: Client,
}

impl TavilyClient {
    /// Creates a client against `api_base` using "advanced" search depth.
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self, SearchError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SearchError::ClientInit(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            search_depth: "advanced".to_string(),
            http_client,
        })
    }

    /// Creates a client from `TAVILY_API_KEY` and optional `TAVILY_API_BASE`.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::MissingApiKey` if `TAVILY_API_KEY` is not set.
    pub fn from_env() -> Result<Self, SearchError> {
        let api_key = env::var("TAVILY_API_KEY").map_err(|_| SearchError::MissingApiKey)?;
        let api_base = env::var("TAVILY_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(api_base, api_key)
    }

    /// Overrides the search depth ("basic" or "advanced").
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl ResearchProvider for TavilyClient {
    async fn search(&self, query: &ResearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let body = SearchRequest {
            api_key: &self.api_key,
            query: &query.text,
            search_depth: &self.search_depth,
            max_results: query.max_results,
        };

        let response = self
            .http_client
            .post(format!("{}/search", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(SearchError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                excerpt: r.content,
                url: r.url,
            })
            .collect())
    }
}
