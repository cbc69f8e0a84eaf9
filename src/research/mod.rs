//! Web research collaborator and context formatting.
//!
//! Each generating stage grounds its prompt in search results. Hits are
//! de-duplicated by URL and rendered as numbered `[SOURCE n]` blocks whose
//! `VERIFIED_URL:` lines form the whitelist that stage validators check
//! generated citations against.

pub mod tavily;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::error::SearchError;

pub use tavily::TavilyClient;

/// Maximum query length accepted by the search API.
pub const MAX_QUERY_CHARS: usize = 400;

static SOURCE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[SOURCE \d+\](.*?)VERIFIED_URL: ([^\n]+)")
        .expect("Invalid regex for source blocks")
});

/// A single search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    #[serde(alias = "content")]
    pub excerpt: String,
    pub url: String,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        excerpt: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            excerpt: excerpt.into(),
            url: url.into(),
        }
    }
}

/// A search query with its result budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchQuery {
    pub text: String,
    pub max_results: usize,
}

impl ResearchQuery {
    /// Builds a query, truncating it to [`MAX_QUERY_CHARS`].
    pub fn new(text: impl AsRef<str>, max_results: usize) -> Self {
        Self {
            text: optimize_query(text.as_ref(), MAX_QUERY_CHARS),
            max_results,
        }
    }
}

/// Trait for web research backends.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Runs one search and returns its hits.
    async fn search(&self, query: &ResearchQuery) -> Result<Vec<SearchHit>, SearchError>;
}

/// Formatted research for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchContext {
    hits: Vec<SearchHit>,
}

impl ResearchContext {
    /// Builds a context, dropping hits whose URL was already seen.
    pub fn from_hits(hits: impl IntoIterator<Item = SearchHit>) -> Self {
        let mut seen = BTreeSet::new();
        let hits = hits
            .into_iter()
            .filter(|hit| hit.url.is_empty() || seen.insert(hit.url.clone()))
            .collect();
        Self { hits }
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Rendered `[SOURCE n]` blocks.
    pub fn render(&self) -> String {
        format_context(&self.hits)
    }

    /// Distinct verified URLs, in source order.
    pub fn verified_urls(&self) -> Vec<String> {
        extract_source_urls(&self.render())
    }

    /// Whether `url` appears as a verified source.
    pub fn is_verified(&self, url: &str) -> bool {
        let url = url.trim();
        !url.is_empty() && self.hits.iter().any(|hit| clean_text(&hit.url) == url)
    }
}

/// Runs every query against `provider`, skipping individual failures.
pub async fn gather(provider: &dyn ResearchProvider, queries: &[ResearchQuery]) -> ResearchContext {
    let mut hits = Vec::new();
    for query in queries {
        match provider.search(query).await {
            Ok(found) => {
                tracing::debug!(query = %query.text, results = found.len(), "Search completed");
                hits.extend(found);
            }
            Err(e) => {
                tracing::warn!(query = %query.text, error = %e, "Search failed, skipping query");
            }
        }
    }
    ResearchContext::from_hits(hits)
}

/// Renders hits as numbered source blocks separated by blank lines.
///
/// Hits with neither title nor excerpt are omitted but keep their number.
pub fn format_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .filter_map(|(idx, hit)| {
            let title = clean_text(&hit.title);
            let content = clean_text(&hit.excerpt);
            let url = clean_text(&hit.url);
            if title.is_empty() && content.is_empty() {
                return None;
            }
            Some(format!(
                "[SOURCE {}]\nTitle: {}\nContent: {}\nVERIFIED_URL: {}\n---",
                idx + 1,
                title,
                content,
                url
            ))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Extracts distinct `VERIFIED_URL` values from a rendered context.
pub fn extract_source_urls(context: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    SOURCE_BLOCK
        .captures_iter(context)
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|url| !url.is_empty() && seen.insert(url.clone()))
        .collect()
}

/// Replaces control characters with spaces and collapses whitespace.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncates a query to at most `max_chars` characters.
pub fn optimize_query(query: &str, max_chars: usize) -> String {
    match query.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => query[..byte_idx].to_string(),
        None => query.to_string(),
    }
}
