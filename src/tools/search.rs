//! Web search backends
//!
//! The pipeline only needs an ordered list of candidate sources; ranking and
//! relevance are the backend's business. An empty list is a valid result.
//!
//! - [`TavilySearch`] - Tavily API (advanced depth, excluded domains)
//! - [`DuckDuckGoSearch`] - DuckDuckGo via daedra (feature `duckduckgo`)
//! - [`FixtureSearch`] - two fixed sources, used when no search key is set

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result, SourceDocument};
use crate::utils::toml_config::{SearchConfig, SearchProviderKind, SokratConfig};
use crate::utils::truncate_chars;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const SNIPPET_CHARS: usize = 500;

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Ranked candidate sources for `query`, rank starting at 1
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Pick the search backend described by `[search]`.
///
/// Tavily without a key falls back to the fixture backend.
pub fn create_search_backend(config: &SokratConfig) -> Result<Arc<dyn SearchBackend>> {
    match config.search.provider {
        SearchProviderKind::Tavily => match config.search_api_key() {
            Some(api_key) => Ok(Arc::new(TavilySearch::new(api_key, config.search.clone())?)),
            None => {
                tracing::warn!("Tavily API key not set, using fixture search results");
                Ok(Arc::new(FixtureSearch))
            }
        },
        SearchProviderKind::DuckDuckGo => {
            #[cfg(feature = "duckduckgo")]
            {
                Ok(Arc::new(DuckDuckGoSearch::from_config(&config.search)))
            }
            #[cfg(not(feature = "duckduckgo"))]
            {
                Err(AppError::Configuration(
                    "search.provider = \"duckduckgo\" requires the `duckduckgo` feature"
                        .to_string(),
                ))
            }
        }
        SearchProviderKind::Fixture => Ok(Arc::new(FixtureSearch)),
    }
}

// ============= Tavily =============

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    exclude_domains: &'a [String],
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

pub struct TavilySearch {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    config: SearchConfig,
}

impl TavilySearch {
    pub fn new(api_key: String, config: SearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Search(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            endpoint: TAVILY_ENDPOINT.to_string(),
            config,
        })
    }

    /// Point the client at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn request(&self, query: &str) -> Result<Vec<SourceDocument>> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            max_results: self.config.max_results,
            exclude_domains: &self.config.exclude_domains,
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Search(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::Search(e.to_string()))?;

        let data: TavilyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Search(format!("Invalid Tavily response: {}", e)))?;

        Ok(data
            .results
            .into_iter()
            .enumerate()
            .map(|(idx, r)| SourceDocument {
                snippet: truncate_chars(&r.content, SNIPPET_CHARS).to_string(),
                url: r.url,
                title: r.title,
                rank: idx as u32 + 1,
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>> {
        match self.request(query).await {
            Ok(results) => {
                tracing::info!(count = results.len(), "Search returned results");
                Ok(results)
            }
            Err(e) => {
                tracing::error!(error = %e, "Search failed");
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

// ============= DuckDuckGo =============

/// DuckDuckGo search powered by daedra
#[cfg(feature = "duckduckgo")]
pub struct DuckDuckGoSearch {
    num_results: usize,
    timeout: Duration,
}

#[cfg(feature = "duckduckgo")]
impl DuckDuckGoSearch {
    pub fn new(num_results: usize, timeout: Duration) -> Self {
        Self {
            num_results,
            timeout,
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.max_results, config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(feature = "duckduckgo")]
#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SourceDocument>> {
        let search_args = daedra::SearchArgs {
            query: query.to_string(),
            options: Some(daedra::SearchOptions {
                num_results: self.num_results,
                ..Default::default()
            }),
        };

        match tokio::time::timeout(
            self.timeout,
            daedra::tools::search::perform_search(&search_args),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response
                .data
                .iter()
                .enumerate()
                .map(|(idx, r)| SourceDocument {
                    url: r.url.clone(),
                    title: r.title.clone(),
                    snippet: truncate_chars(&r.description, SNIPPET_CHARS).to_string(),
                    rank: idx as u32 + 1,
                })
                .collect()),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "DuckDuckGo search failed");
                Ok(Vec::new())
            }
            Err(_) => {
                tracing::error!("DuckDuckGo search timed out");
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

// ============= Fixture =============

/// Deterministic results for offline runs and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureSearch;

impl FixtureSearch {
    pub fn results() -> Vec<SourceDocument> {
        vec![
            SourceDocument {
                url: "https://example.com/1".to_string(),
                title: "Wave Energy Efficiency Study".to_string(),
                snippet: "Wave energy conversion efficiency ranges from 40-60%...".to_string(),
                rank: 1,
            },
            SourceDocument {
                url: "https://example.com/2".to_string(),
                title: "Coastal Wave Power Plants".to_string(),
                snippet: "Near-shore wave energy converters achieve 35-45% efficiency..."
                    .to_string(),
                rank: 2,
            },
        ]
    }
}

#[async_trait]
impl SearchBackend for FixtureSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SourceDocument>> {
        Ok(Self::results())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}
