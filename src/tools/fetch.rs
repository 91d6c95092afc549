//! Page fetching and HTML text extraction
//!
//! [`HttpPageFetcher`] downloads one URL and extracts readable text with
//! scraper. Size caps and the concurrency gate belong to
//! [`BoundedFetcher`](crate::pipeline::fetcher::BoundedFetcher); this module
//! only answers "what does this page say".

use async_trait::async_trait;
use futures::StreamExt;
use scraper::{Html, Node, Selector};

use crate::types::{AppError, Result};
use crate::utils::toml_config::FetchConfig;

/// Elements whose text never counts as page content
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "iframe", "noscript",
];

/// Extracted content of one page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    /// One line per text node of the main content
    pub text: String,
    pub raw_content: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// `Ok(None)` when the URL does not serve HTML
    async fn fetch(&self, url: &str) -> Result<Option<FetchedPage>>;
}

pub struct HttpPageFetcher {
    http: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AppError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Read at most `limit` bytes of the body, dropping the connection after that.
///
/// A multi-byte character cut at the limit decodes as a replacement character.
async fn read_capped(response: reqwest::Response, limit: usize) -> reqwest::Result<String> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<FetchedPage>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("{}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| AppError::Fetch(format!("{}: {}", url, e)))?;

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            tracing::debug!(url = %url, "Skipping non-HTML response");
            return Ok(None);
        }

        let body = read_capped(response, self.max_body_bytes)
            .await
            .map_err(|e| AppError::Fetch(format!("{}: {}", url, e)))?;

        let (title, text) = extract_page(&body, url)?;
        Ok(Some(FetchedPage {
            url: url.to_string(),
            title,
            text,
            raw_content: body,
        }))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::Internal(format!("Bad selector '{}': {}", css, e)))
}

/// Title and main text of an HTML document.
///
/// Content is taken from `<main>`, else `<article>`, else `<body>`, else the
/// whole document; text under navigation and script-like elements is skipped.
/// The title falls back to `fallback_title` when the page has none.
pub fn extract_page(html: &str, fallback_title: &str) -> Result<(String, String)> {
    let document = Html::parse_document(html);

    let title = document
        .select(&selector("title")?)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());

    let mut root = None;
    for css in ["main", "article", "body"] {
        if let Some(element) = document.select(&selector(css)?).next() {
            root = Some(element);
            break;
        }
    }

    let scope = root.unwrap_or_else(|| document.root_element());

    let mut lines = Vec::new();
    for node in scope.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let excluded = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| EXCLUDED_TAGS.contains(&e.name()))
                .unwrap_or(false)
        });
        if excluded {
            continue;
        }
        let line = text.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    Ok((title, lines.join("\n")))
}
