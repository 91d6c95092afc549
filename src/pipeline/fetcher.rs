//! Concurrency-limited page retrieval.
//!
//! At most `concurrency` fetches are in flight at once, across every batch
//! issued through the same [`BoundedFetcher`]. A URL that fails, times out or
//! is not HTML is dropped from the output and logged; the rest of the batch
//! carries on. Output keeps input order.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::tools::fetch::{FetchedPage, PageFetcher};
use crate::types::ParsedDocument;
use crate::utils::toml_config::FetchConfig;
use crate::utils::truncate_chars;

/// Appended to extracted text cut at the character budget
pub const TRUNCATION_MARKER: &str = "...[truncated]";

pub struct BoundedFetcher {
    fetcher: Arc<dyn PageFetcher>,
    semaphore: Arc<Semaphore>,
    config: FetchConfig,
}

impl BoundedFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: FetchConfig) -> Self {
        let permits = config.concurrency.max(1);
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(permits)),
            config,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Fetch and extract every URL. Duplicates are fetched once per occurrence.
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<ParsedDocument> {
        let results = join_all(urls.iter().map(|url| self.fetch_one(url))).await;
        let documents: Vec<ParsedDocument> = results.into_iter().flatten().collect();

        tracing::info!(
            parsed = documents.len(),
            requested = urls.len(),
            "Pages parsed"
        );
        documents
    }

    async fn fetch_one(&self, url: &str) -> Option<ParsedDocument> {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Fetch gate closed");
                return None;
            }
        };

        match timeout(self.config.request_timeout(), self.fetcher.fetch(url)).await {
            Ok(Ok(Some(page))) => Some(self.to_document(page)),
            Ok(Ok(None)) => {
                tracing::debug!(url = %url, "Skipped non-HTML page");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "Failed to fetch page");
                None
            }
            Err(_) => {
                tracing::warn!(
                    url = %url,
                    timeout_secs = self.config.request_timeout_secs,
                    "Page fetch timed out"
                );
                None
            }
        }
    }

    fn to_document(&self, page: FetchedPage) -> ParsedDocument {
        let cleaned_text = cap_text(&page.text, self.config.max_text_chars);
        let raw_content = truncate_chars(&page.raw_content, self.config.max_raw_chars).to_string();

        ParsedDocument {
            word_count: cleaned_text.split_whitespace().count(),
            url: page.url,
            title: page.title,
            raw_content,
            cleaned_text,
        }
    }
}

/// Cut `text` to `max_chars`, marking the cut
pub fn cap_text(text: &str, max_chars: usize) -> String {
    let kept = truncate_chars(text, max_chars);
    if kept.len() < text.len() {
        format!("{}{}", kept, TRUNCATION_MARKER)
    } else {
        text.to_string()
    }
}
