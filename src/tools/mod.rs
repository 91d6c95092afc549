//! External retrieval collaborators
//!
//! - [`search`](crate::tools::search) - web search backends (Tavily, DuckDuckGo, fixture)
//! - [`fetch`](crate::tools::fetch) - page download and HTML text extraction
//!
//! Both sit behind traits ([`SearchBackend`], [`PageFetcher`]) so the pipeline
//! can be driven by doubles in tests.

/// Page fetching and text extraction.
pub mod fetch;
/// Web search backends.
pub mod search;

pub use fetch::{FetchedPage, HttpPageFetcher, PageFetcher};
pub use search::{create_search_backend, FixtureSearch, SearchBackend, TavilySearch};

#[cfg(feature = "duckduckgo")]
pub use search::DuckDuckGoSearch;
