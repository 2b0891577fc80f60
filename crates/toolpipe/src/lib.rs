//! Embedding facade for `toolpipe`.
//!
//! Most callers want [`web_search`] or [`web_fetch`]; both read the same `TOOLPIPE_*` environment
//! the binary does. The backend-agnostic types from `toolpipe-core` are re-exported at the root.

pub use toolpipe_core::*;
pub use toolpipe_local::search::{DuckDuckGoSearch, ReqwestTransport};
pub use toolpipe_local::webfetch::FetchedPage;
pub use toolpipe_local::LocalFetcher;

/// One search with the environment-configured endpoints and deadline.
///
/// Invalid input and upstream failures come back inside `Ok` as [`SearchOutcome::Failure`].
/// `Err` is only returned when the HTTP client cannot be built.
pub async fn web_search(query: &str, max_results: Option<usize>) -> Result<SearchOutcome> {
    let fetcher = LocalFetcher::new()?;
    let search = DuckDuckGoSearch::from_env(fetcher.client().clone());
    Ok(search.search_raw(query, max_results).await.outcome)
}

pub async fn web_fetch(url: &str) -> Result<FetchedPage> {
    let fetcher = LocalFetcher::new()?;
    toolpipe_local::webfetch::web_fetch(&fetcher, url).await
}
