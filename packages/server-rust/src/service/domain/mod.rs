//! Business logic: the fan-out gateway and the two provider services.
//!
//! Providers call public search APIs over HTTP and return their own record
//! type. The gateway reaches them only through [`SearchService`] handles, which
//! in production are resilient RPC endpoint sets.
//!
//! [`SearchService`]: crate::service::SearchService

pub mod albums;
pub mod books;
pub mod gateway;

pub use albums::ITunesProvider;
pub use books::GoogleBooksProvider;
pub use gateway::{BackendStatus, MediaSearchGateway};

use anyhow::Context as _;
use mediagate_core::SearchError;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::service::endpoint::CallContext;

/// Normalizes user query text before it is sent to a public API.
#[derive(Debug, Clone)]
pub(crate) struct QueryCleaner {
    disallowed: Regex,
}

impl QueryCleaner {
    pub(crate) fn new() -> anyhow::Result<Self> {
        let disallowed = Regex::new(r"[^\w\s]").context("invalid query filter")?;
        Ok(Self { disallowed })
    }

    /// Drops punctuation and collapses whitespace.
    ///
    /// Rejects text that is empty before or after cleaning.
    pub(crate) fn clean(&self, raw: &str) -> Result<String, SearchError> {
        let stripped = self.disallowed.replace_all(raw, "");
        let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        Ok(cleaned)
    }
}

/// GETs `url` with `params` within the context's remaining budget and parses
/// the JSON body. `api` names the upstream in error messages.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    api: &str,
    url: &str,
    params: &[(&str, String)],
    ctx: &CallContext,
) -> Result<T, SearchError> {
    let budget = ctx.remaining();
    if budget.is_zero() {
        return Err(SearchError::DeadlineExceeded { timeout_ms: 0 });
    }

    let response = client
        .get(url)
        .query(params)
        .timeout(budget)
        .send()
        .await
        .map_err(|e| SearchError::Upstream(format!("{api} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Upstream(format!("{api} returned {status}")));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| SearchError::Upstream(format!("{api} response unreadable: {e}")))
}
