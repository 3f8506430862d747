//! JSON payloads of the gateway's public `POST /search` endpoint.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::{MediaItem, SearchResult};

/// Body of `POST /search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
}

/// Response of `POST /search`.
///
/// `degraded` tells the caller that at least one backend did not contribute;
/// older clients that only read `data`/`err` are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub data: Vec<MediaItem>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub err: Option<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl From<SearchResult> for SearchResponse {
    fn from(result: SearchResult) -> Self {
        Self {
            data: result.items,
            err: result.error_message,
            degraded: result.degraded,
        }
    }
}

impl From<&SearchError> for SearchResponse {
    fn from(err: &SearchError) -> Self {
        Self {
            data: Vec::new(),
            err: Some(err.to_string()),
            degraded: false,
        }
    }
}
