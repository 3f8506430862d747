//! Album provider backed by the iTunes search API.

use async_trait::async_trait;
use mediagate_core::{Album, SearchError};
use serde::Deserialize;

use super::{fetch_json, QueryCleaner};
use crate::service::config::ProviderConfig;
use crate::service::endpoint::CallContext;
use crate::service::search::SearchService;

#[derive(Debug, Default, Deserialize)]
struct ITunesResponse {
    #[serde(default)]
    results: Vec<ITunesEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ITunesEntry {
    #[serde(default)]
    collection_name: String,
    #[serde(default)]
    artist_name: String,
}

impl ITunesResponse {
    fn into_albums(self) -> Vec<Album> {
        self.results
            .into_iter()
            .map(|e| Album {
                title: e.collection_name,
                artist: e.artist_name,
            })
            .collect()
    }
}

/// Searches the iTunes album catalogue and reports each hit as an [`Album`].
#[derive(Debug, Clone)]
pub struct ITunesProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    cleaner: QueryCleaner,
}

impl ITunesProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            config,
            cleaner: QueryCleaner::new()?,
        })
    }
}

#[async_trait]
impl SearchService for ITunesProvider {
    type Output = Vec<Album>;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<Vec<Album>, SearchError> {
        let cleaned = self.cleaner.clean(query)?;
        let params = [
            ("term", cleaned),
            ("entity", "album".to_string()),
            ("limit", self.config.result_limit.to_string()),
        ];
        let response: ITunesResponse =
            fetch_json(&self.client, "itunes", &self.config.api_endpoint, &params, ctx).await?;
        Ok(response.into_albums())
    }

    async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
        Ok(200)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;
    use crate::service::domain::test_support::serve;

    #[test]
    fn maps_collection_and_artist() {
        let response: ITunesResponse = serde_json::from_value(serde_json::json!({
            "resultCount": 1,
            "results": [{"collectionName": "Abbey Road", "artistName": "The Beatles", "collectionId": 1}]
        }))
        .unwrap();
        assert_eq!(
            response.into_albums(),
            vec![Album {
                title: "Abbey Road".to_string(),
                artist: "The Beatles".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn requests_album_entity() {
        let router = Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let ok = params["entity"] == "album" && params["limit"] == "3";
                Json(serde_json::json!({
                    "results": [{"collectionName": params["term"], "artistName": ok.to_string()}]
                }))
            }),
        );
        let base = serve(router).await;
        let provider = ITunesProvider::new(ProviderConfig {
            api_endpoint: format!("{base}/search"),
            result_limit: 3,
        })
        .unwrap();

        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let albums = provider.search(&ctx, "the beatles").await.unwrap();
        assert_eq!(albums[0].title, "the beatles");
        assert_eq!(albums[0].artist, "true");
    }

    #[tokio::test]
    async fn malformed_body_is_upstream_error() {
        let router = Router::new().route("/search", get(|| async { "not json" }));
        let base = serve(router).await;
        let provider = ITunesProvider::new(ProviderConfig {
            api_endpoint: format!("{base}/search"),
            result_limit: 5,
        })
        .unwrap();

        let ctx = CallContext::with_timeout(Duration::from_secs(5));
        let err = provider.search(&ctx, "help").await.unwrap_err();
        assert!(matches!(err, SearchError::Upstream(_)), "{err:?}");
    }
}
