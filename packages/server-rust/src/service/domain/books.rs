//! Book provider backed by the Google Books volumes API.

use async_trait::async_trait;
use mediagate_core::{Book, SearchError};
use serde::Deserialize;

use super::{fetch_json, QueryCleaner};
use crate::service::config::ProviderConfig;
use crate::service::endpoint::CallContext;
use crate::service::search::SearchService;

#[derive(Debug, Default, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
}

impl VolumesResponse {
    fn into_books(self) -> Vec<Book> {
        self.items
            .into_iter()
            .map(|v| Book {
                title: v.volume_info.title,
                author: v.volume_info.authors.join(", "),
            })
            .collect()
    }
}

/// Searches Google Books and reports each volume as a [`Book`].
#[derive(Debug, Clone)]
pub struct GoogleBooksProvider {
    client: reqwest::Client,
    config: ProviderConfig,
    cleaner: QueryCleaner,
}

impl GoogleBooksProvider {
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
impl SearchService for GoogleBooksProvider {
    type Output = Vec<Book>;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<Vec<Book>, SearchError> {
        let cleaned = self.cleaner.clean(query)?;
        let params = [
            ("q", cleaned),
            ("maxResults", self.config.result_limit.to_string()),
        ];
        let response: VolumesResponse = fetch_json(
            &self.client,
            "google books",
            &self.config.api_endpoint,
            &params,
            ctx,
        )
        .await?;
        Ok(response.into_books())
    }

    async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
        Ok(200)
    }
}
